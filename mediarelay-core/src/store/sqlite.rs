use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};

use crate::sqlite::configure_connection;

use super::models::{LinkRecord, ProcessedRecord, StoreCounts};
use super::{DedupLedger, LinkCatalog, StoreError, StoreResult};

const SCHEMA: &str = include_str!("../../../sql/mediarelay.sql");

#[derive(Debug, Clone)]
pub struct SqliteRelayStoreBuilder {
    path: Option<PathBuf>,
    create_if_missing: bool,
}

impl Default for SqliteRelayStoreBuilder {
    fn default() -> Self {
        Self {
            path: None,
            create_if_missing: true,
        }
    }
}

impl SqliteRelayStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn build(self) -> StoreResult<SqliteRelayStore> {
        let path = self.path.ok_or(StoreError::MissingStore)?;
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE;
        if self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        Ok(SqliteRelayStore { path, flags })
    }
}

/// Link catalog and dedup ledger backed by one SQLite file. Each call opens
/// its own connection, so clones are cheap and may move across threads.
#[derive(Debug, Clone)]
pub struct SqliteRelayStore {
    path: PathBuf,
    flags: OpenFlags,
}

impl SqliteRelayStore {
    pub fn builder() -> SqliteRelayStoreBuilder {
        SqliteRelayStoreBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        SqliteRelayStoreBuilder::new().path(path).build()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> StoreResult<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && self.flags.contains(OpenFlags::SQLITE_OPEN_CREATE) {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            StoreError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        configure_connection(&conn).map_err(|source| StoreError::OpenDatabase {
            path: self.path.clone(),
            source,
        })?;
        Ok(conn)
    }

    pub fn initialize(&self) -> StoreResult<()> {
        let conn = self.open()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn append_links(&self, urls: &[String]) -> StoreResult<Vec<LinkRecord>> {
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing: i64 = tx.query_row("SELECT COUNT(*) FROM links", [], |row| row.get(0))?;
        let existing = to_ordinal(existing)?;
        let mut records = Vec::with_capacity(urls.len());
        {
            let mut stmt = tx.prepare("INSERT INTO links (ordinal, url) VALUES (?1, ?2)")?;
            for (position, url) in urls.iter().enumerate() {
                let ordinal = existing + position as u64 + 1;
                stmt.execute(params![ordinal as i64, url])?;
                records.push(LinkRecord::new(ordinal, url.clone()));
            }
        }
        tx.commit()?;
        Ok(records)
    }

    pub fn count_links(&self) -> StoreResult<u64> {
        let conn = self.open()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM links", [], |row| row.get(0))?;
        to_ordinal(count)
    }

    pub fn links_from(&self, from_ordinal: u64, limit: usize) -> StoreResult<Vec<LinkRecord>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT ordinal, url FROM links WHERE ordinal >= ?1 ORDER BY ordinal ASC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![from_ordinal as i64, limit as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(ordinal, url)| Ok(LinkRecord::new(to_ordinal(ordinal)?, url)))
            .collect()
    }

    pub fn is_processed(&self, url: &str) -> StoreResult<bool> {
        let conn = self.open()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM processed_links WHERE url = ?1 LIMIT 1",
                params![url],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn mark_processed(&self, url: &str) -> StoreResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO processed_links (url, processed_at) VALUES (?1, ?2)",
            params![url, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn processed_records(&self, url: &str) -> StoreResult<Vec<ProcessedRecord>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT url, processed_at FROM processed_links WHERE url = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![url], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .map(|(url, processed_at)| ProcessedRecord {
                url,
                processed_at: DateTime::parse_from_rfc3339(&processed_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
            .collect())
    }

    pub fn counts(&self) -> StoreResult<StoreCounts> {
        let conn = self.open()?;
        let links: i64 = conn.query_row("SELECT COUNT(*) FROM links", [], |row| row.get(0))?;
        let processed: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT url) FROM processed_links",
            [],
            |row| row.get(0),
        )?;
        Ok(StoreCounts {
            links: to_ordinal(links)?,
            processed: to_ordinal(processed)?,
        })
    }
}

fn to_ordinal(value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StoreError::InvalidOrdinal(value))
}

async fn blocking<T, F>(store: &SqliteRelayStore, operation: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce(SqliteRelayStore) -> StoreResult<T> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || operation(store))
        .await
        .map_err(|err| StoreError::Io(std::io::Error::other(err)))?
}

#[async_trait]
impl LinkCatalog for SqliteRelayStore {
    async fn append(&self, urls: &[String]) -> StoreResult<Vec<LinkRecord>> {
        let urls = urls.to_vec();
        blocking(self, move |store| store.append_links(&urls)).await
    }

    async fn count(&self) -> StoreResult<u64> {
        blocking(self, |store| store.count_links()).await
    }

    async fn page(&self, from_ordinal: u64, limit: usize) -> StoreResult<Vec<LinkRecord>> {
        blocking(self, move |store| store.links_from(from_ordinal, limit)).await
    }
}

#[async_trait]
impl DedupLedger for SqliteRelayStore {
    async fn contains(&self, url: &str) -> StoreResult<bool> {
        let url = url.to_string();
        blocking(self, move |store| store.is_processed(&url)).await
    }

    async fn mark(&self, url: &str) -> StoreResult<()> {
        let url = url.to_string();
        blocking(self, move |store| store.mark_processed(&url)).await
    }
}
