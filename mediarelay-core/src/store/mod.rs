pub mod error;
pub mod models;
pub mod sqlite;

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;

pub use error::{StoreError, StoreResult};
pub use models::{LinkRecord, ProcessedRecord, StoreCounts};
pub use sqlite::{SqliteRelayStore, SqliteRelayStoreBuilder};

/// Durable ordered table of ingested URLs.
#[async_trait]
pub trait LinkCatalog: Send + Sync {
    /// Appends `urls` in order, assigning `count_before + 1 ..= count_before + len`.
    async fn append(&self, urls: &[String]) -> StoreResult<Vec<LinkRecord>>;

    async fn count(&self) -> StoreResult<u64>;

    /// Up to `limit` records with `ordinal >= from_ordinal`, ascending.
    async fn page(&self, from_ordinal: u64, limit: usize) -> StoreResult<Vec<LinkRecord>>;
}

/// Durable set of URLs that were delivered.
#[async_trait]
pub trait DedupLedger: Send + Sync {
    async fn contains(&self, url: &str) -> StoreResult<bool>;

    /// Unconditional insert; marking twice leaves two rows.
    async fn mark(&self, url: &str) -> StoreResult<()>;
}

/// Forward-only cursor over the catalog starting at a given ordinal.
///
/// Records are pulled one page at a time, so links appended while the scan
/// is running may or may not be observed.
pub struct LinkScan {
    catalog: Arc<dyn LinkCatalog>,
    next_ordinal: u64,
    page_size: usize,
    buffer: VecDeque<LinkRecord>,
    exhausted: bool,
}

impl LinkScan {
    pub fn new(catalog: Arc<dyn LinkCatalog>, start_ordinal: u64, page_size: usize) -> Self {
        Self {
            catalog,
            next_ordinal: start_ordinal.max(1),
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    pub async fn next_record(&mut self) -> StoreResult<Option<LinkRecord>> {
        if self.buffer.is_empty() && !self.exhausted {
            let page = self.catalog.page(self.next_ordinal, self.page_size).await?;
            match page.last() {
                Some(last) => {
                    self.next_ordinal = last.ordinal + 1;
                    self.buffer.extend(page);
                }
                None => self.exhausted = true,
            }
        }
        Ok(self.buffer.pop_front())
    }
}
