use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::delivery::{Destination, ProgressReporter};
use crate::pipeline::{ItemOutcome, Pipeline};
use crate::store::{DedupLedger, LinkCatalog, LinkRecord, LinkScan, StoreError};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to store links: {0}")]
    Append(#[source] StoreError),
    #[error("catalog scan failed at ordinal {ordinal}: {source}")]
    Scan {
        ordinal: u64,
        #[source]
        source: StoreError,
    },
}

pub type BatchResult<T> = Result<T, BatchError>;

#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// First ordinal visited by every scan; lets a long catalog resume past
    /// a prefix that was already handled.
    pub start_ordinal: u64,
    pub page_size: usize,
    pub progress_url_chars: usize,
}

impl BatchSettings {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            start_ordinal: config.batch.start_ordinal,
            page_size: config.store.scan_page_size,
            progress_url_chars: config.batch.progress_url_chars,
        }
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            start_ordinal: 1,
            page_size: 64,
            progress_url_chars: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub run_id: String,
    pub stored: usize,
    pub start_ordinal: u64,
    pub scanned: usize,
    pub skipped: usize,
    pub delivered: usize,
    pub aborted: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub duration_secs: u64,
}

impl BatchSummary {
    fn new(run_id: Uuid, start_ordinal: u64) -> Self {
        Self {
            run_id: run_id.to_string(),
            stored: 0,
            start_ordinal,
            scanned: 0,
            skipped: 0,
            delivered: 0,
            aborted: 0,
            failed: 0,
            errors: Vec::new(),
            duration_secs: 0,
        }
    }
}

/// Sequences the pipeline over the catalog. One item runs to completion
/// before the next starts; a failing item never stops the scan.
pub struct BatchDriver {
    catalog: Arc<dyn LinkCatalog>,
    ledger: Arc<dyn DedupLedger>,
    pipeline: Arc<Pipeline>,
    settings: BatchSettings,
}

impl BatchDriver {
    pub fn new(
        catalog: Arc<dyn LinkCatalog>,
        ledger: Arc<dyn DedupLedger>,
        pipeline: Arc<Pipeline>,
        settings: BatchSettings,
    ) -> Self {
        Self {
            catalog,
            ledger,
            pipeline,
            settings,
        }
    }

    pub async fn run(
        &self,
        urls: &[String],
        destination: &Destination,
        reporter: &dyn ProgressReporter,
    ) -> BatchResult<BatchSummary> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let mut summary = BatchSummary::new(run_id, self.settings.start_ordinal);

        let stored = self.catalog.append(urls).await.map_err(BatchError::Append)?;
        summary.stored = stored.len();
        info!(
            run_id = %run_id,
            stored = stored.len(),
            first = stored.first().map(|record| record.ordinal),
            last = stored.last().map(|record| record.ordinal),
            start = self.settings.start_ordinal,
            "links stored"
        );
        notify(
            reporter,
            &format!(
                "📥 Found {} links. Starting processing from #{}...",
                urls.len(),
                self.settings.start_ordinal
            ),
        )
        .await;

        let mut scan = LinkScan::new(
            Arc::clone(&self.catalog),
            self.settings.start_ordinal,
            self.settings.page_size,
        );
        let mut cursor = self.settings.start_ordinal;
        loop {
            let record = match scan.next_record().await {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(source) => {
                    return Err(BatchError::Scan {
                        ordinal: cursor,
                        source,
                    })
                }
            };
            cursor = record.ordinal + 1;
            summary.scanned += 1;
            self.handle_record(&record, destination, reporter, &mut summary)
                .await;
        }

        summary.duration_secs = started.elapsed().as_secs();
        info!(
            run_id = %run_id,
            scanned = summary.scanned,
            skipped = summary.skipped,
            delivered = summary.delivered,
            aborted = summary.aborted,
            failed = summary.failed,
            duration = summary.duration_secs,
            "batch finished"
        );
        notify(
            reporter,
            &format!(
                "✅ All links processed. Delivered {}, skipped {}, dropped {}, errors {}.",
                summary.delivered, summary.skipped, summary.aborted, summary.failed
            ),
        )
        .await;
        Ok(summary)
    }

    async fn handle_record(
        &self,
        record: &LinkRecord,
        destination: &Destination,
        reporter: &dyn ProgressReporter,
        summary: &mut BatchSummary,
    ) {
        let display = truncate_for_display(&record.url, self.settings.progress_url_chars);
        match self.ledger.contains(&record.url).await {
            Ok(true) => {
                summary.skipped += 1;
                notify(
                    reporter,
                    &format!("⏭️ Skipping link {}: already uploaded", record.ordinal),
                )
                .await;
                return;
            }
            Ok(false) => {}
            Err(err) => {
                self.record_failure(record, &display, &err.to_string(), reporter, summary)
                    .await;
                return;
            }
        }

        notify(
            reporter,
            &format!("➡️ Processing link {}: {display}", record.ordinal),
        )
        .await;
        match self.pipeline.process(&record.url, destination).await {
            Ok(ItemOutcome::Delivered(report)) => {
                summary.delivered += 1;
                let via = report
                    .crf
                    .map(|crf| format!(" (re-encoded at crf {crf})"))
                    .unwrap_or_default();
                notify(
                    reporter,
                    &format!("📤 Uploaded link {}{via}", record.ordinal),
                )
                .await;
            }
            Ok(ItemOutcome::Aborted(reason)) => {
                summary.aborted += 1;
                info!(ordinal = record.ordinal, reason = %reason, "item dropped");
                notify(
                    reporter,
                    &format!("⚠️ Skipped link {}: {reason}", record.ordinal),
                )
                .await;
            }
            Err(err) => {
                self.record_failure(record, &display, &err.to_string(), reporter, summary)
                    .await;
            }
        }
    }

    async fn record_failure(
        &self,
        record: &LinkRecord,
        display: &str,
        error: &str,
        reporter: &dyn ProgressReporter,
        summary: &mut BatchSummary,
    ) {
        summary.failed += 1;
        summary
            .errors
            .push(format!("#{} {}: {error}", record.ordinal, record.url));
        warn!(ordinal = record.ordinal, url = %record.url, error = %error, "item failed");
        notify(
            reporter,
            &format!("❌ Error processing link {display}: {error}"),
        )
        .await;
    }
}

async fn notify(reporter: &dyn ProgressReporter, message: &str) {
    if let Err(err) = reporter.report(message).await {
        warn!(error = %err, "failed to send progress message");
    }
}

/// Shortens `url` to at most `max_chars` characters, appending `...` when cut.
pub fn truncate_for_display(url: &str, max_chars: usize) -> String {
    match url.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &url[..cut]),
        None => url.to_string(),
    }
}
