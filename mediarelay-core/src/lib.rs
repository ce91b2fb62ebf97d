pub mod batch;
pub mod config;
pub mod delivery;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod resolver;
pub mod sqlite;
pub mod store;
pub mod telegram;
pub mod transcoder;

pub use batch::{BatchDriver, BatchError, BatchResult, BatchSettings, BatchSummary};
pub use config::RelayConfig;
pub use delivery::{
    DeliveryError, DeliveryResult, DeliverySink, Destination, LogReporter, ProgressReporter,
};
pub use error::{ConfigError, Result};
pub use pipeline::{
    AbortReason, ItemOutcome, Pipeline, PipelineError, PipelineResult, PipelineSettings,
};
pub use resolver::{proxy_url, resolve_identifier};
pub use store::{DedupLedger, LinkCatalog, LinkRecord, LinkScan, SqliteRelayStore, StoreError};
pub use transcoder::{FfmpegTranscoder, JobBuilder, TranscodeJob, TranscodeStatus, Transcoder};
