use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// Opaque delivery target, resolved once per batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Destination {
    pub chat_id: i64,
}

impl Destination {
    pub fn chat(chat_id: i64) -> Self {
        Self { chat_id }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chat:{}", self.chat_id)
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("transport rejected delivery to {destination}: {reason}")]
    Rejected {
        destination: Destination,
        reason: String,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Uploads a finished artifact to its destination.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, destination: &Destination, path: &Path) -> DeliveryResult<()>;
}

/// Receives the operator-facing progress lines of a batch.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, message: &str) -> DeliveryResult<()>;
}

/// Emits progress lines as tracing events; used when no chat is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

#[async_trait]
impl ProgressReporter for LogReporter {
    async fn report(&self, message: &str) -> DeliveryResult<()> {
        info!(target: "mediarelay::progress", "{message}");
        Ok(())
    }
}
