use std::path::PathBuf;

use thiserror::Error;

use crate::delivery::DeliveryError;
use crate::store::StoreError;
use crate::transcoder::TranscoderError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transcoder error: {0}")]
    Transcoder(#[from] TranscoderError),
    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
    #[error("ledger error: {0}")]
    Ledger(String),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("invalid proxy url {url}: {reason}")]
    InvalidProxy { url: String, reason: String },
}

impl From<StoreError> for PipelineError {
    fn from(error: StoreError) -> Self {
        PipelineError::Ledger(error.to_string())
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
