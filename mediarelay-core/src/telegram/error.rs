use std::path::PathBuf;

use thiserror::Error;

use crate::delivery::DeliveryError;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("bot api request {method} failed: {source}")]
    Http {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("bot api {method} returned error {code:?}: {description}")]
    Api {
        method: &'static str,
        code: Option<i64>,
        description: String,
    },
    #[error("invalid bot api base url: {0}")]
    InvalidBaseUrl(String),
    #[error("file {file_id} has no download path")]
    MissingFilePath { file_id: String },
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

impl TelegramError {
    /// reqwest errors carry the request url, which embeds the bot token.
    pub(crate) fn http(method: &'static str, source: reqwest::Error) -> Self {
        TelegramError::Http {
            method,
            source: source.without_url(),
        }
    }
}

impl From<TelegramError> for DeliveryError {
    fn from(error: TelegramError) -> Self {
        match error {
            TelegramError::Io { source, path } => DeliveryError::Io { source, path },
            other => DeliveryError::Transport(other.to_string()),
        }
    }
}

pub type TelegramResult<T> = Result<T, TelegramError>;
