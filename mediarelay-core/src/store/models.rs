use chrono::{DateTime, Utc};
use serde::Serialize;

/// An ingested URL and the ordinal it was assigned. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRecord {
    pub ordinal: u64,
    pub url: String,
}

impl LinkRecord {
    pub fn new(ordinal: u64, url: impl Into<String>) -> Self {
        Self {
            ordinal,
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessedRecord {
    pub url: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StoreCounts {
    pub links: u64,
    pub processed: u64,
}
