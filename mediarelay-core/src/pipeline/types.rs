use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::PipelineSection;
use crate::transcoder::{TranscodeKind, TranscodeStatus};

/// Transient files of one in-flight item, keyed by its identifier.
#[derive(Debug, Clone)]
pub struct ArtifactSet {
    pub raw: PathBuf,
    pub compressed: PathBuf,
}

impl ArtifactSet {
    pub fn new(work_dir: &Path, identifier: &str) -> Self {
        Self {
            raw: work_dir.join(format!("{identifier}.mp4")),
            compressed: work_dir.join(format!("compressed_{identifier}.mp4")),
        }
    }

    pub fn paths(&self) -> [&Path; 2] {
        [&self.raw, &self.compressed]
    }
}

/// Linear quality sweep: `start`, `start + step`, ... while `<= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionSweep {
    pub start: u32,
    pub step: u32,
    pub max: u32,
}

impl CompressionSweep {
    pub fn levels(&self) -> impl Iterator<Item = u32> {
        (self.start..=self.max).step_by(self.step.max(1) as usize)
    }
}

impl Default for CompressionSweep {
    fn default() -> Self {
        Self {
            start: 24,
            step: 2,
            max: 35,
        }
    }
}

impl From<&PipelineSection> for CompressionSweep {
    fn from(section: &PipelineSection) -> Self {
        Self {
            start: section.crf_start,
            step: section.crf_step,
            max: section.crf_max,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    /// No identifier could be derived from the URL.
    Unresolvable,
    FetchFailed {
        #[serde(serialize_with = "serialize_display")]
        status: TranscodeStatus,
    },
    /// The transcoder reported success but left no file behind.
    NoOutput {
        #[serde(serialize_with = "serialize_display")]
        stage: TranscodeKind,
    },
    CompressionFailed {
        crf: u32,
        #[serde(serialize_with = "serialize_display")]
        status: TranscodeStatus,
    },
    /// Still above the ceiling after the last quality level.
    CompressionExhausted { last_crf: u32, size_bytes: u64 },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Unresolvable => write!(f, "no identifier in url"),
            AbortReason::FetchFailed { status } => write!(f, "download failed ({status})"),
            AbortReason::NoOutput { stage } => write!(f, "{stage} produced no output"),
            AbortReason::CompressionFailed { crf, status } => {
                write!(f, "re-encode at crf {crf} failed ({status})")
            }
            AbortReason::CompressionExhausted {
                last_crf,
                size_bytes,
            } => write!(
                f,
                "still {size_bytes} bytes after re-encoding at crf {last_crf}"
            ),
        }
    }
}

fn serialize_display<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: fmt::Display,
    S: serde::Serializer,
{
    serializer.collect_str(value)
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub url: String,
    pub identifier: String,
    pub size_bytes: u64,
    /// Quality level of the delivered re-encode; `None` when the raw download fit.
    pub crf: Option<u32>,
    pub encode_attempts: u32,
    pub delivered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Delivered(DeliveryReport),
    Aborted(AbortReason),
}

impl ItemOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ItemOutcome::Delivered(_))
    }
}
