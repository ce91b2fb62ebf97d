#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Mutex;
use url::Url;

use mediarelay_core::config::TranscoderSection;
use mediarelay_core::delivery::{
    DeliveryError, DeliveryResult, DeliverySink, Destination, ProgressReporter,
};
use mediarelay_core::pipeline::{CompressionSweep, Pipeline, PipelineSettings};
use mediarelay_core::store::SqliteRelayStore;
use mediarelay_core::transcoder::{
    JobBuilder, TranscodeJob, TranscodeKind, TranscodeResult, TranscodeStatus, Transcoder,
};

pub const CEILING: u64 = 1_000;

/// Writes output files of scripted sizes instead of running ffmpeg.
pub struct ScriptedTranscoder {
    pub fetch_size: u64,
    /// Size produced at a given crf; missing levels produce `fetch_size`.
    pub encode_sizes: HashMap<u32, u64>,
    /// Identifiers whose fetch exits nonzero.
    pub failing_fetches: HashSet<String>,
    /// Quality levels whose encode exits nonzero.
    pub failing_encodes: HashSet<u32>,
    pub fetch_status_override: Option<TranscodeStatus>,
    pub calls: Mutex<Vec<(TranscodeKind, String)>>,
}

impl ScriptedTranscoder {
    pub fn with_fetch_size(fetch_size: u64) -> Self {
        Self {
            fetch_size,
            encode_sizes: HashMap::new(),
            failing_fetches: HashSet::new(),
            failing_encodes: HashSet::new(),
            fetch_status_override: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn encode_size(mut self, crf: u32, size: u64) -> Self {
        self.encode_sizes.insert(crf, size);
        self
    }

    pub fn failing_fetch(mut self, identifier: &str) -> Self {
        self.failing_fetches.insert(identifier.to_string());
        self
    }

    pub fn failing_encode(mut self, crf: u32) -> Self {
        self.failing_encodes.insert(crf);
        self
    }

    pub async fn encode_levels(&self) -> Vec<u32> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|(kind, _)| match kind {
                TranscodeKind::Encode { crf } => Some(*crf),
                TranscodeKind::Fetch => None,
            })
            .collect()
    }

    pub async fn fetch_count(&self) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|(kind, _)| *kind == TranscodeKind::Fetch)
            .count()
    }
}

#[async_trait]
impl Transcoder for ScriptedTranscoder {
    async fn run(&self, job: &TranscodeJob) -> TranscodeResult<TranscodeStatus> {
        let target = job.args.join(" ");
        self.calls.lock().await.push((job.kind, target.clone()));
        let size = match job.kind {
            TranscodeKind::Fetch => {
                if let Some(status) = self.fetch_status_override {
                    return Ok(status);
                }
                if self
                    .failing_fetches
                    .iter()
                    .any(|identifier| target.contains(&format!("id={identifier}")))
                {
                    return Ok(TranscodeStatus::Failed { code: Some(1) });
                }
                self.fetch_size
            }
            TranscodeKind::Encode { crf } => {
                if self.failing_encodes.contains(&crf) {
                    return Ok(TranscodeStatus::Failed { code: Some(1) });
                }
                self.encode_sizes
                    .get(&crf)
                    .copied()
                    .unwrap_or(self.fetch_size)
            }
        };
        tokio::fs::write(&job.output, vec![0u8; size as usize])
            .await
            .expect("write scripted output");
        Ok(TranscodeStatus::Success)
    }
}

#[derive(Debug, Clone)]
pub struct Delivered {
    pub destination: Destination,
    pub file_name: String,
    pub size: u64,
}

/// Records deliveries; fails for file names containing `fail_marker`.
#[derive(Default)]
pub struct RecordingSink {
    pub fail_marker: Option<String>,
    pub delivered: Mutex<Vec<Delivered>>,
}

impl RecordingSink {
    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            delivered: Mutex::new(Vec::new()),
        }
    }

    pub async fn file_names(&self) -> Vec<String> {
        self.delivered
            .lock()
            .await
            .iter()
            .map(|entry| entry.file_name.clone())
            .collect()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn deliver(&self, destination: &Destination, path: &Path) -> DeliveryResult<()> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        if let Some(marker) = &self.fail_marker {
            if file_name.contains(marker.as_str()) {
                return Err(DeliveryError::Rejected {
                    destination: *destination,
                    reason: "Request Entity Too Large".to_string(),
                });
            }
        }
        let size = std::fs::metadata(path).expect("artifact exists").len();
        self.delivered.lock().await.push(Delivered {
            destination: *destination,
            file_name,
            size,
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct CollectingReporter {
    pub messages: Mutex<Vec<String>>,
}

#[async_trait]
impl ProgressReporter for CollectingReporter {
    async fn report(&self, message: &str) -> DeliveryResult<()> {
        self.messages.lock().await.push(message.to_string());
        Ok(())
    }
}

pub fn temp_store(dir: &Path) -> SqliteRelayStore {
    let store = SqliteRelayStore::builder()
        .path(dir.join("relay.sqlite"))
        .create_if_missing(true)
        .build()
        .expect("create store");
    store.initialize().expect("initialize store");
    store
}

pub fn settings(dir: &TempDir) -> PipelineSettings {
    PipelineSettings {
        work_dir: dir.path().join("work"),
        proxy_base: Url::parse("https://proxy.test/").unwrap(),
        size_ceiling_bytes: CEILING,
        sweep: CompressionSweep::default(),
    }
}

pub fn pipeline(
    dir: &TempDir,
    transcoder: Arc<ScriptedTranscoder>,
    sink: Arc<RecordingSink>,
    store: &SqliteRelayStore,
) -> Pipeline {
    Pipeline::new(
        settings(dir),
        JobBuilder::new(TranscoderSection::default()),
        transcoder,
        sink,
        Arc::new(store.clone()),
    )
}

pub fn work_dir_is_empty(dir: &TempDir) -> bool {
    match std::fs::read_dir(dir.path().join("work")) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}
