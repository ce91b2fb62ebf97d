mod error;
mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::fs;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::RelayConfig;
use crate::delivery::{DeliverySink, Destination};
use crate::resolver::{proxy_url, resolve_identifier};
use crate::store::DedupLedger;
use crate::transcoder::{JobBuilder, TranscodeKind, Transcoder};

pub use error::{PipelineError, PipelineResult};
pub use types::{AbortReason, ArtifactSet, CompressionSweep, DeliveryReport, ItemOutcome};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub work_dir: PathBuf,
    pub proxy_base: Url,
    pub size_ceiling_bytes: u64,
    pub sweep: CompressionSweep,
}

impl PipelineSettings {
    pub fn from_config(config: &RelayConfig) -> PipelineResult<Self> {
        let proxy_base =
            Url::parse(&config.proxy.base_url).map_err(|err| PipelineError::InvalidProxy {
                url: config.proxy.base_url.clone(),
                reason: err.to_string(),
            })?;
        Ok(Self {
            work_dir: config.pipeline.work_dir.clone(),
            proxy_base,
            size_ceiling_bytes: config.pipeline.size_ceiling_bytes,
            sweep: CompressionSweep::from(&config.pipeline),
        })
    }
}

enum Compression {
    Fits { crf: u32, size: u64, attempts: u32 },
    Abort(AbortReason),
}

/// Per-URL workflow: resolve, fetch, shrink under the ceiling if needed,
/// deliver, mark in the ledger. Local artifacts are removed on every exit.
pub struct Pipeline {
    settings: PipelineSettings,
    jobs: JobBuilder,
    transcoder: Arc<dyn Transcoder>,
    sink: Arc<dyn DeliverySink>,
    ledger: Arc<dyn DedupLedger>,
}

impl Pipeline {
    pub fn new(
        settings: PipelineSettings,
        jobs: JobBuilder,
        transcoder: Arc<dyn Transcoder>,
        sink: Arc<dyn DeliverySink>,
        ledger: Arc<dyn DedupLedger>,
    ) -> Self {
        Self {
            settings,
            jobs,
            transcoder,
            sink,
            ledger,
        }
    }

    pub async fn process(
        &self,
        url: &str,
        destination: &Destination,
    ) -> PipelineResult<ItemOutcome> {
        let Some(identifier) = resolve_identifier(url) else {
            warn!(url = %url, "no identifier in url, skipping");
            return Ok(ItemOutcome::Aborted(AbortReason::Unresolvable));
        };
        let artifacts = ArtifactSet::new(&self.settings.work_dir, &identifier);
        let result = self
            .run_stages(url, &identifier, &artifacts, destination)
            .await;
        self.cleanup(&artifacts).await;
        result
    }

    async fn run_stages(
        &self,
        url: &str,
        identifier: &str,
        artifacts: &ArtifactSet,
        destination: &Destination,
    ) -> PipelineResult<ItemOutcome> {
        fs::create_dir_all(&self.settings.work_dir)
            .await
            .map_err(|source| PipelineError::Io {
                path: self.settings.work_dir.clone(),
                source,
            })?;

        let source = proxy_url(&self.settings.proxy_base, identifier);
        let fetch = self.jobs.fetch(&source, &artifacts.raw);
        debug!(identifier = %identifier, "fetching through proxy");
        let status = self.transcoder.run(&fetch).await?;
        if !status.is_success() {
            warn!(identifier = %identifier, status = %status, "fetch failed");
            return Ok(ItemOutcome::Aborted(AbortReason::FetchFailed { status }));
        }
        let Some(raw_size) = file_size(&artifacts.raw).await? else {
            return Ok(ItemOutcome::Aborted(AbortReason::NoOutput {
                stage: TranscodeKind::Fetch,
            }));
        };

        let (final_path, size, crf, attempts) = if raw_size <= self.settings.size_ceiling_bytes {
            (artifacts.raw.as_path(), raw_size, None, 0)
        } else {
            info!(
                identifier = %identifier,
                size = raw_size,
                ceiling = self.settings.size_ceiling_bytes,
                "download exceeds ceiling, compressing"
            );
            match self.compress(identifier, artifacts, raw_size).await? {
                Compression::Fits {
                    crf,
                    size,
                    attempts,
                } => (artifacts.compressed.as_path(), size, Some(crf), attempts),
                Compression::Abort(reason) => {
                    warn!(identifier = %identifier, reason = %reason, "dropping item");
                    return Ok(ItemOutcome::Aborted(reason));
                }
            }
        };

        self.sink.deliver(destination, final_path).await?;
        self.ledger.mark(url).await?;
        info!(identifier = %identifier, size, crf = ?crf, destination = %destination, "delivered");

        Ok(ItemOutcome::Delivered(DeliveryReport {
            url: url.to_string(),
            identifier: identifier.to_string(),
            size_bytes: size,
            crf,
            encode_attempts: attempts,
            delivered_at: Utc::now(),
        }))
    }

    async fn compress(
        &self,
        identifier: &str,
        artifacts: &ArtifactSet,
        raw_size: u64,
    ) -> PipelineResult<Compression> {
        let mut attempts = 0;
        let mut last = None;
        for crf in self.settings.sweep.levels() {
            attempts += 1;
            let job = self.jobs.encode(&artifacts.raw, &artifacts.compressed, crf);
            let status = self.transcoder.run(&job).await?;
            if !status.is_success() {
                return Ok(Compression::Abort(AbortReason::CompressionFailed {
                    crf,
                    status,
                }));
            }
            let Some(size) = file_size(&artifacts.compressed).await? else {
                return Ok(Compression::Abort(AbortReason::NoOutput { stage: job.kind }));
            };
            if size <= self.settings.size_ceiling_bytes {
                return Ok(Compression::Fits {
                    crf,
                    size,
                    attempts,
                });
            }
            debug!(identifier = %identifier, crf, size, "re-encode still over ceiling");
            last = Some((crf, size));
        }
        let (last_crf, size_bytes) = last.unwrap_or((self.settings.sweep.start, raw_size));
        Ok(Compression::Abort(AbortReason::CompressionExhausted {
            last_crf,
            size_bytes,
        }))
    }

    async fn cleanup(&self, artifacts: &ArtifactSet) {
        for path in artifacts.paths() {
            match fs::remove_file(path).await {
                Ok(()) => debug!(path = %path.display(), "removed artifact"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to remove artifact")
                }
            }
        }
    }
}

async fn file_size(path: &Path) -> PipelineResult<Option<u64>> {
    match fs::metadata(path).await {
        Ok(metadata) => Ok(Some(metadata.len())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(PipelineError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
