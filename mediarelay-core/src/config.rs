use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, Result};

pub const ENV_BOT_TOKEN: &str = "MEDIARELAY_BOT_TOKEN";
pub const ENV_STORE_PATH: &str = "MEDIARELAY_STORE_PATH";
pub const ENV_DESTINATION: &str = "MEDIARELAY_DESTINATION";
pub const ENV_SIZE_CEILING: &str = "MEDIARELAY_SIZE_CEILING_BYTES";
pub const ENV_START_ORDINAL: &str = "MEDIARELAY_START_ORDINAL";

/// 2 GiB, the upload limit of a self-hosted Bot API server.
pub const DEFAULT_SIZE_CEILING_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Host of the cloud Bot API, which caps uploads at 50 MiB.
pub const CLOUD_API_HOST: &str = "api.telegram.org";
pub const CLOUD_UPLOAD_LIMIT_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RelayConfig {
    pub telegram: TelegramSection,
    pub store: StoreSection,
    pub proxy: ProxySection,
    #[serde(default)]
    pub transcoder: TranscoderSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub batch: BatchSection,
}

impl RelayConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            source,
            path: path.to_path_buf(),
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            source,
            path: path.to_path_buf(),
        })
    }

    /// Applies `MEDIARELAY_*` overrides. `lookup` is `std::env::var` in
    /// production and a map in tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(ENV_BOT_TOKEN) {
            self.telegram.bot_token = token.trim().to_string();
        }
        if let Some(path) = lookup(ENV_STORE_PATH) {
            self.store.path = PathBuf::from(path);
        }
        if let Some(value) = lookup(ENV_DESTINATION) {
            self.telegram.destination_chat_id = Some(parse_env(ENV_DESTINATION, &value)?);
        }
        if let Some(value) = lookup(ENV_SIZE_CEILING) {
            self.pipeline.size_ceiling_bytes = parse_env(ENV_SIZE_CEILING, &value)?;
        }
        if let Some(value) = lookup(ENV_START_ORDINAL) {
            self.batch.start_ordinal = parse_env(ENV_START_ORDINAL, &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch.start_ordinal == 0 {
            return Err(ConfigError::Invalid(
                "batch.start_ordinal must be at least 1".into(),
            ));
        }
        if self.pipeline.crf_step == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.crf_step must be greater than zero".into(),
            ));
        }
        if self.pipeline.crf_start > self.pipeline.crf_max {
            return Err(ConfigError::Invalid(
                "pipeline.crf_start must not exceed pipeline.crf_max".into(),
            ));
        }
        if self.pipeline.size_ceiling_bytes == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.size_ceiling_bytes must be greater than zero".into(),
            ));
        }
        if self.store.scan_page_size == 0 {
            return Err(ConfigError::Invalid(
                "store.scan_page_size must be greater than zero".into(),
            ));
        }
        url::Url::parse(&self.proxy.base_url).map_err(|err| {
            ConfigError::Invalid(format!("proxy.base_url {}: {err}", self.proxy.base_url))
        })?;
        if self.telegram.is_cloud_api()?
            && self.pipeline.size_ceiling_bytes > CLOUD_UPLOAD_LIMIT_BYTES
        {
            return Err(ConfigError::Invalid(format!(
                "pipeline.size_ceiling_bytes {} exceeds the {CLOUD_UPLOAD_LIMIT_BYTES} byte upload \
                 limit of {CLOUD_API_HOST}; lower it or point telegram.api_base at a self-hosted server",
                self.pipeline.size_ceiling_bytes
            )));
        }
        Ok(())
    }

    /// The bot token is only required by commands that talk to Telegram.
    pub fn require_bot_token(&self) -> Result<&str> {
        let token = self.telegram.bot_token.trim();
        if token.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "telegram.bot_token is empty (set {ENV_BOT_TOKEN})"
            )));
        }
        Ok(token)
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|err: T::Err| ConfigError::Env {
        key: key.to_string(),
        value: value.to_string(),
        reason: err.to_string(),
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramSection {
    #[serde(default = "TelegramSection::default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub destination_chat_id: Option<i64>,
    #[serde(default = "TelegramSection::default_poll_timeout")]
    pub poll_timeout_seconds: u64,
    /// Applies to every call except file uploads.
    #[serde(default = "TelegramSection::default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "TelegramSection::default_upload_timeout")]
    pub upload_timeout_seconds: u64,
}

impl TelegramSection {
    fn default_api_base() -> String {
        "http://localhost:8081".to_string()
    }

    fn default_poll_timeout() -> u64 {
        30
    }

    fn default_request_timeout() -> u64 {
        120
    }

    fn default_upload_timeout() -> u64 {
        4 * 60 * 60
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_seconds)
    }

    /// Whether `api_base` points at the cloud Bot API rather than a
    /// self-hosted server.
    pub fn is_cloud_api(&self) -> Result<bool> {
        let base = url::Url::parse(&self.api_base).map_err(|err| {
            ConfigError::Invalid(format!("telegram.api_base {}: {err}", self.api_base))
        })?;
        Ok(base.host_str() == Some(CLOUD_API_HOST))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    pub path: PathBuf,
    #[serde(default = "StoreSection::default_page_size")]
    pub scan_page_size: usize,
}

impl StoreSection {
    fn default_page_size() -> usize {
        64
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxySection {
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscoderSection {
    pub binary: PathBuf,
    pub fetch_timeout_seconds: u64,
    pub encode_timeout_seconds: u64,
    pub rw_timeout_micros: u64,
    pub reconnect_delay_max_seconds: u32,
    pub video_codec: String,
    pub preset: String,
}

impl TranscoderSection {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    pub fn encode_timeout(&self) -> Duration {
        Duration::from_secs(self.encode_timeout_seconds)
    }
}

impl Default for TranscoderSection {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
            fetch_timeout_seconds: 4 * 60 * 60,
            encode_timeout_seconds: 4 * 60 * 60,
            rw_timeout_micros: 5_000_000,
            reconnect_delay_max_seconds: 5,
            video_codec: "libx264".to_string(),
            preset: "fast".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub work_dir: PathBuf,
    pub size_ceiling_bytes: u64,
    pub crf_start: u32,
    pub crf_step: u32,
    pub crf_max: u32,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("data/work"),
            size_ceiling_bytes: DEFAULT_SIZE_CEILING_BYTES,
            crf_start: 24,
            crf_step: 2,
            crf_max: 35,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchSection {
    pub start_ordinal: u64,
    pub progress_url_chars: usize,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            start_ordinal: 1,
            progress_url_chars: 50,
        }
    }
}
