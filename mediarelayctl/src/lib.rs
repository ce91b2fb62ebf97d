use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use mediarelay_core::ingest::read_link_file;
use mediarelay_core::store::StoreCounts;
use mediarelay_core::telegram::{TelegramClient, TelegramError, UploadListener};
use mediarelay_core::{
    proxy_url, resolve_identifier, BatchDriver, BatchError, BatchSettings, BatchSummary,
    ConfigError, Destination, FfmpegTranscoder, JobBuilder, LogReporter, Pipeline, PipelineError,
    PipelineSettings, RelayConfig, SqliteRelayStore, StoreError,
};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("batch error: {0}")]
    Batch(#[from] BatchError),
    #[error("telegram error: {0}")]
    Telegram(#[from] TelegramError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("required resource missing: {0}")]
    MissingResource(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Media relay batch uploader", long_about = None)]
pub struct Cli {
    /// Path to mediarelay.toml
    #[arg(long, default_value = "configs/mediarelay.toml")]
    pub config: PathBuf,
    /// Alternative SQLite store (overrides store.path)
    #[arg(long)]
    pub store: Option<PathBuf>,
    /// First catalog ordinal to process (overrides batch.start_ordinal)
    #[arg(long)]
    pub start_ordinal: Option<u64>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Runs the bot and processes `/upload` requests
    Serve,
    /// Runs one batch from a local link list
    Ingest {
        /// Text file with one URL per line
        file: PathBuf,
        /// Target chat id (defaults to telegram.destination_chat_id)
        #[arg(long, allow_negative_numbers = true)]
        destination: Option<i64>,
    },
    /// Shows catalog and ledger counts
    Status,
    /// Prints the identifier and proxy URL derived from a link
    Resolve { url: String },
    /// Creates the store schema
    Init,
}

pub async fn run(cli: Cli) -> Result<()> {
    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Serve => context.serve().await?,
        Commands::Ingest { file, destination } => {
            let summary = context.ingest(file, *destination).await?;
            render(&summary, cli.format)?;
        }
        Commands::Status => {
            let status = context.status()?;
            render(&status, cli.format)?;
        }
        Commands::Resolve { url } => {
            let resolved = context.resolve(url);
            render(&resolved, cli.format)?;
        }
        Commands::Init => {
            let report = context.init()?;
            render(&report, cli.format)?;
        }
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: RelayConfig,
    store: SqliteRelayStore,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        Self::with_env(cli, |key| std::env::var(key).ok())
    }

    fn with_env<F>(cli: &Cli, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = RelayConfig::from_path(&cli.config)?;
        config.apply_env_overrides(lookup)?;
        if let Some(path) = &cli.store {
            config.store.path = path.clone();
        }
        if let Some(ordinal) = cli.start_ordinal {
            config.batch.start_ordinal = ordinal;
        }
        config.validate()?;
        let store = SqliteRelayStore::new(&config.store.path)?;
        Ok(Self { config, store })
    }

    fn init(&self) -> Result<InitReport> {
        self.store.initialize()?;
        info!(path = %self.store.path().display(), "store initialised");
        Ok(InitReport {
            store_path: self.store.path().display().to_string(),
        })
    }

    fn status(&self) -> Result<StatusReport> {
        if !self.store.path().exists() {
            return Err(AppError::MissingResource(format!(
                "store not found at {} (run `mediarelayctl init`)",
                self.store.path().display()
            )));
        }
        let counts = self.store.counts()?;
        Ok(StatusReport {
            store_path: self.store.path().display().to_string(),
            counts,
            start_ordinal: self.config.batch.start_ordinal,
            size_ceiling_bytes: self.config.pipeline.size_ceiling_bytes,
            destination_chat_id: self.config.telegram.destination_chat_id,
        })
    }

    fn resolve(&self, url: &str) -> ResolveReport {
        let identifier = resolve_identifier(url);
        let proxy = identifier.as_deref().and_then(|identifier| {
            url::Url::parse(&self.config.proxy.base_url)
                .ok()
                .map(|base| proxy_url(&base, identifier).to_string())
        });
        ResolveReport {
            url: url.to_string(),
            identifier,
            proxy_url: proxy,
        }
    }

    fn telegram_client(&self) -> Result<TelegramClient> {
        let token = self.config.require_bot_token()?;
        Ok(TelegramClient::new(&self.config.telegram, token)?)
    }

    fn driver(&self, client: TelegramClient) -> Result<BatchDriver> {
        self.store.initialize()?;
        let pipeline = Pipeline::new(
            PipelineSettings::from_config(&self.config)?,
            JobBuilder::new(self.config.transcoder.clone()),
            Arc::new(FfmpegTranscoder::new(&self.config.transcoder.binary)),
            Arc::new(client),
            Arc::new(self.store.clone()),
        );
        Ok(BatchDriver::new(
            Arc::new(self.store.clone()),
            Arc::new(self.store.clone()),
            Arc::new(pipeline),
            BatchSettings::from_config(&self.config),
        ))
    }

    async fn ingest(&self, file: &Path, destination: Option<i64>) -> Result<BatchSummary> {
        let chat_id = destination
            .or(self.config.telegram.destination_chat_id)
            .ok_or_else(|| {
                AppError::MissingResource(
                    "no destination: pass --destination or set telegram.destination_chat_id"
                        .to_string(),
                )
            })?;
        let urls = read_link_file(file).await?;
        let client = self.telegram_client()?;
        let driver = self.driver(client)?;
        Ok(driver
            .run(&urls, &Destination::chat(chat_id), &LogReporter)
            .await?)
    }

    async fn serve(&self) -> Result<()> {
        let client = self.telegram_client()?;
        let driver = Arc::new(self.driver(client.clone())?);
        let listener = UploadListener::new(Arc::new(client), driver, &self.config.telegram);
        listener.run().await?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct InitReport {
    pub store_path: String,
}

impl DisplayFallback for InitReport {
    fn display(&self) -> String {
        format!("Store ready at {}", self.store_path)
    }
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub store_path: String,
    pub counts: StoreCounts,
    pub start_ordinal: u64,
    pub size_ceiling_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_chat_id: Option<i64>,
}

impl DisplayFallback for StatusReport {
    fn display(&self) -> String {
        let mut lines = vec![
            format!("Store: {}", self.store_path),
            format!("  - Links: {}", self.counts.links),
            format!("  - Delivered: {}", self.counts.processed),
            format!("  - Start ordinal: {}", self.start_ordinal),
            format!("  - Size ceiling: {} bytes", self.size_ceiling_bytes),
        ];
        match self.destination_chat_id {
            Some(chat) => lines.push(format!("  - Destination: chat {chat}")),
            None => lines.push("  - Destination: uploading chat".to_string()),
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ResolveReport {
    pub url: String,
    pub identifier: Option<String>,
    pub proxy_url: Option<String>,
}

impl DisplayFallback for ResolveReport {
    fn display(&self) -> String {
        match (&self.identifier, &self.proxy_url) {
            (Some(identifier), Some(proxy)) => format!("{identifier} -> {proxy}"),
            (Some(identifier), None) => identifier.clone(),
            _ => format!("no identifier in {}", self.url),
        }
    }
}

impl DisplayFallback for BatchSummary {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "Run {}: stored {} links, scanned {} from #{} in {}s",
            self.run_id, self.stored, self.scanned, self.start_ordinal, self.duration_secs
        )];
        lines.push(format!(
            "  delivered={} skipped={} dropped={} errors={}",
            self.delivered, self.skipped, self.aborted, self.failed
        ));
        for error in &self.errors {
            lines.push(format!("  ! {error}"));
        }
        lines.join("\n")
    }
}
