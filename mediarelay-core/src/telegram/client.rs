use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info};
use url::Url;

use crate::config::TelegramSection;
use crate::delivery::{DeliveryResult, DeliverySink, Destination, ProgressReporter};

use super::error::{TelegramError, TelegramResult};
use super::types::{
    ApiResponse, File, GetFileRequest, GetUpdatesRequest, SendMessageRequest, Update,
};

/// Minimal Bot API client: the calls needed to receive link lists and
/// deliver files.
#[derive(Clone)]
pub struct TelegramClient {
    http: Client,
    api_base: Url,
    token: String,
    upload_timeout: Duration,
}

impl fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramClient")
            .field("api_base", &self.api_base.as_str())
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    pub fn new(section: &TelegramSection, token: &str) -> TelegramResult<Self> {
        let mut api_base = Url::parse(&section.api_base)
            .map_err(|err| TelegramError::InvalidBaseUrl(format!("{}: {err}", section.api_base)))?;
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }
        let http = Client::builder()
            .user_agent("mediarelay/0.1")
            .timeout(section.request_timeout())
            .build()
            .map_err(|err| TelegramError::http("client", err))?;
        Ok(Self {
            http,
            api_base,
            token: token.to_string(),
            upload_timeout: section.upload_timeout(),
        })
    }

    fn method_url(&self, method: &str) -> TelegramResult<Url> {
        self.api_base
            .join(&format!("./bot{}/{method}", self.token))
            .map_err(|err| TelegramError::InvalidBaseUrl(err.to_string()))
    }

    async fn call<B, T>(&self, method: &'static str, body: &B) -> TelegramResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.method_url(method)?)
            .json(body)
            .send()
            .await
            .map_err(|err| TelegramError::http(method, err))?;
        Self::unwrap_response(method, response).await
    }

    async fn unwrap_response<T>(method: &'static str, response: reqwest::Response) -> TelegramResult<T>
    where
        T: DeserializeOwned,
    {
        let payload: ApiResponse<T> = response
            .json()
            .await
            .map_err(|err| TelegramError::http(method, err))?;
        match payload {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse {
                description,
                error_code,
                ..
            } => Err(TelegramError::Api {
                method,
                code: error_code,
                description: description.unwrap_or_else(|| "no description".to_string()),
            }),
        }
    }

    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> TelegramResult<Vec<Update>> {
        let request = GetUpdatesRequest {
            offset,
            timeout: timeout_secs,
            allowed_updates: &["message"],
        };
        self.call("getUpdates", &request).await
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
    ) -> TelegramResult<()> {
        let request = SendMessageRequest {
            chat_id,
            text,
            reply_to_message_id: reply_to,
            disable_web_page_preview: true,
        };
        let _: IgnoredAny = self.call("sendMessage", &request).await?;
        Ok(())
    }

    /// Streams a local file to the chat with `sendVideo`.
    pub async fn send_video(&self, chat_id: i64, path: &Path) -> TelegramResult<()> {
        let file = fs::File::open(path)
            .await
            .map_err(|source| TelegramError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let length = file
            .metadata()
            .await
            .map_err(|source| TelegramError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "video.mp4".to_string());
        let part = Part::stream_with_length(Body::from(file), length)
            .file_name(file_name)
            .mime_str("video/mp4")
            .map_err(|err| TelegramError::http("sendVideo", err))?;
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("supports_streaming", "true")
            .part("video", part);
        debug!(chat_id, bytes = length, "uploading video");
        let response = self
            .http
            .post(self.method_url("sendVideo")?)
            .timeout(self.upload_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|err| TelegramError::http("sendVideo", err))?;
        let _: IgnoredAny = Self::unwrap_response("sendVideo", response).await?;
        Ok(())
    }

    pub async fn get_file(&self, file_id: &str) -> TelegramResult<File> {
        self.call("getFile", &GetFileRequest { file_id }).await
    }

    /// Downloads a text document. A self-hosted API server in `--local` mode
    /// returns absolute paths on its own disk, which are read directly.
    pub async fn download_text(&self, file_id: &str) -> TelegramResult<String> {
        let file = self.get_file(file_id).await?;
        let file_path = file.file_path.ok_or_else(|| TelegramError::MissingFilePath {
            file_id: file_id.to_string(),
        })?;
        if Path::new(&file_path).is_absolute() {
            return fs::read_to_string(&file_path)
                .await
                .map_err(|source| TelegramError::Io {
                    path: file_path.into(),
                    source,
                });
        }
        let url = self
            .api_base
            .join(&format!("./file/bot{}/{file_path}", self.token))
            .map_err(|err| TelegramError::InvalidBaseUrl(err.to_string()))?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| TelegramError::http("getFile", err))?;
        response
            .text()
            .await
            .map_err(|err| TelegramError::http("getFile", err))
    }
}

#[async_trait]
impl DeliverySink for TelegramClient {
    async fn deliver(&self, destination: &Destination, path: &Path) -> DeliveryResult<()> {
        self.send_video(destination.chat_id, path).await?;
        info!(destination = %destination, path = %path.display(), "file sent");
        Ok(())
    }
}

/// The Bot API calls the upload listener and chat progress depend on.
#[async_trait]
pub trait BotApi: Send + Sync {
    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> TelegramResult<Vec<Update>>;

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
    ) -> TelegramResult<()>;

    async fn download_text(&self, file_id: &str) -> TelegramResult<String>;
}

#[async_trait]
impl BotApi for TelegramClient {
    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> TelegramResult<Vec<Update>> {
        TelegramClient::get_updates(self, offset, timeout_secs).await
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
    ) -> TelegramResult<()> {
        TelegramClient::send_message(self, chat_id, text, reply_to).await
    }

    async fn download_text(&self, file_id: &str) -> TelegramResult<String> {
        TelegramClient::download_text(self, file_id).await
    }
}

/// Posts progress lines into the chat a batch was requested from.
pub struct ChatReporter {
    api: Arc<dyn BotApi>,
    chat_id: i64,
}

impl ChatReporter {
    pub fn new(api: Arc<dyn BotApi>, chat_id: i64) -> Self {
        Self { api, chat_id }
    }
}

#[async_trait]
impl ProgressReporter for ChatReporter {
    async fn report(&self, message: &str) -> DeliveryResult<()> {
        self.api.send_message(self.chat_id, message, None).await?;
        Ok(())
    }
}
