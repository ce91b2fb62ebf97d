use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::batch::BatchDriver;
use crate::config::TelegramSection;
use crate::delivery::Destination;
use crate::ingest::parse_link_list;

use super::client::{BotApi, ChatReporter};
use super::error::{TelegramError, TelegramResult};
use super::types::Message;

pub const UPLOAD_COMMAND: &str = "/upload";
pub const MISSING_FILE_REPLY: &str = "Please send a `.txt` file containing links.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadCommand {
    LinkFile { file_id: String, file_name: String },
    MissingFile,
}

/// Recognises `/upload` (also `/upload@botname`) in the text or caption.
pub fn classify(message: &Message) -> Option<UploadCommand> {
    let command = message.command_text()?.split_whitespace().next()?;
    if command.split('@').next() != Some(UPLOAD_COMMAND) {
        return None;
    }
    let link_file = message.document.as_ref().and_then(|document| {
        let name = document.file_name.as_deref()?;
        name.to_ascii_lowercase()
            .ends_with(".txt")
            .then(|| UploadCommand::LinkFile {
                file_id: document.file_id.clone(),
                file_name: name.to_string(),
            })
    });
    Some(link_file.unwrap_or(UploadCommand::MissingFile))
}

/// Long-polls the Bot API and runs one batch per `/upload` request, one
/// request at a time.
pub struct UploadListener {
    api: Arc<dyn BotApi>,
    driver: Arc<BatchDriver>,
    destination: Option<Destination>,
    poll_timeout_secs: u64,
    retry_delay: Duration,
}

impl UploadListener {
    pub fn new(api: Arc<dyn BotApi>, driver: Arc<BatchDriver>, section: &TelegramSection) -> Self {
        Self {
            api,
            driver,
            destination: section.destination_chat_id.map(Destination::chat),
            poll_timeout_secs: section.poll_timeout_seconds,
            retry_delay: Duration::from_secs(5),
        }
    }

    /// Runs until the API rejects the token.
    pub async fn run(&self) -> TelegramResult<()> {
        let mut offset = 0;
        info!(destination = ?self.destination, "listening for uploads");
        loop {
            match self.api.get_updates(offset, self.poll_timeout_secs).await {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        if let Some(message) = update.message {
                            self.handle_message(&message).await;
                        }
                    }
                }
                Err(
                    err @ TelegramError::Api {
                        code: Some(401 | 404),
                        ..
                    },
                ) => return Err(err),
                Err(err) => {
                    warn!(error = %err, wait = ?self.retry_delay, "polling failed, retrying");
                    sleep(self.retry_delay).await;
                }
            }
        }
    }

    pub async fn handle_message(&self, message: &Message) {
        let chat_id = message.chat.id;
        match classify(message) {
            None => {}
            Some(UploadCommand::MissingFile) => {
                self.reply(chat_id, MISSING_FILE_REPLY, Some(message.message_id))
                    .await;
            }
            Some(UploadCommand::LinkFile { file_id, file_name }) => {
                info!(chat_id, file = %file_name, "link list received");
                let text = match self.api.download_text(&file_id).await {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(chat_id, error = %err, "failed to download link list");
                        self.reply(
                            chat_id,
                            &format!("❌ Could not read {file_name}: {err}"),
                            Some(message.message_id),
                        )
                        .await;
                        return;
                    }
                };
                let urls = parse_link_list(&text);
                let destination = self.destination.unwrap_or(Destination::chat(chat_id));
                let reporter = ChatReporter::new(Arc::clone(&self.api), chat_id);
                if let Err(err) = self.driver.run(&urls, &destination, &reporter).await {
                    warn!(chat_id, error = %err, "batch aborted");
                    self.reply(chat_id, &format!("❌ Batch failed: {err}"), None)
                        .await;
                }
            }
        }
    }

    async fn reply(&self, chat_id: i64, text: &str, reply_to: Option<i64>) {
        if let Err(err) = self.api.send_message(chat_id, text, reply_to).await {
            warn!(chat_id, error = %err, "failed to send reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::types::{Chat, Document};

    fn message(text: Option<&str>, caption: Option<&str>, file_name: Option<&str>) -> Message {
        Message {
            message_id: 7,
            chat: Chat { id: 42 },
            text: text.map(str::to_string),
            caption: caption.map(str::to_string),
            document: file_name.map(|name| Document {
                file_id: "file-1".to_string(),
                file_name: Some(name.to_string()),
                file_size: Some(128),
            }),
        }
    }

    #[test]
    fn caption_with_text_document_is_a_link_file() {
        let msg = message(None, Some("/upload"), Some("links.txt"));
        assert_eq!(
            classify(&msg),
            Some(UploadCommand::LinkFile {
                file_id: "file-1".to_string(),
                file_name: "links.txt".to_string(),
            })
        );
    }

    #[test]
    fn addressed_command_is_recognised() {
        let msg = message(None, Some("/upload@relay_bot now"), Some("LINKS.TXT"));
        assert!(matches!(classify(&msg), Some(UploadCommand::LinkFile { .. })));
    }

    #[test]
    fn command_without_text_file_asks_for_one() {
        assert_eq!(
            classify(&message(Some("/upload"), None, None)),
            Some(UploadCommand::MissingFile)
        );
        assert_eq!(
            classify(&message(None, Some("/upload"), Some("links.pdf"))),
            Some(UploadCommand::MissingFile)
        );
    }

    #[test]
    fn other_messages_are_ignored() {
        assert_eq!(classify(&message(Some("hello"), None, None)), None);
        assert_eq!(classify(&message(Some("/uploads"), None, None)), None);
        assert_eq!(classify(&message(None, None, Some("links.txt"))), None);
    }
}
