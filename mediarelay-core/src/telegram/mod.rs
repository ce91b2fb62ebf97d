pub mod client;
pub mod error;
pub mod listener;
pub mod types;

pub use client::{BotApi, ChatReporter, TelegramClient};
pub use error::{TelegramError, TelegramResult};
pub use listener::{classify, UploadCommand, UploadListener, MISSING_FILE_REPLY, UPLOAD_COMMAND};
pub use types::{Chat, Document, File, Message, Update};
