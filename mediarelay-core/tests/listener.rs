mod support;

use std::sync::Arc;

use async_trait::async_trait;
use mediarelay_core::batch::{BatchDriver, BatchSettings};
use mediarelay_core::config::TelegramSection;
use mediarelay_core::delivery::Destination;
use mediarelay_core::telegram::{
    BotApi, Chat, Document, Message, TelegramError, TelegramResult, Update, UploadListener,
    MISSING_FILE_REPLY,
};
use tempfile::{tempdir, TempDir};
use tokio::sync::Mutex;

use support::{pipeline, temp_store, RecordingSink, ScriptedTranscoder, CEILING};

const UPLOADING_CHAT: i64 = 42;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Sent {
    chat_id: i64,
    text: String,
    reply_to: Option<i64>,
}

/// Serves one link list for any file id and records outgoing messages.
struct FakeBotApi {
    link_list: String,
    sent: Mutex<Vec<Sent>>,
    downloads: Mutex<Vec<String>>,
}

impl FakeBotApi {
    fn with_links(link_list: &str) -> Self {
        Self {
            link_list: link_list.to_string(),
            sent: Mutex::new(Vec::new()),
            downloads: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl BotApi for FakeBotApi {
    async fn get_updates(&self, _offset: i64, _timeout_secs: u64) -> TelegramResult<Vec<Update>> {
        Err(TelegramError::Api {
            method: "getUpdates",
            code: Some(401),
            description: "Unauthorized".to_string(),
        })
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
    ) -> TelegramResult<()> {
        self.sent.lock().await.push(Sent {
            chat_id,
            text: text.to_string(),
            reply_to,
        });
        Ok(())
    }

    async fn download_text(&self, file_id: &str) -> TelegramResult<String> {
        self.downloads.lock().await.push(file_id.to_string());
        Ok(self.link_list.clone())
    }
}

struct Harness {
    _dir: TempDir,
    api: Arc<FakeBotApi>,
    sink: Arc<RecordingSink>,
    listener: UploadListener,
}

fn section(destination_chat_id: Option<i64>) -> TelegramSection {
    TelegramSection {
        api_base: "http://localhost:8081".to_string(),
        bot_token: String::new(),
        destination_chat_id,
        poll_timeout_seconds: 30,
        request_timeout_seconds: 60,
        upload_timeout_seconds: 600,
    }
}

fn harness(destination_chat_id: Option<i64>) -> Harness {
    let dir = tempdir().unwrap();
    let store = temp_store(dir.path());
    let transcoder = Arc::new(ScriptedTranscoder::with_fetch_size(CEILING / 2));
    let sink = Arc::new(RecordingSink::default());
    let pipeline = pipeline(&dir, transcoder, sink.clone(), &store);
    let driver = BatchDriver::new(
        Arc::new(store.clone()),
        Arc::new(store),
        Arc::new(pipeline),
        BatchSettings::default(),
    );
    let api = Arc::new(FakeBotApi::with_links(
        "https://host/s/first\n\nhttps://host/s/second\n",
    ));
    let listener = UploadListener::new(
        api.clone(),
        Arc::new(driver),
        &section(destination_chat_id),
    );
    Harness {
        _dir: dir,
        api,
        sink,
        listener,
    }
}

fn upload_message(file_name: Option<&str>) -> Message {
    Message {
        message_id: 7,
        chat: Chat { id: UPLOADING_CHAT },
        text: None,
        caption: Some("/upload".to_string()),
        document: file_name.map(|name| Document {
            file_id: "doc-1".to_string(),
            file_name: Some(name.to_string()),
            file_size: Some(64),
        }),
    }
}

#[tokio::test]
async fn files_go_back_to_uploading_chat_by_default() {
    let h = harness(None);

    h.listener.handle_message(&upload_message(Some("links.txt"))).await;

    assert_eq!(*h.api.downloads.lock().await, vec!["doc-1".to_string()]);
    let delivered = h.sink.delivered.lock().await.clone();
    assert_eq!(delivered.len(), 2);
    assert!(delivered
        .iter()
        .all(|entry| entry.destination == Destination::chat(UPLOADING_CHAT)));
}

#[tokio::test]
async fn configured_destination_overrides_uploading_chat() {
    let h = harness(Some(-100_999));

    h.listener.handle_message(&upload_message(Some("links.txt"))).await;

    let delivered = h.sink.delivered.lock().await.clone();
    assert_eq!(delivered.len(), 2);
    assert!(delivered
        .iter()
        .all(|entry| entry.destination == Destination::chat(-100_999)));

    let sent = h.api.sent.lock().await;
    assert!(sent.iter().all(|message| message.chat_id == UPLOADING_CHAT));
    assert_eq!(
        sent.first().map(|message| message.text.as_str()),
        Some("📥 Found 2 links. Starting processing from #1...")
    );
    assert!(sent
        .last()
        .is_some_and(|message| message.text.starts_with("✅ All links processed.")));
}

#[tokio::test]
async fn upload_without_text_file_gets_a_reply() {
    let h = harness(None);

    h.listener.handle_message(&upload_message(Some("links.pdf"))).await;
    h.listener.handle_message(&upload_message(None)).await;

    let expected = Sent {
        chat_id: UPLOADING_CHAT,
        text: MISSING_FILE_REPLY.to_string(),
        reply_to: Some(7),
    };
    assert_eq!(*h.api.sent.lock().await, vec![expected.clone(), expected]);
    assert!(h.api.downloads.lock().await.is_empty());
    assert!(h.sink.delivered.lock().await.is_empty());
}

#[tokio::test]
async fn unrelated_messages_are_ignored() {
    let h = harness(None);
    let mut message = upload_message(Some("links.txt"));
    message.caption = Some("holiday clips".to_string());

    h.listener.handle_message(&message).await;

    assert!(h.api.sent.lock().await.is_empty());
    assert!(h.api.downloads.lock().await.is_empty());
}

#[tokio::test]
async fn rejected_token_stops_the_listener() {
    let h = harness(None);
    let err = h.listener.run().await.unwrap_err();
    assert!(matches!(err, TelegramError::Api { code: Some(401), .. }));
}
