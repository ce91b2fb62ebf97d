use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub document: Option<Document>,
}

impl Message {
    /// Command text: the message text, or the caption of an attachment.
    pub fn command_text(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct File {
    pub file_id: String,
    #[serde(default)]
    pub file_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct GetUpdatesRequest<'a> {
    pub offset: i64,
    pub timeout: u64,
    pub allowed_updates: &'a [&'a str],
}

#[derive(Debug, Serialize)]
pub(crate) struct SendMessageRequest<'a> {
    pub chat_id: i64,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<i64>,
    pub disable_web_page_preview: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct GetFileRequest<'a> {
    pub file_id: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_update_with_document_parses() {
        let payload = r#"{
            "ok": true,
            "result": [{
                "update_id": 901,
                "message": {
                    "message_id": 12,
                    "date": 1700000000,
                    "chat": {"id": -100555, "type": "supergroup"},
                    "caption": "/upload",
                    "document": {"file_id": "BQAC", "file_name": "links.txt", "file_size": 88}
                }
            }]
        }"#;
        let response: ApiResponse<Vec<Update>> = serde_json::from_str(payload).unwrap();
        let updates = response.result.unwrap();
        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.chat.id, -100555);
        assert_eq!(message.command_text(), Some("/upload"));
        assert_eq!(
            message.document.as_ref().unwrap().file_name.as_deref(),
            Some("links.txt")
        );
    }

    #[test]
    fn error_response_carries_code_and_description() {
        let payload = r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#;
        let response: ApiResponse<Vec<Update>> = serde_json::from_str(payload).unwrap();
        assert!(!response.ok);
        assert!(response.result.is_none());
        assert_eq!(response.error_code, Some(401));
    }

    #[test]
    fn reply_id_is_omitted_when_absent() {
        let request = SendMessageRequest {
            chat_id: 5,
            text: "hi",
            reply_to_message_id: None,
            disable_web_page_preview: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("reply_to_message_id").is_none());
        assert_eq!(json["chat_id"], 5);
    }
}
