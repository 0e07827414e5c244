//! Test double for [`Messenger`] used by unit and integration tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::messenger::{ChatMessage, LarkFileType, Messenger, MsgType};

/// One recorded outbound call.
#[derive(Debug, Clone)]
pub enum RecordedCall {
    Send {
        chat_id: String,
        msg_type: MsgType,
        content: serde_json::Value,
    },
    Reply {
        reply_to_id: String,
        msg_type: MsgType,
        content: serde_json::Value,
    },
    Update {
        message_id: String,
        msg_type: MsgType,
        content: serde_json::Value,
    },
    Reaction {
        message_id: String,
        emoji_type: String,
    },
    UploadImage {
        bytes_len: usize,
    },
    UploadFile {
        bytes_len: usize,
        name: String,
        file_type: LarkFileType,
    },
}

/// Records every call made through it instead of talking to a real chat
/// backend. Mirrors the scripted-response shape of `MockAgentRuntime` so
/// gateway tests can assert on exact call sequences.
#[derive(Default)]
pub struct RecordingMessenger {
    calls: Mutex<Vec<RecordedCall>>,
    canned_messages: Mutex<Vec<ChatMessage>>,
    next_id: AtomicU64,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{prefix}_{n}")
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn send_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, RecordedCall::Send { .. }))
            .count()
    }

    pub fn update_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, RecordedCall::Update { .. }))
            .count()
    }

    pub fn reaction_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, RecordedCall::Reaction { .. }))
            .count()
    }

    /// The text body of the most recent Send/Update/Reply call, if any.
    pub fn last_text(&self) -> Option<String> {
        self.calls.lock().iter().rev().find_map(|c| match c {
            RecordedCall::Send { content, .. }
            | RecordedCall::Update { content, .. }
            | RecordedCall::Reply { content, .. } => {
                content.get("text").and_then(|v| v.as_str()).map(String::from)
            }
            _ => None,
        })
    }

    pub fn set_list_messages(&self, messages: Vec<ChatMessage>) {
        *self.canned_messages.lock() = messages;
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_message(
        &self,
        chat_id: &str,
        msg_type: MsgType,
        content: serde_json::Value,
    ) -> Result<String> {
        let id = self.fresh_id("om");
        self.calls.lock().push(RecordedCall::Send {
            chat_id: chat_id.to_string(),
            msg_type,
            content,
        });
        Ok(id)
    }

    async fn reply_message(
        &self,
        reply_to_id: &str,
        msg_type: MsgType,
        content: serde_json::Value,
    ) -> Result<String> {
        let id = self.fresh_id("om");
        self.calls.lock().push(RecordedCall::Reply {
            reply_to_id: reply_to_id.to_string(),
            msg_type,
            content,
        });
        Ok(id)
    }

    async fn update_message(
        &self,
        message_id: &str,
        msg_type: MsgType,
        content: serde_json::Value,
    ) -> Result<()> {
        self.calls.lock().push(RecordedCall::Update {
            message_id: message_id.to_string(),
            msg_type,
            content,
        });
        Ok(())
    }

    async fn add_reaction(&self, message_id: &str, emoji_type: &str) -> Result<()> {
        self.calls.lock().push(RecordedCall::Reaction {
            message_id: message_id.to_string(),
            emoji_type: emoji_type.to_string(),
        });
        Ok(())
    }

    async fn upload_image(&self, bytes: Vec<u8>) -> Result<String> {
        let key = self.fresh_id("img");
        self.calls.lock().push(RecordedCall::UploadImage {
            bytes_len: bytes.len(),
        });
        Ok(key)
    }

    async fn upload_file(
        &self,
        bytes: Vec<u8>,
        name: &str,
        file_type: LarkFileType,
    ) -> Result<String> {
        let key = self.fresh_id("file");
        self.calls.lock().push(RecordedCall::UploadFile {
            bytes_len: bytes.len(),
            name: name.to_string(),
            file_type,
        });
        Ok(key)
    }

    async fn list_messages(&self, _chat_id: &str, page_size: u32) -> Result<Vec<ChatMessage>> {
        let messages = self.canned_messages.lock().clone();
        Ok(messages.into_iter().take(page_size as usize).collect())
    }
}
