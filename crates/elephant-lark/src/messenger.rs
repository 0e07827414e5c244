use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Message content kinds recognized by the chat backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgType {
    Text,
    Image,
    File,
    Interactive,
}

/// Restricted file-type vocabulary the chat backend accepts for uploads.
/// Anything outside this set must be mapped to [`LarkFileType::Stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LarkFileType {
    Opus,
    Mp4,
    Pdf,
    Doc,
    Xls,
    Ppt,
    Stream,
}

impl LarkFileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LarkFileType::Opus => "opus",
            LarkFileType::Mp4 => "mp4",
            LarkFileType::Pdf => "pdf",
            LarkFileType::Doc => "doc",
            LarkFileType::Xls => "xls",
            LarkFileType::Ppt => "ppt",
            LarkFileType::Stream => "stream",
        }
    }
}

/// Map a file extension (with or without a leading dot, any case) to the
/// backend's restricted file-type vocabulary. Unknown extensions map to
/// `stream`.
pub fn lark_file_type(ext: &str) -> LarkFileType {
    let normalized = ext.trim_start_matches('.').to_ascii_lowercase();
    match normalized.as_str() {
        "opus" | "ogg" => LarkFileType::Opus,
        "mp4" | "mov" | "m4v" => LarkFileType::Mp4,
        "pdf" => LarkFileType::Pdf,
        "doc" | "docx" => LarkFileType::Doc,
        "xls" | "xlsx" | "csv" => LarkFileType::Xls,
        "ppt" | "pptx" => LarkFileType::Ppt,
        _ => LarkFileType::Stream,
    }
}

/// A message read back via [`Messenger::list_messages`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: String,
    pub sender_id: String,
    pub text: String,
    pub create_time: String,
}

/// The sole outbound surface to the chat backend. Substituting a recording
/// implementation makes the rest of the gateway unit-testable without a
/// network dependency.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Post a new message into `chat_id`. Returns the backend-assigned
    /// message identifier.
    async fn send_message(
        &self,
        chat_id: &str,
        msg_type: MsgType,
        content: serde_json::Value,
    ) -> Result<String>;

    /// Thread a reply to `reply_to_id`, preserving group-chat threading.
    async fn reply_message(
        &self,
        reply_to_id: &str,
        msg_type: MsgType,
        content: serde_json::Value,
    ) -> Result<String>;

    /// Edit an existing message in place.
    async fn update_message(
        &self,
        message_id: &str,
        msg_type: MsgType,
        content: serde_json::Value,
    ) -> Result<()>;

    /// Attach a reaction to a message.
    async fn add_reaction(&self, message_id: &str, emoji_type: &str) -> Result<()>;

    /// Upload image bytes, returning the backend's `image_key`.
    async fn upload_image(&self, bytes: Vec<u8>) -> Result<String>;

    /// Upload file bytes under `name` with the restricted `file_type`,
    /// returning the backend's `file_key`.
    async fn upload_file(
        &self,
        bytes: Vec<u8>,
        name: &str,
        file_type: LarkFileType,
    ) -> Result<String>;

    /// List recent messages in `chat_id`, most-recent-first, used only to
    /// assemble auto-chat context.
    async fn list_messages(&self, chat_id: &str, page_size: u32) -> Result<Vec<ChatMessage>>;
}

/// Maximum bytes per text message before chunking (leaves headroom under
/// the backend's hard 4096-byte ceiling).
pub const CHUNK_MAX_BYTES: usize = 3900;

/// Split `text` into chunks of at most [`CHUNK_MAX_BYTES`] bytes, preferring
/// splits on newline/whitespace boundaries so words are not cut mid-way.
pub fn split_chunks(text: &str) -> Vec<String> {
    if text.len() <= CHUNK_MAX_BYTES {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.len() > CHUNK_MAX_BYTES {
        let mut window_end = CHUNK_MAX_BYTES;
        while !remaining.is_char_boundary(window_end) {
            window_end -= 1;
        }
        let window = &remaining[..window_end];
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .unwrap_or(window_end);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    if !remaining.is_empty() {
        chunks.push(remaining.to_string());
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_known_extensions() {
        assert_eq!(lark_file_type("pdf").as_str(), "pdf");
        assert_eq!(lark_file_type(".PDF").as_str(), "pdf");
        assert_eq!(lark_file_type("DOCX").as_str(), "doc");
        assert_eq!(lark_file_type("mp4").as_str(), "mp4");
    }

    #[test]
    fn file_type_unknown_extension_is_stream() {
        assert_eq!(lark_file_type("exe").as_str(), "stream");
        assert_eq!(lark_file_type("").as_str(), "stream");
    }

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = split_chunks("hello");
        assert_eq!(chunks, vec!["hello".to_string()]);
    }

    #[test]
    fn long_text_splits_under_limit() {
        let line = "a".repeat(2000);
        let text = format!("{line}\n{line}\n{line}");
        let chunks = split_chunks(&text);
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(c.len() <= CHUNK_MAX_BYTES);
        }
    }
}
