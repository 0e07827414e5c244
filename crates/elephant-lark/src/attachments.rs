//! Attachment fanout: filters A2UI descriptors, resolves bytes, and
//! dispatches the remainder through the [`Messenger`].

use elephant_agent_contract::Attachment;
use tracing::{debug, warn};

use crate::lark_client::fetch_attachment_bytes;
use crate::messenger::{lark_file_type, Messenger, MsgType};

/// Attachment auto-upload policy (spec §6 `auto_upload_*` options).
#[derive(Debug, Clone, Default)]
pub struct UploadPolicy {
    /// Master switch: when false, no attachment is auto-uploaded at all.
    pub enabled: bool,
    /// Attachments larger than this are skipped.
    pub max_bytes: u64,
    /// Allowed extensions (case-insensitive, no leading dot). Empty means
    /// every extension is allowed.
    pub allowed_ext: Vec<String>,
}

impl UploadPolicy {
    fn allows_ext(&self, ext: &str) -> bool {
        self.allowed_ext.is_empty()
            || self
                .allowed_ext
                .iter()
                .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

/// Filter out A2UI attachments and return the rest sorted by name for
/// deterministic dispatch order. Never mutates `attachments`.
pub fn filter_dispatchable(attachments: &[Attachment]) -> Vec<Attachment> {
    let mut kept: Vec<Attachment> = attachments
        .iter()
        .filter(|a| !a.is_a2ui())
        .cloned()
        .collect();
    kept.sort_by(|a, b| a.name.cmp(&b.name));
    kept
}

fn extension_of(attachment: &Attachment) -> String {
    if let Some(ext) = attachment.name.rsplit('.').next() {
        if ext != attachment.name {
            return ext.to_string();
        }
    }
    attachment
        .media_type
        .rsplit('/')
        .next()
        .unwrap_or("")
        .to_string()
}

fn is_image(attachment: &Attachment) -> bool {
    attachment.media_type.to_ascii_lowercase().starts_with("image/")
}

/// Resolve, upload, and dispatch every non-A2UI attachment in
/// `attachments`. Group chats reply-thread to `reply_to_id`; direct chats
/// post plainly into `chat_id`. Failures are logged and skipped — a single
/// bad attachment must not abort the rest of the fanout or the task reply.
pub async fn dispatch_attachments(
    messenger: &dyn Messenger,
    http: &reqwest::Client,
    attachments: &[Attachment],
    chat_id: &str,
    reply_to_id: Option<&str>,
    is_group: bool,
    policy: &UploadPolicy,
) {
    if !policy.enabled {
        debug!("lark: auto_upload_files disabled, skipping attachment fanout");
        return;
    }

    for attachment in filter_dispatchable(attachments) {
        let ext = extension_of(&attachment);
        if !policy.allows_ext(&ext) {
            debug!(name = %attachment.name, ext, "lark: attachment extension not in auto_upload_allow_ext, skipping");
            continue;
        }

        let bytes = match fetch_attachment_bytes(
            http,
            attachment.uri.as_deref(),
            attachment.data.as_deref(),
        )
        .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(name = %attachment.name, error = %e, "lark: failed to resolve attachment bytes");
                continue;
            }
        };

        if bytes.len() as u64 > policy.max_bytes {
            debug!(
                name = %attachment.name,
                bytes = bytes.len(),
                max_bytes = policy.max_bytes,
                "lark: attachment exceeds auto_upload_max_bytes, skipping"
            );
            continue;
        }

        let result = if is_image(&attachment) {
            dispatch_image(messenger, bytes, chat_id, reply_to_id, is_group).await
        } else {
            dispatch_file(messenger, bytes, &attachment, chat_id, reply_to_id, is_group).await
        };

        if let Err(e) = result {
            warn!(name = %attachment.name, error = %e, "lark: failed to dispatch attachment");
        }
    }
}

async fn dispatch_image(
    messenger: &dyn Messenger,
    bytes: Vec<u8>,
    chat_id: &str,
    reply_to_id: Option<&str>,
    is_group: bool,
) -> crate::error::Result<()> {
    let image_key = messenger.upload_image(bytes).await?;
    let content = serde_json::json!({ "image_key": image_key });
    if is_group {
        if let Some(reply_to_id) = reply_to_id {
            messenger
                .reply_message(reply_to_id, MsgType::Image, content)
                .await?;
            return Ok(());
        }
    }
    messenger.send_message(chat_id, MsgType::Image, content).await?;
    Ok(())
}

async fn dispatch_file(
    messenger: &dyn Messenger,
    bytes: Vec<u8>,
    attachment: &Attachment,
    chat_id: &str,
    reply_to_id: Option<&str>,
    is_group: bool,
) -> crate::error::Result<()> {
    let ext = extension_of(attachment);
    let file_type = lark_file_type(&ext);
    let file_key = messenger.upload_file(bytes, &attachment.name, file_type).await?;
    let content = serde_json::json!({ "file_key": file_key });
    if is_group {
        if let Some(reply_to_id) = reply_to_id {
            messenger
                .reply_message(reply_to_id, MsgType::File, content)
                .await?;
            return Ok(());
        }
    }
    messenger.send_message(chat_id, MsgType::File, content).await?;
    Ok(())
}
