//! Concrete [`Messenger`] backed by the Lark/Feishu Open Platform REST API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;

use crate::error::{LarkError, Result};
use crate::messenger::{ChatMessage, LarkFileType, Messenger, MsgType};

const TOKEN_SAFETY_MARGIN: Duration = Duration::from_secs(60);

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// HTTP-backed messenger talking to `base_domain` with an app-id/secret
/// pair exchanged for a tenant access token, refreshed lazily on expiry.
pub struct LarkMessenger {
    http: reqwest::Client,
    base_domain: String,
    app_id: String,
    app_secret: String,
    token: AsyncMutex<Option<CachedToken>>,
}

impl LarkMessenger {
    pub fn new(base_domain: impl Into<String>, app_id: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_domain: base_domain.into(),
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            token: AsyncMutex::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_domain.trim_end_matches('/'), path)
    }

    async fn access_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.value.clone());
            }
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            code: i64,
            msg: String,
            tenant_access_token: Option<String>,
            expire: Option<u64>,
        }

        let resp: TokenResponse = self
            .http
            .post(self.url("/open-apis/auth/v3/tenant_access_token/internal"))
            .json(&serde_json::json!({
                "app_id": self.app_id,
                "app_secret": self.app_secret,
            }))
            .send()
            .await
            .map_err(|e| LarkError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| LarkError::Transport(e.to_string()))?;

        if resp.code != 0 {
            return Err(LarkError::Transport(format!(
                "tenant_access_token request failed: code={} msg={}",
                resp.code, resp.msg
            )));
        }

        let token = resp
            .tenant_access_token
            .ok_or_else(|| LarkError::Transport("missing tenant_access_token in response".into()))?;
        let ttl = resp.expire.unwrap_or(7200);
        let expires_at = Instant::now() + Duration::from_secs(ttl).saturating_sub(TOKEN_SAFETY_MARGIN);

        *guard = Some(CachedToken {
            value: token.clone(),
            expires_at,
        });
        Ok(token)
    }

    fn msg_type_str(msg_type: MsgType) -> &'static str {
        match msg_type {
            MsgType::Text => "text",
            MsgType::Image => "image",
            MsgType::File => "file",
            MsgType::Interactive => "interactive",
        }
    }

    async fn post_message(
        &self,
        receive_id_type: &str,
        receive_id: &str,
        msg_type: MsgType,
        content: serde_json::Value,
    ) -> Result<String> {
        #[derive(Deserialize)]
        struct Envelope {
            code: i64,
            msg: String,
            data: Option<MessageData>,
        }
        #[derive(Deserialize)]
        struct MessageData {
            message_id: String,
        }

        let token = self.access_token().await?;
        let body = serde_json::json!({
            "receive_id": receive_id,
            "msg_type": Self::msg_type_str(msg_type),
            "content": content.to_string(),
        });

        let resp: Envelope = self
            .http
            .post(self.url(&format!(
                "/open-apis/im/v1/messages?receive_id_type={receive_id_type}"
            )))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| LarkError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| LarkError::Transport(e.to_string()))?;

        if resp.code != 0 {
            return Err(LarkError::Transport(format!(
                "send message failed: code={} msg={}",
                resp.code, resp.msg
            )));
        }

        resp.data
            .map(|d| d.message_id)
            .ok_or_else(|| LarkError::Transport("missing message_id in response".into()))
    }
}

#[async_trait]
impl Messenger for LarkMessenger {
    async fn send_message(
        &self,
        chat_id: &str,
        msg_type: MsgType,
        content: serde_json::Value,
    ) -> Result<String> {
        self.post_message("chat_id", chat_id, msg_type, content).await
    }

    async fn reply_message(
        &self,
        reply_to_id: &str,
        msg_type: MsgType,
        content: serde_json::Value,
    ) -> Result<String> {
        #[derive(Deserialize)]
        struct Envelope {
            code: i64,
            msg: String,
            data: Option<MessageData>,
        }
        #[derive(Deserialize)]
        struct MessageData {
            message_id: String,
        }

        let token = self.access_token().await?;
        let body = serde_json::json!({
            "msg_type": Self::msg_type_str(msg_type),
            "content": content.to_string(),
            "reply_in_thread": true,
        });

        let resp: Envelope = self
            .http
            .post(self.url(&format!("/open-apis/im/v1/messages/{reply_to_id}/reply")))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| LarkError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| LarkError::Transport(e.to_string()))?;

        if resp.code != 0 {
            return Err(LarkError::Transport(format!(
                "reply message failed: code={} msg={}",
                resp.code, resp.msg
            )));
        }

        resp.data
            .map(|d| d.message_id)
            .ok_or_else(|| LarkError::Transport("missing message_id in response".into()))
    }

    async fn update_message(
        &self,
        message_id: &str,
        msg_type: MsgType,
        content: serde_json::Value,
    ) -> Result<()> {
        #[derive(Deserialize)]
        struct Envelope {
            code: i64,
            msg: String,
        }

        let token = self.access_token().await?;
        let body = serde_json::json!({
            "msg_type": Self::msg_type_str(msg_type),
            "content": content.to_string(),
        });

        let resp: Envelope = self
            .http
            .patch(self.url(&format!("/open-apis/im/v1/messages/{message_id}")))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| LarkError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| LarkError::Transport(e.to_string()))?;

        if resp.code != 0 {
            return Err(LarkError::Transport(format!(
                "update message failed: code={} msg={}",
                resp.code, resp.msg
            )));
        }
        Ok(())
    }

    async fn add_reaction(&self, message_id: &str, emoji_type: &str) -> Result<()> {
        #[derive(Deserialize)]
        struct Envelope {
            code: i64,
            msg: String,
        }

        let token = self.access_token().await?;
        let resp: Envelope = self
            .http
            .post(self.url(&format!("/open-apis/im/v1/messages/{message_id}/reactions")))
            .bearer_auth(token)
            .json(&serde_json::json!({ "reaction_type": { "emoji_type": emoji_type } }))
            .send()
            .await
            .map_err(|e| LarkError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| LarkError::Transport(e.to_string()))?;

        if resp.code != 0 {
            warn!(code = resp.code, msg = %resp.msg, "lark: add_reaction failed");
            return Err(LarkError::Transport(format!(
                "add reaction failed: code={} msg={}",
                resp.code, resp.msg
            )));
        }
        Ok(())
    }

    async fn upload_image(&self, bytes: Vec<u8>) -> Result<String> {
        #[derive(Deserialize)]
        struct Envelope {
            code: i64,
            msg: String,
            data: Option<ImageData>,
        }
        #[derive(Deserialize)]
        struct ImageData {
            image_key: String,
        }

        let token = self.access_token().await?;
        let part = reqwest::multipart::Part::bytes(bytes).file_name("image.png");
        let form = reqwest::multipart::Form::new()
            .text("image_type", "message")
            .part("image", part);

        let resp: Envelope = self
            .http
            .post(self.url("/open-apis/im/v1/images"))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| LarkError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| LarkError::Transport(e.to_string()))?;

        if resp.code != 0 {
            return Err(LarkError::Transport(format!(
                "upload image failed: code={} msg={}",
                resp.code, resp.msg
            )));
        }

        resp.data
            .map(|d| d.image_key)
            .ok_or_else(|| LarkError::Transport("missing image_key in response".into()))
    }

    async fn upload_file(
        &self,
        bytes: Vec<u8>,
        name: &str,
        file_type: LarkFileType,
    ) -> Result<String> {
        #[derive(Deserialize)]
        struct Envelope {
            code: i64,
            msg: String,
            data: Option<FileData>,
        }
        #[derive(Deserialize)]
        struct FileData {
            file_key: String,
        }

        let token = self.access_token().await?;
        let part = reqwest::multipart::Part::bytes(bytes).file_name(name.to_string());
        let form = reqwest::multipart::Form::new()
            .text("file_type", file_type.as_str())
            .text("file_name", name.to_string())
            .part("file", part);

        let resp: Envelope = self
            .http
            .post(self.url("/open-apis/im/v1/files"))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| LarkError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| LarkError::Transport(e.to_string()))?;

        if resp.code != 0 {
            return Err(LarkError::Transport(format!(
                "upload file failed: code={} msg={}",
                resp.code, resp.msg
            )));
        }

        resp.data
            .map(|d| d.file_key)
            .ok_or_else(|| LarkError::Transport("missing file_key in response".into()))
    }

    async fn list_messages(&self, chat_id: &str, page_size: u32) -> Result<Vec<ChatMessage>> {
        #[derive(Deserialize)]
        struct Envelope {
            code: i64,
            msg: String,
            data: Option<ListData>,
        }
        #[derive(Deserialize)]
        struct ListData {
            items: Vec<Item>,
        }
        #[derive(Deserialize)]
        struct Item {
            message_id: String,
            sender: Sender,
            body: Body,
            create_time: String,
        }
        #[derive(Deserialize)]
        struct Sender {
            id: String,
        }
        #[derive(Deserialize)]
        struct Body {
            content: String,
        }

        let token = self.access_token().await?;
        let resp: Envelope = self
            .http
            .get(self.url("/open-apis/im/v1/messages"))
            .bearer_auth(token)
            .query(&[
                ("container_id_type", "chat"),
                ("container_id", chat_id),
                ("page_size", &page_size.to_string()),
            ])
            .send()
            .await
            .map_err(|e| LarkError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| LarkError::Transport(e.to_string()))?;

        if resp.code != 0 {
            return Err(LarkError::Transport(format!(
                "list messages failed: code={} msg={}",
                resp.code, resp.msg
            )));
        }

        let items = resp.data.map(|d| d.items).unwrap_or_default();
        Ok(items
            .into_iter()
            .map(|item| {
                let text = serde_json::from_str::<serde_json::Value>(&item.body.content)
                    .ok()
                    .and_then(|v| v.get("text").and_then(|t| t.as_str()).map(String::from))
                    .unwrap_or_default();
                ChatMessage {
                    message_id: item.message_id,
                    sender_id: item.sender.id,
                    text,
                    create_time: item.create_time,
                }
            })
            .collect())
    }
}

/// Fetch an attachment's bytes from a `uri`, or decode them from inline
/// base64 `data`. Used by the attachment fanout path.
pub async fn fetch_attachment_bytes(
    http: &reqwest::Client,
    uri: Option<&str>,
    data: Option<&str>,
) -> Result<Vec<u8>> {
    if let Some(data) = data {
        return base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| LarkError::Transport(format!("invalid base64 attachment data: {e}")));
    }
    if let Some(uri) = uri {
        let bytes = http
            .get(uri)
            .send()
            .await
            .map_err(|e| LarkError::Transport(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| LarkError::Transport(e.to_string()))?;
        return Ok(bytes.to_vec());
    }
    Err(LarkError::Transport(
        "attachment has neither uri nor inline data".into(),
    ))
}

pub fn shared_http_client() -> Arc<reqwest::Client> {
    Arc::new(reqwest::Client::new())
}
