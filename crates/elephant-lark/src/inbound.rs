//! Inbound chat event parsing (spec §6): only `text` and `post` message
//! types are processed; `post` is flattened to text, preserving mentions.

use serde::Deserialize;

use crate::error::{LarkError, Result};
use crate::mentions::{resolve_mentions, Mention};

/// The event shape as delivered by the chat backend's webhook/websocket
/// layer, before any gateway-side parsing.
#[derive(Debug, Clone, Deserialize)]
pub struct RawInboundEvent {
    pub message_type: String,
    pub chat_type: String,
    pub chat_id: String,
    pub message_id: String,
    /// Raw JSON payload — `{"text": "..."}` for text, a paragraph tree for
    /// post.
    pub content: String,
    pub sender_id: String,
    #[serde(default)]
    pub mentions: Vec<Mention>,
}

/// A parsed inbound event, ready for dedup/scheduler admission.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub chat_id: String,
    pub message_id: String,
    pub sender_id: String,
    pub is_group: bool,
    pub text: String,
    pub mentions: Vec<Mention>,
}

/// Parse a raw inbound event. Unsupported `message_type`s are rejected —
/// the caller logs at warn and drops the event.
pub fn parse_inbound(raw: &RawInboundEvent) -> Result<InboundEvent> {
    if raw.message_type != "text" && raw.message_type != "post" {
        return Err(LarkError::Parse(format!(
            "unsupported message_type: {}",
            raw.message_type
        )));
    }

    let content_json: serde_json::Value = serde_json::from_str(&raw.content)
        .map_err(|e| LarkError::Parse(format!("invalid content JSON: {e}")))?;

    let raw_text = if raw.message_type == "text" {
        content_json
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    } else {
        flatten_post(&content_json)
    };

    let text = resolve_mentions(&raw_text, &raw.mentions);

    Ok(InboundEvent {
        chat_id: raw.chat_id.clone(),
        message_id: raw.message_id.clone(),
        sender_id: raw.sender_id.clone(),
        is_group: raw.chat_type == "group",
        text,
        mentions: raw.mentions.clone(),
    })
}

/// Flatten a `post` content tree (an array of paragraphs, each an array of
/// `{tag:"text", text}` / `{tag:"at", user_id}` elements) into plain text,
/// joining paragraphs with newlines. `at` elements carry the mention's
/// `key` as `user_id`, left as-is for [`resolve_mentions`] to substitute.
fn flatten_post(content: &serde_json::Value) -> String {
    let Some(paragraphs) = content.get("content").and_then(|v| v.as_array()) else {
        return String::new();
    };

    paragraphs
        .iter()
        .map(|para| {
            let Some(elements) = para.as_array() else {
                return String::new();
            };
            elements
                .iter()
                .map(|el| {
                    let tag = el.get("tag").and_then(|t| t.as_str()).unwrap_or("");
                    match tag {
                        "text" => el.get("text").and_then(|t| t.as_str()).unwrap_or("").to_string(),
                        "at" => el.get("user_id").and_then(|t| t.as_str()).unwrap_or("").to_string(),
                        _ => String::new(),
                    }
                })
                .collect::<Vec<_>>()
                .join("")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_event(message_type: &str, content: &str) -> RawInboundEvent {
        RawInboundEvent {
            message_type: message_type.to_string(),
            chat_type: "p2p".to_string(),
            chat_id: "oc_1".to_string(),
            message_id: "om_1".to_string(),
            content: content.to_string(),
            sender_id: "ou_1".to_string(),
            mentions: Vec::new(),
        }
    }

    #[test]
    fn parses_plain_text() {
        let raw = base_event("text", r#"{"text":"hello"}"#);
        let event = parse_inbound(&raw).unwrap();
        assert_eq!(event.text, "hello");
        assert!(!event.is_group);
    }

    #[test]
    fn parses_group_chat_type() {
        let mut raw = base_event("text", r#"{"text":"hi"}"#);
        raw.chat_type = "group".to_string();
        let event = parse_inbound(&raw).unwrap();
        assert!(event.is_group);
    }

    #[test]
    fn resolves_mentions_in_text() {
        let mut raw = base_event("text", r#"{"text":"hi @_user_1"}"#);
        raw.mentions = vec![Mention {
            key: "@_user_1".to_string(),
            name: "Ada".to_string(),
            open_id: "ou_ada".to_string(),
        }];
        let event = parse_inbound(&raw).unwrap();
        assert_eq!(event.text, "hi @Ada(ou_ada)");
    }

    #[test]
    fn flattens_post_content() {
        let content = serde_json::json!({
            "title": "",
            "content": [
                [{"tag": "text", "text": "line one "}, {"tag": "at", "user_id": "@_user_1"}],
                [{"tag": "text", "text": "line two"}]
            ]
        });
        let mut raw = base_event("post", &content.to_string());
        raw.mentions = vec![Mention {
            key: "@_user_1".to_string(),
            name: "Bob".to_string(),
            open_id: "ou_bob".to_string(),
        }];
        let event = parse_inbound(&raw).unwrap();
        assert_eq!(event.text, "line one @Bob(ou_bob)\nline two");
    }

    #[test]
    fn rejects_unsupported_message_type() {
        let raw = base_event("image", "{}");
        assert!(parse_inbound(&raw).is_err());
    }
}
