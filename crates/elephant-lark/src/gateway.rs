//! Top-level gateway dispatch (spec §2 step 6): parses inbound events,
//! derives identities, runs the scheduler, invokes the agent runtime, and
//! dispatches the reply.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use elephant_agent_contract::{AgentRuntime, EventListener, StopReason, TaskContext, UserInput};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use elephant_core::config::LarkConfig;

use crate::attachments::{dispatch_attachments, UploadPolicy};
use crate::cards;
use crate::commands::{parse_slash_command, SlashCommand};
use crate::dedup::DedupCache;
use crate::identity::memory_identity;
use crate::inbound::{parse_inbound, RawInboundEvent};
use crate::listener::{build_chain, ListenerChainOptions};
use crate::mentions::render_outbound_mentions;
use crate::messenger::{split_chunks, Messenger, MsgType};
use crate::plan_review::{PendingPlanReview, PlanReviewStore};
use crate::scheduler::{Scheduler, SchedulerOutcome};

/// Used whenever the configured `react_emoji` pool has fewer than two
/// distinct tokens (spec §9 "Emoji pool parsing").
const DEFAULT_EMOJI_POOL: &[&str] = &["OK", "THUMBSUP"];

/// A parsed, de-duplicated fallback-emoji pool that cycles through its
/// tokens round-robin so repeated fallbacks are not always the same emoji,
/// per spec §9: tokens separated by `, ; |` or whitespace, trimmed,
/// de-duplicated in arrival order; fewer than two distinct tokens falls
/// back to [`DEFAULT_EMOJI_POOL`].
struct EmojiPool {
    tokens: Vec<String>,
    next: AtomicUsize,
}

impl EmojiPool {
    fn parse(raw: &str) -> Self {
        let mut tokens: Vec<String> = Vec::new();
        for tok in raw.split(|c: char| c == ',' || c == ';' || c == '|' || c.is_whitespace()) {
            let tok = tok.trim();
            if tok.is_empty() || tokens.iter().any(|t| t == tok) {
                continue;
            }
            tokens.push(tok.to_string());
        }
        if tokens.len() < 2 {
            tokens = DEFAULT_EMOJI_POOL.iter().map(|s| s.to_string()).collect();
        }
        Self {
            tokens,
            next: AtomicUsize::new(0),
        }
    }

    fn pick(&self) -> Option<String> {
        if self.tokens.is_empty() {
            return None;
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.tokens.len();
        Some(self.tokens[idx].clone())
    }
}

/// Ties every gateway component together: dedup, scheduler, listener
/// chain, plan-review store, attachment fanout, and card/command handling.
pub struct LarkGateway {
    config: LarkConfig,
    messenger: Arc<dyn Messenger>,
    runtime: Arc<dyn AgentRuntime>,
    dedup: DedupCache,
    scheduler: Scheduler,
    plan_review: Arc<dyn PlanReviewStore>,
    http: reqwest::Client,
    emoji_pool: EmojiPool,
}

impl LarkGateway {
    pub fn new(
        config: LarkConfig,
        messenger: Arc<dyn Messenger>,
        runtime: Arc<dyn AgentRuntime>,
        plan_review: Arc<dyn PlanReviewStore>,
    ) -> Self {
        let session_prefix = config.session_prefix.clone();
        let emoji_pool = EmojiPool::parse(&config.react_emoji);
        Self {
            config,
            messenger,
            runtime,
            dedup: DedupCache::new(),
            scheduler: Scheduler::new(session_prefix),
            plan_review,
            http: reqwest::Client::new(),
            emoji_pool,
        }
    }

    /// True if this chat is allowed to reach the agent runtime, per the
    /// direct/group admission configuration.
    fn is_admitted(&self, is_group: bool) -> bool {
        if is_group {
            self.config.allow_groups
        } else {
            self.config.allow_direct
        }
    }

    /// Handle one raw inbound event end to end. Never propagates an error
    /// to the caller — every failure mode is either a best-effort side
    /// effect or a chat reply.
    pub async fn handle_inbound(&self, raw: RawInboundEvent) {
        if !self.config.enabled {
            return;
        }

        let event = match parse_inbound(&raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "lark: dropping inbound event: parse failed");
                return;
            }
        };

        if self.dedup.is_duplicate(&event.message_id) {
            debug!(message_id = %event.message_id, "lark: duplicate inbound, skipping");
            return;
        }

        let is_group = event.is_group;
        if !self.is_admitted(is_group) {
            debug!(chat_id = %event.chat_id, is_group, "lark: chat not admitted, skipping");
            return;
        }

        if let Some(SlashCommand::Reset) = parse_slash_command(&event.text) {
            self.handle_reset(&event.chat_id).await;
            return;
        }

        let memory_identity = memory_identity(&self.config.session_prefix, &event.chat_id);

        let task_text = if self.config.plan_review_enabled {
            match self.plan_review.get_pending(&event.sender_id, &event.chat_id).await {
                Ok(Some(pending)) => {
                    let _ = self.plan_review.clear_pending(&event.sender_id, &event.chat_id).await;
                    format!(
                        "<plan_feedback run_id=\"{}\">{}</plan_feedback>\n{}",
                        pending.run_id, event.text, pending.internal_plan
                    )
                }
                Ok(None) => event.text.clone(),
                Err(e) => {
                    warn!(error = %e, "lark: get_pending failed, proceeding without plan feedback");
                    event.text.clone()
                }
            }
        } else {
            event.text.clone()
        };

        let task_text = if self.config.auto_chat_context {
            self.prepend_auto_chat_context(&event.chat_id, task_text).await
        } else {
            task_text
        };

        let ctx = TaskContext {
            memory_identity: memory_identity.clone(),
            chat_id: event.chat_id.clone(),
            sender_id: event.sender_id.clone(),
            is_group,
            agent_preset: self.config.agent_preset_or_default().to_string(),
            tool_preset: self.config.tool_preset_or_default().to_string(),
            reply_timeout_secs: self.config.reply_timeout_secs,
            memory_enabled: self.config.memory_enabled,
        };

        let reply_to = if is_group { Some(event.message_id.clone()) } else { None };

        let chain = build_chain(
            self.messenger.clone(),
            &event.chat_id,
            &event.message_id,
            reply_to.clone(),
            None,
            &ListenerChainOptions {
                show_tool_progress: self.config.show_tool_progress,
                show_plan_clarify_messages: self.config.show_plan_clarify_messages,
            },
        );

        let cancel = CancellationToken::new();
        let timeout = Duration::from_secs(self.config.reply_timeout_secs.max(1));
        let listener: Arc<dyn EventListener> = chain.listener.clone();

        let outcome = tokio::time::timeout(
            timeout,
            self.scheduler.admit(
                self.runtime.as_ref(),
                ctx,
                UserInput::text(task_text),
                listener,
                cancel.clone(),
            ),
        )
        .await;

        if let Some(progress) = &chain.progress {
            progress.close().await;
        }

        match outcome {
            Err(_) => {
                cancel.cancel();
                warn!(chat_id = %event.chat_id, "lark: task timed out");
                self.send_fallback_reply(&event.chat_id, reply_to.as_deref(), "execution failed: timed out")
                    .await;
            }
            Ok(SchedulerOutcome::Forwarded) => {
                debug!(chat_id = %event.chat_id, "lark: forwarded into in-flight task");
            }
            Ok(SchedulerOutcome::Failed(e)) => {
                chain.emoji.fire_fallback(self.emoji_pool.pick().as_deref()).await;
                self.send_fallback_reply(
                    &event.chat_id,
                    reply_to.as_deref(),
                    &format!("execution failed: {e}"),
                )
                .await;
            }
            Ok(SchedulerOutcome::Ran(result)) => {
                chain.emoji.fire_fallback(self.emoji_pool.pick().as_deref()).await;

                if result.stop_reason == StopReason::AwaitUserInput && self.config.plan_review_enabled {
                    if let Some(pending) = &result.plan_review_pending {
                        let now = Utc::now();
                        let ttl = chrono::Duration::seconds(self.config.plan_review_pending_ttl_secs as i64);
                        let record = PendingPlanReview {
                            user_id: event.sender_id.clone(),
                            chat_id: event.chat_id.clone(),
                            run_id: pending.run_id.clone(),
                            overall_goal_ui: pending.overall_goal_ui.clone(),
                            internal_plan: pending.internal_plan.clone(),
                            created_at: now,
                            expires_at: now + ttl,
                        };
                        if let Err(e) = self.plan_review.save_pending(record).await {
                            warn!(error = %e, "lark: save_pending failed, continuing without persistence");
                        }
                    }
                }

                self.send_reply(&event.chat_id, reply_to.as_deref(), &result.content, &result.plan_review_pending)
                    .await;

                dispatch_attachments(
                    self.messenger.as_ref(),
                    &self.http,
                    &result.attachments,
                    &event.chat_id,
                    reply_to.as_deref(),
                    is_group,
                    &self.upload_policy(),
                )
                .await;
            }
        }
    }

    /// The attachment auto-upload policy derived from config, consulted by
    /// `dispatch_attachments` on every task completion.
    fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy {
            enabled: self.config.auto_upload_files,
            max_bytes: self.config.auto_upload_max_bytes,
            allowed_ext: self.config.auto_upload_allow_ext.clone(),
        }
    }

    /// Prepend a recent-message transcript (via `Messenger::list_messages`)
    /// to `text` when auto-chat-context is enabled. Best-effort: a failed
    /// lookup falls back to the task text unchanged.
    async fn prepend_auto_chat_context(&self, chat_id: &str, text: String) -> String {
        match self
            .messenger
            .list_messages(chat_id, self.config.auto_chat_context_size)
            .await
        {
            Ok(messages) if !messages.is_empty() => {
                let transcript = messages
                    .iter()
                    .rev()
                    .map(|m| format!("{}: {}", m.sender_id, m.text))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("<chat_context>\n{transcript}\n</chat_context>\n{text}")
            }
            Ok(_) => text,
            Err(e) => {
                warn!(error = %e, "lark: list_messages failed, proceeding without auto chat context");
                text
            }
        }
    }

    async fn handle_reset(&self, chat_id: &str) {
        let memory_identity = memory_identity(&self.config.session_prefix, chat_id);
        match self.runtime.reset_session(&memory_identity).await {
            Ok(()) => {
                self.send_reply(chat_id, None, "会话已重置", &None).await;
            }
            Err(e) => {
                warn!(error = %e, "lark: reset_session failed");
                self.send_reply(chat_id, None, "重置失败，请稍后重试", &None).await;
            }
        }
    }

    async fn send_reply(
        &self,
        chat_id: &str,
        reply_to: Option<&str>,
        text: &str,
        plan_review_pending: &Option<elephant_agent_contract::PlanReviewPending>,
    ) {
        let use_plan_card = self.config.cards_enabled
            && self.config.cards_plan_review
            && plan_review_pending.is_some();

        if use_plan_card {
            let pending = plan_review_pending.as_ref().unwrap();
            let content = cards::plan_review_card(&pending.overall_goal_ui);
            let result = match reply_to {
                Some(reply_to) => self.messenger.reply_message(reply_to, MsgType::Interactive, content).await,
                None => self.messenger.send_message(chat_id, MsgType::Interactive, content).await,
            };
            if let Err(e) = result {
                warn!(error = %e, "lark: send_reply (plan card) failed");
            }
            return;
        }

        for chunk in split_chunks(text) {
            let chunk = render_outbound_mentions(&chunk);
            let (content, msg_type) = if self.config.cards_enabled && self.config.cards_results {
                (cards::results_card(&chunk), MsgType::Interactive)
            } else {
                (serde_json::json!({ "text": chunk }), MsgType::Text)
            };

            let result = match reply_to {
                Some(reply_to) => self.messenger.reply_message(reply_to, msg_type, content).await,
                None => self.messenger.send_message(chat_id, msg_type, content).await,
            };
            if let Err(e) = result {
                warn!(error = %e, "lark: send_reply failed");
            }
        }
    }

    async fn send_fallback_reply(&self, chat_id: &str, reply_to: Option<&str>, text: &str) {
        let text = render_outbound_mentions(text);
        let (content, msg_type) = if self.config.cards_enabled && self.config.cards_errors {
            (cards::error_card(&text), MsgType::Interactive)
        } else {
            (serde_json::json!({ "text": text }), MsgType::Text)
        };

        let result = match reply_to {
            Some(reply_to) => self.messenger.reply_message(reply_to, msg_type, content).await,
            None => self.messenger.send_message(chat_id, msg_type, content).await,
        };
        if result.is_err() {
            // Best-effort retry as a plain fallback text message.
            let fallback = serde_json::json!({ "text": "no reply available" });
            let _ = match reply_to {
                Some(reply_to) => self.messenger.reply_message(reply_to, MsgType::Text, fallback).await,
                None => self.messenger.send_message(chat_id, MsgType::Text, fallback).await,
            };
        }
    }

    /// Resolve a card action taxonomy payload into the user input string to
    /// inject as the next inbound message. Exposed for the card-callback
    /// entry point.
    pub fn resolve_card_action(
        &self,
        action_tag: &str,
        plan_feedback: Option<&str>,
        generic_value: Option<&str>,
    ) -> String {
        cards::CardAction::from_tag(action_tag).resolve_user_input(plan_feedback, generic_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emoji_pool_dedups_and_splits_on_all_separators() {
        let pool = EmojiPool::parse(" THUMBSUP , THUMBSUP ; OK | CLAP\tHEART");
        assert_eq!(pool.tokens, vec!["THUMBSUP", "OK", "CLAP", "HEART"]);
    }

    #[test]
    fn emoji_pool_falls_back_to_default_when_fewer_than_two_tokens() {
        let default: Vec<String> = DEFAULT_EMOJI_POOL.iter().map(|s| s.to_string()).collect();

        let empty = EmojiPool::parse("");
        assert_eq!(empty.tokens, default);

        let single = EmojiPool::parse(" , OK ; ");
        assert_eq!(single.tokens, default);
    }

    #[test]
    fn emoji_pool_picks_cycle_round_robin_and_are_distinct_in_sequence() {
        let pool = EmojiPool::parse("THUMBSUP, OK");
        let first = pool.pick().unwrap();
        let second = pool.pick().unwrap();
        assert_ne!(first, second);
        let third = pool.pick().unwrap();
        assert_eq!(first, third);
    }
}
