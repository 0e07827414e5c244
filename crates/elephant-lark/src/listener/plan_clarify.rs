//! Plan/clarify listener (spec §4.4 item 3): turns `plan`/`clarify` tool
//! completions into a reply bubble and tracks whether an inline question
//! has already been surfaced.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use elephant_agent_contract::{AgentEvent, EventListener};

use crate::messenger::{Messenger, MsgType};

/// Tracks whether an inline clarifying question has already been shown to
/// the user during this run, so the gateway does not ask twice.
#[derive(Default)]
pub struct AwaitQuestionTracker {
    asked: AtomicBool,
}

impl AwaitQuestionTracker {
    pub fn mark_asked(&self) {
        self.asked.store(true, Ordering::SeqCst);
    }

    pub fn has_asked(&self) -> bool {
        self.asked.load(Ordering::SeqCst)
    }
}

pub struct PlanClarifyListener {
    inner: Arc<dyn EventListener>,
    messenger: Arc<dyn Messenger>,
    chat_id: String,
    reply_to: Option<String>,
    tracker: Arc<AwaitQuestionTracker>,
}

impl PlanClarifyListener {
    pub fn new(
        inner: Arc<dyn EventListener>,
        messenger: Arc<dyn Messenger>,
        chat_id: impl Into<String>,
        reply_to: Option<String>,
        tracker: Arc<AwaitQuestionTracker>,
    ) -> Self {
        Self {
            inner,
            messenger,
            chat_id: chat_id.into(),
            reply_to,
            tracker,
        }
    }
}

impl EventListener for PlanClarifyListener {
    fn on_event(&self, event: &AgentEvent) {
        self.inner.on_event(event);

        let AgentEvent::ToolCompleted {
            tool_name,
            metadata,
            ..
        } = event
        else {
            return;
        };

        if tool_name != "plan" && tool_name != "clarify" {
            return;
        }
        let Some(metadata) = metadata else {
            return;
        };

        let bubble_text = metadata
            .get("overall_goal_ui")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .or_else(|| {
                metadata
                    .get("question_to_user")
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
            });
        let Some(bubble_text) = bubble_text else {
            return;
        };

        let needs_user_input = metadata
            .get("needs_user_input")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        if needs_user_input {
            self.tracker.mark_asked();
        }

        let messenger = self.messenger.clone();
        let chat_id = self.chat_id.clone();
        let reply_to = self.reply_to.clone();
        let text = bubble_text.to_string();

        tokio::spawn(async move {
            let content = serde_json::json!({ "text": text });
            let result = match reply_to {
                Some(reply_to) => messenger.reply_message(&reply_to, MsgType::Text, content).await,
                None => messenger.send_message(&chat_id, MsgType::Text, content).await,
            };
            let _ = result;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingMessenger;
    use elephant_agent_contract::NullListener;
    use tokio::time::{sleep, Duration};

    fn tool_completed(tool_name: &str, metadata: serde_json::Value) -> AgentEvent {
        AgentEvent::ToolCompleted {
            call_id: "c1".into(),
            tool_name: tool_name.into(),
            duration_secs: 0.1,
            error: None,
            metadata: Some(metadata),
        }
    }

    #[tokio::test]
    async fn emits_bubble_for_plan_tool() {
        let messenger = Arc::new(RecordingMessenger::new());
        let tracker = Arc::new(AwaitQuestionTracker::default());
        let listener = PlanClarifyListener::new(
            Arc::new(NullListener),
            messenger.clone(),
            "oc_1",
            None,
            tracker.clone(),
        );

        listener.on_event(&tool_completed(
            "plan",
            serde_json::json!({ "overall_goal_ui": "goal-9", "needs_user_input": true }),
        ));
        sleep(Duration::from_millis(20)).await;

        assert_eq!(messenger.send_count(), 1);
        assert_eq!(messenger.last_text().as_deref(), Some("goal-9"));
        assert!(tracker.has_asked());
    }

    #[tokio::test]
    async fn ignores_unrelated_tools() {
        let messenger = Arc::new(RecordingMessenger::new());
        let tracker = Arc::new(AwaitQuestionTracker::default());
        let listener =
            PlanClarifyListener::new(Arc::new(NullListener), messenger.clone(), "oc_1", None, tracker);

        listener.on_event(&tool_completed(
            "web_search",
            serde_json::json!({ "overall_goal_ui": "goal-9" }),
        ));
        sleep(Duration::from_millis(20)).await;
        assert_eq!(messenger.call_count(), 0);
    }

    #[tokio::test]
    async fn ignores_empty_bubble_text() {
        let messenger = Arc::new(RecordingMessenger::new());
        let tracker = Arc::new(AwaitQuestionTracker::default());
        let listener =
            PlanClarifyListener::new(Arc::new(NullListener), messenger.clone(), "oc_1", None, tracker);

        listener.on_event(&tool_completed("clarify", serde_json::json!({})));
        sleep(Duration::from_millis(20)).await;
        assert_eq!(messenger.call_count(), 0);
    }
}
