//! Emoji-reaction interceptor (spec §4.4 item 1).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use elephant_agent_contract::{AgentEvent, EventListener};

use crate::messenger::Messenger;

/// Reacts exactly once, on the first `PreAnalysisEmoji` event. If the task
/// ends without ever emitting one, the gateway's post-execution hook
/// (`fire_fallback`) posts a configured fallback emoji instead — but never
/// both.
pub struct EmojiListener {
    inner: Arc<dyn EventListener>,
    messenger: Arc<dyn Messenger>,
    message_id: String,
    fired: AtomicBool,
}

impl EmojiListener {
    pub fn new(inner: Arc<dyn EventListener>, messenger: Arc<dyn Messenger>, message_id: impl Into<String>) -> Self {
        Self {
            inner,
            messenger,
            message_id: message_id.into(),
            fired: AtomicBool::new(false),
        }
    }

    /// True once a reaction has actually been fired (dynamic or fallback).
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Called by the gateway after the task ends: posts `fallback_emoji` iff
    /// no dynamic reaction fired during the run.
    pub async fn fire_fallback(&self, fallback_emoji: Option<&str>) {
        let Some(emoji) = fallback_emoji else {
            return;
        };
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.messenger.add_reaction(&self.message_id, emoji).await;
    }
}

impl EventListener for EmojiListener {
    fn on_event(&self, event: &AgentEvent) {
        self.inner.on_event(event);

        if let AgentEvent::PreAnalysisEmoji { emoji } = event {
            if self.fired.swap(true, Ordering::SeqCst) {
                return;
            }
            let messenger = self.messenger.clone();
            let message_id = self.message_id.clone();
            let emoji = emoji.clone();
            tokio::spawn(async move {
                let _ = messenger.add_reaction(&message_id, &emoji).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingMessenger;
    use elephant_agent_contract::NullListener;
    use tokio::time::{sleep, Duration};

    #[tokio::test]
    async fn reacts_once_on_first_event() {
        let messenger = Arc::new(RecordingMessenger::new());
        let listener = EmojiListener::new(Arc::new(NullListener), messenger.clone(), "om_1");

        listener.on_event(&AgentEvent::PreAnalysisEmoji { emoji: "THUMBSUP".into() });
        listener.on_event(&AgentEvent::PreAnalysisEmoji { emoji: "OK".into() });

        sleep(Duration::from_millis(20)).await;
        assert_eq!(messenger.reaction_count(), 1);
    }

    #[tokio::test]
    async fn fallback_skipped_once_dynamic_fired() {
        let messenger = Arc::new(RecordingMessenger::new());
        let listener = EmojiListener::new(Arc::new(NullListener), messenger.clone(), "om_1");
        listener.on_event(&AgentEvent::PreAnalysisEmoji { emoji: "OK".into() });
        sleep(Duration::from_millis(20)).await;

        listener.fire_fallback(Some("FALLBACK")).await;
        assert_eq!(messenger.reaction_count(), 1);
    }

    #[tokio::test]
    async fn fallback_fires_when_no_dynamic_event() {
        let messenger = Arc::new(RecordingMessenger::new());
        let listener = EmojiListener::new(Arc::new(NullListener), messenger.clone(), "om_1");
        listener.fire_fallback(Some("FALLBACK")).await;
        assert_eq!(messenger.reaction_count(), 1);
    }
}
