//! The event-listener decorator chain (spec §4.4). Each decorator forwards
//! every event to the inner listener ("forward first, react second") and
//! additionally reacts to the kinds it cares about.

pub mod background;
pub mod emoji;
pub mod plan_clarify;
pub mod progress;

pub use background::BackgroundTaskListener;
pub use emoji::EmojiListener;
pub use plan_clarify::{AwaitQuestionTracker, PlanClarifyListener};
pub use progress::ProgressListener;

use std::sync::Arc;

use elephant_agent_contract::{EventListener, NullListener};

use crate::messenger::Messenger;

/// Configuration toggles controlling which decorators are active, mirroring
/// the `show_tool_progress` / `show_plan_clarify_messages` configuration
/// options.
pub struct ListenerChainOptions {
    pub show_tool_progress: bool,
    pub show_plan_clarify_messages: bool,
}

/// Everything the gateway needs back out of the constructed chain to run a
/// task and inspect/finalize decorator state afterward.
pub struct ListenerChain {
    pub listener: Arc<dyn EventListener>,
    pub emoji: Arc<EmojiListener>,
    pub progress: Option<Arc<ProgressListener>>,
    pub await_question_tracker: Arc<AwaitQuestionTracker>,
}

/// Build the decorator chain in outermost-first order: emoji reaction,
/// progress, plan/clarify, background task, then the caller-supplied
/// observer innermost.
pub fn build_chain(
    messenger: Arc<dyn Messenger>,
    chat_id: &str,
    trigger_message_id: &str,
    reply_to: Option<String>,
    observer: Option<Arc<dyn EventListener>>,
    options: &ListenerChainOptions,
) -> ListenerChain {
    let innermost: Arc<dyn EventListener> = observer.unwrap_or_else(|| Arc::new(NullListener));
    let await_question_tracker = Arc::new(AwaitQuestionTracker::default());

    let background = Arc::new(BackgroundTaskListener::new(
        innermost,
        messenger.clone(),
        chat_id.to_string(),
        reply_to.clone(),
    ));
    let mut current: Arc<dyn EventListener> = background;

    if options.show_plan_clarify_messages {
        current = Arc::new(PlanClarifyListener::new(
            current,
            messenger.clone(),
            chat_id.to_string(),
            reply_to.clone(),
            await_question_tracker.clone(),
        ));
    }

    let progress = if options.show_tool_progress {
        let progress = Arc::new(ProgressListener::new(
            current.clone(),
            messenger.clone(),
            chat_id.to_string(),
            reply_to.clone(),
        ));
        current = progress.clone();
        Some(progress)
    } else {
        None
    };

    let emoji = Arc::new(EmojiListener::new(current, messenger, trigger_message_id.to_string()));

    ListenerChain {
        listener: emoji.clone(),
        emoji,
        progress,
        await_question_tracker,
    }
}
