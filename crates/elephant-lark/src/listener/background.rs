//! Background task listener (spec §4.4 item 4): turns a background
//! workflow's envelope events into an initial reply plus periodic in-place
//! updates, bounded by a tick interval and a maximum lifetime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use elephant_agent_contract::{AgentEvent, EventListener};
use parking_lot::Mutex;

use crate::messenger::{Messenger, MsgType};

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(15);
const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);

struct TaskState {
    message_id: Option<String>,
    summary: String,
    started_at: Instant,
    stopped: Arc<AtomicBool>,
}

pub struct BackgroundTaskListener {
    inner: Arc<dyn EventListener>,
    messenger: Arc<dyn Messenger>,
    chat_id: String,
    reply_to: Option<String>,
    tick_interval: Duration,
    max_lifetime: Duration,
    tasks: Arc<Mutex<HashMap<String, TaskState>>>,
}

impl BackgroundTaskListener {
    pub fn new(
        inner: Arc<dyn EventListener>,
        messenger: Arc<dyn Messenger>,
        chat_id: impl Into<String>,
        reply_to: Option<String>,
    ) -> Self {
        Self {
            inner,
            messenger,
            chat_id: chat_id.into(),
            reply_to,
            tick_interval: DEFAULT_TICK_INTERVAL,
            max_lifetime: DEFAULT_MAX_LIFETIME,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn dispatch(&self, task_id: &str, summary: &str) {
        {
            let mut tasks = self.tasks.lock();
            if tasks.contains_key(task_id) {
                return;
            }
            tasks.insert(
                task_id.to_string(),
                TaskState {
                    message_id: None,
                    summary: summary.to_string(),
                    started_at: Instant::now(),
                    stopped: Arc::new(AtomicBool::new(false)),
                },
            );
        }
        self.send_update(task_id, true);
        self.spawn_ticker(task_id.to_string());
    }

    fn progress(&self, task_id: &str, summary: &str) {
        let has_task = {
            let mut tasks = self.tasks.lock();
            match tasks.get_mut(task_id) {
                Some(state) => {
                    state.summary = summary.to_string();
                    true
                }
                None => false,
            }
        };
        if !has_task {
            return;
        }
    }

    fn finish(&self, task_id: &str, summary: &str, error: Option<&str>) {
        let stopped = {
            let mut tasks = self.tasks.lock();
            let Some(state) = tasks.get_mut(task_id) else {
                return;
            };
            state.summary = match error {
                Some(err) => format!("{summary} (error: {err})"),
                None => summary.to_string(),
            };
            state.stopped.clone()
        };
        stopped.store(true, Ordering::SeqCst);
        self.send_update(task_id, false);
    }

    fn awaiting_input(&self, task_id: &str, question: &str) {
        let stopped = {
            let mut tasks = self.tasks.lock();
            let Some(state) = tasks.get_mut(task_id) else {
                return;
            };
            state.summary = format!("awaiting input: {question}");
            state.stopped.clone()
        };
        stopped.store(true, Ordering::SeqCst);
        self.send_update(task_id, false);
    }

    fn send_update(&self, task_id: &str, is_initial: bool) {
        let (known_message_id, text) = {
            let tasks = self.tasks.lock();
            let Some(state) = tasks.get(task_id) else {
                return;
            };
            (state.message_id.clone(), state.summary.clone())
        };

        let messenger = self.messenger.clone();
        let chat_id = self.chat_id.clone();
        let reply_to = self.reply_to.clone();
        let tasks = self.tasks.clone();
        let task_id = task_id.to_string();

        tokio::spawn(async move {
            let content = serde_json::json!({ "text": text });
            if is_initial || known_message_id.is_none() {
                let sent = match reply_to {
                    Some(ref reply_to) => messenger.reply_message(reply_to, MsgType::Text, content).await,
                    None => messenger.send_message(&chat_id, MsgType::Text, content).await,
                };
                if let Ok(message_id) = sent {
                    if let Some(state) = tasks.lock().get_mut(&task_id) {
                        state.message_id = Some(message_id);
                    }
                }
            } else if let Some(message_id) = known_message_id {
                let _ = messenger.update_message(&message_id, MsgType::Text, content).await;
            }
        });
    }

    fn spawn_ticker(&self, task_id: String) {
        let tasks = self.tasks.clone();
        let tick_interval = self.tick_interval;
        let max_lifetime = self.max_lifetime;
        let messenger = self.messenger.clone();
        let chat_id = self.chat_id.clone();
        let reply_to = self.reply_to.clone();

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tick_interval).await;

                let (stopped, expired, known_message_id, text) = {
                    let tasks_guard = tasks.lock();
                    let Some(state) = tasks_guard.get(&task_id) else {
                        return;
                    };
                    let expired = state.started_at.elapsed() >= max_lifetime;
                    (
                        state.stopped.load(Ordering::SeqCst),
                        expired,
                        state.message_id.clone(),
                        state.summary.clone(),
                    )
                };

                if stopped || expired {
                    return;
                }

                if let Some(message_id) = known_message_id {
                    let content = serde_json::json!({ "text": text });
                    let _ = messenger.update_message(&message_id, MsgType::Text, content).await;
                } else {
                    let content = serde_json::json!({ "text": text });
                    let sent = match reply_to {
                        Some(ref reply_to) => messenger.reply_message(reply_to, MsgType::Text, content).await,
                        None => messenger.send_message(&chat_id, MsgType::Text, content).await,
                    };
                    if let Ok(message_id) = sent {
                        if let Some(state) = tasks.lock().get_mut(&task_id) {
                            state.message_id = Some(message_id);
                        }
                    }
                }
            }
        });
    }
}

impl EventListener for BackgroundTaskListener {
    fn on_event(&self, event: &AgentEvent) {
        self.inner.on_event(event);

        match event {
            AgentEvent::BackgroundTaskDispatched { task_id, summary } => {
                self.dispatch(task_id, summary);
            }
            AgentEvent::ExternalAgentProgress { task_id, summary } => {
                self.progress(task_id, summary);
            }
            AgentEvent::ExternalInputRequested { task_id, question } => {
                self.awaiting_input(task_id, question);
            }
            AgentEvent::BackgroundTaskCompleted {
                task_id,
                summary,
                error,
            } => {
                self.finish(task_id, summary, error.as_deref());
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingMessenger;
    use elephant_agent_contract::NullListener;
    use tokio::time::{sleep, Duration as TokioDuration};

    #[tokio::test]
    async fn dispatch_sends_initial_reply() {
        let messenger = Arc::new(RecordingMessenger::new());
        let listener =
            BackgroundTaskListener::new(Arc::new(NullListener), messenger.clone(), "oc_1", None);

        listener.on_event(&AgentEvent::BackgroundTaskDispatched {
            task_id: "t1".into(),
            summary: "started".into(),
        });
        sleep(TokioDuration::from_millis(20)).await;
        assert_eq!(messenger.send_count(), 1);
    }

    #[tokio::test]
    async fn completion_sends_final_update() {
        let messenger = Arc::new(RecordingMessenger::new());
        let listener =
            BackgroundTaskListener::new(Arc::new(NullListener), messenger.clone(), "oc_1", None);

        listener.on_event(&AgentEvent::BackgroundTaskDispatched {
            task_id: "t1".into(),
            summary: "started".into(),
        });
        sleep(TokioDuration::from_millis(20)).await;

        listener.on_event(&AgentEvent::BackgroundTaskCompleted {
            task_id: "t1".into(),
            summary: "finished".into(),
            error: None,
        });
        sleep(TokioDuration::from_millis(20)).await;

        assert_eq!(messenger.update_count(), 1);
        assert_eq!(messenger.last_text().as_deref(), Some("finished"));
    }
}
