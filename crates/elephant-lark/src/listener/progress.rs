//! Rate-limited, single-message progress updater (spec §4.5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use elephant_agent_contract::{AgentEvent, EventListener};
use parking_lot::Mutex;
use tracing::debug;

use crate::messenger::{Messenger, MsgType};

const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(2);

struct ToolStatus {
    tool_name: String,
    started_at: Instant,
    done: bool,
    errored: bool,
    duration_secs: Option<f64>,
}

struct State {
    order: Vec<String>,
    tools: HashMap<String, ToolStatus>,
    message_id: Option<String>,
    dirty: bool,
    closed: bool,
    timer_pending: bool,
    last_flush: Instant,
}

/// Wraps an inner [`EventListener`] and forwards every event unchanged,
/// additionally coalescing `ToolStarted`/`ToolCompleted` (and the
/// equivalent background-task envelope events) into at most one
/// send-or-update of a single chat message per `flush_interval`.
pub struct ProgressListener {
    inner: Arc<dyn EventListener>,
    messenger: Arc<dyn Messenger>,
    chat_id: String,
    reply_to: Option<String>,
    flush_interval: Duration,
    state: Arc<Mutex<State>>,
}

impl ProgressListener {
    pub fn new(
        inner: Arc<dyn EventListener>,
        messenger: Arc<dyn Messenger>,
        chat_id: impl Into<String>,
        reply_to: Option<String>,
    ) -> Self {
        Self::with_flush_interval(inner, messenger, chat_id, reply_to, DEFAULT_FLUSH_INTERVAL)
    }

    pub fn with_flush_interval(
        inner: Arc<dyn EventListener>,
        messenger: Arc<dyn Messenger>,
        chat_id: impl Into<String>,
        reply_to: Option<String>,
        flush_interval: Duration,
    ) -> Self {
        Self {
            inner,
            messenger,
            chat_id: chat_id.into(),
            reply_to,
            flush_interval,
            state: Arc::new(Mutex::new(State {
                order: Vec::new(),
                tools: HashMap::new(),
                message_id: None,
                dirty: false,
                closed: false,
                timer_pending: false,
                last_flush: Instant::now() - DEFAULT_FLUSH_INTERVAL,
            })),
        }
    }

    fn on_tool_started(&self, call_id: &str, tool_name: &str) {
        let mut state = self.state.lock();
        if state.tools.contains_key(call_id) {
            return;
        }
        state.order.push(call_id.to_string());
        state.tools.insert(
            call_id.to_string(),
            ToolStatus {
                tool_name: tool_name.to_string(),
                started_at: Instant::now(),
                done: false,
                errored: false,
                duration_secs: None,
            },
        );
        state.dirty = true;
        drop(state);
        self.schedule_flush();
    }

    fn on_tool_completed(&self, call_id: &str, duration_secs: f64, error: Option<&str>) {
        let mut state = self.state.lock();
        let Some(tool) = state.tools.get_mut(call_id) else {
            return;
        };
        tool.done = true;
        tool.errored = error.is_some();
        tool.duration_secs = Some(duration_secs);
        state.dirty = true;
        drop(state);
        self.schedule_flush();
    }

    /// Idempotent: a pending timer is left alone; otherwise fires
    /// immediately if the interval has already elapsed, or after the
    /// remaining delay.
    fn schedule_flush(&self) {
        let mut state = self.state.lock();
        if state.timer_pending || state.closed {
            return;
        }
        let elapsed = state.last_flush.elapsed();
        let delay = if elapsed >= self.flush_interval {
            Duration::ZERO
        } else {
            self.flush_interval - elapsed
        };
        state.timer_pending = true;
        drop(state);

        let state_handle = self.state.clone();
        let messenger = self.messenger.clone();
        let chat_id = self.chat_id.clone();
        let reply_to = self.reply_to.clone();

        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            flush_now(&state_handle, &messenger, &chat_id, reply_to.as_deref()).await;
        });
    }

    /// Final synchronous flush if dirty, then stop accepting further
    /// updates. Idempotent.
    pub async fn close(&self) {
        let already_closed = {
            let mut state = self.state.lock();
            let was_closed = state.closed;
            state.closed = true;
            was_closed
        };
        if already_closed {
            return;
        }
        flush_now(&self.state, &self.messenger, &self.chat_id, self.reply_to.as_deref()).await;
    }
}

async fn flush_now(
    state_handle: &Arc<Mutex<State>>,
    messenger: &Arc<dyn Messenger>,
    chat_id: &str,
    reply_to: Option<&str>,
) {
    let (text, known_message_id, should_write) = {
        let mut state = state_handle.lock();
        state.timer_pending = false;
        if !state.dirty {
            (String::new(), state.message_id.clone(), false)
        } else {
            let text = render(&state);
            state.dirty = false;
            state.last_flush = Instant::now();
            (text, state.message_id.clone(), true)
        }
    };

    if !should_write {
        return;
    }

    let content = serde_json::json!({ "text": text });
    match known_message_id {
        None => {
            let result = match reply_to {
                Some(reply_to) => messenger.reply_message(reply_to, MsgType::Text, content).await,
                None => messenger.send_message(chat_id, MsgType::Text, content).await,
            };
            match result {
                Ok(message_id) => {
                    state_handle.lock().message_id = Some(message_id);
                }
                Err(e) => {
                    debug!(error = %e, "progress listener: initial send failed, will retry next flush");
                    state_handle.lock().dirty = true;
                }
            }
        }
        Some(message_id) => {
            if let Err(e) = messenger.update_message(&message_id, MsgType::Text, content).await {
                debug!(error = %e, "progress listener: update failed, will retry next flush");
                state_handle.lock().dirty = true;
            }
        }
    }
}

fn render(state: &State) -> String {
    let mut out = String::from("[处理中...]");
    for call_id in &state.order {
        let Some(tool) = state.tools.get(call_id) else {
            continue;
        };
        out.push('\n');
        if !tool.done {
            let elapsed = tool.started_at.elapsed().as_secs_f64();
            out.push_str(&format!("> {} [running {:.1}s]", tool.tool_name, elapsed));
        } else if tool.errored {
            out.push_str(&format!(
                "> {} [error {:.1}s]",
                tool.tool_name,
                tool.duration_secs.unwrap_or_default()
            ));
        } else {
            out.push_str(&format!(
                "> {} [done {:.1}s]",
                tool.tool_name,
                tool.duration_secs.unwrap_or_default()
            ));
        }
    }
    out
}

impl EventListener for ProgressListener {
    fn on_event(&self, event: &AgentEvent) {
        self.inner.on_event(event);

        match event {
            AgentEvent::ToolStarted { call_id, tool_name } => {
                self.on_tool_started(call_id, tool_name);
            }
            AgentEvent::ToolCompleted {
                call_id,
                duration_secs,
                error,
                ..
            } => {
                self.on_tool_completed(call_id, *duration_secs, error.as_deref());
            }
            AgentEvent::BackgroundTaskDispatched { task_id, .. } => {
                self.on_tool_started(task_id, "background_task");
            }
            AgentEvent::ExternalAgentProgress { task_id, .. } => {
                // Still running — no terminal state change, but nudge a flush
                // so elapsed time stays fresh.
                self.schedule_flush();
                let _ = task_id;
            }
            AgentEvent::ExternalInputRequested { task_id, .. } => {
                self.on_tool_completed(task_id, 0.0, None);
            }
            AgentEvent::BackgroundTaskCompleted { task_id, error, .. } => {
                let state = self.state.lock();
                let duration = state
                    .tools
                    .get(task_id)
                    .map(|t| t.started_at.elapsed().as_secs_f64())
                    .unwrap_or(0.0);
                drop(state);
                self.on_tool_completed(task_id, duration, error.as_deref());
            }
        }
    }
}
