//! End-to-end gateway scenarios (spec §8): admission, dedup, in-flight
//! forwarding, await-user-input session reuse, progress updates, and the
//! plan-review round trip. Driven through `LarkGateway::handle_inbound`
//! with a `RecordingMessenger` and a scripted `MockAgentRuntime`.

use std::sync::Arc;
use std::time::Duration;

use elephant_agent_contract::{AgentEvent, MockAgentRuntime, ScriptedTurn, StopReason};
use elephant_core::config::LarkConfig;
use elephant_lark::gateway::LarkGateway;
use elephant_lark::inbound::RawInboundEvent;
use elephant_lark::plan_review::{PlanReviewStore, SqlitePlanReviewStore};
use elephant_lark::testing::{RecordedCall, RecordingMessenger};

fn raw_text_event(chat_id: &str, message_id: &str, sender_id: &str, chat_type: &str, text: &str) -> RawInboundEvent {
    RawInboundEvent {
        message_type: "text".to_string(),
        chat_type: chat_type.to_string(),
        chat_id: chat_id.to_string(),
        message_id: message_id.to_string(),
        content: serde_json::json!({ "text": text }).to_string(),
        sender_id: sender_id.to_string(),
        mentions: Vec::new(),
    }
}

async fn sqlite_store() -> Arc<dyn PlanReviewStore> {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    let store: Arc<dyn PlanReviewStore> = Arc::new(SqlitePlanReviewStore::new(conn));
    store.ensure_schema().await.unwrap();
    store
}

fn enabled_config() -> LarkConfig {
    let mut config = LarkConfig::default();
    config.enabled = true;
    config
}

#[tokio::test]
async fn direct_message_is_admitted_and_replied_to() {
    let config = enabled_config();
    let messenger = Arc::new(RecordingMessenger::new());
    let runtime = Arc::new(MockAgentRuntime::new());
    let gateway = LarkGateway::new(config, messenger.clone(), runtime.clone(), sqlite_store().await);

    gateway
        .handle_inbound(raw_text_event("oc_1", "om_1", "ou_1", "p2p", "hello"))
        .await;

    assert_eq!(runtime.call_count(), 1);
    assert_eq!(messenger.last_text().as_deref(), Some("echo: hello"));
}

#[tokio::test]
async fn duplicate_message_id_is_dropped() {
    let config = enabled_config();
    let messenger = Arc::new(RecordingMessenger::new());
    let runtime = Arc::new(MockAgentRuntime::new());
    let gateway = LarkGateway::new(config, messenger.clone(), runtime.clone(), sqlite_store().await);

    let event = raw_text_event("oc_1", "om_dup", "ou_1", "p2p", "hi");
    gateway.handle_inbound(event.clone()).await;
    gateway.handle_inbound(event).await;

    assert_eq!(runtime.call_count(), 1);
}

#[tokio::test]
async fn ungrouped_chat_not_admitted_is_skipped() {
    // allow_groups defaults to false
    let config = enabled_config();
    let messenger = Arc::new(RecordingMessenger::new());
    let runtime = Arc::new(MockAgentRuntime::new());
    let gateway = LarkGateway::new(config, messenger.clone(), runtime.clone(), sqlite_store().await);

    gateway
        .handle_inbound(raw_text_event("oc_grp", "om_1", "ou_1", "group", "hi team"))
        .await;

    assert_eq!(runtime.call_count(), 0);
    assert_eq!(messenger.call_count(), 0);
}

#[tokio::test]
async fn second_message_forwards_into_in_flight_task() {
    let config = enabled_config();
    let messenger = Arc::new(RecordingMessenger::new());
    let runtime = Arc::new(MockAgentRuntime::new());

    let memory_identity =
        elephant_lark::identity::memory_identity(&config.session_prefix, "oc_1");
    runtime.queue_turn(
        &memory_identity,
        ScriptedTurn::completed("done").waiting_for_forward(),
    );

    let gateway = Arc::new(LarkGateway::new(config, messenger.clone(), runtime.clone(), sqlite_store().await));

    let gw = gateway.clone();
    let first = tokio::spawn(async move {
        gw.handle_inbound(raw_text_event("oc_1", "om_first", "ou_1", "p2p", "start task"))
            .await;
    });

    // Give the first task time to register itself as in-flight before the
    // second message arrives.
    tokio::time::sleep(Duration::from_millis(50)).await;

    gateway
        .handle_inbound(raw_text_event("oc_1", "om_second", "ou_1", "p2p", "more context"))
        .await;

    first.await.unwrap();

    let calls = runtime.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].forwarded_input.as_ref().map(|i| i.content.as_str()),
        Some("more context")
    );
}

#[tokio::test]
async fn awaiting_input_session_is_reused_for_next_message() {
    let config = enabled_config();
    let messenger = Arc::new(RecordingMessenger::new());
    let runtime = Arc::new(MockAgentRuntime::new());

    let memory_identity =
        elephant_lark::identity::memory_identity(&config.session_prefix, "oc_1");
    runtime.set_awaiting_input(&memory_identity, "sess-1");
    runtime.queue_turn(&memory_identity, ScriptedTurn::completed("continuing"));

    let gateway = LarkGateway::new(config, messenger.clone(), runtime.clone(), sqlite_store().await);

    gateway
        .handle_inbound(raw_text_event("oc_1", "om_1", "ou_1", "p2p", "continue please"))
        .await;

    let calls = runtime.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].session_id, "sess-1");
}

#[tokio::test]
async fn progress_events_update_the_chat_message() {
    let mut config = enabled_config();
    config.show_tool_progress = true;
    let messenger = Arc::new(RecordingMessenger::new());
    let runtime = Arc::new(MockAgentRuntime::new());

    let memory_identity =
        elephant_lark::identity::memory_identity(&config.session_prefix, "oc_1");
    runtime.queue_turn(
        &memory_identity,
        ScriptedTurn::completed("all done").with_events(vec![
            AgentEvent::ToolStarted {
                call_id: "c1".to_string(),
                tool_name: "search".to_string(),
            },
            AgentEvent::ToolCompleted {
                call_id: "c1".to_string(),
                tool_name: "search".to_string(),
                duration_secs: 1.0,
                error: None,
                metadata: None,
            },
        ]),
    );

    let gateway = LarkGateway::new(config, messenger.clone(), runtime.clone(), sqlite_store().await);

    gateway
        .handle_inbound(raw_text_event("oc_1", "om_1", "ou_1", "p2p", "search something"))
        .await;

    // The progress updater's flush is a spawned background task; give it a
    // chance to run before inspecting the recorded calls.
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(messenger.update_count() > 0 || messenger.send_count() > 0);
}

#[tokio::test]
async fn plan_review_pending_is_persisted_and_folded_into_next_message() {
    let config = enabled_config();
    let messenger = Arc::new(RecordingMessenger::new());
    let runtime = Arc::new(MockAgentRuntime::new());
    let store = sqlite_store().await;

    let memory_identity =
        elephant_lark::identity::memory_identity(&config.session_prefix, "oc_1");
    runtime.queue_turn(
        &memory_identity,
        ScriptedTurn::completed("here is my plan")
            .with_stop_reason(StopReason::AwaitUserInput)
            .with_plan_review(
                "run-42",
                "Ship the feature",
                serde_json::json!({"steps": ["a", "b"]}),
            ),
    );
    runtime.queue_turn(&memory_identity, ScriptedTurn::completed("proceeding"));

    let gateway = LarkGateway::new(config, messenger.clone(), runtime.clone(), store.clone());

    gateway
        .handle_inbound(raw_text_event("oc_1", "om_1", "ou_1", "p2p", "do the thing"))
        .await;

    let pending = store.get_pending("ou_1", "oc_1").await.unwrap();
    assert!(pending.is_some());

    gateway
        .handle_inbound(raw_text_event("oc_1", "om_2", "ou_1", "p2p", "looks good"))
        .await;

    let calls = runtime.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].input.content.contains("run_id=\"run-42\""));
    assert!(calls[1].input.content.contains("looks good"));

    assert!(store.get_pending("ou_1", "oc_1").await.unwrap().is_none());
}

#[tokio::test]
async fn reset_slash_command_resets_session_without_invoking_runtime() {
    let config = enabled_config();
    let messenger = Arc::new(RecordingMessenger::new());
    let runtime = Arc::new(MockAgentRuntime::new());
    let gateway = LarkGateway::new(config, messenger.clone(), runtime.clone(), sqlite_store().await);

    gateway
        .handle_inbound(raw_text_event("oc_1", "om_1", "ou_1", "p2p", "/reset"))
        .await;

    assert_eq!(runtime.call_count(), 0);
    assert!(matches!(messenger.calls().last(), Some(RecordedCall::Send { .. } | RecordedCall::Reply { .. })));
}
