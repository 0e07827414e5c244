use std::sync::Arc;

use elephant_channels::ChannelManager;
use elephant_core::config::ElephantConfig;
use elephant_lark::gateway::LarkGateway;
use elephant_lark::lark_client::LarkMessenger;
use elephant_lark::plan_review::{PlanReviewStore, SqlitePlanReviewStore};
use elephant_lark::LarkChannel;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    elephant_core::logging::init("elephant_app=info,elephant_lark=info");

    let config_path = std::env::var("ELEPHANT_CONFIG").ok();
    let config = ElephantConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({}), using defaults", e);
        ElephantConfig::default()
    });

    let conn = rusqlite::Connection::open(&config.database.path)?;
    let plan_review: Arc<dyn PlanReviewStore> = Arc::new(SqlitePlanReviewStore::new(conn));
    plan_review.ensure_schema().await?;

    let messenger = Arc::new(LarkMessenger::new(
        config.lark.base_domain.clone(),
        config.lark.app_id.clone(),
        config.lark.app_secret.clone(),
    ));

    // The real agent runtime is an external collaborator (spec.md §1);
    // this wiring point is where a production deployment substitutes its
    // own `AgentRuntime` implementation.
    let runtime = Arc::new(elephant_agent_contract::MockAgentRuntime::default());

    let gateway = Arc::new(LarkGateway::new(
        config.lark.clone(),
        messenger.clone(),
        runtime,
        plan_review,
    ));

    let mut manager = ChannelManager::new();
    manager.register(Box::new(LarkChannel::new(gateway, messenger)));

    info!("elephant-app: connecting channels");
    manager.connect_all().await;

    // Keep the process alive; the Lark channel's inbound event source
    // (outside this repo's scope) drives `LarkGateway::handle_inbound`.
    std::future::pending::<()>().await;

    Ok(())
}
