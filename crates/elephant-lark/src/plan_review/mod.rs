//! Durable plan-review handshake store (spec §4.6).

pub mod sqlite_store;

pub use sqlite_store::SqlitePlanReviewStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One pending plan-review record, keyed by `(user_id, chat_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingPlanReview {
    pub user_id: String,
    pub chat_id: String,
    pub run_id: String,
    pub overall_goal_ui: String,
    pub internal_plan: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait PlanReviewStore: Send + Sync {
    /// Bootstrap the backing schema. Idempotent.
    async fn ensure_schema(&self) -> Result<()>;

    /// Upsert, primary-keyed by `(user_id, chat_id)`.
    async fn save_pending(&self, record: PendingPlanReview) -> Result<()>;

    /// Absent or expired records are reported as `None` and opportunistically
    /// deleted.
    async fn get_pending(&self, user_id: &str, chat_id: &str) -> Result<Option<PendingPlanReview>>;

    /// Idempotent.
    async fn clear_pending(&self, user_id: &str, chat_id: &str) -> Result<()>;
}
