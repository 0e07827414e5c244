use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::warn;

use crate::error::{LarkError, Result};

use super::{PendingPlanReview, PlanReviewStore};

/// SQLite-backed plan-review store. Table layout is bit-exact with the
/// persisted-state contract: `(user_id, chat_id, run_id, overall_goal_ui,
/// internal_plan, created_at, expires_at)`, primary keyed by
/// `(user_id, chat_id)`, indexed on `expires_at`.
pub struct SqlitePlanReviewStore {
    conn: Mutex<Connection>,
}

impl SqlitePlanReviewStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

#[async_trait]
impl PlanReviewStore for SqlitePlanReviewStore {
    async fn ensure_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS plan_review_pending (
                user_id         TEXT NOT NULL,
                chat_id         TEXT NOT NULL,
                run_id          TEXT NOT NULL,
                overall_goal_ui TEXT NOT NULL,
                internal_plan   TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                expires_at      TEXT NOT NULL,
                PRIMARY KEY (user_id, chat_id)
            );
            CREATE INDEX IF NOT EXISTS idx_plan_review_pending_expires
                ON plan_review_pending(expires_at);",
        )
        .map_err(LarkError::from_rusqlite)?;
        Ok(())
    }

    async fn save_pending(&self, record: PendingPlanReview) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO plan_review_pending
                (user_id, chat_id, run_id, overall_goal_ui, internal_plan, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(user_id, chat_id) DO UPDATE SET
                run_id = excluded.run_id,
                overall_goal_ui = excluded.overall_goal_ui,
                internal_plan = excluded.internal_plan,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at",
            rusqlite::params![
                record.user_id,
                record.chat_id,
                record.run_id,
                record.overall_goal_ui,
                record.internal_plan.to_string(),
                record.created_at.to_rfc3339(),
                record.expires_at.to_rfc3339(),
            ],
        )
        .map_err(LarkError::from_rusqlite)?;
        Ok(())
    }

    async fn get_pending(&self, user_id: &str, chat_id: &str) -> Result<Option<PendingPlanReview>> {
        let conn = self.conn.lock().unwrap();
        let row = conn.query_row(
            "SELECT run_id, overall_goal_ui, internal_plan, created_at, expires_at
             FROM plan_review_pending WHERE user_id = ?1 AND chat_id = ?2",
            rusqlite::params![user_id, chat_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        );

        let (run_id, overall_goal_ui, internal_plan_json, created_at, expires_at) = match row {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(LarkError::from_rusqlite(e)),
        };

        let expires_at: DateTime<Utc> = expires_at
            .parse()
            .map_err(|e| LarkError::Store(format!("corrupt expires_at: {e}")))?;

        if expires_at <= Utc::now() {
            if let Err(e) = conn.execute(
                "DELETE FROM plan_review_pending WHERE user_id = ?1 AND chat_id = ?2",
                rusqlite::params![user_id, chat_id],
            ) {
                warn!(error = %e, "failed to opportunistically delete expired plan-review row");
            }
            return Ok(None);
        }

        let internal_plan = serde_json::from_str(&internal_plan_json).unwrap_or(serde_json::Value::Null);
        let created_at: DateTime<Utc> = created_at
            .parse()
            .map_err(|e| LarkError::Store(format!("corrupt created_at: {e}")))?;

        Ok(Some(PendingPlanReview {
            user_id: user_id.to_string(),
            chat_id: chat_id.to_string(),
            run_id,
            overall_goal_ui,
            internal_plan,
            created_at,
            expires_at,
        }))
    }

    async fn clear_pending(&self, user_id: &str, chat_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM plan_review_pending WHERE user_id = ?1 AND chat_id = ?2",
            rusqlite::params![user_id, chat_id],
        )
        .map_err(LarkError::from_rusqlite)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store() -> SqlitePlanReviewStore {
        let conn = Connection::open_in_memory().unwrap();
        SqlitePlanReviewStore::new(conn)
    }

    fn record(ttl: Duration) -> PendingPlanReview {
        let now = Utc::now();
        PendingPlanReview {
            user_id: "ou_1".into(),
            chat_id: "oc_1".into(),
            run_id: "run-9".into(),
            overall_goal_ui: "goal-9".into(),
            internal_plan: serde_json::json!({ "steps": ["a", "b"] }),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    #[tokio::test]
    async fn round_trip_within_ttl() {
        let store = store();
        store.ensure_schema().await.unwrap();
        store.save_pending(record(Duration::minutes(60))).await.unwrap();

        let got = store.get_pending("ou_1", "oc_1").await.unwrap();
        let got = got.expect("record should be present");
        assert_eq!(got.run_id, "run-9");
        assert_eq!(got.overall_goal_ui, "goal-9");
    }

    #[tokio::test]
    async fn expired_record_reported_absent_and_deleted() {
        let store = store();
        store.ensure_schema().await.unwrap();
        store.save_pending(record(Duration::seconds(-1))).await.unwrap();

        assert!(store.get_pending("ou_1", "oc_1").await.unwrap().is_none());
        // Opportunistic delete: a second read also finds nothing, and no error.
        assert!(store.get_pending("ou_1", "oc_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_then_get_reports_absent() {
        let store = store();
        store.ensure_schema().await.unwrap();
        store.save_pending(record(Duration::minutes(60))).await.unwrap();
        store.clear_pending("ou_1", "oc_1").await.unwrap();
        assert!(store.get_pending("ou_1", "oc_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let store = store();
        store.ensure_schema().await.unwrap();
        store.clear_pending("ou_1", "oc_1").await.unwrap();
        store.clear_pending("ou_1", "oc_1").await.unwrap();
    }

    #[tokio::test]
    async fn upsert_overwrites_existing_record() {
        let store = store();
        store.ensure_schema().await.unwrap();
        store.save_pending(record(Duration::minutes(60))).await.unwrap();

        let mut second = record(Duration::minutes(60));
        second.run_id = "run-10".into();
        store.save_pending(second).await.unwrap();

        let got = store.get_pending("ou_1", "oc_1").await.unwrap().unwrap();
        assert_eq!(got.run_id, "run-10");
    }
}
