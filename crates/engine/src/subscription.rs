//! Subscription lookup for the access gate.
//!
//! Billing state belongs to the user's company. The latest subscription row
//! wins; there is no caching, so a webhook-driven status change is visible on
//! the next request.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use hireport_common::error::AppError;
use hireport_common::types::{SubscriptionSnapshot, SubscriptionStatus};

#[async_trait]
pub trait SubscriptionDirectory: Send + Sync {
    /// Current subscription of the user's company, if it has one.
    async fn snapshot_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<SubscriptionSnapshot>, AppError>;
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    status: String,
    current_period_end: Option<DateTime<Utc>>,
}

/// Postgres-backed directory over `company_subscriptions`.
#[derive(Clone)]
pub struct PgSubscriptionDirectory {
    pool: PgPool,
}

impl PgSubscriptionDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionDirectory for PgSubscriptionDirectory {
    async fn snapshot_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<SubscriptionSnapshot>, AppError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT cs.status, cs.current_period_end
            FROM company_subscriptions cs
            JOIN users u ON u.company_id = cs.company_id
            WHERE u.id = $1
            ORDER BY cs.created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| SubscriptionSnapshot {
            status: SubscriptionStatus::parse(&row.status),
            current_period_end: row.current_period_end,
        }))
    }
}
