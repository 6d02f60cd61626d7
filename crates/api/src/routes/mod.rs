pub mod health;
pub mod notifications;
pub mod supply_jobs;
pub mod templates;

use axum::Router;
use sqlx::PgPool;
use uuid::Uuid;

use hireport_common::error::AppError;

use crate::middleware::subscription::{SubscriptionGate, require_subscription};
use crate::state::AppState;

/// Build the complete API router with all routes.
///
/// Everything under `/api` passes the subscription gate; `/health` does not.
pub fn create_router(state: AppState) -> Router {
    let gate = SubscriptionGate::from_state(&state);

    let api = Router::new()
        .merge(templates::router())
        .merge(notifications::router())
        .merge(supply_jobs::router())
        .route_layer(axum::middleware::from_fn_with_state(gate, require_subscription));

    Router::new()
        .merge(health::router())
        .merge(api)
        .with_state(state)
}

/// Reject non-admin users.
pub(crate) async fn require_admin(pool: &PgPool, user_id: Uuid) -> Result<(), AppError> {
    let is_admin: Option<(bool,)> = sqlx::query_as("SELECT is_admin FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    match is_admin {
        Some((true,)) => Ok(()),
        _ => Err(AppError::Forbidden("Administrator access required".to_string())),
    }
}
