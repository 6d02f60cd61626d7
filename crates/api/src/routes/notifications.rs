//! Ad-hoc notification sends.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use hireport_common::error::AppError;
use hireport_engine::dispatcher::DispatchOutcome;
use hireport_engine::templates::TemplateContext;

use crate::middleware::auth::AuthUser;
use crate::routes::require_admin;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/notifications/send", post(send_notification))
}

#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    pub template: String,
    pub to: String,
    #[serde(default)]
    pub to_name: String,
    pub reply_to: Option<String>,
    #[serde(default)]
    pub context: TemplateContext,
}

/// POST /api/notifications/send: render a template and email it.
///
/// Delivery problems are reported in the returned outcome, not as HTTP errors.
async fn send_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<SendNotificationRequest>,
) -> Result<Json<DispatchOutcome>, AppError> {
    require_admin(&state.pool, auth.user_id).await?;

    if request.template.trim().is_empty() {
        return Err(AppError::Validation("template must not be empty".to_string()));
    }

    let outcome = state
        .dispatcher
        .send(&request.template, &request.context, |email| {
            email.to(request.to.as_str(), request.to_name.as_str());
            if let Some(reply_to) = &request.reply_to {
                email.reply_to(reply_to.as_str());
            }
        })
        .await;

    Ok(Json(outcome))
}
