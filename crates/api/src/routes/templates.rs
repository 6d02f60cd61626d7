//! Template administration routes.

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;

use hireport_common::error::AppError;
use hireport_common::types::Template;
use hireport_engine::templates::{UpsertTemplateParams, unresolved_placeholders};

use crate::middleware::auth::AuthUser;
use crate::routes::require_admin;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/templates", get(list_templates))
        .route("/api/templates/{name}", put(upsert_template))
        .route("/api/templates/{name}/active", post(set_template_active))
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

/// GET /api/templates: list all stored templates.
async fn list_templates(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Template>>, AppError> {
    require_admin(&state.pool, auth.user_id).await?;
    Ok(Json(state.templates.list().await?))
}

/// PUT /api/templates/:name: create or replace a template.
///
/// Without a `variables` list the placeholders found in subject and body are
/// stored; a given list must cover all of them.
async fn upsert_template(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(name): Path<String>,
    Json(mut params): Json<UpsertTemplateParams>,
) -> Result<Json<Template>, AppError> {
    require_admin(&state.pool, auth.user_id).await?;

    let placeholders = unresolved_placeholders(&format!("{} {}", params.subject, params.body));
    if params.variables.is_empty() {
        params.variables = placeholders;
    } else {
        let undeclared: Vec<String> = placeholders
            .into_iter()
            .filter(|p| !params.variables.contains(p))
            .collect();
        if !undeclared.is_empty() {
            return Err(AppError::Template(format!(
                "Undeclared placeholders: {}",
                undeclared.join(", ")
            )));
        }
    }

    let template = state.templates.upsert(&name, &params).await?;
    Ok(Json(template))
}

/// POST /api/templates/:name/active: enable or disable a template.
async fn set_template_active(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(name): Path<String>,
    Json(request): Json<SetActiveRequest>,
) -> Result<Json<Template>, AppError> {
    require_admin(&state.pool, auth.user_id).await?;
    let template = state.templates.set_active(&name, request.active).await?;
    Ok(Json(template))
}
