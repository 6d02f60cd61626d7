//! Supplier notification for supply jobs.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;

use hireport_common::error::AppError;
use hireport_notifier::queue::{JobPayload, SupplierSmsJob};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/supply-jobs/{id}/supplier-sms", post(enqueue_supplier_sms))
}

/// POST /api/supply-jobs/:id/supplier-sms: queue the "new supply job" SMS.
///
/// Allowed for members of the supplier company and for administrators.
/// Queuing the same job twice is harmless; the worker sends at most once per
/// dedup window.
async fn enqueue_supplier_sms(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let allowed: Option<(bool,)> = sqlx::query_as(
        r#"
        SELECT u.is_admin OR u.company_id = sj.supplier_company_id
        FROM supply_jobs sj
        JOIN users u ON u.id = $2
        WHERE sj.id = $1
        "#,
    )
    .bind(id)
    .bind(auth.user_id)
    .fetch_optional(&state.pool)
    .await?;

    match allowed {
        None => return Err(AppError::NotFound(format!("Supply job {} not found", id))),
        Some((false,)) => {
            return Err(AppError::Forbidden(
                "Supply job belongs to another company".to_string(),
            ));
        }
        Some((true,)) => {}
    }

    let job = state
        .queue
        .push(JobPayload::SupplierSms(SupplierSmsJob { supply_job_id: id }))
        .await?;

    tracing::info!(supply_job_id = id, job_id = %job.id, user_id = %auth.user_id, "Supplier SMS queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "queued": true, "job_id": job.id, "supply_job_id": id })),
    ))
}
