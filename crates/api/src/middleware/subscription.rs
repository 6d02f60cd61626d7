//! Subscription gate middleware.
//!
//! Runs the gate decision for every request on the `/api` routes. The
//! subscription snapshot is loaded per request.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use hireport_engine::gate::{GateDecision, GateNotice, decide};
use hireport_engine::subscription::SubscriptionDirectory;

use crate::middleware::auth::bearer_principal;
use crate::state::AppState;

pub const WARNING_HEADER: &str = "x-subscription-warning";
pub const STATUS_HEADER: &str = "x-subscription-status";

/// State of the gate middleware.
#[derive(Clone)]
pub struct SubscriptionGate {
    jwt_secret: String,
    directory: Arc<dyn SubscriptionDirectory>,
}

impl SubscriptionGate {
    pub fn new(jwt_secret: impl Into<String>, directory: Arc<dyn SubscriptionDirectory>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            directory,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(state.config.jwt_secret.clone(), state.subscriptions.clone())
    }
}

pub async fn require_subscription(
    State(gate): State<SubscriptionGate>,
    mut request: Request,
    next: Next,
) -> Response {
    let principal = bearer_principal(request.headers(), &gate.jwt_secret);

    let snapshot = match &principal {
        Some(principal) => match gate.directory.snapshot_for_user(principal.user_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(user_id = %principal.user_id, error = %e, "Subscription lookup failed");
                return e.into_response();
            }
        },
        None => None,
    };

    match decide(principal.as_ref(), snapshot.as_ref()) {
        GateDecision::Allow => {
            if let Some(principal) = principal {
                request.extensions_mut().insert(principal);
            }
            next.run(request).await
        }
        GateDecision::GraceWarn(notice) => {
            if let Some(principal) = principal {
                request.extensions_mut().insert(principal);
            }
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(WARNING_HEADER, HeaderValue::from_static(notice.code));
            if let Some(status) = notice
                .subscription_status
                .as_deref()
                .and_then(|s| HeaderValue::from_str(s).ok())
            {
                headers.insert(STATUS_HEADER, status);
            }
            response
        }
        GateDecision::Deny(notice) => {
            tracing::info!(code = notice.code, status = notice.status, "Request denied by subscription gate");
            deny_response(notice)
        }
    }
}

fn deny_response(notice: GateNotice) -> Response {
    let status = StatusCode::from_u16(notice.status).unwrap_or(StatusCode::FORBIDDEN);
    let body = json!({
        "error": notice.reason,
        "code": notice.code,
        "status": notice.status,
        "subscription_status": notice.subscription_status,
    });
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::Router;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use axum::routing::get;
    use std::collections::HashMap;
    use tower::ServiceExt;
    use uuid::Uuid;

    use hireport_common::error::AppError;
    use hireport_common::types::{SubscriptionSnapshot, SubscriptionStatus};

    use crate::middleware::auth::encode_jwt;

    const SECRET: &str = "gate-test-secret";

    struct Directory(HashMap<Uuid, &'static str>);

    #[async_trait]
    impl SubscriptionDirectory for Directory {
        async fn snapshot_for_user(
            &self,
            user_id: Uuid,
        ) -> Result<Option<SubscriptionSnapshot>, AppError> {
            Ok(self.0.get(&user_id).map(|status| SubscriptionSnapshot {
                status: SubscriptionStatus::parse(status),
                current_period_end: None,
            }))
        }
    }

    fn app(users: &[(Uuid, &'static str)]) -> Router {
        let gate = SubscriptionGate::new(
            SECRET,
            Arc::new(Directory(users.iter().copied().collect())),
        );
        Router::new()
            .route("/api/ping", get(|| async { "pong" }))
            .layer(axum::middleware::from_fn_with_state(gate, require_subscription))
    }

    fn request(user_id: Option<Uuid>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().uri("/api/ping");
        if let Some(user_id) = user_id {
            let token = encode_jwt(user_id, SECRET, 1).unwrap();
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_token_is_401() {
        let response = app(&[]).oneshot(request(None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["code"], "authentication_required");
        assert_eq!(body["error"], "authentication required");
    }

    #[tokio::test]
    async fn test_no_subscription_is_403() {
        let response = app(&[]).oneshot(request(Some(Uuid::new_v4()))).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["code"], "no_subscription");
    }

    #[tokio::test]
    async fn test_active_passes_through_without_warning() {
        let user = Uuid::new_v4();
        let response = app(&[(user, "active")]).oneshot(request(Some(user))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(WARNING_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_past_due_proceeds_with_warning_headers() {
        let user = Uuid::new_v4();
        let response = app(&[(user, "past_due")]).oneshot(request(Some(user))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(WARNING_HEADER).unwrap(),
            "payment_failed_grace_period"
        );
        assert_eq!(response.headers().get(STATUS_HEADER).unwrap(), "past_due");
    }

    #[tokio::test]
    async fn test_unpaid_is_402() {
        let user = Uuid::new_v4();
        let response = app(&[(user, "unpaid")]).oneshot(request(Some(user))).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let body = json_body(response).await;
        assert_eq!(body["code"], "payment_required");
        assert_eq!(body["subscription_status"], "unpaid");
    }

    #[tokio::test]
    async fn test_canceled_status_echoed() {
        let user = Uuid::new_v4();
        let response = app(&[(user, "canceled")]).oneshot(request(Some(user))).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = json_body(response).await;
        assert_eq!(body["error"], "canceled");
        assert_eq!(body["status"], 403);
    }
}
