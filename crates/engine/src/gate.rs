//! Subscription gate: per-request access decision from billing state.
//!
//! Evaluated in order, first match wins:
//!
//! | Condition                    | Decision                     |
//! |------------------------------|------------------------------|
//! | no authenticated principal   | Deny 401                     |
//! | principal, no subscription   | Deny 403                     |
//! | `active` / `trialing`        | Allow                        |
//! | `past_due`                   | GraceWarn 402 (proceeds)     |
//! | `unpaid`                     | Deny 402                     |
//! | anything else                | Deny 403, status echoed      |
//!
//! The caller loads a fresh snapshot for every request.

use serde::Serialize;

use hireport_common::types::{Principal, SubscriptionSnapshot, SubscriptionStatus};

/// Machine-readable part of a deny or warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateNotice {
    /// HTTP status code
    pub status: u16,
    /// Stable identifier for clients
    pub code: &'static str,
    /// Short human-readable reason
    pub reason: String,
    /// Processor status, when a subscription exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    GraceWarn(GateNotice),
    Deny(GateNotice),
}

impl GateDecision {
    /// Whether the request may reach business logic.
    pub fn permits(&self) -> bool {
        matches!(self, GateDecision::Allow | GateDecision::GraceWarn(_))
    }
}

pub fn decide(
    principal: Option<&Principal>,
    subscription: Option<&SubscriptionSnapshot>,
) -> GateDecision {
    if principal.is_none() {
        return GateDecision::Deny(GateNotice {
            status: 401,
            code: "authentication_required",
            reason: "authentication required".to_string(),
            subscription_status: None,
        });
    }

    let Some(subscription) = subscription else {
        return GateDecision::Deny(GateNotice {
            status: 403,
            code: "no_subscription",
            reason: "no subscription found".to_string(),
            subscription_status: None,
        });
    };

    let status = Some(subscription.status.to_string());

    match &subscription.status {
        SubscriptionStatus::Active | SubscriptionStatus::Trialing => GateDecision::Allow,
        SubscriptionStatus::PastDue => GateDecision::GraceWarn(GateNotice {
            status: 402,
            code: "payment_failed_grace_period",
            reason: "payment failed, grace period".to_string(),
            subscription_status: status,
        }),
        SubscriptionStatus::Unpaid => GateDecision::Deny(GateNotice {
            status: 402,
            code: "payment_required",
            reason: "payment required".to_string(),
            subscription_status: status,
        }),
        SubscriptionStatus::Other(raw) => GateDecision::Deny(GateNotice {
            status: 403,
            code: "subscription_inactive",
            reason: raw.clone(),
            subscription_status: status,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn principal() -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
        }
    }

    fn snapshot(status: &str) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            status: SubscriptionStatus::parse(status),
            current_period_end: None,
        }
    }

    fn status_of(decision: &GateDecision) -> Option<u16> {
        match decision {
            GateDecision::Allow => None,
            GateDecision::GraceWarn(n) | GateDecision::Deny(n) => Some(n.status),
        }
    }

    #[test]
    fn test_no_principal_is_401_even_with_subscription() {
        let decision = decide(None, Some(&snapshot("active")));
        assert!(matches!(decision, GateDecision::Deny(_)));
        assert_eq!(status_of(&decision), Some(401));
    }

    #[test]
    fn test_no_subscription_is_403() {
        let decision = decide(Some(&principal()), None);
        assert!(matches!(&decision, GateDecision::Deny(n) if n.code == "no_subscription"));
        assert_eq!(status_of(&decision), Some(403));
    }

    #[test]
    fn test_active_and_trialing_allowed() {
        let p = principal();
        assert_eq!(decide(Some(&p), Some(&snapshot("active"))), GateDecision::Allow);
        assert_eq!(decide(Some(&p), Some(&snapshot("trialing"))), GateDecision::Allow);
    }

    #[test]
    fn test_past_due_grace_warning() {
        let decision = decide(Some(&principal()), Some(&snapshot("past_due")));
        assert!(matches!(decision, GateDecision::GraceWarn(_)));
        assert_eq!(status_of(&decision), Some(402));
        assert!(decision.permits());
    }

    #[test]
    fn test_unpaid_denied_402() {
        let decision = decide(Some(&principal()), Some(&snapshot("unpaid")));
        assert!(matches!(&decision, GateDecision::Deny(n) if n.code == "payment_required"));
        assert_eq!(status_of(&decision), Some(402));
        assert!(!decision.permits());
    }

    #[test]
    fn test_other_status_echoed() {
        let decision = decide(Some(&principal()), Some(&snapshot("canceled")));
        match decision {
            GateDecision::Deny(notice) => {
                assert_eq!(notice.status, 403);
                assert_eq!(notice.reason, "canceled");
                assert_eq!(notice.subscription_status.as_deref(), Some("canceled"));
            }
            other => panic!("expected deny, got {:?}", other),
        }
    }

    #[test]
    fn test_notice_serialization_has_stable_fields() {
        let GateDecision::Deny(notice) = decide(None, None) else {
            panic!("expected deny");
        };
        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["status"], 401);
        assert_eq!(json["code"], "authentication_required");
        assert!(json.get("subscription_status").is_none());
    }
}
