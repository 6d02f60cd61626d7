//! Notification dispatcher: template lookup, static fallback, one send.
//!
//! For each `send` call:
//! 1. Resolve the template from the store
//! 2. Disabled template → `Skipped`, no transport call
//! 3. Active template → build the message and send it once
//! 4. No stored template (or the store failed) → render the compiled-in
//!    fallback of the same name and send that once
//!
//! Transport failures are logged and reported as `Failed`; callers get a
//! status, never an error.

use std::sync::Arc;

use serde::Serialize;

use hireport_common::config::AppConfig;

use crate::fallback::FallbackTemplates;
use crate::templates::{RenderedTemplate, Resolution, TemplateContext, TemplateResolver, TemplateStore};
use crate::transport::{Mailer, OutgoingEmail, html_to_text};

/// Where the content of a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateSource {
    Database,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The stored template is disabled.
    Disabled,
}

/// Result of one `send` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Sent {
        source: TemplateSource,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        source: Option<TemplateSource>,
        reason: String,
    },
}

impl DispatchOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, DispatchOutcome::Sent { .. })
    }
}

/// Rendered content for a template name, before any transport is involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Ready {
        source: TemplateSource,
        rendered: RenderedTemplate,
    },
    Suppressed,
    Unavailable(String),
}

/// Sender used when the recipient callback does not override it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultSender {
    pub address: String,
    pub name: String,
}

impl DefaultSender {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            address: config.mail_from_address.clone(),
            name: config.mail_from_name.clone(),
        }
    }
}

/// Delivers templated email through a `Mailer`.
pub struct NotificationDispatcher {
    resolver: TemplateResolver<dyn TemplateStore>,
    fallbacks: FallbackTemplates,
    mailer: Arc<dyn Mailer>,
    sender: DefaultSender,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn TemplateStore>,
        fallbacks: FallbackTemplates,
        mailer: Arc<dyn Mailer>,
        sender: DefaultSender,
    ) -> Self {
        Self {
            resolver: TemplateResolver::new(store),
            fallbacks,
            mailer,
            sender,
        }
    }

    /// Resolve `template_name` to content, falling back to the compiled-in
    /// template when no stored one exists or the store cannot be read.
    pub async fn content(&self, template_name: &str, context: &TemplateContext) -> Content {
        match self.resolver.resolve(template_name, context).await {
            Ok(Resolution::Resolved(rendered)) => Content::Ready {
                source: TemplateSource::Database,
                rendered,
            },
            Ok(Resolution::Suppressed) => Content::Suppressed,
            Ok(Resolution::NotFound) => self.fallback_content(template_name, context),
            Err(e) => {
                tracing::warn!(
                    template = %template_name,
                    error = %e,
                    "Template lookup failed, using fallback"
                );
                self.fallback_content(template_name, context)
            }
        }
    }

    fn fallback_content(&self, template_name: &str, context: &TemplateContext) -> Content {
        match self.fallbacks.render(template_name, context) {
            Some(Ok(rendered)) => Content::Ready {
                source: TemplateSource::Fallback,
                rendered,
            },
            Some(Err(e)) => Content::Unavailable(e.to_string()),
            None => Content::Unavailable(format!("No template named {}", template_name)),
        }
    }

    /// Render `template_name` and send it to whoever `recipient` configures.
    ///
    /// `recipient` receives a message pre-filled with the default sender,
    /// subject and bodies; it must at least set the destination address.
    pub async fn send<F>(
        &self,
        template_name: &str,
        context: &TemplateContext,
        recipient: F,
    ) -> DispatchOutcome
    where
        F: FnOnce(&mut OutgoingEmail),
    {
        let (source, rendered) = match self.content(template_name, context).await {
            Content::Ready { source, rendered } => (source, rendered),
            Content::Suppressed => {
                tracing::info!(
                    template = %template_name,
                    reason = "disabled",
                    "Template disabled, email not sent"
                );
                return DispatchOutcome::Skipped {
                    reason: SkipReason::Disabled,
                };
            }
            Content::Unavailable(reason) => {
                tracing::error!(template = %template_name, reason = %reason, "No usable template");
                return DispatchOutcome::Failed {
                    source: None,
                    reason,
                };
            }
        };

        let mut email = OutgoingEmail {
            from: self.sender.address.clone(),
            from_name: self.sender.name.clone(),
            subject: rendered.subject,
            text_body: html_to_text(&rendered.body),
            html_body: rendered.body,
            ..OutgoingEmail::default()
        };
        recipient(&mut email);

        if email.to.trim().is_empty() {
            tracing::error!(template = %template_name, "Recipient callback set no address");
            return DispatchOutcome::Failed {
                source: Some(source),
                reason: "No recipient address".to_string(),
            };
        }

        match self.mailer.send_email(&email).await {
            Ok(()) => {
                tracing::info!(
                    template = %template_name,
                    source = ?source,
                    transport = self.mailer.name(),
                    "Email sent"
                );
                DispatchOutcome::Sent { source }
            }
            Err(e) => {
                tracing::error!(
                    template = %template_name,
                    source = ?source,
                    transport = self.mailer.name(),
                    error = %e,
                    "Email delivery failed"
                );
                DispatchOutcome::Failed {
                    source: Some(source),
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::templates::tests::{MemoryStore, context, template};
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct RecordingMailer {
        pub sent: Mutex<Vec<OutgoingEmail>>,
        pub fail: bool,
    }

    impl RecordingMailer {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn calls(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send_email(&self, email: &OutgoingEmail) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(email.clone());
            if self.fail {
                return Err(TransportError::Unavailable("smtp down".to_string()));
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn sender() -> DefaultSender {
        DefaultSender {
            address: "noreply@hireport.test".to_string(),
            name: "Hireport".to_string(),
        }
    }

    pub(crate) fn dispatcher(
        store: MemoryStore,
        mailer: Arc<RecordingMailer>,
    ) -> NotificationDispatcher {
        NotificationDispatcher::new(
            Arc::new(store),
            FallbackTemplates::new().unwrap(),
            mailer,
            sender(),
        )
    }

    fn to_alice(email: &mut OutgoingEmail) {
        email.to("alice@acme.test", "Alice");
    }

    #[tokio::test]
    async fn test_disabled_template_skips_without_transport_call() {
        let mailer = Arc::new(RecordingMailer::default());
        let store = MemoryStore::with(vec![template("registrationSuccess", "s", "b", false)]);
        let d = dispatcher(store, mailer.clone());

        let outcome = d.send("registrationSuccess", &TemplateContext::new(), to_alice).await;

        assert_eq!(
            outcome,
            DispatchOutcome::Skipped {
                reason: SkipReason::Disabled
            }
        );
        assert_eq!(mailer.calls(), 0);
    }

    #[tokio::test]
    async fn test_stored_template_substitutes_context() {
        let mailer = Arc::new(RecordingMailer::default());
        let store = MemoryStore::with(vec![template(
            "registrationSuccess",
            "Hi {{name}}",
            "<p>Welcome {{name}}</p>",
            true,
        )]);
        let d = dispatcher(store, mailer.clone());

        let outcome = d
            .send("registrationSuccess", &context(json!({"name": "Alice"})), to_alice)
            .await;

        assert_eq!(
            outcome,
            DispatchOutcome::Sent {
                source: TemplateSource::Database
            }
        );
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Hi Alice");
        assert!(sent[0].html_body.contains("Alice"));
        assert!(!sent[0].html_body.contains("{{name}}"));
        assert_eq!(sent[0].text_body, "Welcome Alice");
        assert_eq!(sent[0].from, "noreply@hireport.test");
        assert_eq!(sent[0].to, "alice@acme.test");
    }

    #[tokio::test]
    async fn test_missing_template_uses_fallback_once() {
        let mailer = Arc::new(RecordingMailer::default());
        let d = dispatcher(MemoryStore::default(), mailer.clone());

        let outcome = d
            .send("registrationSuccess", &context(json!({"name": "Alice"})), to_alice)
            .await;

        assert_eq!(
            outcome,
            DispatchOutcome::Sent {
                source: TemplateSource::Fallback
            }
        );
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Welcome to Hireport, Alice");
    }

    #[tokio::test]
    async fn test_stored_template_transport_failure_does_not_fall_back() {
        let mailer = Arc::new(RecordingMailer::failing());
        let store = MemoryStore::with(vec![template("registrationSuccess", "s", "b", true)]);
        let d = dispatcher(store, mailer.clone());

        let outcome = d.send("registrationSuccess", &TemplateContext::new(), to_alice).await;

        assert!(matches!(
            outcome,
            DispatchOutcome::Failed {
                source: Some(TemplateSource::Database),
                ..
            }
        ));
        assert_eq!(mailer.calls(), 1);
    }

    #[tokio::test]
    async fn test_fallback_transport_failure_reported() {
        let mailer = Arc::new(RecordingMailer::failing());
        let d = dispatcher(MemoryStore::default(), mailer.clone());

        let outcome = d.send("passwordReset", &TemplateContext::new(), to_alice).await;

        assert!(matches!(
            outcome,
            DispatchOutcome::Failed {
                source: Some(TemplateSource::Fallback),
                ..
            }
        ));
        assert_eq!(mailer.calls(), 1);
    }

    #[tokio::test]
    async fn test_store_error_uses_fallback() {
        let mailer = Arc::new(RecordingMailer::default());
        let d = dispatcher(MemoryStore::failing(), mailer.clone());

        let outcome = d.send("passwordReset", &TemplateContext::new(), to_alice).await;

        assert_eq!(
            outcome,
            DispatchOutcome::Sent {
                source: TemplateSource::Fallback
            }
        );
        assert_eq!(mailer.calls(), 1);
    }

    #[tokio::test]
    async fn test_no_stored_and_no_fallback_fails_without_transport_call() {
        let mailer = Arc::new(RecordingMailer::default());
        let d = dispatcher(MemoryStore::default(), mailer.clone());

        let outcome = d.send("unknownTemplate", &TemplateContext::new(), to_alice).await;

        assert!(matches!(outcome, DispatchOutcome::Failed { source: None, .. }));
        assert_eq!(mailer.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_recipient_fails_without_transport_call() {
        let mailer = Arc::new(RecordingMailer::default());
        let d = dispatcher(MemoryStore::default(), mailer.clone());

        let outcome = d
            .send("passwordReset", &TemplateContext::new(), |_email| {})
            .await;

        assert!(matches!(outcome, DispatchOutcome::Failed { .. }));
        assert_eq!(mailer.calls(), 0);
    }

    #[tokio::test]
    async fn test_recipient_callback_overrides_sender() {
        let mailer = Arc::new(RecordingMailer::default());
        let d = dispatcher(MemoryStore::default(), mailer.clone());

        d.send("passwordReset", &TemplateContext::new(), |email| {
            email
                .to("bob@acme.test", "Bob")
                .from("billing@hireport.test", "Billing")
                .reply_to("support@hireport.test");
        })
        .await;

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent[0].from, "billing@hireport.test");
        assert_eq!(sent[0].from_name, "Billing");
        assert_eq!(sent[0].reply_to.as_deref(), Some("support@hireport.test"));
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(DispatchOutcome::Sent {
            source: TemplateSource::Fallback,
        })
        .unwrap();
        assert_eq!(json, json!({"outcome": "sent", "source": "fallback"}));
    }
}
