//! Compiled-in fallback templates.
//!
//! Used when a template name has no row in `notification_templates`. Rendered
//! with Handlebars; bodies are HTML-escaped, subjects are not.

use handlebars::Handlebars;

use hireport_common::error::AppError;

use crate::templates::{RenderedTemplate, TemplateContext};

/// Raw source of a fallback template. Also used to seed the database.
#[derive(Debug, Clone, Copy)]
pub struct FallbackDefinition {
    pub name: &'static str,
    pub subject: &'static str,
    pub body: &'static str,
    pub variables: &'static [&'static str],
}

pub const DEFINITIONS: &[FallbackDefinition] = &[
    FallbackDefinition {
        name: "registrationSuccess",
        subject: "Welcome to Hireport, {{name}}",
        body: r#"<h1>Welcome aboard, {{name}}!</h1>
<p>Your account for {{company}} is ready. You can now list equipment, respond to rental requests and manage your fleet from the dashboard.</p>
<p><a href="{{dashboard_url}}">Open your dashboard</a></p>"#,
        variables: &["name", "company", "dashboard_url"],
    },
    FallbackDefinition {
        name: "passwordReset",
        subject: "Reset your Hireport password",
        body: r#"<p>Hi {{name}},</p>
<p>We received a request to reset your password. The link below is valid for {{expires_in}}.</p>
<p><a href="{{reset_url}}">Reset password</a></p>
<p>If you did not ask for this, you can ignore this email.</p>"#,
        variables: &["name", "reset_url", "expires_in"],
    },
    FallbackDefinition {
        name: "jobOfferReceived",
        subject: "New rental offer for {{job_title}}",
        body: r#"<p>Hi {{name}},</p>
<p>{{company}} sent an offer for <strong>{{job_title}}</strong>.</p>
<p><a href="{{offer_url}}">Review the offer</a></p>"#,
        variables: &["name", "company", "job_title", "offer_url"],
    },
    FallbackDefinition {
        name: "subscriptionPaymentFailed",
        subject: "Payment failed for your Hireport subscription",
        body: r#"<p>Hi {{name}},</p>
<p>We could not collect {{amount}} for your subscription. Your account stays available during a short grace period.</p>
<p><a href="{{billing_url}}">Update your payment method</a></p>"#,
        variables: &["name", "amount", "billing_url"],
    },
    FallbackDefinition {
        name: "trialEndingReminder",
        subject: "Your Hireport trial ends on {{trial_end_date}}",
        body: r#"<p>Hi {{name}},</p>
<p>The free trial for {{company}} ends on {{trial_end_date}}. Add a payment method to keep your listings online.</p>
<p><a href="{{billing_url}}">Choose a plan</a></p>"#,
        variables: &["name", "company", "trial_end_date", "billing_url"],
    },
    FallbackDefinition {
        name: "listingExpiringReminder",
        subject: "Your listing \"{{listing_title}}\" expires soon",
        body: r#"<p>Hi {{name}},</p>
<p>Your listing <strong>{{listing_title}}</strong> expires on {{expires_on}}.</p>
<p><a href="{{listing_url}}">Renew the listing</a></p>"#,
        variables: &["name", "listing_title", "expires_on", "listing_url"],
    },
    FallbackDefinition {
        name: "supplierJobSms",
        subject: "New supply job #{{job_id}}",
        body: "Hireport: new supply job #{{job_id}} \"{{job_title}}\" is waiting for your answer.",
        variables: &["job_id", "job_title"],
    },
];

/// Handlebars registry holding every fallback template.
pub struct FallbackTemplates {
    subjects: Handlebars<'static>,
    bodies: Handlebars<'static>,
}

impl FallbackTemplates {
    /// Compile all fallback definitions.
    pub fn new() -> Result<Self, AppError> {
        let mut subjects = Handlebars::new();
        subjects.register_escape_fn(handlebars::no_escape);
        let mut bodies = Handlebars::new();

        for def in DEFINITIONS {
            subjects
                .register_template_string(def.name, def.subject)
                .map_err(|e| {
                    AppError::Template(format!("Failed to register {} subject: {}", def.name, e))
                })?;
            bodies
                .register_template_string(def.name, def.body)
                .map_err(|e| {
                    AppError::Template(format!("Failed to register {} body: {}", def.name, e))
                })?;
        }

        Ok(Self { subjects, bodies })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bodies.has_template(name)
    }

    /// Render the fallback for `name`. `None` when no fallback exists.
    pub fn render(
        &self,
        name: &str,
        context: &TemplateContext,
    ) -> Option<Result<RenderedTemplate, AppError>> {
        if !self.contains(name) {
            return None;
        }

        let rendered = self
            .subjects
            .render(name, context)
            .and_then(|subject| {
                self.bodies
                    .render(name, context)
                    .map(|body| RenderedTemplate { subject, body })
            })
            .map_err(|e| AppError::Template(format!("Failed to render {}: {}", name, e)));

        Some(rendered)
    }

    pub fn definitions() -> &'static [FallbackDefinition] {
        DEFINITIONS
    }
}
