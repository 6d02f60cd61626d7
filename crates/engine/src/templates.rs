//! Template resolution against database-backed notification templates.
//!
//! A template name resolves to one of three outcomes:
//! - `Resolved`: the row exists and is active; placeholders are substituted
//! - `Suppressed`: the row exists but an operator disabled it, nothing may be sent
//! - `NotFound`: no row; the caller falls back to the compiled-in template
//!
//! Substitution is plain `{{key}}` replacement. Placeholders without a value
//! are left in the output verbatim. Values are HTML-escaped in the body,
//! since bodies are HTML and context values come from user input.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use hireport_common::error::AppError;
use hireport_common::types::Template;

/// Placeholder name → value.
pub type TemplateContext = HashMap<String, Value>;

/// Subject and body ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTemplate {
    pub subject: String,
    pub body: String,
}

/// Outcome of resolving a template by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(RenderedTemplate),
    Suppressed,
    NotFound,
}

/// Read access to stored templates.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Single-row lookup by exact name.
    async fn find_by_name(&self, name: &str) -> Result<Option<Template>, AppError>;
}

/// Resolves template names against a `TemplateStore`.
pub struct TemplateResolver<S: ?Sized> {
    store: std::sync::Arc<S>,
}

impl<S: TemplateStore + ?Sized> TemplateResolver<S> {
    pub fn new(store: std::sync::Arc<S>) -> Self {
        Self { store }
    }

    /// Look up `name` and render it with `context`.
    ///
    /// Errors only when the store itself fails.
    pub async fn resolve(
        &self,
        name: &str,
        context: &TemplateContext,
    ) -> Result<Resolution, AppError> {
        let Some(template) = self.store.find_by_name(name).await? else {
            tracing::debug!(template = %name, "No stored template");
            return Ok(Resolution::NotFound);
        };

        if !template.is_active {
            return Ok(Resolution::Suppressed);
        }

        Ok(Resolution::Resolved(render(&template, context)))
    }
}

/// Substitute `context` into a stored template.
pub fn render(template: &Template, context: &TemplateContext) -> RenderedTemplate {
    RenderedTemplate {
        subject: substitute(&template.subject, context, false),
        body: substitute(&template.body, context, true),
    }
}

/// Replace `{{key}}` and `{{ key }}` with the context value for `key`.
///
/// One left-to-right pass over `text`; inserted values are never rescanned.
/// Unknown placeholders stay untouched.
pub fn substitute(text: &str, context: &TemplateContext, escape: bool) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            break;
        };
        result.push_str(&rest[..start]);

        let token = &rest[start..start + 2 + end + 2];
        match context.get(after[..end].trim()) {
            Some(value) => {
                let raw = value_to_string(value);
                if escape {
                    result.push_str(&handlebars::html_escape(&raw));
                } else {
                    result.push_str(&raw);
                }
            }
            None => result.push_str(token),
        }

        rest = &after[end + 2..];
    }

    result.push_str(rest);
    result
}

/// Placeholders that are still present after substitution.
pub fn unresolved_placeholders(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            break;
        };
        let name = after[..end].trim();
        if !name.is_empty() && !found.iter().any(|f| f == name) {
            found.push(name.to_string());
        }
        rest = &after[end + 2..];
    }

    found
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Fields for creating or replacing a template.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct UpsertTemplateParams {
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub variables: Vec<String>,
}

/// Postgres-backed template store.
#[derive(Clone)]
pub struct PgTemplateStore {
    pool: PgPool,
}

impl PgTemplateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All templates, ordered by name.
    pub async fn list(&self) -> Result<Vec<Template>, AppError> {
        let templates: Vec<Template> =
            sqlx::query_as("SELECT * FROM notification_templates ORDER BY name")
                .fetch_all(&self.pool)
                .await?;

        Ok(templates)
    }

    /// Insert a template or replace its content.
    ///
    /// `is_active` is set only on insert; an operator's toggle survives re-seeding.
    pub async fn upsert(
        &self,
        name: &str,
        params: &UpsertTemplateParams,
    ) -> Result<Template, AppError> {
        if name.trim().is_empty() {
            return Err(AppError::Validation("Template name must not be empty".to_string()));
        }

        let template: Template = sqlx::query_as(
            r#"
            INSERT INTO notification_templates (id, name, subject, body, variables, is_active)
            VALUES ($1, $2, $3, $4, $5, true)
            ON CONFLICT (name) DO UPDATE
            SET subject = EXCLUDED.subject,
                body = EXCLUDED.body,
                variables = EXCLUDED.variables,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(&params.subject)
        .bind(&params.body)
        .bind(&params.variables)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(template = %name, "Template upserted");

        Ok(template)
    }

    /// Enable or disable a template.
    pub async fn set_active(&self, name: &str, active: bool) -> Result<Template, AppError> {
        let template: Template = sqlx::query_as(
            r#"
            UPDATE notification_templates
            SET is_active = $1, updated_at = NOW()
            WHERE name = $2
            RETURNING *
            "#,
        )
        .bind(active)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Template {} not found", name)))?;

        tracing::info!(template = %name, active, "Template activation changed");

        Ok(template)
    }
}

#[async_trait]
impl TemplateStore for PgTemplateStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Template>, AppError> {
        let template: Option<Template> =
            sqlx::query_as("SELECT * FROM notification_templates WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        Ok(template)
    }
}
