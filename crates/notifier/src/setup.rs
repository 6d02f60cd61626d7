//! Wiring shared by the binaries and the API server.

use std::sync::Arc;

use sqlx::PgPool;

use hireport_common::config::AppConfig;
use hireport_engine::dispatcher::{DefaultSender, NotificationDispatcher};
use hireport_engine::fallback::FallbackTemplates;
use hireport_engine::templates::PgTemplateStore;

use crate::smtp::SmtpMailer;

/// Email dispatcher over the Postgres template store and the SMTP mailer.
pub fn email_dispatcher(pool: PgPool, config: &AppConfig) -> anyhow::Result<NotificationDispatcher> {
    Ok(NotificationDispatcher::new(
        Arc::new(PgTemplateStore::new(pool)),
        FallbackTemplates::new()?,
        Arc::new(SmtpMailer::from_config(config)?),
        DefaultSender::from_config(config),
    ))
}
