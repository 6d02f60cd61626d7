//! Daily reminder emails: expiring trials and expiring listings.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;

use hireport_common::error::AppError;
use hireport_common::types::User;
use hireport_engine::dispatcher::{DispatchOutcome, NotificationDispatcher};
use hireport_engine::templates::TemplateContext;

pub const TRIAL_TEMPLATE: &str = "trialEndingReminder";
pub const LISTING_TEMPLATE: &str = "listingExpiringReminder";

/// One email to send.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub email: String,
    pub name: String,
    pub context: TemplateContext,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanOutSummary {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Send `template` to every recipient. A failed recipient does not stop the rest.
pub async fn fan_out(
    dispatcher: &NotificationDispatcher,
    template: &str,
    recipients: &[Recipient],
) -> FanOutSummary {
    let mut summary = FanOutSummary::default();

    for recipient in recipients {
        let outcome = dispatcher
            .send(template, &recipient.context, |email| {
                email.to(recipient.email.as_str(), recipient.name.as_str());
            })
            .await;

        match outcome {
            DispatchOutcome::Sent { .. } => summary.sent += 1,
            DispatchOutcome::Skipped { .. } => summary.skipped += 1,
            DispatchOutcome::Failed { .. } => summary.failed += 1,
        }
    }

    tracing::info!(
        template,
        sent = summary.sent,
        skipped = summary.skipped,
        failed = summary.failed,
        "Reminder fan-out finished"
    );
    summary
}

#[derive(Debug, sqlx::FromRow)]
struct TrialRow {
    #[sqlx(flatten)]
    user: User,
    company_name: String,
    trial_ends_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct ListingRow {
    #[sqlx(flatten)]
    user: User,
    listing_id: uuid::Uuid,
    listing_title: String,
    expires_at: DateTime<Utc>,
}

fn context(pairs: impl IntoIterator<Item = (&'static str, serde_json::Value)>) -> TemplateContext {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn lead_days(days: i64) -> Result<i32, AppError> {
    i32::try_from(days)
        .map_err(|_| AppError::Validation(format!("Reminder lead days out of range: {}", days)))
}

/// Users of companies whose trial ends `lead_days` from today.
pub async fn trial_reminder_recipients(
    pool: &PgPool,
    lead_days_ahead: i64,
    app_base_url: &str,
) -> Result<Vec<Recipient>, AppError> {
    let rows: Vec<TrialRow> = sqlx::query_as(
        r#"
        SELECT u.*, c.name AS company_name, cs.trial_ends_at
        FROM users u
        JOIN companies c ON c.id = u.company_id
        JOIN LATERAL (
            SELECT status, trial_ends_at
            FROM company_subscriptions
            WHERE company_id = u.company_id
            ORDER BY created_at DESC
            LIMIT 1
        ) cs ON TRUE
        WHERE cs.status = 'trialing'
          AND cs.trial_ends_at::date = (NOW() + make_interval(days => $1))::date
        ORDER BY u.email
        "#,
    )
    .bind(lead_days(lead_days_ahead)?)
    .fetch_all(pool)
    .await?;

    let billing_url = format!("{}/billing", app_base_url);

    Ok(rows
        .into_iter()
        .map(|row| {
            let name = row.user.display_name();
            Recipient {
                context: context([
                    ("name", json!(name)),
                    ("company", json!(row.company_name)),
                    ("trial_end_date", json!(row.trial_ends_at.format("%B %-d, %Y").to_string())),
                    ("billing_url", json!(billing_url)),
                ]),
                email: row.user.email,
                name,
            }
        })
        .collect())
}

/// Users of companies with a listing expiring `lead_days` from today.
pub async fn listing_reminder_recipients(
    pool: &PgPool,
    lead_days_ahead: i64,
    app_base_url: &str,
) -> Result<Vec<Recipient>, AppError> {
    let rows: Vec<ListingRow> = sqlx::query_as(
        r#"
        SELECT u.*, l.id AS listing_id, l.title AS listing_title, l.expires_at
        FROM listings l
        JOIN users u ON u.company_id = l.company_id
        WHERE l.expires_at::date = (NOW() + make_interval(days => $1))::date
        ORDER BY l.expires_at, u.email
        "#,
    )
    .bind(lead_days(lead_days_ahead)?)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let name = row.user.display_name();
            Recipient {
                context: context([
                    ("name", json!(name)),
                    ("listing_title", json!(row.listing_title)),
                    ("expires_on", json!(row.expires_at.format("%B %-d, %Y").to_string())),
                    (
                        "listing_url",
                        json!(format!("{}/listings/{}", app_base_url, row.listing_id)),
                    ),
                ]),
                email: row.user.email,
                name,
            }
        })
        .collect())
}
