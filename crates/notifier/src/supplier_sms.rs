//! "New supply job" SMS to the supplier, run under the dedup executor.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::json;
use sqlx::PgPool;
use tokio::sync::OnceCell;

use hireport_common::error::AppError;
use hireport_engine::dedup::DedupKey;
use hireport_engine::destination::resolve_phone;
use hireport_engine::dispatcher::{Content, NotificationDispatcher};
use hireport_engine::executor::{DestinationError, GuardedDelivery};
use hireport_engine::transport::{SmsSender, html_to_text};

use crate::queue::SupplierSmsJob;

pub const TEMPLATE_NAME: &str = "supplierJobSms";

/// Supplier contact details for one supply job.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SupplierContact {
    pub supply_job_id: i64,
    pub title: String,
    pub company_name: String,
    pub mobile_phone: Option<String>,
    pub company_phone: Option<String>,
}

#[async_trait]
pub trait SupplierDirectory: Send + Sync {
    async fn contact_for_job(&self, supply_job_id: i64)
    -> Result<Option<SupplierContact>, AppError>;
}

#[derive(Clone)]
pub struct PgSupplierDirectory {
    pool: PgPool,
}

impl PgSupplierDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SupplierDirectory for PgSupplierDirectory {
    async fn contact_for_job(
        &self,
        supply_job_id: i64,
    ) -> Result<Option<SupplierContact>, AppError> {
        let contact: Option<SupplierContact> = sqlx::query_as(
            r#"
            SELECT sj.id AS supply_job_id,
                   sj.title,
                   c.name AS company_name,
                   u.mobile_phone,
                   c.phone AS company_phone
            FROM supply_jobs sj
            JOIN companies c ON c.id = sj.supplier_company_id
            LEFT JOIN users u ON u.id = sj.supplier_user_id
            WHERE sj.id = $1
            "#,
        )
        .bind(supply_job_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(contact)
    }
}

struct PreparedSms {
    body: String,
}

/// One supplier-SMS delivery.
///
/// The destination is the supplier user's mobile, else the company phone.
/// The text comes from the `supplierJobSms` template (stored or fallback).
pub struct SupplierSmsDelivery<'a> {
    job: SupplierSmsJob,
    directory: &'a dyn SupplierDirectory,
    dispatcher: &'a NotificationDispatcher,
    sms: &'a dyn SmsSender,
    prepared: OnceCell<PreparedSms>,
}

impl<'a> SupplierSmsDelivery<'a> {
    pub fn new(
        job: SupplierSmsJob,
        directory: &'a dyn SupplierDirectory,
        dispatcher: &'a NotificationDispatcher,
        sms: &'a dyn SmsSender,
    ) -> Self {
        Self {
            job,
            directory,
            dispatcher,
            sms,
            prepared: OnceCell::new(),
        }
    }

    async fn message_body(&self, contact: &SupplierContact) -> Result<String, DestinationError> {
        let context: HashMap<String, serde_json::Value> = HashMap::from([
            ("job_id".to_string(), json!(contact.supply_job_id)),
            ("job_title".to_string(), json!(contact.title)),
            ("company_name".to_string(), json!(contact.company_name)),
        ]);

        match self.dispatcher.content(TEMPLATE_NAME, &context).await {
            Content::Ready { rendered, .. } => Ok(html_to_text(&rendered.body)),
            Content::Suppressed => Err(DestinationError::Unresolvable(format!(
                "template {} is disabled",
                TEMPLATE_NAME
            ))),
            Content::Unavailable(reason) => Err(DestinationError::Lookup(reason)),
        }
    }
}

#[async_trait]
impl GuardedDelivery for SupplierSmsDelivery<'_> {
    fn marker_key(&self) -> DedupKey {
        DedupKey::supplier_sms_sent(self.job.supply_job_id)
    }

    async fn resolve_destination(&self) -> Result<String, DestinationError> {
        let contact = self
            .directory
            .contact_for_job(self.job.supply_job_id)
            .await
            .map_err(|e| DestinationError::Lookup(e.to_string()))?
            .ok_or_else(|| {
                DestinationError::Unresolvable(format!(
                    "supply job {} not found",
                    self.job.supply_job_id
                ))
            })?;

        let phone = resolve_phone([
            contact.mobile_phone.as_deref(),
            contact.company_phone.as_deref(),
        ])?;

        let body = self.message_body(&contact).await?;
        // A retry builds a fresh delivery, so the cell is only ever set once here
        let _ = self.prepared.set(PreparedSms { body });

        Ok(phone)
    }

    async fn deliver(&self, destination: &str) -> Result<(), String> {
        let prepared = self
            .prepared
            .get()
            .ok_or_else(|| "message not prepared".to_string())?;

        let receipt = self.sms.send_sms(destination, &prepared.body).await;
        if receipt.success {
            Ok(())
        } else {
            Err(receipt
                .error
                .unwrap_or_else(|| format!("{} reported failure", self.sms.name())))
        }
    }

    fn failed(&self, error: &str) {
        tracing::error!(
            supply_job_id = self.job.supply_job_id,
            error = %error,
            "Supplier SMS failed permanently"
        );
    }
}
