//! Queue worker: pops jobs and runs them through the dedup executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use hireport_common::error::AppError;
use hireport_engine::dispatcher::NotificationDispatcher;
use hireport_engine::executor::{DedupExecutor, ExecutionOutcome, JobContext};
use hireport_engine::transport::SmsSender;

use crate::queue::{JobPayload, JobQueue, QueueJobContext, QueuedJob};
use crate::supplier_sms::{SupplierDirectory, SupplierSmsDelivery};

/// Runs one payload against its delivery unit.
pub struct JobHandler {
    executor: DedupExecutor,
    dispatcher: Arc<NotificationDispatcher>,
    suppliers: Arc<dyn SupplierDirectory>,
    sms: Arc<dyn SmsSender>,
}

impl JobHandler {
    pub fn new(
        executor: DedupExecutor,
        dispatcher: Arc<NotificationDispatcher>,
        suppliers: Arc<dyn SupplierDirectory>,
        sms: Arc<dyn SmsSender>,
    ) -> Self {
        Self {
            executor,
            dispatcher,
            suppliers,
            sms,
        }
    }

    pub async fn handle(&self, job: &dyn JobContext, payload: &JobPayload) -> ExecutionOutcome {
        match payload {
            JobPayload::SupplierSms(sms_job) => {
                let delivery = SupplierSmsDelivery::new(
                    sms_job.clone(),
                    self.suppliers.as_ref(),
                    self.dispatcher.as_ref(),
                    self.sms.as_ref(),
                );
                self.executor.execute(job, &delivery).await
            }
        }
    }
}

pub struct Worker {
    queue: JobQueue,
    handler: JobHandler,
    poll_timeout: Duration,
}

impl Worker {
    pub fn new(queue: JobQueue, handler: JobHandler, poll_timeout: Duration) -> Self {
        Self {
            queue,
            handler,
            poll_timeout,
        }
    }

    /// Process jobs until `shutdown` flips to `true`.
    ///
    /// The signal is checked between jobs; a job that has been popped always
    /// runs to completion and is acknowledged before the loop exits.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        self.queue.recover_processing().await?;

        tracing::info!(
            queue = %self.queue.name(),
            poll_timeout_secs = self.poll_timeout.as_secs(),
            "Worker started"
        );

        loop {
            if *shutdown.borrow() {
                tracing::info!("Received shutdown signal, stopping worker");
                break;
            }

            if let Err(e) = self.tick().await {
                tracing::error!(error = %e, "Worker iteration failed, backing off");
                tokio::select! {
                    _ = shutdown.changed() => {}
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
            }
        }

        tracing::info!(queue = %self.queue.name(), "Worker stopped");
        Ok(())
    }

    async fn tick(&self) -> Result<(), AppError> {
        self.queue.promote_due().await?;

        let Some(raw) = self.queue.pop(self.poll_timeout).await? else {
            return Ok(());
        };

        let job: QueuedJob = match serde_json::from_str(&raw) {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!(error = %e, raw = %raw, "Dropping malformed job");
                return self.queue.ack(&raw).await;
            }
        };

        let context = QueueJobContext::start(self.queue.clone(), job);
        let outcome = self
            .handler
            .handle(&context, &context.job().payload)
            .await;

        tracing::info!(
            job_id = %context.job().id,
            attempt = context.job().attempts,
            outcome = ?outcome,
            "Job processed"
        );

        // A retry was already parked on the delayed set by release()
        self.queue.ack(&raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::SupplierSmsJob;
    use crate::supplier_sms::tests::{RecordingSms, StaticSuppliers, contact, dispatcher};
    use async_trait::async_trait;
    use hireport_common::types::RetryPolicy;
    use hireport_engine::dedup::MemoryDedupCache;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Attempt(AtomicU32);

    #[async_trait]
    impl JobContext for Attempt {
        fn attempts(&self) -> u32 {
            self.0.load(Ordering::SeqCst)
        }

        async fn release(&self, _delay: Duration) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn handler(sms: Arc<RecordingSms>) -> JobHandler {
        JobHandler::new(
            DedupExecutor::new(
                Arc::new(MemoryDedupCache::new()),
                RetryPolicy::default(),
                Duration::from_secs(86_400),
            ),
            Arc::new(dispatcher()),
            Arc::new(StaticSuppliers {
                contacts: vec![contact(42, Some("+15551234567"), None)],
            }),
            sms,
        )
    }

    #[tokio::test]
    async fn test_duplicate_jobs_send_once() {
        let sms = Arc::new(RecordingSms::default());
        let handler = handler(sms.clone());
        let payload = JobPayload::SupplierSms(SupplierSmsJob { supply_job_id: 42 });

        let first = handler.handle(&Attempt(AtomicU32::new(1)), &payload).await;
        let second = handler.handle(&Attempt(AtomicU32::new(1)), &payload).await;

        assert_eq!(first, ExecutionOutcome::Sent);
        assert_eq!(second, ExecutionOutcome::AlreadySent);
        assert_eq!(sms.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    #[ignore] // requires Redis
    async fn test_worker_acks_handled_job_and_stops_on_signal() {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let redis = hireport_common::redis_pool::create_redis_pool(&url)
            .await
            .unwrap();
        let queue = JobQueue::new(redis, format!("hireport:test:{}", uuid::Uuid::new_v4()));
        queue
            .push(JobPayload::SupplierSms(SupplierSmsJob { supply_job_id: 42 }))
            .await
            .unwrap();

        let sms = Arc::new(RecordingSms::default());
        let worker = Worker::new(queue.clone(), handler(sms.clone()), Duration::from_secs(1));

        worker.tick().await.unwrap();
        assert_eq!(sms.sent.lock().unwrap().len(), 1);
        assert_eq!(queue.in_flight().await.unwrap(), 0);

        let (shutdown_tx, shutdown_rx) = watch::channel(true);
        worker.run(shutdown_rx).await.unwrap();
        drop(shutdown_tx);
    }

    #[tokio::test]
    async fn test_unknown_supply_job_is_terminal() {
        let sms = Arc::new(RecordingSms::default());
        let handler = handler(sms.clone());
        let payload = JobPayload::SupplierSms(SupplierSmsJob { supply_job_id: 404 });

        let outcome = handler.handle(&Attempt(AtomicU32::new(1)), &payload).await;

        assert!(matches!(outcome, ExecutionOutcome::NoDestination { .. }));
        assert!(sms.sent.lock().unwrap().is_empty());
    }
}
