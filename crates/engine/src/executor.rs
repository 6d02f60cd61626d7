//! Deduplicated, retryable execution of a side-effecting delivery.
//!
//! Per business key:
//!
//! ```text
//! Pending ──marker present──────────────▶ AlreadySent
//!    │ ────destination unresolvable──────▶ NoDestination   (terminal, no retry)
//!    │ ────send ok──▶ write marker ──────▶ Sent
//!    │ ────send failed, attempts < max──▶ RetryScheduled   (job released with backoff)
//!    └─────send failed, attempts = max──▶ Failed           (terminal, no marker)
//! ```
//!
//! Retries are driven by the host job runner through `JobContext::release`;
//! this module holds no timers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use hireport_common::types::RetryPolicy;

use crate::dedup::{DedupCache, DedupKey};

/// The job runner's view of the current unit of work.
#[async_trait]
pub trait JobContext: Send + Sync {
    /// 1-based number of the current execution.
    fn attempts(&self) -> u32;

    /// Re-schedule this unit to run again after `delay`.
    async fn release(&self, delay: Duration) -> anyhow::Result<()>;
}

/// Why a destination could not be produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationError {
    /// No usable destination in the data. Retrying will not help.
    Unresolvable(String),
    /// Lookup failed for a transient reason; worth retrying.
    Lookup(String),
}

/// A side effect guarded by a dedup marker.
#[async_trait]
pub trait GuardedDelivery: Send + Sync {
    fn marker_key(&self) -> DedupKey;

    async fn resolve_destination(&self) -> Result<String, DestinationError>;

    async fn deliver(&self, destination: &str) -> Result<(), String>;

    /// Called once when the last attempt failed.
    fn failed(&self, error: &str) {
        tracing::error!(
            key = %self.marker_key(),
            error = %error,
            "Delivery failed permanently after exhausting retries"
        );
    }
}

/// Result of one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Sent,
    AlreadySent,
    NoDestination { reason: String },
    RetryScheduled { attempt: u32, delay_secs: u64 },
    Failed { attempts: u32, error: String },
}

/// Runs `GuardedDelivery` units under a retry policy and dedup markers.
pub struct DedupExecutor {
    cache: Arc<dyn DedupCache>,
    policy: RetryPolicy,
    marker_ttl: Duration,
}

impl DedupExecutor {
    pub fn new(cache: Arc<dyn DedupCache>, policy: RetryPolicy, marker_ttl: Duration) -> Self {
        Self {
            cache,
            policy,
            marker_ttl,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn execute<U>(&self, job: &dyn JobContext, unit: &U) -> ExecutionOutcome
    where
        U: GuardedDelivery + ?Sized,
    {
        let key = unit.marker_key();
        let attempt = job.attempts();

        match self.cache.has(&key).await {
            Ok(true) => {
                tracing::info!(key = %key, "Already delivered, skipping");
                return ExecutionOutcome::AlreadySent;
            }
            Ok(false) => {}
            Err(e) => {
                // Without the marker we cannot rule out a duplicate; treat as transient.
                return self
                    .on_failure(job, unit, &key, attempt, format!("dedup check failed: {}", e))
                    .await;
            }
        }

        let destination = match unit.resolve_destination().await {
            Ok(destination) => destination,
            Err(DestinationError::Unresolvable(reason)) => {
                tracing::warn!(key = %key, reason = %reason, "No usable destination, not retrying");
                return ExecutionOutcome::NoDestination { reason };
            }
            Err(DestinationError::Lookup(error)) => {
                return self
                    .on_failure(job, unit, &key, attempt, format!("destination lookup failed: {}", error))
                    .await;
            }
        };

        if let Err(error) = unit.deliver(&destination).await {
            return self.on_failure(job, unit, &key, attempt, error).await;
        }

        if let Err(e) = self.cache.put(&key, self.marker_ttl).await {
            // The send happened; a missing marker only risks a later duplicate.
            tracing::error!(key = %key, error = %e, "Delivered but failed to write dedup marker");
        }

        tracing::info!(key = %key, attempt, "Delivered");
        ExecutionOutcome::Sent
    }

    async fn on_failure<U>(
        &self,
        job: &dyn JobContext,
        unit: &U,
        key: &DedupKey,
        attempt: u32,
        error: String,
    ) -> ExecutionOutcome
    where
        U: GuardedDelivery + ?Sized,
    {
        if attempt < self.policy.max_attempts {
            match job.release(self.policy.backoff).await {
                Ok(()) => {
                    tracing::warn!(
                        key = %key,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_secs = self.policy.backoff.as_secs(),
                        error = %error,
                        "Delivery failed, retry scheduled"
                    );
                    return ExecutionOutcome::RetryScheduled {
                        attempt,
                        delay_secs: self.policy.backoff.as_secs(),
                    };
                }
                Err(e) => {
                    tracing::error!(key = %key, error = %e, "Could not re-schedule failed delivery");
                }
            }
        }

        unit.failed(&error);
        ExecutionOutcome::Failed {
            attempts: attempt,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::MemoryDedupCache;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    /// Job context that records releases; the test loop plays the job runner.
    struct FakeJob {
        attempts: AtomicU32,
        releases: Mutex<Vec<Duration>>,
        fail_release: bool,
    }

    impl FakeJob {
        fn new() -> Self {
            Self {
                attempts: AtomicU32::new(1),
                releases: Mutex::new(Vec::new()),
                fail_release: false,
            }
        }

        fn next_attempt(&self) {
            self.attempts.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl JobContext for FakeJob {
        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }

        async fn release(&self, delay: Duration) -> anyhow::Result<()> {
            if self.fail_release {
                anyhow::bail!("queue unavailable");
            }
            self.releases.lock().unwrap().push(delay);
            Ok(())
        }
    }

    struct FakeSms {
        job_id: i64,
        destination: Result<String, DestinationError>,
        fail_sends: bool,
        sends: AtomicUsize,
        failed_hooks: AtomicUsize,
    }

    impl FakeSms {
        fn new(job_id: i64) -> Self {
            Self {
                job_id,
                destination: Ok("+15551234567".to_string()),
                fail_sends: false,
                sends: AtomicUsize::new(0),
                failed_hooks: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GuardedDelivery for FakeSms {
        fn marker_key(&self) -> DedupKey {
            DedupKey::supplier_sms_sent(self.job_id)
        }

        async fn resolve_destination(&self) -> Result<String, DestinationError> {
            self.destination.clone()
        }

        async fn deliver(&self, _destination: &str) -> Result<(), String> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.fail_sends {
                return Err("gateway timeout".to_string());
            }
            Ok(())
        }

        fn failed(&self, _error: &str) {
            self.failed_hooks.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn executor(cache: Arc<MemoryDedupCache>) -> DedupExecutor {
        DedupExecutor::new(
            cache,
            RetryPolicy {
                max_attempts: 3,
                backoff: Duration::from_secs(60),
            },
            Duration::from_secs(86_400),
        )
    }

    #[tokio::test]
    async fn test_second_execution_short_circuits() {
        let cache = Arc::new(MemoryDedupCache::new());
        let exec = executor(cache.clone());
        let sms = FakeSms::new(42);

        assert_eq!(exec.execute(&FakeJob::new(), &sms).await, ExecutionOutcome::Sent);
        assert!(cache.has(&DedupKey::supplier_sms_sent(42)).await.unwrap());

        assert_eq!(
            exec.execute(&FakeJob::new(), &sms).await,
            ExecutionOutcome::AlreadySent
        );
        assert_eq!(sms.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_marker_expiry_allows_resend() {
        let cache = Arc::new(MemoryDedupCache::new());
        let exec = executor(cache);
        let sms = FakeSms::new(42);

        assert_eq!(exec.execute(&FakeJob::new(), &sms).await, ExecutionOutcome::Sent);
        tokio::time::advance(Duration::from_secs(86_401)).await;
        assert_eq!(exec.execute(&FakeJob::new(), &sms).await, ExecutionOutcome::Sent);
        assert_eq!(sms.sends.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_destination_is_terminal() {
        let cache = Arc::new(MemoryDedupCache::new());
        let exec = executor(cache.clone());
        let mut sms = FakeSms::new(5);
        sms.destination = Err(DestinationError::Unresolvable("invalid phone".to_string()));
        let job = FakeJob::new();

        let outcome = exec.execute(&job, &sms).await;

        assert_eq!(
            outcome,
            ExecutionOutcome::NoDestination {
                reason: "invalid phone".to_string()
            }
        );
        assert!(job.releases.lock().unwrap().is_empty());
        assert_eq!(sms.sends.load(Ordering::SeqCst), 0);
        assert!(!cache.has(&DedupKey::supplier_sms_sent(5)).await.unwrap());
    }

    #[tokio::test]
    async fn test_retry_bound_and_no_marker_after_exhaustion() {
        let cache = Arc::new(MemoryDedupCache::new());
        let exec = executor(cache.clone());
        let mut sms = FakeSms::new(9);
        sms.fail_sends = true;
        let job = FakeJob::new();

        let mut outcomes = Vec::new();
        loop {
            let outcome = exec.execute(&job, &sms).await;
            let retry = matches!(outcome, ExecutionOutcome::RetryScheduled { .. });
            outcomes.push(outcome);
            if !retry {
                break;
            }
            job.next_attempt();
        }

        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            outcomes[0],
            ExecutionOutcome::RetryScheduled {
                attempt: 1,
                delay_secs: 60
            }
        );
        assert!(matches!(
            outcomes[2],
            ExecutionOutcome::Failed { attempts: 3, .. }
        ));
        assert_eq!(sms.sends.load(Ordering::SeqCst), 3);
        assert_eq!(sms.failed_hooks.load(Ordering::SeqCst), 1);
        assert_eq!(job.releases.lock().unwrap().len(), 2);
        assert!(!cache.has(&DedupKey::supplier_sms_sent(9)).await.unwrap());
    }

    #[tokio::test]
    async fn test_transient_lookup_failure_is_retried() {
        let exec = executor(Arc::new(MemoryDedupCache::new()));
        let mut sms = FakeSms::new(3);
        sms.destination = Err(DestinationError::Lookup("db timeout".to_string()));
        let job = FakeJob::new();

        let outcome = exec.execute(&job, &sms).await;

        assert!(matches!(outcome, ExecutionOutcome::RetryScheduled { attempt: 1, .. }));
        assert_eq!(sms.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_release_failure_becomes_terminal() {
        let exec = executor(Arc::new(MemoryDedupCache::new()));
        let mut sms = FakeSms::new(11);
        sms.fail_sends = true;
        let mut job = FakeJob::new();
        job.fail_release = true;

        let outcome = exec.execute(&job, &sms).await;

        assert!(matches!(outcome, ExecutionOutcome::Failed { attempts: 1, .. }));
        assert_eq!(sms.failed_hooks.load(Ordering::SeqCst), 1);
    }
}
