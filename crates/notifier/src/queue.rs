//! Redis-backed job queue.
//!
//! Ready jobs sit in a list (`LPUSH`). A worker takes one with `BLMOVE` into
//! `{queue}:processing` and removes it from there with `ack` once handled, so
//! a job in flight when the worker dies is still in Redis; `recover_processing`
//! puts those back on the ready list at startup.
//!
//! Jobs released for a later retry sit in the sorted set `{queue}:delayed`,
//! scored by the unix time at which they become due, until `promote_due` moves
//! them back to the ready list.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Direction};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hireport_common::error::AppError;
use hireport_engine::executor::JobContext;

/// "Text the supplier about this supply job."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierSmsJob {
    pub supply_job_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum JobPayload {
    SupplierSms(SupplierSmsJob),
}

/// Envelope stored in Redis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: Uuid,
    /// Executions started so far.
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub payload: JobPayload,
}

impl QueuedJob {
    pub fn new(payload: JobPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            attempts: 0,
            enqueued_at: Utc::now(),
            payload,
        }
    }
}

#[derive(Clone)]
pub struct JobQueue {
    redis: ConnectionManager,
    name: String,
}

impl JobQueue {
    pub fn new(redis: ConnectionManager, name: impl Into<String>) -> Self {
        Self {
            redis,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn delayed_key(&self) -> String {
        format!("{}:delayed", self.name)
    }

    fn processing_key(&self) -> String {
        format!("{}:processing", self.name)
    }

    /// Enqueue a new job for immediate execution.
    pub async fn push(&self, payload: JobPayload) -> Result<QueuedJob, AppError> {
        let job = QueuedJob::new(payload);
        let encoded = serde_json::to_string(&job)?;

        let mut redis = self.redis.clone();
        redis.lpush::<_, _, ()>(&self.name, encoded).await?;

        tracing::info!(queue = %self.name, job_id = %job.id, "Job enqueued");
        Ok(job)
    }

    /// Park `job` until `delay` has elapsed.
    pub async fn schedule(&self, job: &QueuedJob, delay: Duration) -> Result<(), AppError> {
        let encoded = serde_json::to_string(job)?;
        let due = Utc::now().timestamp() + delay.as_secs() as i64;

        let mut redis = self.redis.clone();
        redis
            .zadd::<_, _, _, ()>(self.delayed_key(), encoded, due)
            .await?;

        tracing::debug!(queue = %self.name, job_id = %job.id, due, "Job scheduled for retry");
        Ok(())
    }

    /// Move every due delayed job onto the ready list. Returns how many moved.
    pub async fn promote_due(&self) -> Result<usize, AppError> {
        let mut redis = self.redis.clone();
        let now = Utc::now().timestamp();
        let due: Vec<String> = redis
            .zrangebyscore(self.delayed_key(), "-inf", now)
            .await?;

        let mut promoted = 0;
        for encoded in due {
            // Only the worker that removes the entry may push it
            let removed: i64 = redis.zrem(self.delayed_key(), &encoded).await?;
            if removed == 1 {
                redis.lpush::<_, _, ()>(&self.name, &encoded).await?;
                promoted += 1;
            }
        }

        if promoted > 0 {
            tracing::debug!(queue = %self.name, promoted, "Promoted due jobs");
        }
        Ok(promoted)
    }

    /// Block up to `timeout` for the next ready job.
    ///
    /// The entry stays in the processing list until `ack`. Returns the raw
    /// entry so that a malformed one can be logged and dropped.
    pub async fn pop(&self, timeout: Duration) -> Result<Option<String>, AppError> {
        let mut redis = self.redis.clone();
        let entry: Option<String> = redis
            .blmove(
                &self.name,
                self.processing_key(),
                Direction::Right,
                Direction::Left,
                timeout.as_secs_f64().max(1.0),
            )
            .await?;

        Ok(entry)
    }

    /// Forget a popped entry after it was handled (or released for retry).
    pub async fn ack(&self, raw: &str) -> Result<(), AppError> {
        let mut redis = self.redis.clone();
        redis
            .lrem::<_, _, ()>(self.processing_key(), 1, raw)
            .await?;
        Ok(())
    }

    /// Return entries left in processing by a stopped worker to the ready list.
    ///
    /// Only safe while no other worker consumes this queue.
    pub async fn recover_processing(&self) -> Result<usize, AppError> {
        let mut redis = self.redis.clone();
        let mut recovered = 0;

        loop {
            let moved: Option<String> = redis
                .lmove(
                    self.processing_key(),
                    &self.name,
                    Direction::Right,
                    Direction::Right,
                )
                .await?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }

        if recovered > 0 {
            tracing::warn!(queue = %self.name, recovered, "Requeued jobs left in processing");
        }
        Ok(recovered)
    }

    /// Entries popped but not yet acknowledged.
    pub async fn in_flight(&self) -> Result<usize, AppError> {
        let mut redis = self.redis.clone();
        let len: usize = redis.llen(self.processing_key()).await?;
        Ok(len)
    }
}

/// One execution of a queued job, as seen by the executor.
pub struct QueueJobContext {
    queue: JobQueue,
    job: QueuedJob,
}

impl QueueJobContext {
    /// Start the next execution of `job`.
    pub fn start(queue: JobQueue, mut job: QueuedJob) -> Self {
        job.attempts += 1;
        Self { queue, job }
    }

    pub fn job(&self) -> &QueuedJob {
        &self.job
    }
}

#[async_trait]
impl JobContext for QueueJobContext {
    fn attempts(&self) -> u32 {
        self.job.attempts
    }

    async fn release(&self, delay: Duration) -> anyhow::Result<()> {
        self.queue.schedule(&self.job, delay).await?;
        Ok(())
    }
}
