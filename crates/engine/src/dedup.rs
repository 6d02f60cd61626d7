//! Dedup markers: cache entries proving a side effect already happened.
//!
//! A marker is written only after the guarded action succeeded, and expires on
//! its own after the configured TTL. Presence means "do not repeat".
//!
//! Check and write are two separate round trips. Two concurrent executions for
//! the same key can both see "absent" and both send; one duplicate SMS in that
//! window is accepted.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::time::Instant;

use hireport_common::error::AppError;

/// Cache key of a dedup marker, e.g. `supplier_sms_sent:42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn new(scope: &str, business_id: impl std::fmt::Display) -> Self {
        Self(format!("{}:{}", scope, business_id))
    }

    /// Marker for "SMS about supply job `job_id` already went to the supplier".
    pub fn supplier_sms_sent(job_id: i64) -> Self {
        Self::new("supplier_sms_sent", job_id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Marker storage.
#[async_trait]
pub trait DedupCache: Send + Sync {
    async fn has(&self, key: &DedupKey) -> Result<bool, AppError>;

    async fn put(&self, key: &DedupKey, ttl: Duration) -> Result<(), AppError>;
}

/// Redis-backed markers.
#[derive(Clone)]
pub struct RedisDedupCache {
    redis: ConnectionManager,
}

impl RedisDedupCache {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl DedupCache for RedisDedupCache {
    async fn has(&self, key: &DedupKey) -> Result<bool, AppError> {
        let mut redis = self.redis.clone();
        let exists: bool = redis.exists(key.as_str()).await?;
        Ok(exists)
    }

    async fn put(&self, key: &DedupKey, ttl: Duration) -> Result<(), AppError> {
        let mut redis = self.redis.clone();
        // SET key "1" EX ttl; a zero TTL would be rejected by Redis
        redis
            .set_ex::<_, _, ()>(key.as_str(), "1", ttl.as_secs().max(1))
            .await?;

        tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "Dedup marker written");
        Ok(())
    }
}

/// Process-local markers for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryDedupCache {
    entries: Mutex<HashMap<DedupKey, Instant>>,
}

impl MemoryDedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<DedupKey, Instant>>, AppError> {
        self.entries
            .lock()
            .map_err(|_| AppError::Internal("dedup cache lock poisoned".to_string()))
    }
}

#[async_trait]
impl DedupCache for MemoryDedupCache {
    async fn has(&self, key: &DedupKey) -> Result<bool, AppError> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some(expires_at) if *expires_at > Instant::now() => Ok(true),
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn put(&self, key: &DedupKey, ttl: Duration) -> Result<(), AppError> {
        self.lock()?.insert(key.clone(), Instant::now() + ttl);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supplier_sms_key_format() {
        assert_eq!(DedupKey::supplier_sms_sent(42).as_str(), "supplier_sms_sent:42");
        assert_eq!(DedupKey::new("offer_reminder", "abc").to_string(), "offer_reminder:abc");
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_marker_expires_after_ttl() {
        let cache = MemoryDedupCache::new();
        let key = DedupKey::supplier_sms_sent(7);

        assert!(!cache.has(&key).await.unwrap());
        cache.put(&key, Duration::from_secs(86_400)).await.unwrap();
        assert!(cache.has(&key).await.unwrap());

        tokio::time::advance(Duration::from_secs(86_399)).await;
        assert!(cache.has(&key).await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!cache.has(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_markers_are_per_key() {
        let cache = MemoryDedupCache::new();
        cache
            .put(&DedupKey::supplier_sms_sent(1), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(!cache.has(&DedupKey::supplier_sms_sent(2)).await.unwrap());
    }
}
