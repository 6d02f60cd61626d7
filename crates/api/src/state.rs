//! Shared application state for the Axum API server.

use std::sync::Arc;

use redis::aio::ConnectionManager;
use sqlx::PgPool;

use hireport_common::config::AppConfig;
use hireport_engine::dispatcher::NotificationDispatcher;
use hireport_engine::subscription::{PgSubscriptionDirectory, SubscriptionDirectory};
use hireport_engine::templates::PgTemplateStore;
use hireport_notifier::queue::JobQueue;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: AppConfig,
    pub templates: PgTemplateStore,
    pub subscriptions: Arc<dyn SubscriptionDirectory>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub queue: JobQueue,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        redis: ConnectionManager,
        config: AppConfig,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            templates: PgTemplateStore::new(pool.clone()),
            subscriptions: Arc::new(PgSubscriptionDirectory::new(pool.clone())),
            queue: JobQueue::new(redis, config.job_queue_name.clone()),
            dispatcher: Arc::new(dispatcher),
            pool,
            config,
        }
    }
}
