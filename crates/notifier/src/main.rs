use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::watch;

use hireport_common::config::AppConfig;
use hireport_common::{db, redis_pool};
use hireport_engine::dedup::RedisDedupCache;
use hireport_engine::executor::DedupExecutor;
use hireport_notifier::queue::JobQueue;
use hireport_notifier::setup;
use hireport_notifier::sms::TextMagicClient;
use hireport_notifier::supplier_sms::PgSupplierDirectory;
use hireport_notifier::worker::{JobHandler, Worker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hireport_notifier=info,hireport_engine=info".into()),
        )
        .json()
        .init();

    tracing::info!("Hireport worker starting...");

    let config = AppConfig::from_env()?;

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::migrate(&pool).await?;

    let redis = redis_pool::create_redis_pool(&config.redis_url).await?;

    let Some(sms) = TextMagicClient::from_config(&config) else {
        anyhow::bail!("TEXTMAGIC_USERNAME and TEXTMAGIC_API_KEY must be set to run the worker");
    };

    let executor = DedupExecutor::new(
        Arc::new(RedisDedupCache::new(redis.clone())),
        config.retry_policy(),
        config.marker_ttl(),
    );
    let handler = JobHandler::new(
        executor,
        Arc::new(setup::email_dispatcher(pool.clone(), &config)?),
        Arc::new(PgSupplierDirectory::new(pool)),
        Arc::new(sms),
    );
    let worker = Worker::new(
        JobQueue::new(redis, config.job_queue_name.clone()),
        handler,
        Duration::from_secs(config.worker_poll_timeout_seconds),
    );

    // Stop between jobs on Ctrl+C or SIGTERM
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    if let Err(e) = worker.run(shutdown_rx).await {
        tracing::error!(error = %e, "Worker exited with error");
        return Err(e);
    }

    tracing::info!("Hireport worker stopped.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, finishing current job..."),
        _ = terminate => tracing::info!("Received SIGTERM, finishing current job..."),
    }
}
