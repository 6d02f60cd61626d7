//! Hireport API server binary entrypoint.

use std::net::SocketAddr;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use hireport_common::config::AppConfig;
use hireport_common::db::{create_pool, migrate};
use hireport_common::redis_pool::create_redis_pool;
use hireport_notifier::setup::email_dispatcher;

use hireport_api::routes::create_router;
use hireport_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("hireport_api=debug,hireport_engine=debug,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting Hireport API server...");

    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    migrate(&pool).await?;

    let redis = create_redis_pool(&config.redis_url).await?;

    let dispatcher = email_dispatcher(pool.clone(), &config)?;
    let port = config.api_port;
    let state = AppState::new(pool, redis, config, dispatcher);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
