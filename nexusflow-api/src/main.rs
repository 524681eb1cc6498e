//! # NexusFlow API Server
//!
//! Serves the REST API and the chat WebSocket.
//!
//! ```bash
//! DATABASE_URL=postgres://... JWT_SECRET=... cargo run -p nexusflow-api
//! ```

use nexusflow_api::{
    app::{build_router, AppState},
    config::Config,
    middleware::rate_limit::RateLimiter,
};
use nexusflow_shared::{
    db::{
        migrations::run_migrations,
        pool::{self, DatabaseConfig},
    },
    redis::{RedisClient, RedisConfig, RedisRateLimiter},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "nexusflow_api=debug,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn rate_limiter(config: &Config) -> RateLimiter {
    let Some(url) = &config.redis_url else {
        return RateLimiter::local();
    };

    match RedisClient::new(RedisConfig::new(url.clone())).await {
        Ok(client) => {
            tracing::info!("Rate limits shared through Redis");
            RateLimiter::with_redis(RedisRateLimiter::new(client))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable, using in-process rate limits");
            RateLimiter::local()
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("NexusFlow API v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let db = pool::create_pool(DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        min_connections: config.database.max_connections.min(2),
        ..Default::default()
    })
    .await?;
    run_migrations(&db).await?;

    let limiter = rate_limiter(&config).await;
    let address = config.bind_address();
    let state = AppState::new(db.clone(), config, limiter);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(address = %address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool::close_pool(db).await;
    Ok(())
}
