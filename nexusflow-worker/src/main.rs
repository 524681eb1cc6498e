//! # NexusFlow Worker
//!
//! Delivers queued emails and cleans up expired verification codes.
//!
//! ```bash
//! DATABASE_URL=postgres://... MAILER=log cargo run -p nexusflow-worker
//! ```

use nexusflow_shared::db::pool::{self, DatabaseConfig};
use nexusflow_worker::{
    config::{MailerKind, WorkerConfig},
    mailer::{HttpMailer, LogMailer, Mailer},
    orchestrator::WorkerOrchestrator,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "nexusflow_worker=debug".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn build_mailer(kind: &MailerKind) -> anyhow::Result<Arc<dyn Mailer>> {
    Ok(match kind {
        MailerKind::Log => Arc::new(LogMailer),
        MailerKind::Http { url, token } => Arc::new(HttpMailer::new(url.clone(), token.clone())?),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("NexusFlow Worker v{} starting", env!("CARGO_PKG_VERSION"));

    let config = WorkerConfig::from_env()?;

    let db = pool::create_pool(DatabaseConfig {
        url: config.database_url.clone(),
        max_connections: config.max_connections,
        min_connections: config.max_connections.min(1),
        ..Default::default()
    })
    .await?;

    let mailer = build_mailer(&config.mailer)?;
    let orchestrator = WorkerOrchestrator::new(
        db.clone(),
        mailer,
        config.mail_from.clone(),
        config.orchestrator.clone(),
    );

    let shutdown = orchestrator.shutdown_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown signal received");
        shutdown.cancel();
    });

    orchestrator.run().await?;

    pool::close_pool(db).await;
    Ok(())
}
