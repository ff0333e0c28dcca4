use std::sync::Arc;

use anyhow::Context;
use shutdown_log::auth::LocalAuth;
use shutdown_log::clock::{Clock, SystemClock};
use shutdown_log::config::AppConfig;
use shutdown_log::logs::LogService;
use shutdown_log::server::{AppState, build_router};
use shutdown_log::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;

    eprintln!("Shutdown Log v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api/logs", config.port);
    eprintln!("   Session WS: ws://0.0.0.0:{}/ws/session", config.port);

    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let auth = Arc::new(LocalAuth::new(
        Arc::clone(&db),
        Arc::clone(&clock),
        config.session_ttl,
    ));
    if let Err(e) = auth.prune_expired().await {
        tracing::warn!(error = %e, "Expired session sweep failed");
    }

    let state = AppState {
        auth,
        logs: Arc::new(LogService::new(db, clock)),
    };
    let app = build_router(state, config.cors_origin.as_deref())?;

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Shutdown log server started");
    axum::serve(listener, app).await?;

    Ok(())
}
