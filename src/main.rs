use std::{sync::Arc, time::Duration};

use linkpulse::{config::AppConfig, db, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long shutdown waits for pending click writes.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (ignore error if file is absent, env vars may already be set)
    dotenvy::dotenv().ok();

    // Initialise structured logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linkpulse=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env()?;
    tracing::info!("Starting linkpulse on {}", config.bind_addr());
    tracing::info!("Base URL: {}", config.base_url);

    let pool = db::connect(&config).await?;

    // Run embedded migrations (files in migrations/)
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations applied");

    let bind_addr = config.bind_addr();
    let state = Arc::new(AppState::new(config, pool));
    state.urls.warm_cache().await?;
    let cache = state.urls.cache();
    if cache.is_empty() {
        tracing::info!("No stored URLs, starting with an empty cache");
    } else {
        tracing::debug!("Cache holds {} URL(s)", cache.len());
    }

    let app = linkpulse::app(state.clone());

    // ── Serve ──────────────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Redirects already answered still owe their click write.
    let pending = state.urls.clicks().pending();
    if pending > 0 {
        tracing::info!("Waiting for {} pending click write(s)", pending);
    }
    if tokio::time::timeout(DRAIN_TIMEOUT, state.urls.clicks().drain())
        .await
        .is_err()
    {
        tracing::error!(
            "Click writes still pending after {}s, exiting anyway",
            DRAIN_TIMEOUT.as_secs()
        );
    }

    tracing::info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::warn!("Failed to listen for Ctrl+C: {}. Shutting down", e),
    }
}
