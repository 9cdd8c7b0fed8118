use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use combat_analyzer::cli::{self, Cli};
use combat_analyzer::config::Config;
use combat_analyzer::db::AuthToken;
use combat_analyzer::startup::run_startup_checks;
use combat_analyzer::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Client and maintenance commands don't start the server
    if cli.command.is_some() {
        return cli::run_command(&cli).await;
    }

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Combat Analyzer v{}", env!("CARGO_PKG_VERSION"));

    // Ensure data and upload directories exist
    for dir in [&config.server.data_dir, &config.uploads.dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    // Initialize database
    let db = combat_analyzer::db::init(&config.database_path()).await?;

    if cli.skip_checks {
        tracing::warn!("Skipping startup self-checks");
    } else {
        let report = run_startup_checks(&config, &db).await;
        if !report.all_critical_passed {
            anyhow::bail!("Startup checks failed: {}", report.summary);
        }
    }

    let purged = AuthToken::purge_expired(&db).await?;
    if purged > 0 {
        tracing::info!(purged, "Removed expired auth tokens");
    }

    let state = Arc::new(AppState::new(config.clone(), db));

    // Create API router
    let api_router = combat_analyzer::api::create_router(state);

    // Serve the frontend build with SPA fallback
    let index_file = config.server.static_dir.join("index.html");
    let serve_static =
        ServeDir::new(&config.server.static_dir).not_found_service(ServeFile::new(&index_file));

    // API first, then static files as fallback
    let app = axum::Router::new()
        .merge(api_router)
        .fallback_service(serve_static);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
