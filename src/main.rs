use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lead_api::app::build_app;
use lead_api::config::{Config, StoreKind};
use lead_api::db::Database;
use lead_api::handlers::AppState;
use lead_api::memory_repo::InMemoryLeadRepository;
use lead_api::repository::{LeadRepository, PgLeadRepository};

/// Main entry point for the application.
///
/// Loads configuration, initializes logging, connects the lead store, builds
/// the route table and serves HTTP until Ctrl-C or SIGTERM.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing
    let default_filter = if config.debug {
        "lead_api=debug,tower_http=debug"
    } else {
        "lead_api=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.log_summary();
    tracing::info!(
        "Environment: {}",
        if config.debug { "Development" } else { "Production" }
    );

    let repo: Arc<dyn LeadRepository> = match config.store {
        StoreKind::Postgres => {
            let db = Database::new(&config).await?;
            tracing::info!("Database connection pool established");
            Arc::new(PgLeadRepository::new(db.pool))
        }
        StoreKind::Memory => {
            tracing::warn!("Using in-memory lead store; data is lost on restart");
            Arc::new(InMemoryLeadRepository::new())
        }
    };

    let state = Arc::new(AppState::new(config.clone(), repo)?);
    tracing::info!("Registered routes (resolution order):");
    for (method, pattern) in state.routes.iter() {
        tracing::info!("  {} {}", method, pattern);
    }

    let app = build_app(state);

    // Start server
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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
