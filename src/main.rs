//! Process entrypoint: load config, init tracing, connect + migrate the
//! database, serve the router, and shut down cleanly on signal.
//!
//! Grounded on `roder-stroma/src/main.rs`'s thin-main pattern and
//! `indexer/src/database.rs`'s connect/migrate sequence.

use std::net::SocketAddr;
use std::sync::Arc;

use quickly_pick::config::Config;
use quickly_pick::db::Database;
use quickly_pick::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        eprintln!("quickly-pick: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::load();

    let db = Database::connect(&config.database_url, config.max_db_connections).await?;
    db.migrate().await?;

    let state = AppState {
        db,
        config: Arc::new(config.clone()),
    };
    let router = quickly_pick::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutting down");
}
