//! # Keyward API Server
//!
//! Serves login, refresh and logout over HTTP, backed by PostgreSQL.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p keyward-api
//! ```

use keyward_api::{
    app::{build_router, AppState},
    config::{Config, LogFormat},
};
use keyward_shared::clock::SystemClock;
use keyward_shared::db::{
    migrations::run_migrations,
    pool::{close_pool, create_pool},
};
use keyward_shared::session::manager::SessionManager;
use keyward_shared::store::{PgAccountStore, PgSessionStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    tracing::info!("Keyward API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let pool = create_pool(config.database.clone()).await?;
    run_migrations(&pool).await?;

    let sessions = SessionManager::new(
        Arc::new(PgAccountStore::new(pool.clone())),
        Arc::new(PgSessionStore::new(pool.clone())),
        &config.auth,
        Arc::new(SystemClock),
    );

    let bind_address = config.bind_address();
    let app = build_router(AppState::new(Arc::new(sessions), config, Some(pool.clone())));

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    close_pool(pool).await;
    tracing::info!("Server stopped");

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "keyward_api=debug,keyward_shared=info,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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

    tracing::info!("Shutdown signal received, draining connections...");
}
