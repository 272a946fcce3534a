//! disease-api - HTTP server for the disease normalizer.

use std::net::SocketAddr;

use tracing::{info, warn};

use disease_api::{init_tracing, router, AppState};
use disease_core::defaults;
use disease_db::{create_store, StoreContext};
use disease_search::QueryHandler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let _log_guard = init_tracing(
        "disease_api=debug,disease_search=info,disease_db=info,tower_http=debug",
        "disease-api.log",
    );

    // Get configuration from environment
    let host = std::env::var("HOST").unwrap_or_else(|_| defaults::SERVER_HOST.to_string());
    let port: u16 = match std::env::var("PORT") {
        Ok(raw) => raw.parse()?,
        Err(_) => defaults::SERVER_PORT,
    };

    let store = create_store(None, StoreContext::from_env()?).await?;
    let app = router(AppState::new(QueryHandler::new(store.clone())));

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!(
        subsystem = "api",
        backend = store.backend_name(),
        "Starting server on {}",
        addr
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await?;
    info!(subsystem = "api", "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(subsystem = "api", error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(subsystem = "api", "Shutdown signal received");
}
