//! Veridian identity provider server entry point.

mod config;
mod observability;
mod server;

use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::server::App;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    observability::init_tracing("info");

    let config = ServerConfig::load()?;
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let app = App::build(config.auth).await?;
    let router = app.router();

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, issuer = %app.config.issuer, "Veridian identity provider listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install shutdown handler");
        return;
    }
    tracing::info!("Shutdown signal received");
}
