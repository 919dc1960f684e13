//! snippets server entry point.
//!
//! Loads configuration, opens the store and cache, and serves the snippet
//! tools over MCP stdio transport. Logging goes to stderr to avoid
//! interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use snippets_core::{AppConfig, SnippetService};
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    let service = Arc::new(SnippetService::from_config(&config).await.context("failed to start snippet service")?);

    tracing::info!(
        replicas = service.store().replica_count(),
        cache = service.cache().is_enabled(),
        "Starting snippets server on stdio transport"
    );

    let handler = handler::SnippetServer::new(service.clone());
    let server = serve_server(handler, stdio()).await?;
    let quit = server.waiting().await;

    if let Err(e) = service.store().close().await {
        tracing::warn!(error = %e, "failed to close store cleanly");
    }
    quit?;

    Ok(())
}
