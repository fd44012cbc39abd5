//! sitecache MCP server entry point.
//!
//! Boots the cache administration server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use sitecache_core::{CacheConfig, CacheManager};
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = CacheConfig::load()?;
    tracing::info!(backend = config.backend.as_str(), "Starting sitecache server on stdio transport");

    let cache = Arc::new(CacheManager::new(config));
    cache.initialize().await?;

    let handler = handler::SiteCacheServer::new(Arc::clone(&cache));
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    let quit_reason = server.waiting().await;
    cache.shutdown().await;
    quit_reason?;

    Ok(())
}
