//! slipquote server entry point.
//!
//! Loads every model artifact into the immutable registry, then serves
//! quotes until the process is stopped. A missing or invalid artifact is
//! fatal before the listener binds: the server never comes up with a
//! partial registry.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use slipquote::config::Config;
use slipquote::model::ModelRegistry;
use slipquote::server::{QuoteServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let config = Config::from_env()?;

    let registry = ModelRegistry::load_dir(&config.models_dir).with_context(|| {
        format!(
            "loading model artifacts from {}",
            config.models_dir.display()
        )
    })?;
    info!(
        instruments = ?registry.instruments(),
        "📊 model registry loaded"
    );

    let bind_addr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;

    let server = QuoteServer::bind(
        ServerConfig {
            bind_addr,
            max_frame_bytes: config.max_frame_bytes,
            default_order_sz: config.default_order_sz,
        },
        Arc::new(registry),
    )
    .await
    .context("binding listener")?;

    server.run().await.context("server error")?;

    Ok(())
}
