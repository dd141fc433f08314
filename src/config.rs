//! Server Configuration
//!
//! Environment-driven configuration, resolved once at startup.

use std::path::PathBuf;

use crate::protocol::DEFAULT_ORDER_SZ_USD;
use crate::server::DEFAULT_MAX_FRAME_BYTES;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub models_dir: PathBuf,
    pub max_frame_bytes: usize,
    pub default_order_sz: f64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let host = std::env::var("SLIPQUOTE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = std::env::var("SLIPQUOTE_PORT")
            .unwrap_or_else(|_| "9000".to_string())
            .parse()
            .unwrap_or(9000);

        let models_dir = std::env::var("SLIPQUOTE_MODELS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./models"));

        let max_frame_bytes = std::env::var("SLIPQUOTE_MAX_FRAME_BYTES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(DEFAULT_MAX_FRAME_BYTES);

        let default_order_sz = std::env::var("SLIPQUOTE_DEFAULT_ORDER_SZ")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|&v| v > 0.0)
            .unwrap_or(DEFAULT_ORDER_SZ_USD);

        Ok(Self {
            host,
            port,
            models_dir,
            max_frame_bytes,
            default_order_sz,
        })
    }
}
