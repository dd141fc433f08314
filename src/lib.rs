//! slipquote - Real-time Slippage Quote Server
//!
//! Serves expected trade execution slippage for an instrument from a live
//! order-book snapshot, using a previously fitted linear model per
//! instrument, over long-lived framed TCP connections.
//!
//! Exposes core modules for use by binaries and tests.

pub mod book;
pub mod config;
pub mod features;
pub mod fit;
pub mod model;
pub mod protocol;
pub mod server;
pub mod service;
