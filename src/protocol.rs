//! Request Dispatch Protocol
//!
//! Envelope types for the newline-framed JSON protocol and the dispatcher
//! that routes decoded requests to handlers. The dispatcher is the error
//! boundary: every failure below it, from a malformed envelope to a thin
//! order book, leaves as a well-formed `{"error": ...}` envelope.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::book::OrderBookSnapshot;
use crate::model::ModelRegistry;
use crate::service;

/// Order size applied when a request omits `order_sz`, in USD.
pub const DEFAULT_ORDER_SZ_USD: f64 = 100.0;

/// Incoming request envelope: `{"method": ..., "params": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub method: String,
    pub params: Value,
}

/// Outgoing response envelope. Externally tagged, so it serializes as
/// exactly one of `{"result": ...}` or `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponseEnvelope {
    #[serde(rename = "result")]
    Result(Value),
    #[serde(rename = "error")]
    Error(String),
}

/// The closed set of supported methods. Routing goes through this enum so
/// the dispatcher match stays exhaustive when a method is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    ExpectedSlippage,
}

impl Method {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "expected_slippage" => Some(Self::ExpectedSlippage),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ExpectedSlippage => "expected_slippage",
        }
    }
}

/// Parameters of the `expected_slippage` method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlippageParams {
    pub instrument: String,
    #[serde(flatten)]
    pub book: OrderBookSnapshot,
    /// USD notional of the simulated order; defaults server-side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_sz: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volatility_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_pct: Option<f64>,
}

/// Routes framed request lines to handlers over a shared, read-only
/// registry. One instance serves every connection.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ModelRegistry>,
    default_order_sz: f64,
}

impl Dispatcher {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            default_order_sz: DEFAULT_ORDER_SZ_USD,
        }
    }

    pub fn with_default_order_sz(mut self, usd: f64) -> Self {
        self.default_order_sz = usd;
        self
    }

    /// Handle one framed request line and produce one framed response
    /// body. Total: malformed input, unknown methods, and handler
    /// failures all come back as error envelopes, never as a fault.
    pub fn dispatch(&self, raw: &str) -> String {
        let response = self.dispatch_inner(raw);
        serde_json::to_string(&response)
            .unwrap_or_else(|_| r#"{"error":"internal: response encoding failed"}"#.to_string())
    }

    fn dispatch_inner(&self, raw: &str) -> ResponseEnvelope {
        let envelope: RequestEnvelope = match serde_json::from_str(raw) {
            Ok(envelope) => envelope,
            Err(err) => return ResponseEnvelope::Error(err.to_string()),
        };

        let method = match Method::from_name(&envelope.method) {
            Some(method) => method,
            None => {
                return ResponseEnvelope::Error(format!("Unknown function: {}", envelope.method))
            }
        };

        match self.handle(method, envelope.params) {
            Ok(result) => ResponseEnvelope::Result(result),
            Err(message) => ResponseEnvelope::Error(message),
        }
    }

    fn handle(&self, method: Method, params: Value) -> Result<Value, String> {
        match method {
            Method::ExpectedSlippage => self.expected_slippage(params),
        }
    }

    fn expected_slippage(&self, params: Value) -> Result<Value, String> {
        let params: SlippageParams =
            serde_json::from_value(params).map_err(|err| err.to_string())?;
        let order_sz = params.order_sz.unwrap_or(self.default_order_sz);

        let quote = service::predict(
            &self.registry,
            &params.instrument,
            &params.book,
            order_sz,
            params.volatility_pct,
            params.fee_pct,
        )
        .map_err(|err| err.to_string())?;

        serde_json::to_value(&quote).map_err(|err| err.to_string())
    }
}
