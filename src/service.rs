//! Prediction Service
//!
//! Glue between the registry, the feature extractor, and the model:
//! look up the instrument, extract features, run the regressor, shape
//! the quote.

use serde::{Deserialize, Serialize};

use crate::book::OrderBookSnapshot;
use crate::features::{self, FeatureError};
use crate::model::ModelRegistry;

/// The served quote for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlippageQuote {
    /// Magnitude of the model output, in percent (the training-target scale).
    pub predicted_slippage_pct: f64,
    /// Relative spread as a plain ratio.
    pub spread_pct: f64,
    pub mid_price: f64,
}

/// Failures on the prediction path, all surfaced to the client as a
/// textual error by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictError {
    UnknownInstrument(String),
    Feature(FeatureError),
}

impl std::fmt::Display for PredictError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownInstrument(instrument) => {
                write!(f, "Unsupported instrument: {}", instrument)
            }
            Self::Feature(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for PredictError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Feature(err) => Some(err),
            Self::UnknownInstrument(_) => None,
        }
    }
}

impl From<FeatureError> for PredictError {
    fn from(err: FeatureError) -> Self {
        Self::Feature(err)
    }
}

/// Predict expected slippage for one snapshot.
///
/// The model is invoked with `(spread_pct, imbalance)` in exactly that
/// order; artifacts are validated against this order at load time. The
/// fitted value may be signed, the quote always reports magnitude.
pub fn predict(
    registry: &ModelRegistry,
    instrument: &str,
    snapshot: &OrderBookSnapshot,
    usd_quantity: f64,
    volatility: Option<f64>,
    fee_pct: Option<f64>,
) -> Result<SlippageQuote, PredictError> {
    let model = registry
        .get(instrument)
        .ok_or_else(|| PredictError::UnknownInstrument(instrument.to_string()))?;

    let features = features::extract(snapshot, usd_quantity, volatility, fee_pct)?;
    let fitted = model.predict(features.spread_pct, features.imbalance);

    Ok(SlippageQuote {
        predicted_slippage_pct: fitted.abs(),
        spread_pct: features.spread_pct,
        mid_price: features.mid_price,
    })
}
