//! Offline Model Fitting
//!
//! Builds a training dataset from historical order-book snapshot files and
//! fits the per-instrument linear model by ordinary least squares. The
//! extractor here is the same code the serving path runs, so training and
//! serving can never drift apart on feature definitions.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use crate::book::OrderBookSnapshot;
use crate::features;
use crate::model::{ModelArtifact, SlippageModel, FEATURE_NAMES};

/// One training row: the two model features plus the regression target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitRow {
    pub spread_pct: f64,
    pub imbalance: f64,
    pub slippage_pct: f64,
}

/// Result of an OLS fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FittedOls {
    pub intercept: f64,
    pub coefficients: [f64; 2],
    pub n_samples: usize,
}

impl FittedOls {
    pub fn model(&self) -> SlippageModel {
        SlippageModel::new(self.intercept, self.coefficients)
    }

    /// Package the fit as a versioned on-disk artifact.
    pub fn into_artifact(self, instrument: String) -> ModelArtifact {
        ModelArtifact {
            instrument,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            intercept: self.intercept,
            coefficients: self.coefficients.to_vec(),
            n_samples: self.n_samples,
            fitted_at: Utc::now(),
        }
    }
}

/// Fitting failures.
#[derive(Debug, Clone, PartialEq)]
pub enum FitError {
    /// No usable rows at all.
    NoSamples,
    /// Fewer rows than model parameters.
    Underdetermined { rows: usize },
    /// The design matrix has no least-squares solution (degenerate data,
    /// e.g. every snapshot identical).
    Singular,
}

impl std::fmt::Display for FitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSamples => write!(f, "no usable snapshot produced a training row"),
            Self::Underdetermined { rows } => write!(
                f,
                "{} rows cannot determine {} parameters",
                rows,
                FEATURE_NAMES.len() + 1
            ),
            Self::Singular => write!(f, "degenerate design matrix, fit has no solution"),
        }
    }
}

impl std::error::Error for FitError {}

/// Read every `*.json` snapshot under `dir` and extract a training row
/// per file.
///
/// Files that fail to parse or extract are skipped with a warning rather
/// than aborting the whole fit; one corrupt capture should not cost a
/// night of data. Files are visited in sorted order so a rerun over the
/// same directory is deterministic.
pub fn build_dataset(dir: &Path, usd_quantity: f64) -> io::Result<Vec<FitRow>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    paths.sort();

    let mut rows = Vec::with_capacity(paths.len());
    for path in &paths {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable snapshot");
                continue;
            }
        };
        let snapshot: OrderBookSnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unparsable snapshot");
                continue;
            }
        };
        match features::extract(&snapshot, usd_quantity, None, None) {
            Ok(f) => rows.push(FitRow {
                spread_pct: f.spread_pct,
                imbalance: f.imbalance,
                slippage_pct: f.simulated_slippage_pct,
            }),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping snapshot");
            }
        }
    }

    debug!(files = paths.len(), rows = rows.len(), "dataset built");
    Ok(rows)
}

/// Ordinary least squares of `slippage_pct` on `(spread_pct, imbalance)`
/// with an intercept, solved via SVD.
pub fn fit_ols(rows: &[FitRow]) -> Result<FittedOls, FitError> {
    if rows.is_empty() {
        return Err(FitError::NoSamples);
    }
    let n = rows.len();
    if n < FEATURE_NAMES.len() + 1 {
        return Err(FitError::Underdetermined { rows: n });
    }

    let design = DMatrix::from_fn(n, 3, |row, col| match col {
        0 => 1.0,
        1 => rows[row].spread_pct,
        _ => rows[row].imbalance,
    });
    let target = DVector::from_fn(n, |row, _| rows[row].slippage_pct);

    let svd = design.svd(true, true);
    let beta = svd.solve(&target, 1e-12).map_err(|_| FitError::Singular)?;

    let fitted = FittedOls {
        intercept: beta[0],
        coefficients: [beta[1], beta[2]],
        n_samples: n,
    };
    if !fitted.intercept.is_finite() || fitted.coefficients.iter().any(|c| !c.is_finite()) {
        return Err(FitError::Singular);
    }
    Ok(fitted)
}
