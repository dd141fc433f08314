//! Slippage Models and the Instrument Registry
//!
//! A model is a fitted linear regressor over exactly two features,
//! `(spread_pct, imbalance)`, in that order. Artifacts are JSON files
//! produced by the `fit_slippage` binary; the loader validates the pinned
//! feature-name list so a mis-ordered artifact can never reach serving.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The feature order every model is fitted on. Changing this silently
/// corrupts predictions, which is why artifacts carry it and the loader
/// checks it.
pub const FEATURE_NAMES: [&str; 2] = ["spread_pct", "imbalance"];

/// A fitted per-instrument linear model. Read-only after load; shared by
/// all connections without locking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlippageModel {
    intercept: f64,
    coefficients: [f64; 2],
}

impl SlippageModel {
    pub fn new(intercept: f64, coefficients: [f64; 2]) -> Self {
        Self {
            intercept,
            coefficients,
        }
    }

    /// Raw fitted value for `(spread_pct, imbalance)`. May be signed; the
    /// serving layer reports magnitude.
    #[inline]
    pub fn predict(&self, spread_pct: f64, imbalance: f64) -> f64 {
        self.intercept + self.coefficients[0] * spread_pct + self.coefficients[1] * imbalance
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn coefficients(&self) -> [f64; 2] {
        self.coefficients
    }
}

/// On-disk model artifact, one JSON file per instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub instrument: String,
    pub feature_names: Vec<String>,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub n_samples: usize,
    pub fitted_at: DateTime<Utc>,
}

impl ModelArtifact {
    /// Validate and convert into a runtime model.
    pub fn into_model(self) -> Result<(String, SlippageModel), ArtifactError> {
        if self.feature_names != FEATURE_NAMES {
            return Err(ArtifactError::FeatureNamesMismatch {
                instrument: self.instrument,
                found: self.feature_names,
            });
        }
        if self.coefficients.len() != FEATURE_NAMES.len() {
            return Err(ArtifactError::CoefficientCount {
                instrument: self.instrument,
                found: self.coefficients.len(),
            });
        }
        let coefficients = [self.coefficients[0], self.coefficients[1]];
        if !self.intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ArtifactError::NonFinite {
                instrument: self.instrument,
            });
        }
        Ok((
            self.instrument,
            SlippageModel::new(self.intercept, coefficients),
        ))
    }
}

/// Failures while building the registry from disk. All fatal at startup.
#[derive(Debug)]
pub enum ArtifactError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    FeatureNamesMismatch {
        instrument: String,
        found: Vec<String>,
    },
    CoefficientCount {
        instrument: String,
        found: usize,
    },
    NonFinite {
        instrument: String,
    },
    DuplicateInstrument {
        instrument: String,
        path: PathBuf,
    },
    EmptyRegistry {
        dir: PathBuf,
    },
}

impl std::fmt::Display for ArtifactError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "reading {}: {}", path.display(), source)
            }
            Self::Parse { path, source } => {
                write!(f, "parsing {}: {}", path.display(), source)
            }
            Self::FeatureNamesMismatch { instrument, found } => write!(
                f,
                "model for {} was fitted on features {:?}, expected {:?}",
                instrument, found, FEATURE_NAMES
            ),
            Self::CoefficientCount { instrument, found } => write!(
                f,
                "model for {} carries {} coefficients, expected {}",
                instrument,
                found,
                FEATURE_NAMES.len()
            ),
            Self::NonFinite { instrument } => {
                write!(f, "model for {} contains non-finite parameters", instrument)
            }
            Self::DuplicateInstrument { instrument, path } => write!(
                f,
                "duplicate model for {} at {}",
                instrument,
                path.display()
            ),
            Self::EmptyRegistry { dir } => write!(
                f,
                "no model artifacts (*.json) found in {}",
                dir.display()
            ),
        }
    }
}

impl std::error::Error for ArtifactError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Immutable instrument -> model lookup table, built once at startup and
/// shared read-only by every connection.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, SlippageModel>,
}

impl ModelRegistry {
    /// Build a registry directly from models, mainly for tests and stubs.
    pub fn from_models(models: HashMap<String, SlippageModel>) -> Self {
        Self { models }
    }

    /// Load every `*.json` artifact under `dir`. Any unreadable or invalid
    /// artifact is fatal, as is an empty directory: the server must never
    /// come up with a partial registry.
    pub fn load_dir(dir: &Path) -> Result<Self, ArtifactError> {
        let entries = fs::read_dir(dir).map_err(|source| ArtifactError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut models = HashMap::new();
        for entry in entries {
            let entry = entry.map_err(|source| ArtifactError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let raw = fs::read_to_string(&path).map_err(|source| ArtifactError::Io {
                path: path.clone(),
                source,
            })?;
            let artifact: ModelArtifact =
                serde_json::from_str(&raw).map_err(|source| ArtifactError::Parse {
                    path: path.clone(),
                    source,
                })?;

            let (instrument, model) = artifact.into_model()?;
            debug!(%instrument, path = %path.display(), "loaded model artifact");
            if models.insert(instrument.clone(), model).is_some() {
                return Err(ArtifactError::DuplicateInstrument { instrument, path });
            }
        }

        if models.is_empty() {
            return Err(ArtifactError::EmptyRegistry {
                dir: dir.to_path_buf(),
            });
        }
        Ok(Self { models })
    }

    /// Case-sensitive exact-match lookup.
    pub fn get(&self, instrument: &str) -> Option<&SlippageModel> {
        self.models.get(instrument)
    }

    /// Supported instruments, sorted for stable startup logs.
    pub fn instruments(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.models.keys().map(String::as_str).collect();
        symbols.sort_unstable();
        symbols
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn artifact_json(instrument: &str) -> String {
        format!(
            r#"{{
                "instrument": "{}",
                "feature_names": ["spread_pct", "imbalance"],
                "intercept": 0.01,
                "coefficients": [1.5, -0.25],
                "n_samples": 1440,
                "fitted_at": "2026-08-07T12:00:00Z"
            }}"#,
            instrument
        )
    }

    #[test]
    fn test_predict_is_linear() {
        let model = SlippageModel::new(0.5, [2.0, -1.0]);
        assert!((model.predict(0.0, 0.0) - 0.5).abs() < 1e-12);
        assert!((model.predict(0.1, 0.2) - (0.5 + 0.2 - 0.2)).abs() < 1e-12);
    }

    #[test]
    fn test_artifact_roundtrip_preserves_prediction() {
        let artifact: ModelArtifact = serde_json::from_str(&artifact_json("BTC")).unwrap();
        let re = serde_json::to_string(&artifact).unwrap();
        let artifact2: ModelArtifact = serde_json::from_str(&re).unwrap();

        let (_, m1) = artifact.into_model().unwrap();
        let (_, m2) = artifact2.into_model().unwrap();
        assert_eq!(m1.predict(0.002, -0.3), m2.predict(0.002, -0.3));
    }

    #[test]
    fn test_artifact_rejects_wrong_feature_order() {
        let mut artifact: ModelArtifact = serde_json::from_str(&artifact_json("BTC")).unwrap();
        artifact.feature_names = vec!["imbalance".to_string(), "spread_pct".to_string()];
        assert!(matches!(
            artifact.into_model(),
            Err(ArtifactError::FeatureNamesMismatch { .. })
        ));
    }

    #[test]
    fn test_artifact_rejects_non_finite() {
        let mut artifact: ModelArtifact = serde_json::from_str(&artifact_json("BTC")).unwrap();
        artifact.intercept = f64::NAN;
        assert!(matches!(
            artifact.into_model(),
            Err(ArtifactError::NonFinite { .. })
        ));
    }

    #[test]
    fn test_load_dir_builds_registry() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("btc.json"), artifact_json("BTC")).unwrap();
        fs::write(dir.path().join("eth.json"), artifact_json("ETH")).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let registry = ModelRegistry::load_dir(dir.path()).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.instruments(), vec!["BTC", "ETH"]);
        assert!(registry.get("BTC").is_some());
        assert!(registry.get("btc").is_none());
    }

    #[test]
    fn test_load_dir_empty_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ModelRegistry::load_dir(dir.path()),
            Err(ArtifactError::EmptyRegistry { .. })
        ));
    }

    #[test]
    fn test_load_dir_bad_artifact_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("btc.json"), artifact_json("BTC")).unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        assert!(matches!(
            ModelRegistry::load_dir(dir.path()),
            Err(ArtifactError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_dir_duplicate_instrument_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("btc.json"), artifact_json("BTC")).unwrap();
        fs::write(dir.path().join("btc_v2.json"), artifact_json("BTC")).unwrap();
        assert!(matches!(
            ModelRegistry::load_dir(dir.path()),
            Err(ArtifactError::DuplicateInstrument { .. })
        ));
    }
}
