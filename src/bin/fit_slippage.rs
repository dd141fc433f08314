//! Slippage Model Fitting CLI
//!
//! Fits the per-instrument linear slippage model from a directory of
//! historical order-book snapshot JSON files and writes a versioned model
//! artifact the server loads at startup.
//!
//! Usage:
//!   fit_slippage --snapshots ./data/btc --instrument BTC --out ./models

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use slipquote::fit::{self, FitRow};

#[derive(Parser, Debug)]
#[command(name = "fit_slippage")]
#[command(about = "Fit a per-instrument slippage model from recorded snapshots")]
struct Args {
    /// Directory of historical snapshot JSON files
    #[arg(long, env = "SLIPQUOTE_SNAPSHOTS_DIR")]
    snapshots: PathBuf,

    /// Instrument symbol the model is fitted for (e.g. BTC)
    #[arg(long)]
    instrument: String,

    /// Directory to write the model artifact into
    #[arg(long, env = "SLIPQUOTE_MODELS_DIR", default_value = "./models")]
    out: PathBuf,

    /// USD notional of the simulated order used for the target
    #[arg(long, default_value_t = 100.0)]
    order_size: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let args = Args::parse();

    let rows: Vec<FitRow> = fit::build_dataset(&args.snapshots, args.order_size)
        .with_context(|| format!("reading snapshots from {}", args.snapshots.display()))?;
    if rows.is_empty() {
        bail!(
            "no usable snapshots in {} - nothing to fit",
            args.snapshots.display()
        );
    }
    info!(rows = rows.len(), instrument = %args.instrument, "dataset ready");

    let fitted = fit::fit_ols(&rows).context("fitting model")?;
    info!(
        intercept = fitted.intercept,
        spread_coef = fitted.coefficients[0],
        imbalance_coef = fitted.coefficients[1],
        n_samples = fitted.n_samples,
        "model fitted"
    );

    let artifact = fitted.into_artifact(args.instrument.clone());
    fs::create_dir_all(&args.out)
        .with_context(|| format!("creating {}", args.out.display()))?;
    let path = args.out.join(format!("{}.json", args.instrument));
    let encoded = serde_json::to_string_pretty(&artifact).context("encoding artifact")?;
    fs::write(&path, encoded).with_context(|| format!("writing {}", path.display()))?;

    info!(path = %path.display(), "💾 model artifact written");
    Ok(())
}
