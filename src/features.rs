//! Order Book Feature Extraction
//!
//! Turns a raw snapshot plus a USD order size into the numeric features the
//! slippage model consumes: relative spread, top-of-book depth imbalance,
//! and a simulated market-impact fill of the ask side.

use crate::book::{BookLevel, OrderBookSnapshot};

/// Number of levels per side aggregated into the depth imbalance.
pub const TOP_DEPTH_LEVELS: usize = 5;

/// Guards the imbalance denominator when both sides carry zero size.
const IMBALANCE_EPSILON: f64 = 1e-6;

/// Features derived from one snapshot, immutable once extracted.
///
/// `spread_pct` and `imbalance` are plain ratios. `simulated_slippage_pct`
/// is scaled by 100 because it is the model's training target, which is
/// measured in percent.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    /// (best_ask - best_bid) / mid_price.
    pub spread_pct: f64,
    /// Signed top-5 depth imbalance, strictly inside (-1, 1).
    pub imbalance: f64,
    /// Arithmetic mean of best bid and best ask.
    pub mid_price: f64,
    /// Simulated execution slippage of the walk, in percent.
    pub simulated_slippage_pct: f64,
    /// Base-asset quantity implied by the USD notional.
    pub order_qty: f64,
    /// Passthrough context, not consumed by the model.
    pub volatility: Option<f64>,
    pub fee_pct: Option<f64>,
}

/// Failures the extractor can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureError {
    /// Empty book side, non-positive mid price, or a non-finite input.
    InvalidSnapshot(String),
    /// The ask side ran out before the requested quantity was filled.
    InsufficientLiquidity { requested: f64, available: f64 },
}

impl std::fmt::Display for FeatureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSnapshot(reason) => write!(f, "invalid snapshot: {}", reason),
            Self::InsufficientLiquidity {
                requested,
                available,
            } => write!(
                f,
                "insufficient ask liquidity: requested {:.8} but only {:.8} available",
                requested, available
            ),
        }
    }
}

impl std::error::Error for FeatureError {}

/// Extract model features from a snapshot.
///
/// Pure and deterministic. `usd_quantity` is the notional of the simulated
/// market buy; `volatility` and `fee_pct` are carried through untouched.
pub fn extract(
    snapshot: &OrderBookSnapshot,
    usd_quantity: f64,
    volatility: Option<f64>,
    fee_pct: Option<f64>,
) -> Result<FeatureVector, FeatureError> {
    if snapshot.asks.is_empty() {
        return Err(FeatureError::InvalidSnapshot("no ask levels".to_string()));
    }
    if snapshot.bids.is_empty() {
        return Err(FeatureError::InvalidSnapshot("no bid levels".to_string()));
    }
    if !usd_quantity.is_finite() || usd_quantity <= 0.0 {
        return Err(FeatureError::InvalidSnapshot(format!(
            "order size must be a positive number, got {}",
            usd_quantity
        )));
    }

    let asks = snapshot.sorted_asks();
    let bids = snapshot.sorted_bids();

    let best_ask = asks[0].price;
    let best_bid = bids[0].price;
    let mid_price = (best_ask + best_bid) / 2.0;
    if !mid_price.is_finite() || mid_price <= 0.0 {
        return Err(FeatureError::InvalidSnapshot(format!(
            "non-positive mid price {}",
            mid_price
        )));
    }

    let spread_pct = (best_ask - best_bid) / mid_price;
    let base_qty = usd_quantity / mid_price;

    let avg_exec_price = walk_asks(&asks, base_qty)?;
    let simulated_slippage_pct = (avg_exec_price - mid_price) / mid_price * 100.0;

    let depth_ask = top_depth(&asks);
    let depth_bid = top_depth(&bids);
    let imbalance = (depth_bid - depth_ask) / (depth_bid + depth_ask + IMBALANCE_EPSILON);

    Ok(FeatureVector {
        spread_pct,
        imbalance,
        mid_price,
        simulated_slippage_pct,
        order_qty: base_qty,
        volatility,
        fee_pct,
    })
}

/// Greedy liquidity walk: fill `base_qty` level by level in ascending price
/// order and return the average execution price.
///
/// The terminal level is filled partially. If every level is consumed before
/// the target quantity is reached the walk fails rather than averaging over
/// the partial fill, which would understate impact exactly when the book is
/// thinnest.
fn walk_asks(asks: &[BookLevel], base_qty: f64) -> Result<f64, FeatureError> {
    let mut filled = 0.0;
    let mut total_cost = 0.0;

    for level in asks {
        if filled + level.size >= base_qty {
            total_cost += level.price * (base_qty - filled);
            return Ok(total_cost / base_qty);
        }
        total_cost += level.price * level.size;
        filled += level.size;
    }

    Err(FeatureError::InsufficientLiquidity {
        requested: base_qty,
        available: filled,
    })
}

/// Sum of sizes over the best `TOP_DEPTH_LEVELS` levels (or fewer).
fn top_depth(levels: &[BookLevel]) -> f64 {
    levels
        .iter()
        .take(TOP_DEPTH_LEVELS)
        .map(|level| level.size)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::BookLevel;

    fn reference_book() -> OrderBookSnapshot {
        OrderBookSnapshot {
            asks: vec![BookLevel::new(105.2, 1.0), BookLevel::new(105.3, 1.5)],
            bids: vec![BookLevel::new(105.0, 1.0), BookLevel::new(104.9, 1.5)],
        }
    }

    #[test]
    fn test_reference_fixture() {
        let f = extract(&reference_book(), 100.0, None, None).unwrap();

        assert!((f.mid_price - 105.1).abs() < 1e-12);
        assert!((f.spread_pct - 0.2 / 105.1).abs() < 1e-12);
        assert!((f.order_qty - 100.0 / 105.1).abs() < 1e-12);

        // Order fits inside the first ask level, so the walk fills at 105.2.
        let expected_slip = (105.2 - 105.1) / 105.1 * 100.0;
        assert!((f.simulated_slippage_pct - expected_slip).abs() < 1e-9);
        assert!((f.simulated_slippage_pct - 0.0951).abs() < 1e-4);
    }

    #[test]
    fn test_unsorted_input_matches_sorted() {
        let sorted = extract(&reference_book(), 100.0, None, None).unwrap();
        let shuffled = OrderBookSnapshot {
            asks: vec![BookLevel::new(105.3, 1.5), BookLevel::new(105.2, 1.0)],
            bids: vec![BookLevel::new(104.9, 1.5), BookLevel::new(105.0, 1.0)],
        };
        let unsorted = extract(&shuffled, 100.0, None, None).unwrap();
        assert_eq!(sorted, unsorted);
    }

    #[test]
    fn test_walk_crosses_level_boundary() {
        // 200 USD at mid 105.1 needs ~1.9029 units: all of level one (1.0)
        // plus a partial fill of level two.
        let f = extract(&reference_book(), 200.0, None, None).unwrap();
        let base_qty = 200.0 / 105.1;
        let expected_cost = 105.2 * 1.0 + 105.3 * (base_qty - 1.0);
        let expected_avg = expected_cost / base_qty;
        let expected_slip = (expected_avg - 105.1) / 105.1 * 100.0;
        assert!((f.simulated_slippage_pct - expected_slip).abs() < 1e-9);
    }

    #[test]
    fn test_insufficient_liquidity_is_typed() {
        // Total ask depth is 2.5 units; ask for far more than that.
        let err = extract(&reference_book(), 1_000_000.0, None, None).unwrap_err();
        match err {
            FeatureError::InsufficientLiquidity {
                requested,
                available,
            } => {
                assert!(requested > available);
                assert!((available - 2.5).abs() < 1e-12);
            }
            other => panic!("expected InsufficientLiquidity, got {:?}", other),
        }
    }

    #[test]
    fn test_exact_depth_fill_succeeds() {
        // base_qty exactly equal to total depth must still fill (>= boundary).
        let snap = OrderBookSnapshot {
            asks: vec![BookLevel::new(100.0, 1.0)],
            bids: vec![BookLevel::new(100.0, 1.0)],
        };
        // mid = 100, base_qty = 1.0 == level size
        let f = extract(&snap, 100.0, None, None).unwrap();
        assert!((f.simulated_slippage_pct - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_sides_rejected() {
        let no_asks = OrderBookSnapshot {
            asks: vec![],
            bids: vec![BookLevel::new(105.0, 1.0)],
        };
        assert!(matches!(
            extract(&no_asks, 100.0, None, None),
            Err(FeatureError::InvalidSnapshot(_))
        ));

        let no_bids = OrderBookSnapshot {
            asks: vec![BookLevel::new(105.2, 1.0)],
            bids: vec![],
        };
        assert!(matches!(
            extract(&no_bids, 100.0, None, None),
            Err(FeatureError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn test_non_positive_order_size_rejected() {
        for bad in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                extract(&reference_book(), bad, None, None),
                Err(FeatureError::InvalidSnapshot(_))
            ));
        }
    }

    #[test]
    fn test_imbalance_bounds_and_depth_window() {
        // Heavily bid-weighted book: imbalance positive, still below 1.
        let mut bids = Vec::new();
        for i in 0..8 {
            bids.push(BookLevel::new(104.0 - i as f64 * 0.1, 10.0));
        }
        let snap = OrderBookSnapshot {
            asks: vec![BookLevel::new(104.2, 0.5), BookLevel::new(104.3, 1.0)],
            bids,
        };
        let f = extract(&snap, 10.0, None, None).unwrap();
        assert!(f.imbalance > 0.0 && f.imbalance < 1.0);

        // Only the best five bid levels count: 5 * 10 = 50, asks = 1.5.
        let expected = (50.0 - 1.5) / (50.0 + 1.5 + 1e-6);
        assert!((f.imbalance - expected).abs() < 1e-12);
    }

    #[test]
    fn test_passthrough_context_carried() {
        let f = extract(&reference_book(), 100.0, Some(0.015), Some(0.05)).unwrap();
        assert_eq!(f.volatility, Some(0.015));
        assert_eq!(f.fee_pct, Some(0.05));
    }

    #[test]
    fn test_spread_non_negative_for_valid_books() {
        let f = extract(&reference_book(), 100.0, None, None).unwrap();
        assert!(f.spread_pct >= 0.0);
    }
}
