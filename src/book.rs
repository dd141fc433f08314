//! Order Book Snapshot Types
//!
//! Wire-level representation of an L2 order book snapshot as sent by
//! clients: two lists of `[price, size]` levels. Upstream feeds quote
//! decimals either as JSON numbers or as strings, so both are accepted.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single price level in the order book.
///
/// Serialized as a two-element array `[price, size]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

impl BookLevel {
    #[inline]
    pub fn new(price: f64, size: f64) -> Self {
        Self { price, size }
    }
}

/// A decimal that may arrive as a JSON number or a numeric string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawDecimal {
    Num(f64),
    Text(String),
}

impl RawDecimal {
    fn to_f64(&self) -> Result<f64, String> {
        match self {
            RawDecimal::Num(v) => Ok(*v),
            RawDecimal::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("invalid decimal string: {:?}", s)),
        }
    }
}

impl<'de> Deserialize<'de> for BookLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (price, size) = <(RawDecimal, RawDecimal)>::deserialize(deserializer)?;
        Ok(Self {
            price: price.to_f64().map_err(serde::de::Error::custom)?,
            size: size.to_f64().map_err(serde::de::Error::custom)?,
        })
    }
}

impl Serialize for BookLevel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (self.price, self.size).serialize(serializer)
    }
}

/// A raw order-book snapshot: ask and bid levels in source order.
///
/// No ordering guarantee from the source; callers that need best-first
/// levels must go through [`sorted_asks`](Self::sorted_asks) /
/// [`sorted_bids`](Self::sorted_bids).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub asks: Vec<BookLevel>,
    pub bids: Vec<BookLevel>,
}

impl OrderBookSnapshot {
    /// Ask levels sorted ascending by price (best ask first).
    pub fn sorted_asks(&self) -> Vec<BookLevel> {
        let mut asks = self.asks.clone();
        asks.sort_by(|a, b| {
            a.price
                .partial_cmp(&b.price)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        asks
    }

    /// Bid levels sorted descending by price (best bid first).
    pub fn sorted_bids(&self) -> Vec<BookLevel> {
        let mut bids = self.bids.clone();
        bids.sort_by(|a, b| {
            b.price
                .partial_cmp(&a.price)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        bids
    }
}
