//! Order book (market depth) models.

use rust_decimal::Decimal;
use serde::Deserialize;

/// A single price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    /// Lots available at `price`.
    pub volume: i64,
}

/// Order book snapshot. Bids are sorted best-first, asks best-first.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OrderBook {
    #[serde(default)]
    pub bids: Vec<PriceLevel>,
    #[serde(default)]
    pub asks: Vec<PriceLevel>,
    /// UTC Unix milliseconds.
    #[serde(default)]
    pub ms_timestamp: i64,
    /// `true` for snapshot data, `false` for live updates.
    #[serde(default)]
    pub existing: bool,
    /// Stamped by the streaming router from the subscription.
    #[serde(default)]
    pub symbol: String,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.first().copied()
    }

    /// Total lots on one side of the book.
    pub fn depth_volume(levels: &[PriceLevel]) -> i64 {
        levels.iter().map(|l| l.volume).sum()
    }
}
