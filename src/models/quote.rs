//! Quote (ticker) models.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rust_decimal::Decimal;
use serde::Deserialize;

/// Best bid/ask, last trade and session statistics for one instrument.
///
/// Fields the server may omit or send as `null` are optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Quote {
    pub symbol: String,
    pub exchange: String,
    pub description: Option<String>,
    pub prev_close_price: Option<Decimal>,
    pub last_price: Option<Decimal>,
    /// UTC Unix seconds of `last_price`.
    pub last_price_timestamp: i64,
    pub open_price: Option<Decimal>,
    pub high_price: Option<Decimal>,
    pub low_price: Option<Decimal>,
    /// Session volume in lots.
    pub volume: Option<i64>,
    pub ask: Option<Decimal>,
    pub bid: Option<Decimal>,
    /// Lots at the best ask.
    pub ask_vol: Option<Decimal>,
    /// Lots at the best bid.
    pub bid_vol: Option<Decimal>,
    #[serde(rename = "total_ask_vol")]
    pub ask_volume_total: Option<i64>,
    #[serde(rename = "total_bid_vol")]
    pub bid_volume_total: Option<i64>,
    #[serde(rename = "lotsize")]
    pub lot_size: Option<Decimal>,
    #[serde(rename = "lotvalue")]
    pub lot_value: Option<Decimal>,
    #[serde(rename = "facevalue")]
    pub face_value: Option<Decimal>,
    pub open_interest: Option<i64>,
    #[serde(rename = "accruedInt")]
    pub accrued_interest: Option<Decimal>,
    /// UTC Unix milliseconds of the order book state.
    #[serde(rename = "ob_ms_timestamp")]
    pub order_book_ms_timestamp: Option<i64>,
    #[serde(rename = "type")]
    pub tpe: Option<String>,
    pub change: Option<Decimal>,
    pub change_percent: Option<Decimal>,
}

impl Quote {
    /// Time of the last trade as a [`SystemTime`].
    pub fn last_time(&self) -> SystemTime {
        match u64::try_from(self.last_price_timestamp) {
            Ok(secs) => UNIX_EPOCH + Duration::from_secs(secs),
            Err(_) => UNIX_EPOCH,
        }
    }

    /// Difference between best ask and best bid, when both are known.
    pub fn spread(&self) -> Option<Decimal> {
        Some(self.ask? - self.bid?)
    }
}
