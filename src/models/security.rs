//! Instrument (security) reference data.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Trading parameters of one instrument.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Security {
    pub symbol: String,
    #[serde(rename = "shortname")]
    pub short_name: String,
    pub description: Option<String>,
    pub exchange: String,
    /// Trading mode code (instrument group).
    pub board: Option<String>,
    #[serde(rename = "primary_board")]
    pub primary_board: Option<String>,
    #[serde(rename = "lotsize")]
    pub lot_size: Option<Decimal>,
    #[serde(rename = "minstep")]
    pub min_step: Option<Decimal>,
    #[serde(rename = "pricestep")]
    pub price_step: Option<Decimal>,
    pub currency: Option<String>,
    #[serde(rename = "cfiCode")]
    pub cfi_code: Option<String>,
    /// Expiry date for derivatives (UTC).
    pub cancellation: Option<String>,
    #[serde(rename = "priceMax")]
    pub price_max: Option<Decimal>,
    #[serde(rename = "priceMin")]
    pub price_min: Option<Decimal>,
    #[serde(rename = "tradingStatus")]
    pub trading_status: Option<i32>,
    #[serde(rename = "tradingStatusInfo")]
    pub trading_status_info: Option<String>,
    #[serde(rename = "type")]
    pub tpe: Option<String>,
}
