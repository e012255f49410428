//! Shared models for the ALOR REST and streaming APIs.
//!
//! Contains the feed opcodes, the subscription descriptor, the inbound
//! frame envelope and the domain records (candles, quotes, orders, order
//! books, securities, positions) decoded from them, plus the order
//! entry bodies.

pub mod account;
pub mod candle;
pub mod order;
pub mod order_book;
pub mod quote;
pub mod security;
pub mod subscription;

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use account::{Portfolio, Position, Trade};
pub use candle::{Candle, History, Interval};
pub use order::{
    InstrumentRef, NewOrder, NewStopOrder, Order, OrderResponse, OrderSide, OrderStatus,
    OrderType, PortfolioRef, StopCondition, TimeInForce,
};
pub use order_book::{OrderBook, PriceLevel};
pub use quote::Quote;
pub use security::Security;
pub use subscription::{SubscribeOptions, SubscriptionRequest, UnsubscribeRequest};

/// Streaming feeds offered by the ALOR WebSocket API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    /// Price history and live bars (candles).
    #[serde(rename = "BarsGetAndSubscribe")]
    Bars,
    /// Best bid/ask and last price.
    #[serde(rename = "QuotesSubscribe")]
    Quotes,
    /// Order updates for one portfolio.
    #[serde(rename = "OrdersGetAndSubscribeV2")]
    Orders,
    /// Exchange order book.
    #[serde(rename = "OrderBookGetAndSubscribe")]
    OrderBook,
    #[serde(rename = "AllTradesGetAndSubscribe")]
    AllTrades,
    #[serde(rename = "PositionsGetAndSubscribeV2")]
    Positions,
    #[serde(rename = "SummariesGetAndSubscribeV2")]
    Summaries,
    #[serde(rename = "RisksGetAndSubscribe")]
    Risks,
    #[serde(rename = "TradesGetAndSubscribeV2")]
    Trades,
    #[serde(rename = "StopOrdersGetAndSubscribeV2")]
    StopOrders,
    #[serde(rename = "InstrumentsGetAndSubscribeV2")]
    Instruments,
}

impl Opcode {
    /// Returns the wire-format opcode expected by the ALOR API.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bars => "BarsGetAndSubscribe",
            Self::Quotes => "QuotesSubscribe",
            Self::Orders => "OrdersGetAndSubscribeV2",
            Self::OrderBook => "OrderBookGetAndSubscribe",
            Self::AllTrades => "AllTradesGetAndSubscribe",
            Self::Positions => "PositionsGetAndSubscribeV2",
            Self::Summaries => "SummariesGetAndSubscribeV2",
            Self::Risks => "RisksGetAndSubscribe",
            Self::Trades => "TradesGetAndSubscribeV2",
            Self::StopOrders => "StopOrdersGetAndSubscribeV2",
            Self::Instruments => "InstrumentsGetAndSubscribeV2",
        }
    }

    /// Leading segment of the correlation guid for this feed.
    pub fn guid_prefix(self) -> &'static str {
        match self {
            Self::Bars => "candle",
            Self::Quotes => "quote",
            Self::Orders => "orders",
            Self::OrderBook => "orderbook",
            Self::AllTrades => "alltrades",
            Self::Positions => "positions",
            Self::Summaries => "summaries",
            Self::Risks => "risks",
            Self::Trades => "trades",
            Self::StopOrders => "stoporders",
            Self::Instruments => "instruments",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of the JSON objects returned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResponseFormat {
    #[default]
    Simple,
    Slim,
    Heavy,
}

/// Bearer token that serializes as-is but never shows up in `Debug`
/// output or logs.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RedactedToken(String);

impl RedactedToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RedactedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("RedactedToken(<empty>)")
        } else {
            f.write_str("RedactedToken(<redacted>)")
        }
    }
}

impl Serialize for RedactedToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RedactedToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

/// Envelope shared by every inbound streaming frame.
///
/// Control frames carry `httpCode`/`message`/`requestGuid`; data frames
/// carry `data` (shaped by the subscription's opcode) and `guid`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamFrame {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "httpCode")]
    pub http_code: Option<u16>,
    #[serde(default, rename = "requestGuid")]
    pub request_guid: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub guid: Option<String>,
}
