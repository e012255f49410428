//! Order models shared by the REST endpoints and the orders feed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
    Stop,
    StopLimit,
}

/// Lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Resting on the exchange.
    Working,
    Filled,
    Canceled,
    Rejected,
}

impl OrderStatus {
    /// Returns `true` once the order can no longer change.
    pub fn is_final(self) -> bool {
        !matches!(self, Self::Working)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Working => "working",
            Self::Filled => "filled",
            Self::Canceled => "canceled",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "working" => Some(Self::Working),
            "filled" => Some(Self::Filled),
            "canceled" => Some(Self::Canceled),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    /// Good until the end of the trading day.
    OneDay,
    GoodTillCancelled,
    FillOrKill,
    ImmediateOrCancel,
}

/// One exchange order as reported by the broker.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub symbol: String,
    /// `EXCHANGE:SYMBOL` pair.
    #[serde(default)]
    pub broker_symbol: Option<String>,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub portfolio: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub side: OrderSide,
    pub status: OrderStatus,
    #[serde(default, rename = "transTime")]
    pub transition_time: Option<String>,
    #[serde(default)]
    pub update_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    /// Quantity in lots.
    #[serde(default)]
    pub qty: i64,
    #[serde(default)]
    pub qty_units: Option<i64>,
    /// Filled quantity in lots.
    #[serde(default)]
    pub filled: i64,
    #[serde(default)]
    pub filled_qty_units: Option<i64>,
    #[serde(default)]
    pub price: Decimal,
    /// `true` for snapshot (history) entries, `false` for live events.
    #[serde(default)]
    pub existing: bool,
    #[serde(default)]
    pub time_in_force: Option<TimeInForce>,
    /// `null` for market orders.
    #[serde(default)]
    pub volume: Option<Decimal>,
}

impl Order {
    /// Lots still waiting to be filled.
    pub fn remaining(&self) -> i64 {
        (self.qty - self.filled).max(0)
    }
}

/// Body returned by order commands (create, cancel).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub order_number: Option<String>,
}

/// Trigger condition of a stop order, relative to the last price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopCondition {
    More,
    Less,
    MoreOrEqual,
    LessOrEqual,
}

/// Instrument an order is placed on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentRef {
    pub symbol: String,
    pub exchange: String,
    /// Board, e.g. `TQBR`. The exchange picks the primary board if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrument_group: Option<String>,
}

impl InstrumentRef {
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            exchange: exchange.into(),
            instrument_group: None,
        }
    }

    #[must_use]
    pub fn with_board(mut self, board: impl Into<String>) -> Self {
        self.instrument_group = Some(board.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortfolioRef {
    pub portfolio: String,
}

/// A market or limit order to submit.
///
/// Built with [`NewOrder::market`] or [`NewOrder::limit`]; time in force
/// defaults to [`TimeInForce::OneDay`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    #[serde(skip)]
    order_type: OrderType,
    pub side: OrderSide,
    /// Quantity in lots.
    pub quantity: i64,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<Decimal>,
    pub comment: String,
    pub instrument: InstrumentRef,
    pub user: PortfolioRef,
    pub time_in_force: TimeInForce,
}

impl NewOrder {
    pub fn market(
        side: OrderSide,
        instrument: InstrumentRef,
        portfolio: impl Into<String>,
        quantity: i64,
    ) -> Self {
        Self {
            order_type: OrderType::Market,
            side,
            quantity,
            price: None,
            comment: String::new(),
            instrument,
            user: PortfolioRef {
                portfolio: portfolio.into(),
            },
            time_in_force: TimeInForce::OneDay,
        }
    }

    pub fn limit(
        side: OrderSide,
        instrument: InstrumentRef,
        portfolio: impl Into<String>,
        quantity: i64,
        price: Decimal,
    ) -> Self {
        Self {
            order_type: OrderType::Limit,
            price: Some(price),
            ..Self::market(side, instrument, portfolio, quantity)
        }
    }

    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    #[must_use]
    pub fn with_time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = time_in_force;
        self
    }

    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    /// Path segment of the command endpoint for this order.
    pub fn action(&self) -> &'static str {
        match self.order_type {
            OrderType::Limit => "limit",
            _ => "market",
        }
    }
}

/// A stop or stop-limit order to submit.
///
/// [`NewStopOrder::stop`] builds a stop order; adding a limit price with
/// [`with_limit_price`](NewStopOrder::with_limit_price) turns it into a
/// stop-limit order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStopOrder {
    pub side: OrderSide,
    pub condition: StopCondition,
    #[serde(with = "rust_decimal::serde::float")]
    pub trigger_price: Decimal,
    /// Limit price; only stop-limit orders carry one.
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<Decimal>,
    pub quantity: i64,
    /// Expiry as Unix seconds, `0` for the exchange default.
    pub stop_end_unix_time: i64,
    pub instrument: InstrumentRef,
    pub user: PortfolioRef,
    pub time_in_force: TimeInForce,
    /// Inactive orders are stored but not sent to the exchange.
    pub activate: bool,
}

impl NewStopOrder {
    pub fn stop(
        side: OrderSide,
        condition: StopCondition,
        trigger_price: Decimal,
        instrument: InstrumentRef,
        portfolio: impl Into<String>,
        quantity: i64,
    ) -> Self {
        Self {
            side,
            condition,
            trigger_price,
            price: None,
            quantity,
            stop_end_unix_time: 0,
            instrument,
            user: PortfolioRef {
                portfolio: portfolio.into(),
            },
            time_in_force: TimeInForce::OneDay,
            activate: true,
        }
    }

    #[must_use]
    pub fn with_limit_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    #[must_use]
    pub fn expires_at(mut self, unix_secs: i64) -> Self {
        self.stop_end_unix_time = unix_secs;
        self
    }

    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.activate = false;
        self
    }

    pub fn order_type(&self) -> OrderType {
        if self.price.is_some() {
            OrderType::StopLimit
        } else {
            OrderType::Stop
        }
    }

    pub fn action(&self) -> &'static str {
        match self.order_type() {
            OrderType::StopLimit => "stopLimit",
            _ => "stop",
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn order_update_deserializes() {
        let order: Order = serde_json::from_str(
            r#"{
                "id": "18995978560",
                "symbol": "SBER",
                "brokerSymbol": "MOEX:SBER",
                "exchange": "MOEX",
                "portfolio": "D39004",
                "type": "limit",
                "side": "buy",
                "status": "working",
                "transTime": "2024-05-30T10:15:00.000Z",
                "qty": 10,
                "filled": 3,
                "price": 315.12,
                "existing": false,
                "timeInForce": "oneday",
                "volume": 3151.2
            }"#,
        )
        .unwrap();

        assert_eq!(order.side, OrderSide::Buy);
        assert_eq!(order.order_type, OrderType::Limit);
        assert_eq!(order.status, OrderStatus::Working);
        assert_eq!(order.time_in_force, Some(TimeInForce::OneDay));
        assert_eq!(order.price, dec!(315.12));
        assert_eq!(order.remaining(), 7);
        assert!(!order.status.is_final());
    }

    #[test]
    fn market_order_has_no_volume() {
        let order: Order = serde_json::from_str(
            r#"{"id":"1","symbol":"GAZP","type":"market","side":"sell","status":"filled","volume":null}"#,
        )
        .unwrap();

        assert!(order.volume.is_none());
        assert!(order.status.is_final());
    }

    #[test]
    fn limit_order_body_matches_command_api() {
        let order = NewOrder::limit(
            OrderSide::Buy,
            InstrumentRef::new("MOEX", "SBER").with_board("TQBR"),
            "D39004",
            2,
            dec!(315.12),
        )
        .with_comment("entry");

        let body = serde_json::to_value(&order).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "side": "buy",
                "quantity": 2,
                "price": 315.12,
                "comment": "entry",
                "instrument": {"symbol": "SBER", "exchange": "MOEX", "instrumentGroup": "TQBR"},
                "user": {"portfolio": "D39004"},
                "timeInForce": "oneday"
            })
        );
        assert_eq!(order.action(), "limit");
    }

    #[test]
    fn market_order_omits_price() {
        let order = NewOrder::market(
            OrderSide::Sell,
            InstrumentRef::new("MOEX", "GAZP"),
            "D39004",
            1,
        )
        .with_time_in_force(TimeInForce::ImmediateOrCancel);

        let body = serde_json::to_value(&order).unwrap();
        assert!(body.get("price").is_none());
        assert!(body.get("instrument").unwrap().get("instrumentGroup").is_none());
        assert_eq!(body["timeInForce"], "immediateorcancel");
        assert_eq!(order.order_type(), OrderType::Market);
        assert_eq!(order.action(), "market");
    }

    #[test]
    fn stop_order_becomes_stop_limit_with_a_price() {
        let stop = NewStopOrder::stop(
            OrderSide::Sell,
            StopCondition::LessOrEqual,
            dec!(300),
            InstrumentRef::new("MOEX", "SBER"),
            "D39004",
            3,
        )
        .expires_at(1_717_099_200);
        assert_eq!(stop.action(), "stop");

        let body = serde_json::to_value(&stop).unwrap();
        assert_eq!(body["condition"], "LessOrEqual");
        assert_eq!(body["triggerPrice"], 300.0);
        assert_eq!(body["stopEndUnixTime"], 1_717_099_200);
        assert_eq!(body["activate"], true);
        assert!(body.get("price").is_none());

        let stop_limit = stop.with_limit_price(dec!(299.5)).inactive();
        assert_eq!(stop_limit.order_type(), OrderType::StopLimit);
        assert_eq!(stop_limit.action(), "stopLimit");
        let body = serde_json::to_value(&stop_limit).unwrap();
        assert_eq!(body["price"], 299.5);
        assert_eq!(body["activate"], false);
    }
}
