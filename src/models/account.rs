//! Portfolio, position and trade models.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;

use super::OrderSide;

/// Portfolio summary (`/summary`). Futures portfolios report no
/// commission.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Portfolio {
    pub buying_power_at_morning: Option<Decimal>,
    pub buying_power: Option<Decimal>,
    pub profit: Option<Decimal>,
    /// Percent.
    pub profit_rate: Option<Decimal>,
    pub portfolio_evaluation: Option<Decimal>,
    pub portfolio_liquidation_value: Option<Decimal>,
    pub initial_margin: Option<Decimal>,
    pub risk_before_force_position_closing: Option<Decimal>,
    pub commission: Option<Decimal>,
}

/// One holding of a portfolio, including money balances.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Position {
    pub portfolio: String,
    pub symbol: String,
    pub broker_symbol: Option<String>,
    pub exchange: String,
    pub short_name: Option<String>,
    /// Value at the average price.
    pub volume: Option<Decimal>,
    /// Value at the current price.
    pub current_volume: Option<Decimal>,
    pub avg_price: Option<Decimal>,
    pub qty_units: Decimal,
    pub open_units: Option<Decimal>,
    pub lot_size: Option<Decimal>,
    /// Quantity in lots.
    pub qty: Decimal,
    pub daily_unrealised_pl: Option<Decimal>,
    pub unrealised_pl: Option<Decimal>,
    /// `true` for money balances, `false` for instruments.
    pub is_currency: bool,
}

impl Position {
    /// Whole lots held; negative for a short position.
    pub fn lots(&self) -> i64 {
        self.qty.trunc().to_i64().unwrap_or_default()
    }
}

/// One execution of the current session.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: String,
    /// Number of the order that produced this trade.
    #[serde(default, rename = "orderno")]
    pub order_number: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    pub symbol: String,
    #[serde(default)]
    pub broker_symbol: Option<String>,
    #[serde(default)]
    pub exchange: Option<String>,
    /// Execution time (UTC, ISO 8601).
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub board: Option<String>,
    #[serde(default)]
    pub qty_units: Option<i64>,
    /// Quantity in lots.
    #[serde(default)]
    pub qty: i64,
    pub price: Decimal,
    pub side: OrderSide,
    #[serde(default)]
    pub existing: bool,
    #[serde(default)]
    pub commission: Option<Decimal>,
    #[serde(default)]
    pub volume: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn short_position_has_negative_lots() {
        let position: Position = serde_json::from_str(
            r#"{"portfolio":"D39004","symbol":"SBER","exchange":"MOEX","qty":-3,"qtyUnits":-30,"avgPrice":315.2,"isCurrency":false}"#,
        )
        .unwrap();

        assert_eq!(position.lots(), -3);
        assert_eq!(position.qty_units, dec!(-30));
        assert_eq!(position.avg_price, Some(dec!(315.2)));
    }

    #[test]
    fn money_balance_is_a_currency_position() {
        let position: Position = serde_json::from_str(
            r#"{"portfolio":"D39004","symbol":"RUB","exchange":"MOEX","qty":10500.75,"isCurrency":true}"#,
        )
        .unwrap();

        assert!(position.is_currency);
        assert_eq!(position.lots(), 10500);
    }

    #[test]
    fn trade_deserializes() {
        let trade: Trade = serde_json::from_str(
            r#"{"id":"159","orderno":"7271479","symbol":"SBER","exchange":"MOEX","date":"2024-05-30T10:00:00.000Z","board":"TQBR","qtyUnits":10,"qty":1,"price":315.1,"side":"sell","existing":true,"volume":3151}"#,
        )
        .unwrap();

        assert_eq!(trade.order_number.as_deref(), Some("7271479"));
        assert_eq!(trade.side, OrderSide::Sell);
        assert_eq!(trade.volume, Some(dec!(3151)));
    }
}
