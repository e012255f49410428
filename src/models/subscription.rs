//! Subscription descriptors sent to the streaming endpoint.

use serde::{Deserialize, Serialize};

use super::{Interval, Opcode, OrderStatus, RedactedToken, ResponseFormat};
use crate::Result;

/// Default server push period for candles, in milliseconds.
pub const CANDLES_DEFAULT_FREQUENCY: u32 = 1000;
/// Default server push period for quotes, in milliseconds.
pub const QUOTES_DEFAULT_FREQUENCY: u32 = 175;
/// Default number of order book levels per side.
pub const ORDER_BOOK_DEFAULT_DEPTH: u32 = 20;

/// One feed request.
///
/// The guid is derived from the opcode, instrument code, timeframe and
/// portfolio when the descriptor is built and never changes afterwards, so
/// every reconnect re-subscribes with the same correlation id. Only the
/// token is replaced before each (re)connect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    pub opcode: Opcode,
    guid: String,
    #[serde(default)]
    token: RedactedToken,
    pub exchange: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tf: Option<Interval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portfolio: Option<String>,
    #[serde(default)]
    pub format: ResponseFormat,
    /// Minimum push period in milliseconds.
    #[serde(default, rename = "freq", skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u32>,
    /// History start, UTC Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_history: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_group: Option<String>,
    /// Sent as a comma-separated list.
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "status_list")]
    pub order_statuses: Vec<OrderStatus>,
}

/// Feed options shared by the convenience constructors of the client.
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// Overrides the configured default exchange.
    pub exchange: Option<String>,
    pub format: ResponseFormat,
    pub frequency: Option<u32>,
    pub from: Option<i64>,
    pub skip_history: Option<bool>,
    pub depth: Option<u32>,
    pub instrument_group: Option<String>,
}

impl SubscriptionRequest {
    /// Builds a bare descriptor for any feed.
    pub fn new(
        opcode: Opcode,
        exchange: impl Into<String>,
        code: Option<String>,
        tf: Option<Interval>,
        portfolio: Option<String>,
    ) -> Self {
        let guid = make_guid(opcode, code.as_deref(), tf, portfolio.as_deref());
        Self {
            opcode,
            guid,
            token: RedactedToken::default(),
            exchange: exchange.into(),
            code,
            tf,
            portfolio,
            format: ResponseFormat::default(),
            frequency: None,
            from: None,
            skip_history: None,
            depth: None,
            instrument_group: None,
            order_statuses: Vec::new(),
        }
    }

    /// Candles for `code` at timeframe `tf`. Live bars only by default.
    pub fn candles(exchange: impl Into<String>, code: impl Into<String>, tf: Interval) -> Self {
        let mut request = Self::new(Opcode::Bars, exchange, Some(code.into()), Some(tf), None);
        request.frequency = Some(CANDLES_DEFAULT_FREQUENCY);
        request.skip_history = Some(true);
        request
    }

    pub fn quotes(exchange: impl Into<String>, code: impl Into<String>) -> Self {
        let mut request = Self::new(Opcode::Quotes, exchange, Some(code.into()), None, None);
        request.frequency = Some(QUOTES_DEFAULT_FREQUENCY);
        request
    }

    /// Order updates of one portfolio.
    pub fn orders(exchange: impl Into<String>, portfolio: impl Into<String>) -> Self {
        Self::new(Opcode::Orders, exchange, None, None, Some(portfolio.into()))
    }

    pub fn order_book(exchange: impl Into<String>, code: impl Into<String>) -> Self {
        let mut request = Self::new(Opcode::OrderBook, exchange, Some(code.into()), None, None);
        request.depth = Some(ORDER_BOOK_DEFAULT_DEPTH);
        request
    }

    /// Applies caller overrides on top of the feed defaults.
    ///
    /// The guid does not depend on any of these fields and is unchanged.
    #[must_use]
    pub fn with_options(mut self, options: SubscribeOptions) -> Self {
        if let Some(exchange) = options.exchange {
            self.exchange = exchange;
        }
        self.format = options.format;
        self.frequency = options.frequency.or(self.frequency);
        self.from = options.from.or(self.from);
        self.skip_history = options.skip_history.or(self.skip_history);
        self.depth = options.depth.or(self.depth);
        self.instrument_group = options.instrument_group.or(self.instrument_group);
        self
    }

    #[must_use]
    pub fn with_order_statuses(mut self, statuses: Vec<OrderStatus>) -> Self {
        self.order_statuses = statuses;
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.set_token(token);
        self
    }

    /// Replaces the bearer token before a (re)connect.
    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = RedactedToken::new(token);
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }

    pub fn token(&self) -> &RedactedToken {
        &self.token
    }

    /// Human-readable subject of the feed: the instrument code or the
    /// portfolio.
    pub fn subject(&self) -> &str {
        self.code
            .as_deref()
            .or(self.portfolio.as_deref())
            .unwrap_or("")
    }

    /// Serializes the subscribe frame.
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Builds the matching unsubscribe frame with the current token.
    pub fn unsubscribe(&self) -> UnsubscribeRequest {
        UnsubscribeRequest {
            opcode: UNSUBSCRIBE_OPCODE.to_string(),
            guid: self.guid.clone(),
            token: self.token.clone(),
        }
    }
}

const UNSUBSCRIBE_OPCODE: &str = "unsubscribe";

/// Cancels a subscription identified by its guid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsubscribeRequest {
    pub opcode: String,
    pub guid: String,
    pub token: RedactedToken,
}

impl UnsubscribeRequest {
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

mod status_list {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::models::OrderStatus;

    pub fn serialize<S: Serializer>(
        statuses: &[OrderStatus],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let joined = statuses
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(",");
        serializer.serialize_str(&joined)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<OrderStatus>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                OrderStatus::parse(s)
                    .ok_or_else(|| D::Error::custom(format!("unknown order status: {s}")))
            })
            .collect()
    }
}

fn make_guid(
    opcode: Opcode,
    code: Option<&str>,
    tf: Option<Interval>,
    portfolio: Option<&str>,
) -> String {
    let mut guid = String::from(opcode.guid_prefix());
    match (code, portfolio) {
        (Some(code), _) => {
            guid.push('|');
            guid.push_str(code);
        }
        (None, Some(portfolio)) => {
            guid.push('|');
            guid.push_str(portfolio);
        }
        (None, None) => {}
    }
    if let Some(tf) = tf {
        guid.push('|');
        guid.push_str(&tf.to_string());
    }
    guid
}
