//! REST endpoints used alongside the streaming client.
//!
//! Covers market data (server time, securities, quotes, history, order
//! books), account queries (portfolio summary, positions, trades) and
//! order entry/cancellation. Every request carries the current access
//! token as a bearer credential unless the client runs anonymously.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::Result;
use crate::auth::TokenSource;
use crate::error::{AlorError, ApiError};
use crate::models::{
    Candle, History, InstrumentRef, Interval, NewOrder, NewStopOrder, Order, OrderBook,
    OrderResponse, OrderSide, Portfolio, Position, Quote, ResponseFormat, Security, Trade,
};

const ORDER_COMMANDS: &str = "/commandapi/warptrans/TRADE/v2/client/orders";

/// Filters for [`RestClient::get_securities`]. Unset fields are not sent.
#[derive(Debug, Clone, Default)]
pub struct SecuritiesQuery {
    /// Defaults to the client's exchange.
    pub exchange: Option<String>,
    /// Free-text search over ticker and name.
    pub query: Option<String>,
    pub board: Option<String>,
    pub sector: Option<String>,
    /// The server returns 25 entries when unset.
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    /// Include delisted instruments.
    pub include_old: bool,
}

/// Existence check run before opening a subscription.
#[async_trait]
pub trait SecurityLookup: Send + Sync {
    /// Returns the instrument, or `None` if the exchange does not know it.
    async fn find_security(&self, exchange: &str, symbol: &str) -> Result<Option<Security>>;
}

/// Thin wrapper over the ALOR REST API.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    exchange: String,
    tokens: Arc<dyn TokenSource>,
    last_request_id: Arc<AtomicU64>,
}

impl RestClient {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        exchange: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            exchange: exchange.into(),
            tokens,
            last_request_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Default exchange for calls that do not take one.
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Current server time.
    ///
    /// Anonymous callers get the time as of 15 minutes ago.
    pub async fn get_time(&self) -> Result<SystemTime> {
        let response = self.send(self.request(Method::GET, "/md/v2/time")).await?;
        let body = response.text().await?;
        let secs: u64 = body.trim().parse().map_err(|_| {
            AlorError::MalformedMessage(format!("unexpected time response: {body}"))
        })?;
        Ok(UNIX_EPOCH + Duration::from_secs(secs))
    }

    /// Instrument parameters, `None` if the instrument does not exist.
    pub async fn get_security(
        &self,
        exchange: &str,
        symbol: &str,
        board: Option<&str>,
    ) -> Result<Option<Security>> {
        let mut request = self.request(
            Method::GET,
            &format!("/md/v2/Securities/{exchange}/{symbol}"),
        );
        if let Some(board) = board {
            request = request.query(&[("instrumentGroup", board)]);
        }

        let security = self.get_optional(request).await?;
        if security.is_none() {
            debug!(exchange, symbol, "Security not found");
        }
        Ok(security)
    }

    /// Instrument list sorted by traded volume.
    pub async fn get_securities(&self, filter: &SecuritiesQuery) -> Result<Vec<Security>> {
        let exchange = filter.exchange.as_deref().unwrap_or(&self.exchange);
        let mut params: Vec<(&str, String)> = vec![("exchange", exchange.to_string())];
        if let Some(query) = &filter.query {
            params.push(("query", query.clone()));
        }
        if let Some(board) = &filter.board {
            params.push(("instrumentGroup", board.clone()));
        }
        if let Some(sector) = &filter.sector {
            params.push(("sector", sector.clone()));
        }
        if let Some(limit) = filter.limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(offset) = filter.offset {
            params.push(("offset", offset.to_string()));
        }
        if filter.include_old {
            params.push(("includeOld", "true".to_string()));
        }

        let request = self.request(Method::GET, "/md/v2/Securities").query(&params);
        self.get_json(request).await
    }

    /// Quotes for `EXCHANGE:SYMBOL` pairs, e.g. `["MOEX:SBER", "MOEX:GAZP"]`.
    pub async fn get_quotes(&self, symbols: &[&str]) -> Result<Vec<Quote>> {
        let path = format!("/md/v2/Securities/{}/quotes", symbols.join(","));
        self.get_json(self.request(Method::GET, &path)).await
    }

    /// Quote for one instrument on the default exchange.
    pub async fn get_quote(&self, symbol: &str) -> Result<Option<Quote>> {
        let pair = format!("{}:{symbol}", self.exchange);
        let quotes = self.get_quotes(&[pair.as_str()]).await?;
        Ok(quotes.into_iter().next())
    }

    /// Candle history between `from` and `to` (UTC Unix seconds).
    pub async fn get_history(
        &self,
        symbol: &str,
        tf: Interval,
        from: i64,
        to: i64,
    ) -> Result<History> {
        let request = self.request(Method::GET, "/md/v2/history").query(&[
            ("exchange", self.exchange.clone()),
            ("symbol", symbol.to_string()),
            ("tf", tf.to_string()),
            ("from", from.to_string()),
            ("to", to.to_string()),
            ("format", format_name(ResponseFormat::Simple).to_string()),
        ]);
        self.get_json(request).await
    }

    /// Candle history with every bar stamped with `symbol` and `tf`.
    pub async fn get_candles(
        &self,
        symbol: &str,
        tf: Interval,
        from: i64,
        to: i64,
    ) -> Result<Vec<Candle>> {
        let history = self.get_history(symbol, tf, from, to).await?;
        Ok(history
            .candles
            .into_iter()
            .map(|mut candle| {
                candle.symbol = symbol.to_string();
                candle.interval = Some(tf);
                candle
            })
            .collect())
    }

    /// Order book snapshot, up to `depth` levels per side.
    pub async fn get_order_book(&self, symbol: &str, depth: u32) -> Result<OrderBook> {
        let path = format!("/md/v2/orderbooks/{}/{symbol}", self.exchange);
        let request = self
            .request(Method::GET, &path)
            .query(&[("depth", depth)]);
        let mut book: OrderBook = self.get_json(request).await?;
        book.symbol = symbol.to_string();
        Ok(book)
    }

    /// All orders of `portfolio` for the current session.
    pub async fn get_orders(&self, portfolio: &str) -> Result<Vec<Order>> {
        let path = format!("/md/v2/Clients/{}/{portfolio}/orders", self.exchange);
        self.get_json(self.request(Method::GET, &path)).await
    }

    pub async fn get_order(&self, portfolio: &str, order_id: &str) -> Result<Order> {
        let path = format!(
            "/md/v2/Clients/{}/{portfolio}/orders/{order_id}",
            self.exchange
        );
        self.get_json(self.request(Method::GET, &path)).await
    }

    /// Portfolio summary: buying power, valuation, profit.
    pub async fn get_portfolio(&self, portfolio: &str) -> Result<Portfolio> {
        let path = format!("/md/v2/Clients/{}/{portfolio}/summary", self.exchange);
        self.get_json(self.request(Method::GET, &path)).await
    }

    /// All positions of `portfolio`, money balances included.
    pub async fn get_positions(&self, portfolio: &str) -> Result<Vec<Position>> {
        let path = format!("/md/v2/Clients/{}/{portfolio}/positions", self.exchange);
        self.get_json(self.request(Method::GET, &path)).await
    }

    /// Position in one instrument, `None` if nothing is held.
    pub async fn get_position(&self, portfolio: &str, symbol: &str) -> Result<Option<Position>> {
        let path = format!(
            "/md/v2/Clients/{}/{portfolio}/positions/{symbol}",
            self.exchange
        );
        self.get_optional(self.request(Method::GET, &path)).await
    }

    /// Trades of the current session.
    pub async fn get_trades(&self, portfolio: &str) -> Result<Vec<Trade>> {
        let path = format!("/md/v2/Clients/{}/{portfolio}/trades", self.exchange);
        self.get_json(self.request(Method::GET, &path)).await
    }

    /// Submits a market or limit order and returns its order number.
    ///
    /// # Errors
    ///
    /// Returns [`AlorError::Api`] if the broker refuses the order, or
    /// [`AlorError::MalformedMessage`] if the answer has no order number.
    pub async fn place_order(&self, order: &NewOrder) -> Result<String> {
        let path = format!("{ORDER_COMMANDS}/actions/{}", order.action());
        let request = self.request(Method::POST, &path).json(order);
        let order_number = self.submit(request).await?;
        info!(
            order_number = %order_number,
            symbol = %order.instrument.symbol,
            side = ?order.side,
            quantity = order.quantity,
            kind = order.action(),
            "Order placed"
        );
        Ok(order_number)
    }

    /// Submits a stop or stop-limit order and returns its order number.
    pub async fn place_stop_order(&self, order: &NewStopOrder) -> Result<String> {
        let path = format!("{ORDER_COMMANDS}/actions/{}", order.action());
        let request = self.request(Method::POST, &path).json(order);
        let order_number = self.submit(request).await?;
        info!(
            order_number = %order_number,
            symbol = %order.instrument.symbol,
            side = ?order.side,
            trigger = %order.trigger_price,
            kind = order.action(),
            "Stop order placed"
        );
        Ok(order_number)
    }

    /// Buys `lots` of `symbol` on the default exchange at market.
    pub async fn buy_market(&self, portfolio: &str, symbol: &str, lots: i64) -> Result<String> {
        self.place_order(&NewOrder::market(
            OrderSide::Buy,
            self.instrument(symbol),
            portfolio,
            lots,
        ))
        .await
    }

    pub async fn sell_market(&self, portfolio: &str, symbol: &str, lots: i64) -> Result<String> {
        self.place_order(&NewOrder::market(
            OrderSide::Sell,
            self.instrument(symbol),
            portfolio,
            lots,
        ))
        .await
    }

    /// Places a day limit buy order on the default exchange.
    pub async fn buy_limit(
        &self,
        portfolio: &str,
        symbol: &str,
        lots: i64,
        price: Decimal,
    ) -> Result<String> {
        self.place_order(&NewOrder::limit(
            OrderSide::Buy,
            self.instrument(symbol),
            portfolio,
            lots,
            price,
        ))
        .await
    }

    pub async fn sell_limit(
        &self,
        portfolio: &str,
        symbol: &str,
        lots: i64,
        price: Decimal,
    ) -> Result<String> {
        self.place_order(&NewOrder::limit(
            OrderSide::Sell,
            self.instrument(symbol),
            portfolio,
            lots,
            price,
        ))
        .await
    }

    /// Cancels a working order.
    ///
    /// # Errors
    ///
    /// The broker answers `400` when the order is unknown or already
    /// cancelled; that surfaces as [`AlorError::Api`].
    pub async fn cancel_order(&self, portfolio: &str, order_id: &str) -> Result<OrderResponse> {
        let path = format!("{ORDER_COMMANDS}/{order_id}");
        let request = self.request(Method::DELETE, &path).query(&[
            ("exchange", self.exchange.as_str()),
            ("portfolio", portfolio),
            ("stop", "false"),
            ("jsonResponse", "true"),
        ]);
        let response: OrderResponse = self.get_json(request).await?;
        debug!(order_id, ?response, "Order cancelled");
        Ok(response)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}{path}", self.base_url))
    }

    fn instrument(&self, symbol: &str) -> InstrumentRef {
        InstrumentRef::new(self.exchange.clone(), symbol)
    }

    /// Unique, increasing id for `X-ALOR-REQID`: nanoseconds since the
    /// epoch, bumped when two commands share a timestamp. The broker
    /// answers a repeated id with the first response instead of
    /// executing again.
    fn next_request_id(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or_default();
        let bumped = self
            .last_request_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| {
                Some(now.max(last + 1))
            });
        match bumped {
            Ok(last) | Err(last) => now.max(last + 1),
        }
    }

    /// Sends an order command and extracts the order number.
    async fn submit(&self, request: RequestBuilder) -> Result<String> {
        let request = request.header("X-ALOR-REQID", self.next_request_id().to_string());
        let response: OrderResponse = self.get_json(request).await?;
        response.order_number.ok_or_else(|| {
            AlorError::MalformedMessage(format!(
                "order response without order number: {:?}",
                response.message
            ))
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        Ok(self.send(request).await?.json().await?)
    }

    /// Like [`get_json`](Self::get_json), mapping `404` to `None`.
    async fn get_optional<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Option<T>> {
        match self.send(request).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(AlorError::Api(ApiError { status, .. }))
                if status == StatusCode::NOT_FOUND.as_u16() =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Attaches the bearer token and maps non-2xx answers to
    /// [`AlorError::Api`].
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let token = self.tokens.token().await?;
        let request = if token.is_empty() {
            request
        } else {
            request.bearer_auth(token)
        };

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(ApiError {
            status: status.as_u16(),
            message,
            request_guid: None,
        }
        .into())
    }
}

#[async_trait]
impl SecurityLookup for RestClient {
    async fn find_security(&self, exchange: &str, symbol: &str) -> Result<Option<Security>> {
        self.get_security(exchange, symbol, None).await
    }
}

fn format_name(format: ResponseFormat) -> &'static str {
    match format {
        ResponseFormat::Simple => "Simple",
        ResponseFormat::Slim => "Slim",
        ResponseFormat::Heavy => "Heavy",
    }
}
