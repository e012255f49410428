//! High-level client tying the REST API, token management and streaming
//! subscriptions together.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Result;
use crate::auth::{OAuthRefresher, TokenProvider, TokenSource};
use crate::config::AlorConfig;
use crate::error::AlorError;
use crate::events::EventBus;
use crate::models::{Interval, SubscribeOptions, SubscriptionRequest};
use crate::rest::{RestClient, SecurityLookup};
use crate::tls;
use crate::websocket::{ConnectionManager, Dialer, SubscriptionHandle, WsDialer};

/// Entry point of the library.
///
/// Each `subscribe_*` call checks that the instrument exists, then opens a
/// dedicated streaming session that delivers decoded events to
/// [`events`](Self::events). [`shutdown`](Self::shutdown) closes every
/// session opened through this client.
pub struct AlorClient {
    config: AlorConfig,
    tokens: Arc<TokenProvider>,
    rest: RestClient,
    securities: Arc<dyn SecurityLookup>,
    events: EventBus,
    connections: ConnectionManager,
    shutdown: CancellationToken,
}

impl AlorClient {
    /// Builds a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`AlorError::Tls`] if the configured CA bundle cannot be
    /// loaded, or [`AlorError::Http`] if the HTTP client cannot be built.
    pub fn new(config: AlorConfig) -> Result<Self> {
        let tls = tls::load_optional(config.ca_bundle.as_deref())?;

        let mut http = reqwest::Client::builder();
        if let Some(tls) = &tls {
            http = http.use_preconfigured_tls((**tls).clone());
        }
        let http = http.build()?;

        let refresher = Arc::new(OAuthRefresher::new(http.clone(), config.oauth_url.clone()));
        let tokens = Arc::new(TokenProvider::new(config.refresh_token.clone(), refresher));
        if tokens.is_anonymous() {
            warn!("No refresh token configured, running in anonymous mode");
        }

        let rest = RestClient::new(
            http,
            config.api_url.clone(),
            config.exchange.clone(),
            tokens.clone(),
        );

        Ok(Self::with_parts(
            config,
            tokens,
            rest.clone(),
            Arc::new(rest),
            Arc::new(WsDialer::new(tls)),
        ))
    }

    /// Builds a client from explicit collaborators.
    pub fn with_parts(
        config: AlorConfig,
        tokens: Arc<TokenProvider>,
        rest: RestClient,
        securities: Arc<dyn SecurityLookup>,
        dialer: Arc<dyn Dialer>,
    ) -> Self {
        let events = EventBus::new();
        let token_source: Arc<dyn TokenSource> = tokens.clone();
        let connections = ConnectionManager::new(
            dialer,
            token_source,
            events.clone(),
            config.stream.clone(),
        );

        Self {
            config,
            tokens,
            rest,
            securities,
            events,
            connections,
            shutdown: CancellationToken::new(),
        }
    }

    /// Event registry shared by every subscription of this client.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    pub fn config(&self) -> &AlorConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenProvider {
        &self.tokens
    }

    /// Streams closed candles of `symbol` at timeframe `tf`.
    ///
    /// # Errors
    ///
    /// Returns [`AlorError::InstrumentNotFound`] if the instrument does not
    /// exist, or the session's connection error.
    pub async fn subscribe_candles(
        &self,
        symbol: &str,
        tf: Interval,
        options: SubscribeOptions,
    ) -> Result<SubscriptionHandle> {
        let exchange = self.exchange_for(&options);
        self.ensure_exists(&exchange, symbol).await?;
        let request = SubscriptionRequest::candles(exchange, symbol, tf).with_options(options);
        self.subscribe(request).await
    }

    pub async fn subscribe_quotes(
        &self,
        symbol: &str,
        options: SubscribeOptions,
    ) -> Result<SubscriptionHandle> {
        let exchange = self.exchange_for(&options);
        self.ensure_exists(&exchange, symbol).await?;
        let request = SubscriptionRequest::quotes(exchange, symbol).with_options(options);
        self.subscribe(request).await
    }

    pub async fn subscribe_order_book(
        &self,
        symbol: &str,
        options: SubscribeOptions,
    ) -> Result<SubscriptionHandle> {
        let exchange = self.exchange_for(&options);
        self.ensure_exists(&exchange, symbol).await?;
        let request = SubscriptionRequest::order_book(exchange, symbol).with_options(options);
        self.subscribe(request).await
    }

    /// Streams order updates of `portfolio`. Requires credentials.
    pub async fn subscribe_orders(
        &self,
        portfolio: &str,
        options: SubscribeOptions,
    ) -> Result<SubscriptionHandle> {
        if self.tokens.is_anonymous() {
            return Err(AlorError::Auth(
                "order updates require a refresh token".into(),
            ));
        }
        let exchange = self.exchange_for(&options);
        let request = SubscriptionRequest::orders(exchange, portfolio).with_options(options);
        self.subscribe(request).await
    }

    /// Opens a session for a prepared descriptor without any existence
    /// check.
    pub async fn subscribe(&self, request: SubscriptionRequest) -> Result<SubscriptionHandle> {
        let handle = self.connections.connect(request, &self.shutdown).await?;
        info!(guid = handle.guid(), opcode = %handle.opcode(), "Subscription started");
        Ok(handle)
    }

    /// Closes every session opened through this client.
    pub fn shutdown(&self) {
        info!("Shutting down client");
        self.shutdown.cancel();
    }

    fn exchange_for(&self, options: &SubscribeOptions) -> String {
        options
            .exchange
            .clone()
            .unwrap_or_else(|| self.config.exchange.clone())
    }

    async fn ensure_exists(&self, exchange: &str, symbol: &str) -> Result<()> {
        match self.securities.find_security(exchange, symbol).await? {
            Some(_) => Ok(()),
            None => Err(AlorError::InstrumentNotFound {
                exchange: exchange.to_string(),
                symbol: symbol.to_string(),
            }),
        }
    }
}

impl Drop for AlorClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::auth::TokenRefresher;
    use crate::models::Security;
    use crate::websocket::{FrameSink, FrameStream};

    struct NoSecurities;

    #[async_trait]
    impl SecurityLookup for NoSecurities {
        async fn find_security(&self, _exchange: &str, _symbol: &str) -> Result<Option<Security>> {
            Ok(None)
        }
    }

    struct NeverDial;

    #[async_trait]
    impl Dialer for NeverDial {
        async fn dial(&self, _url: &str) -> Result<(FrameSink, FrameStream)> {
            panic!("no dial expected");
        }
    }

    struct NoRefresh;

    #[async_trait]
    impl TokenRefresher for NoRefresh {
        async fn refresh(&self, _refresh_token: &str) -> Result<String> {
            Err(AlorError::Auth("unused".into()))
        }
    }

    fn client() -> AlorClient {
        let config = AlorConfig::new(crate::config::Environment::Test);
        let tokens = Arc::new(TokenProvider::new(None, Arc::new(NoRefresh)));
        let rest = RestClient::new(
            reqwest::Client::new(),
            config.api_url.clone(),
            config.exchange.clone(),
            tokens.clone(),
        );
        AlorClient::with_parts(config, tokens, rest, Arc::new(NoSecurities), Arc::new(NeverDial))
    }

    #[tokio::test]
    async fn unknown_instrument_is_rejected_before_dialing() {
        let err = client()
            .subscribe_candles("NOPE", Interval::M1, SubscribeOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AlorError::InstrumentNotFound { ref exchange, ref symbol }
                if exchange == "MOEX" && symbol == "NOPE"
        ));
    }

    #[tokio::test]
    async fn order_feed_requires_credentials() {
        let err = client()
            .subscribe_orders("D39004", SubscribeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AlorError::Auth(_)));
    }

    #[test]
    fn options_can_override_the_exchange() {
        let client = client();
        let options = SubscribeOptions {
            exchange: Some("SPBX".into()),
            ..Default::default()
        };
        assert_eq!(client.exchange_for(&options), "SPBX");
        assert_eq!(client.exchange_for(&SubscribeOptions::default()), "MOEX");
    }
}
