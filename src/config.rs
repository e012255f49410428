//! Client configuration.
//!
//! [`AlorConfig`] is an explicit value passed to
//! [`AlorClient::new`](crate::client::AlorClient::new); nothing in the
//! crate reads ambient global state. [`fetch_config`] builds one from
//! environment variables:
//!
//! - `ALOR_REFRESH_TOKEN`: refresh token used to obtain access tokens
//!   (optional; without it the client runs in anonymous mode)
//! - `ALOR_ENVIRONMENT`: `production` (default) or `test`
//! - `ALOR_EXCHANGE`: default exchange code, `MOEX` if unset
//! - `ALOR_CA_BUNDLE`: optional PEM file with trusted CA roots
//! - `ALOR_RECONNECT_COOLDOWN_SECS`: delay before a reconnect attempt

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use zeroize::Zeroizing;

/// Exchange used when none is configured.
pub const DEFAULT_EXCHANGE: &str = "MOEX";

/// Delay between a transport failure and the next reconnect attempt.
pub const DEFAULT_RECONNECT_COOLDOWN: Duration = Duration::from_secs(10);

/// Interval between keep-alive pings on an idle stream.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Which broker contour the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Live trading contour.
    #[default]
    Production,
    /// Sandbox contour with test accounts.
    Test,
}

impl Environment {
    /// Base URL of the REST API.
    pub fn api_url(self) -> &'static str {
        match self {
            Self::Production => "https://api.alor.ru",
            Self::Test => "https://apidev.alor.ru",
        }
    }

    /// Base URL of the OAuth token service.
    pub fn oauth_url(self) -> &'static str {
        match self {
            Self::Production => "https://oauth.alor.ru",
            Self::Test => "https://oauthdev.alor.ru",
        }
    }

    /// Streaming endpoint.
    pub fn websocket_url(self) -> &'static str {
        match self {
            Self::Production => "wss://api.alor.ru/ws",
            Self::Test => "wss://apidev.alor.ru/ws",
        }
    }

    fn parse(value: &str) -> crate::Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "test" | "dev" => Ok(Self::Test),
            other => Err(crate::AlorError::Config(format!(
                "unknown ALOR_ENVIRONMENT value: {other}"
            ))),
        }
    }
}

/// Streaming session tuning shared by every subscription.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub websocket_url: String,
    pub reconnect_cooldown: Duration,
    /// `None` disables keep-alive pings.
    pub ping_interval: Option<Duration>,
}

impl StreamConfig {
    /// Stream settings for the given endpoint with default timings.
    #[must_use]
    pub fn new(websocket_url: impl Into<String>) -> Self {
        Self {
            websocket_url: websocket_url.into(),
            reconnect_cooldown: DEFAULT_RECONNECT_COOLDOWN,
            ping_interval: Some(DEFAULT_PING_INTERVAL),
        }
    }
}

/// Top-level client configuration.
#[derive(Clone)]
pub struct AlorConfig {
    pub environment: Environment,
    pub api_url: String,
    pub oauth_url: String,
    pub exchange: String,
    pub refresh_token: Option<Zeroizing<String>>,
    pub ca_bundle: Option<PathBuf>,
    pub stream: StreamConfig,
}

impl AlorConfig {
    /// Configuration for `environment` with default endpoints and no
    /// credentials.
    #[must_use]
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            api_url: environment.api_url().to_string(),
            oauth_url: environment.oauth_url().to_string(),
            exchange: DEFAULT_EXCHANGE.to_string(),
            refresh_token: None,
            ca_bundle: None,
            stream: StreamConfig::new(environment.websocket_url()),
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(Zeroizing::new(token.into()));
        self
    }

    #[must_use]
    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    /// Returns `true` if a refresh token is configured.
    pub fn has_credentials(&self) -> bool {
        self.refresh_token.as_ref().is_some_and(|t| !t.is_empty())
    }
}

impl fmt::Debug for AlorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlorConfig")
            .field("environment", &self.environment)
            .field("api_url", &self.api_url)
            .field("oauth_url", &self.oauth_url)
            .field("exchange", &self.exchange)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("ca_bundle", &self.ca_bundle)
            .field("stream", &self.stream)
            .finish()
    }
}

/// Loads the client configuration from environment variables.
///
/// # Errors
///
/// Returns [`AlorError::Config`](crate::AlorError::Config) if
/// `ALOR_ENVIRONMENT` or `ALOR_RECONNECT_COOLDOWN_SECS` hold values that
/// cannot be parsed.
pub fn fetch_config() -> crate::Result<AlorConfig> {
    let environment = match non_empty_var("ALOR_ENVIRONMENT") {
        Some(value) => Environment::parse(&value)?,
        None => Environment::default(),
    };

    let mut config = AlorConfig::new(environment);

    if let Some(token) = non_empty_var("ALOR_REFRESH_TOKEN") {
        config.refresh_token = Some(Zeroizing::new(token));
    }
    if let Some(exchange) = non_empty_var("ALOR_EXCHANGE") {
        config.exchange = exchange;
    }
    config.ca_bundle = non_empty_var("ALOR_CA_BUNDLE").map(PathBuf::from);

    if let Some(secs) = non_empty_var("ALOR_RECONNECT_COOLDOWN_SECS") {
        let secs: u64 = secs.parse().map_err(|_| {
            crate::AlorError::Config(format!(
                "ALOR_RECONNECT_COOLDOWN_SECS is not a number of seconds: {secs}"
            ))
        })?;
        config.stream.reconnect_cooldown = Duration::from_secs(secs);
    }

    Ok(config)
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}
