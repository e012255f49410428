//! Crate-level error types.
//!
//! [`AlorError`] unifies every error source (configuration, WebSocket,
//! HTTP, JSON, broker rejections) behind a single enum so callers can
//! match on the variant they care about while still using the `?`
//! operator for easy propagation.

use std::fmt;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AlorError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum AlorError {
    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// A WebSocket operation (connect, send, receive) failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// An HTTP request failed before a response was received.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// TLS configuration could not be built.
    #[error("tls error: {0}")]
    Tls(String),

    /// A frame or response body did not have the expected shape.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The broker answered with a non-success status.
    #[error("api error: {0}")]
    Api(ApiError),

    /// The access token could not be refreshed.
    #[error("authentication error: {0}")]
    Auth(String),

    /// The instrument requested for a subscription does not exist.
    #[error("instrument {symbol} not found on {exchange}")]
    InstrumentNotFound { exchange: String, symbol: String },

    /// The client was shut down before the operation started.
    #[error("client is shut down")]
    Shutdown,
}

/// A broker-side rejection: an HTTP status plus the message that came
/// with it.
///
/// Produced both by REST calls and by streaming control frames
/// (`httpCode` / `message` / `requestGuid`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: u16,
    pub message: String,
    /// Correlation guid echoed by the streaming endpoint, if any.
    pub request_guid: Option<String>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.request_guid {
            Some(guid) => write!(
                f,
                "status {} for request {guid}: {}",
                self.status, self.message
            ),
            None => write!(f, "status {}: {}", self.status, self.message),
        }
    }
}

impl From<ApiError> for AlorError {
    fn from(err: ApiError) -> Self {
        Self::Api(err)
    }
}
