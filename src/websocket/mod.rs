//! Streaming client for the ALOR WebSocket API.
//!
//! This module is organized by concern:
//! - [`subscription`] - Subscribe/unsubscribe frames
//! - [`handler`] - Incoming frame classification and decoding
//! - [`candle_filter`] - Bar-closed detection for candle feeds
//! - [`connection`] - Per-subscription session with reconnection

pub mod candle_filter;
pub mod connection;
pub mod handler;
pub mod subscription;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{Sink, Stream, StreamExt};
use tokio_tungstenite::{Connector, connect_async_tls_with_config};
use tracing::info;
use tungstenite::Message;

use crate::Result;

pub use candle_filter::CandleAccumulator;
pub use connection::{CloseReason, ConnectionManager, SessionState, SubscriptionHandle};
pub use handler::{Routed, parse_frame, route};
pub use subscription::{send_subscribe, send_unsubscribe};

/// Write half of a streaming connection.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = tungstenite::Error> + Send>>;

/// Read half of a streaming connection.
pub type FrameStream =
    Pin<Box<dyn Stream<Item = std::result::Result<Message, tungstenite::Error>> + Send>>;

/// Opens streaming connections.
///
/// Sessions dial through this trait so tests can substitute in-memory
/// transports for real sockets.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Establishes a connection to `url` and returns its two halves.
    async fn dial(&self, url: &str) -> Result<(FrameSink, FrameStream)>;
}

/// Dials real WebSocket connections over TLS.
#[derive(Clone, Default)]
pub struct WsDialer {
    tls: Option<Arc<rustls::ClientConfig>>,
}

impl WsDialer {
    /// Uses `tls` for the handshake, or the built-in webpki roots when
    /// `None`.
    #[must_use]
    pub fn new(tls: Option<Arc<rustls::ClientConfig>>) -> Self {
        Self { tls }
    }
}

#[async_trait]
impl Dialer for WsDialer {
    async fn dial(&self, url: &str) -> Result<(FrameSink, FrameStream)> {
        let connector = self.tls.clone().map(Connector::Rustls);
        let (ws_stream, _) = connect_async_tls_with_config(url, None, false, connector).await?;
        info!(url, "WebSocket handshake completed");

        let (write, read) = ws_stream.split();
        Ok((Box::pin(write), Box::pin(read)))
    }
}
