//! Shared test utilities and constants.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tungstenite::Message;

use alor::Result;
use alor::websocket::{Dialer, FrameSink, FrameStream};

/// ALOR test-contour REST endpoint.
pub const ALOR_DEV_API_URL: &str = "https://apidev.alor.ru";

/// ALOR test-contour streaming endpoint.
pub const ALOR_DEV_WS_URL: &str = "wss://apidev.alor.ru/ws";

/// Server side of an in-memory streaming connection.
pub struct FakeServer {
    to_client: mpsc::UnboundedSender<std::result::Result<Message, tungstenite::Error>>,
    from_client: mpsc::UnboundedReceiver<Message>,
}

impl FakeServer {
    /// Sends a text frame to the client.
    pub fn push(&self, json: &str) {
        self.to_client
            .unbounded_send(Ok(Message::text(json.to_owned())))
            .expect("client stream dropped");
    }

    /// Next JSON text frame sent by the client.
    pub async fn next_json(&mut self) -> serde_json::Value {
        while let Some(message) = self.from_client.next().await {
            if let Message::Text(text) = message {
                return serde_json::from_str(text.as_str()).expect("client sent invalid JSON");
            }
        }
        panic!("client hung up");
    }
}

/// Dialer that connects every call to a new [`FakeServer`].
pub struct FakeDialer {
    accepted: Mutex<Vec<String>>,
    servers: mpsc::UnboundedSender<FakeServer>,
}

impl FakeDialer {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeServer>) {
        let (servers, rx) = mpsc::unbounded();
        let dialer = Arc::new(Self {
            accepted: Mutex::new(Vec::new()),
            servers,
        });
        (dialer, rx)
    }

    /// URLs dialed so far.
    pub fn dialed(&self) -> Vec<String> {
        self.accepted.lock().clone()
    }
}

#[async_trait]
impl Dialer for FakeDialer {
    async fn dial(&self, url: &str) -> Result<(FrameSink, FrameStream)> {
        self.accepted.lock().push(url.to_string());

        let (to_client, client_rx) = mpsc::unbounded();
        let (client_tx, from_client) = mpsc::unbounded::<Message>();
        let _ = self.servers.unbounded_send(FakeServer {
            to_client,
            from_client,
        });

        let sink = client_tx.sink_map_err(|_| tungstenite::Error::ConnectionClosed);
        Ok((Box::pin(sink), Box::pin(client_rx)))
    }
}
