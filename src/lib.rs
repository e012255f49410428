//! ALOR brokerage client library.
//!
//! Provides typed models, REST calls and self-healing WebSocket
//! subscriptions for ALOR market data (candles, quotes, order books) and
//! order updates. Decoded events are fanned out through an [`EventBus`].

pub mod auth;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod models;
pub mod rest;
pub mod tls;
pub mod websocket;

pub use client::AlorClient;
pub use error::{AlorError, ApiError, Result};
pub use events::{EventBus, EventKind, StreamEvent};
