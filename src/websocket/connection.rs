//! Subscription session lifecycle.
//!
//! [`ConnectionManager::connect`] opens one socket per subscription, sends
//! the subscribe frame and spawns two tasks:
//!
//! - a reader that decodes frames, feeds candles through the
//!   [`CandleAccumulator`] and publishes events on the [`EventBus`];
//! - a supervisor that waits for reconnect requests, sleeps the cool-down,
//!   re-dials with a fresh token and re-sends the subscribe frame with the
//!   same guid, retrying until the session is cancelled.
//!
//! The reader signals the supervisor through a single-slot channel, so at
//! most one reconnect is ever pending. A control frame with `httpCode >=
//! 400` closes the session for good.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tungstenite::Message;

use super::candle_filter::CandleAccumulator;
use super::handler::{Routed, parse_frame, route};
use super::subscription::{send_subscribe, send_unsubscribe};
use super::{Dialer, FrameSink, FrameStream};
use crate::Result;
use crate::auth::TokenSource;
use crate::config::StreamConfig;
use crate::error::{AlorError, ApiError};
use crate::events::{EventBus, StreamEvent};
use crate::models::{Opcode, SubscriptionRequest};

/// Upper bound for the unsubscribe and close frames sent on shutdown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Ping periods without any inbound frame before the socket is
/// considered dead.
const STALE_AFTER_PINGS: u32 = 2;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// [`SubscriptionHandle::close`] was called.
    Requested,
    /// The client (or another parent token) was shut down.
    Cancelled,
    /// The server refused the subscription.
    Rejected(ApiError),
}

/// Observable state of a subscription session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Dialing and sending the subscribe frame.
    Connecting,
    /// Subscribe frame sent, no data received yet on this connection.
    Subscribed,
    /// Data is flowing.
    Streaming,
    /// The connection failed; waiting for the cool-down to reconnect.
    ReconnectPending,
    Closed(CloseReason),
}

impl SessionState {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

/// Opens subscription sessions with a shared dialer, token source and
/// event bus.
#[derive(Clone)]
pub struct ConnectionManager {
    dialer: Arc<dyn Dialer>,
    tokens: Arc<dyn TokenSource>,
    events: EventBus,
    config: StreamConfig,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(
        dialer: Arc<dyn Dialer>,
        tokens: Arc<dyn TokenSource>,
        events: EventBus,
        config: StreamConfig,
    ) -> Self {
        Self {
            dialer,
            tokens,
            events,
            config,
        }
    }

    /// Opens a session for `request`.
    ///
    /// The first dial, token fetch and subscribe frame happen before this
    /// returns; any failure is reported to the caller and nothing is
    /// spawned. Afterwards the session reconnects on its own until it is
    /// closed through the handle or `parent` is cancelled.
    ///
    /// Each session costs one socket and two tasks.
    ///
    /// # Errors
    ///
    /// Returns [`AlorError::Shutdown`] if `parent` is already cancelled,
    /// otherwise an [`AlorError`] if the token cannot be obtained, the dial
    /// fails or the subscribe frame cannot be sent.
    pub async fn connect(
        &self,
        request: SubscriptionRequest,
        parent: &CancellationToken,
    ) -> Result<SubscriptionHandle> {
        if parent.is_cancelled() {
            return Err(AlorError::Shutdown);
        }
        let (write, read, live) = self.open(&request).await?;
        let (handle, _trigger) = self.spawn_session(request, parent, write, read, live);
        Ok(handle)
    }

    /// Spawns the reader and supervisor for an already subscribed
    /// connection. Also returns the session's reconnect trigger.
    fn spawn_session(
        &self,
        request: SubscriptionRequest,
        parent: &CancellationToken,
        write: FrameSink,
        read: FrameStream,
        live: SubscriptionRequest,
    ) -> (SubscriptionHandle, mpsc::Sender<()>) {
        let (state_tx, state_rx) = watch::channel(SessionState::Subscribed);
        let shared = Arc::new(Shared {
            guid: request.guid().to_string(),
            opcode: request.opcode,
            cancel: parent.child_token(),
            state: state_tx,
            close_reason: Mutex::new(None),
            accumulator: Mutex::new(CandleAccumulator::new()),
            events: self.events.clone(),
        });

        let (reconnect_tx, reconnect_rx) = mpsc::channel(1);
        let reader = tokio::spawn(read_loop(
            Arc::clone(&shared),
            write,
            read,
            live,
            reconnect_tx.clone(),
            self.config.ping_interval,
        ));
        tokio::spawn(supervise(
            self.clone(),
            Arc::clone(&shared),
            request,
            reconnect_tx.clone(),
            reconnect_rx,
            reader,
        ));

        (SubscriptionHandle { shared, state_rx }, reconnect_tx)
    }

    /// Dials, authenticates and subscribes. Returns the connection and the
    /// request stamped with the token that was sent.
    async fn open(
        &self,
        request: &SubscriptionRequest,
    ) -> Result<(FrameSink, FrameStream, SubscriptionRequest)> {
        info!(
            url = %self.config.websocket_url,
            guid = request.guid(),
            "Connecting to WebSocket"
        );
        let (mut write, read) = self.dialer.dial(&self.config.websocket_url).await?;

        let token = self.tokens.token().await?;
        let mut live = request.clone();
        live.set_token(token);

        send_subscribe(&mut write, &live).await?;
        Ok((write, read, live))
    }
}

/// State shared by a session's reader, supervisor and handle.
struct Shared {
    guid: String,
    opcode: Opcode,
    cancel: CancellationToken,
    state: watch::Sender<SessionState>,
    close_reason: Mutex<Option<CloseReason>>,
    /// Survives reconnects so a bar formed before a drop still closes.
    accumulator: Mutex<CandleAccumulator>,
    events: EventBus,
}

impl Shared {
    /// Moves to `next` unless the session already reached a terminal state.
    fn set_state(&self, next: SessionState) {
        self.state.send_if_modified(|current| {
            if current.is_closed() || *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    /// Records `reason` unless another reason was recorded first, then
    /// cancels the session. Returns `false` if it was already cancelled.
    fn close_with(&self, reason: CloseReason) -> bool {
        let mut slot = self.close_reason.lock();
        if self.cancel.is_cancelled() {
            return false;
        }
        slot.get_or_insert(reason);
        self.cancel.cancel();
        true
    }

    fn request_reconnect(&self, reconnect_tx: &mpsc::Sender<()>) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.set_state(SessionState::ReconnectPending);
        // A full slot means a reconnect is already pending.
        let _ = reconnect_tx.try_send(());
    }

    /// Handles one text frame. Returns the rejection if the server refused
    /// the subscription.
    fn handle_text(&self, text: &str, request: &SubscriptionRequest) -> Option<ApiError> {
        let routed = match parse_frame(text).and_then(|frame| route(frame, request)) {
            Ok(routed) => routed,
            Err(e) => {
                warn!(guid = %self.guid, error = %e, "Dropping undecodable frame");
                return None;
            }
        };

        let event = match routed {
            Routed::Ack => return None,
            Routed::Rejected(err) => return Some(err),
            Routed::Unsupported(opcode) => {
                debug!(guid = %self.guid, %opcode, "No decoder for feed, frame dropped");
                return None;
            }
            Routed::Candle(candle) => {
                self.set_state(SessionState::Streaming);
                let closed = self.accumulator.lock().push(candle);
                match closed {
                    Some(candle) => StreamEvent::CandleClosed(candle),
                    None => return None,
                }
            }
            Routed::Quote(quote) => StreamEvent::Quote(quote),
            Routed::Order(order) => StreamEvent::Order(order),
            Routed::OrderBook(book) => StreamEvent::OrderBook(book),
        };

        self.set_state(SessionState::Streaming);
        self.events.publish(&event);
        None
    }
}

/// Caller-side view of a running session.
///
/// Dropping the handle does not close the session; call
/// [`close`](Self::close) or cancel the parent token.
pub struct SubscriptionHandle {
    shared: Arc<Shared>,
    state_rx: watch::Receiver<SessionState>,
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("guid", &self.shared.guid)
            .field("opcode", &self.shared.opcode)
            .finish_non_exhaustive()
    }
}

impl SubscriptionHandle {
    pub fn guid(&self) -> &str {
        &self.shared.guid
    }

    pub fn opcode(&self) -> Opcode {
        self.shared.opcode
    }

    /// Current state of the session.
    pub fn state(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    /// A receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state_rx.borrow().is_closed()
    }

    /// Closes the session: the reader sends a best-effort unsubscribe and
    /// close frame, both tasks exit.
    ///
    /// Returns `false` if the session was already closed or closing.
    pub fn close(&self) -> bool {
        let closed = self.shared.close_with(CloseReason::Requested);
        if closed {
            info!(guid = %self.shared.guid, "Closing subscription");
        }
        closed
    }

    /// Waits until the session reaches its terminal state and returns why.
    pub async fn closed(&self) -> CloseReason {
        let mut rx = self.state_rx.clone();
        let reason = match rx.wait_for(SessionState::is_closed).await {
            Ok(state) => match &*state {
                SessionState::Closed(reason) => reason.clone(),
                _ => CloseReason::Cancelled,
            },
            Err(_) => CloseReason::Cancelled,
        };
        reason
    }
}

/// Reads frames until cancellation, rejection or a transport failure.
async fn read_loop(
    shared: Arc<Shared>,
    mut write: FrameSink,
    mut read: FrameStream,
    request: SubscriptionRequest,
    reconnect_tx: mpsc::Sender<()>,
    ping_interval: Option<Duration>,
) {
    let mut ping = ping_interval.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });
    let stale_after = ping_interval.map(|period| period * STALE_AFTER_PINGS);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            () = shared.cancel.cancelled() => {
                close_socket(&mut write, &request, true).await;
                return;
            }

            () = tick(&mut ping) => {
                if let Some(limit) = stale_after
                    && last_seen.elapsed() >= limit
                {
                    warn!(
                        guid = %shared.guid,
                        silent_secs = last_seen.elapsed().as_secs(),
                        "No frames from server, dropping stale connection"
                    );
                    shared.request_reconnect(&reconnect_tx);
                    return;
                }
                if let Err(e) = write.send(Message::Ping(Default::default())).await {
                    warn!(guid = %shared.guid, error = %e, "Keep-alive ping failed");
                    shared.request_reconnect(&reconnect_tx);
                    return;
                }
            }

            msg = read.next() => {
                if matches!(msg, Some(Ok(_))) {
                    last_seen = Instant::now();
                }
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(err) = shared.handle_text(text.as_str(), &request) {
                            error!(
                                guid = %shared.guid,
                                status = err.status,
                                message = %err.message,
                                "Subscription rejected"
                            );
                            shared.close_with(CloseReason::Rejected(err));
                            close_socket(&mut write, &request, false).await;
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        warn!(guid = %shared.guid, ?frame, "Server closed the connection");
                        shared.request_reconnect(&reconnect_tx);
                        return;
                    }
                    Some(Ok(_)) => {} // Binary/Ping/Pong frames
                    Some(Err(e)) => {
                        warn!(guid = %shared.guid, error = %e, "WebSocket error");
                        shared.request_reconnect(&reconnect_tx);
                        return;
                    }
                    None => {
                        warn!(guid = %shared.guid, "WebSocket stream ended");
                        shared.request_reconnect(&reconnect_tx);
                        return;
                    }
                }
            }
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Sends the unsubscribe (optionally) and close frames, bounded by
/// [`CLOSE_TIMEOUT`].
async fn close_socket(write: &mut FrameSink, request: &SubscriptionRequest, unsubscribe: bool) {
    let goodbye = async {
        if unsubscribe {
            send_unsubscribe(write, request).await?;
        }
        write.send(Message::Close(None)).await?;
        Ok::<(), AlorError>(())
    };

    match tokio::time::timeout(CLOSE_TIMEOUT, goodbye).await {
        Ok(Ok(())) => debug!(guid = request.guid(), "WebSocket closed"),
        Ok(Err(e)) => debug!(guid = request.guid(), error = %e, "Close handshake failed"),
        Err(_) => debug!(guid = request.guid(), "Close handshake timed out"),
    }
}

/// Reconnects the session whenever the reader asks for it.
async fn supervise(
    manager: ConnectionManager,
    shared: Arc<Shared>,
    request: SubscriptionRequest,
    reconnect_tx: mpsc::Sender<()>,
    mut reconnect_rx: mpsc::Receiver<()>,
    reader: JoinHandle<()>,
) {
    let cooldown = manager.config.reconnect_cooldown;
    let mut reader = Some(reader);

    loop {
        tokio::select! {
            () = shared.cancel.cancelled() => break,

            Some(()) = reconnect_rx.recv() => {
                // The reader requests a reconnect right before it exits.
                if let Some(handle) = reader.take() {
                    let _ = handle.await;
                }
                // Requests raised while the reader shut down belong to this
                // same reconnect.
                while reconnect_rx.try_recv().is_ok() {}

                info!(
                    guid = %shared.guid,
                    cooldown_secs = cooldown.as_secs(),
                    "Connection lost, reconnecting after cool-down"
                );
                tokio::select! {
                    () = shared.cancel.cancelled() => break,
                    () = tokio::time::sleep(cooldown) => {}
                }

                shared.set_state(SessionState::Connecting);
                let opened = tokio::select! {
                    () = shared.cancel.cancelled() => break,
                    opened = manager.open(&request) => opened,
                };

                match opened {
                    Ok((write, read, live)) => {
                        shared.set_state(SessionState::Subscribed);
                        info!(guid = %shared.guid, "Reconnected and resubscribed");
                        reader = Some(tokio::spawn(read_loop(
                            Arc::clone(&shared),
                            write,
                            read,
                            live,
                            reconnect_tx.clone(),
                            manager.config.ping_interval,
                        )));
                    }
                    Err(e) => {
                        warn!(guid = %shared.guid, error = %e, "Reconnect attempt failed");
                        shared.request_reconnect(&reconnect_tx);
                    }
                }
            }
        }
    }

    if let Some(handle) = reader.take() {
        let _ = handle.await;
    }

    let reason = shared
        .close_reason
        .lock()
        .take()
        .unwrap_or(CloseReason::Cancelled);
    info!(guid = %shared.guid, ?reason, "Subscription closed");
    shared.state.send_replace(SessionState::Closed(reason));
}
