//! Typed fan-out of decoded stream events.
//!
//! [`EventBus`] keeps, per [`EventKind`], the handlers registered for it
//! and invokes them synchronously, in registration order, on the task that
//! decoded the event. A handler that panics is logged and skipped; the
//! remaining handlers still run.
//!
//! [`EventBus::stream`] offers a pull-based alternative: an
//! [`EventStream`] backed by an unbounded channel that unregisters itself
//! when dropped.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::models::{Candle, Order, OrderBook, Quote};

/// Kinds of events a handler can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A candle that will not change any more.
    CandleClosed,
    Quote,
    Order,
    OrderBook,
}

/// A decoded event ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    CandleClosed(Candle),
    Quote(Quote),
    Order(Order),
    OrderBook(OrderBook),
}

impl StreamEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::CandleClosed(_) => EventKind::CandleClosed,
            Self::Quote(_) => EventKind::Quote,
            Self::Order(_) => EventKind::Order,
            Self::OrderBook(_) => EventKind::OrderBook,
        }
    }
}

/// Identifies a registered handler for [`EventBus::unregister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<(HandlerId, Handler)>>,
}

/// Per-client registry of event handlers. Cheap to clone; clones share
/// the registry.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<RwLock<Registry>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` to the list for `kind`.
    pub fn register<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.write();
        registry.next_id += 1;
        let id = HandlerId(registry.next_id);
        registry
            .handlers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Removes a handler. Returns `false` if it was not registered.
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut registry = self.registry.write();
        for handlers in registry.handlers.values_mut() {
            if let Some(pos) = handlers.iter().position(|(h, _)| *h == id) {
                handlers.remove(pos);
                return true;
            }
        }
        false
    }

    /// Number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.registry
            .read()
            .handlers
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Delivers `event` to every handler of its kind and returns how many
    /// handlers completed without panicking.
    ///
    /// Handlers run on a snapshot of the list, so registering or
    /// unregistering from inside a handler is allowed and takes effect
    /// from the next event.
    pub fn publish(&self, event: &StreamEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<(HandlerId, Handler)> = self
            .registry
            .read()
            .handlers
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        if snapshot.is_empty() {
            debug!(?kind, "No handlers registered, event dropped");
            return 0;
        }

        let mut delivered = 0;
        for (id, handler) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => delivered += 1,
                Err(_) => error!(?kind, handler = id.0, "Event handler panicked"),
            }
        }
        delivered
    }

    /// Returns a stream of every event of `kind` published from now on.
    pub fn stream(&self, kind: EventKind) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.register(kind, move |event| {
            let _ = tx.send(event.clone());
        });
        EventStream {
            rx,
            id,
            bus: self.clone(),
        }
    }

    pub fn on_candle_closed<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&Candle) + Send + Sync + 'static,
    {
        self.register(EventKind::CandleClosed, move |event| {
            if let StreamEvent::CandleClosed(candle) = event {
                handler(candle);
            }
        })
    }

    pub fn on_quote<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&Quote) + Send + Sync + 'static,
    {
        self.register(EventKind::Quote, move |event| {
            if let StreamEvent::Quote(quote) = event {
                handler(quote);
            }
        })
    }

    pub fn on_order<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&Order) + Send + Sync + 'static,
    {
        self.register(EventKind::Order, move |event| {
            if let StreamEvent::Order(order) = event {
                handler(order);
            }
        })
    }

    pub fn on_order_book<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&OrderBook) + Send + Sync + 'static,
    {
        self.register(EventKind::OrderBook, move |event| {
            if let StreamEvent::OrderBook(book) = event {
                handler(book);
            }
        })
    }
}

/// Channel-backed event subscription created by [`EventBus::stream`].
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
    id: HandlerId,
    bus: EventBus,
}

impl EventStream {
    /// Waits for the next event.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }
}

impl Stream for EventStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.bus.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

    use super::*;

    fn quote(symbol: &str) -> StreamEvent {
        StreamEvent::Quote(Quote {
            symbol: symbol.into(),
            last_price: Some(dec!(100)),
            ..Default::default()
        })
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        for name in ["A", "B", "C"] {
            let calls = Arc::clone(&calls);
            bus.register(EventKind::Quote, move |_| calls.lock().push(name));
        }

        assert_eq!(bus.publish(&quote("SBER")), 3);
        // All three ran before publish returned.
        assert_eq!(*calls.lock(), vec!["A", "B", "C"]);
    }

    #[test]
    fn publishing_without_handlers_is_a_no_op() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(&quote("SBER")), 0);
    }

    #[test]
    fn handlers_only_see_their_kind() {
        let bus = EventBus::new();
        let candles = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&candles);
        bus.on_candle_closed(move |_| *counter.lock() += 1);

        assert_eq!(bus.publish(&quote("SBER")), 0);
        assert_eq!(*candles.lock(), 0);
    }

    #[test]
    fn panicking_handler_does_not_stop_the_others() {
        let bus = EventBus::new();
        let reached = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&reached);

        bus.register(EventKind::Quote, |_| panic!("handler failure"));
        bus.on_quote(move |_| *flag.lock() = true);

        assert_eq!(bus.publish(&quote("SBER")), 1);
        assert!(*reached.lock());
    }

    #[test]
    fn unregistered_handler_is_not_called() {
        let bus = EventBus::new();
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let id = bus.on_quote(move |_| *counter.lock() += 1);

        assert!(bus.unregister(id));
        assert!(!bus.unregister(id));
        bus.publish(&quote("SBER"));
        assert_eq!(*calls.lock(), 0);
    }

    #[test]
    fn registering_from_a_handler_applies_to_the_next_event() {
        let bus = EventBus::new();
        let inner = bus.clone();
        bus.register(EventKind::Quote, move |_| {
            inner.register(EventKind::Quote, |_| {});
        });

        assert_eq!(bus.publish(&quote("SBER")), 1);
        assert_eq!(bus.handler_count(EventKind::Quote), 2);
    }

    #[tokio::test]
    async fn stream_receives_events_and_unregisters_on_drop() {
        let bus = EventBus::new();
        let mut stream = bus.stream(EventKind::Quote);
        assert_eq!(bus.handler_count(EventKind::Quote), 1);

        bus.publish(&quote("SBER"));
        bus.publish(&quote("GAZP"));

        let first = stream.next().await.unwrap();
        let second = stream.recv().await.unwrap();
        assert!(matches!(first, StreamEvent::Quote(q) if q.symbol == "SBER"));
        assert!(matches!(second, StreamEvent::Quote(q) if q.symbol == "GAZP"));

        drop(stream);
        assert_eq!(bus.handler_count(EventKind::Quote), 0);
    }
}
