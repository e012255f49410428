//! Turns "bar forming" candle snapshots into "bar closed" events.
//!
//! The server pushes the current, still-changing bar repeatedly. A bar is
//! final once a bar with a later open time shows up.

use tracing::warn;

use crate::models::Candle;

/// Holds the most recent not-yet-closed candle of one subscription.
#[derive(Debug, Default)]
pub struct CandleAccumulator {
    held: Option<Candle>,
}

impl CandleAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one update and returns the bar it closed, if any.
    ///
    /// - nothing held: the update is held;
    /// - same open time: the held bar is replaced;
    /// - later open time: the held bar is returned as closed and the update
    ///   is held instead;
    /// - earlier open time: logged and ignored.
    pub fn push(&mut self, candle: Candle) -> Option<Candle> {
        let Some(held_time) = self.held.as_ref().map(|c| c.time) else {
            self.held = Some(candle);
            return None;
        };

        if candle.time == held_time {
            self.held = Some(candle);
            None
        } else if candle.time > held_time {
            self.held.replace(candle)
        } else {
            warn!(
                symbol = %candle.symbol,
                held = held_time,
                received = candle.time,
                "Out-of-order candle ignored"
            );
            None
        }
    }

    /// The bar currently being formed.
    pub fn pending(&self) -> Option<&Candle> {
        self.held.as_ref()
    }
}
