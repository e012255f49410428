//! Candle (bar) models and timeframe codes.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rust_decimal::Decimal;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Candle timeframe: an exact number of seconds or a calendar code.
///
/// On the wire this is the `tf` field: `"60"`, `"3600"`, `"D"`, `"W"`,
/// `"M"` or `"Y"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    Seconds(u32),
    Day,
    Week,
    Month,
    Year,
}

impl Interval {
    pub const S15: Self = Self::Seconds(15);
    pub const M1: Self = Self::Seconds(60);
    pub const M5: Self = Self::Seconds(300);
    pub const H1: Self = Self::Seconds(3600);

    /// Nominal length of one bar.
    pub fn duration(self) -> Duration {
        let secs = match self {
            Self::Seconds(s) => u64::from(s),
            Self::Day => 86_400,
            Self::Week => 604_800,
            Self::Month => 2_592_000,
            Self::Year => 31_536_000,
        };
        Duration::from_secs(secs)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seconds(s) => write!(f, "{s}"),
            Self::Day => f.write_str("D"),
            Self::Week => f.write_str("W"),
            Self::Month => f.write_str("M"),
            Self::Year => f.write_str("Y"),
        }
    }
}

/// Error returned when a timeframe code cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIntervalError(String);

impl fmt::Display for ParseIntervalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid timeframe: {:?}", self.0)
    }
}

impl std::error::Error for ParseIntervalError {}

impl FromStr for Interval {
    type Err = ParseIntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "D" => Ok(Self::Day),
            "W" => Ok(Self::Week),
            "M" => Ok(Self::Month),
            "Y" => Ok(Self::Year),
            other => match other.parse::<u32>() {
                Ok(secs) if secs > 0 => Ok(Self::Seconds(secs)),
                _ => Err(ParseIntervalError(other.to_string())),
            },
        }
    }
}

impl Serialize for Interval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IntervalVisitor;

        impl Visitor<'_> for IntervalVisitor {
            type Value = Interval;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a timeframe in seconds or one of D, W, M, Y")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Interval, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Interval, E> {
                u32::try_from(v)
                    .ok()
                    .filter(|s| *s > 0)
                    .map(Interval::Seconds)
                    .ok_or_else(|| E::custom(format!("invalid timeframe: {v}")))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Interval, E> {
                u64::try_from(v)
                    .map_err(|_| E::custom(format!("invalid timeframe: {v}")))
                    .and_then(|v| self.visit_u64(v))
            }
        }

        deserializer.deserialize_any(IntervalVisitor)
    }
}

/// A single OHLCV bar.
///
/// `symbol` and `interval` are not part of the payload; the streaming
/// router stamps them from the subscription that produced the bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time (UTC, Unix seconds).
    pub time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
    #[serde(default)]
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<Interval>,
}

impl Candle {
    /// Bar open time as a [`SystemTime`].
    pub fn opened_at(&self) -> SystemTime {
        match u64::try_from(self.time) {
            Ok(secs) => UNIX_EPOCH + Duration::from_secs(secs),
            Err(_) => UNIX_EPOCH,
        }
    }
}

/// Response of the `/md/v2/history` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct History {
    #[serde(rename = "history")]
    pub candles: Vec<Candle>,
    /// Open time of the bar following the returned range.
    #[serde(default)]
    pub next: Option<i64>,
    /// Open time of the bar preceding the returned range.
    #[serde(default)]
    pub prev: Option<i64>,
}
