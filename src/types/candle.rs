//! OHLC candle records.

use serde::{Deserialize, Serialize};

use super::instrument::InstrumentKey;
use super::tick::{MarketLevel, OptionGreeks};

/// The bar interval a [`Candle`] was aggregated over.
///
/// Only `OneMinute` and `OneDay` are ever produced by live ingestion; wider
/// granularities are served by the History Hydrator directly from the
/// broker's History API without being ingested live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandleInterval {
    /// 1-minute bar.
    #[serde(rename = "1min")]
    OneMinute,
    /// 5-minute bar (history-hydration only).
    #[serde(rename = "5min")]
    FiveMinute,
    /// 15-minute bar (history-hydration only).
    #[serde(rename = "15min")]
    FifteenMinute,
    /// 30-minute bar (history-hydration only).
    #[serde(rename = "30min")]
    ThirtyMinute,
    /// 1-day bar.
    #[serde(rename = "1day")]
    OneDay,
}

impl CandleInterval {
    /// The canonical wire string for this interval.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneMinute => "1min",
            Self::FiveMinute => "5min",
            Self::FifteenMinute => "15min",
            Self::ThirtyMinute => "30min",
            Self::OneDay => "1day",
        }
    }

    /// Parse a canonical wire string back into an interval.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1min" => Some(Self::OneMinute),
            "5min" => Some(Self::FiveMinute),
            "15min" => Some(Self::FifteenMinute),
            "30min" => Some(Self::ThirtyMinute),
            "1day" => Some(Self::OneDay),
            _ => None,
        }
    }

    /// Whether this interval is ever produced by live ingestion (as opposed
    /// to history-hydration only).
    pub fn is_live_ingested(&self) -> bool {
        matches!(self, Self::OneMinute | Self::OneDay)
    }
}

/// Whether a [`Candle`] may still change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandleStatus {
    /// The currently-forming candle for this (instrument, interval); its
    /// attributes may still change until it is superseded.
    Active,
    /// A candle that will not change further.
    Completed,
}

/// An OHLC bar for one (instrument, interval, start-timestamp).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// The instrument this candle describes.
    pub instrument_key: InstrumentKey,
    /// The bar interval.
    pub interval: CandleInterval,
    /// Opening price.
    pub open: f64,
    /// Highest price observed in the bar.
    pub high: f64,
    /// Lowest price observed in the bar.
    pub low: f64,
    /// Closing (or latest, if still active) price.
    pub close: f64,
    /// Traded volume within the bar.
    pub volume: i64,
    /// Candle start-timestamp, broker-supplied, milliseconds since the Unix
    /// epoch, UTC. This value is also the ZSET score and the series
    /// position.
    pub timestamp: i64,
    /// Whether this bar is still forming or has been finalized.
    pub candle_status: CandleStatus,
    /// Open interest snapshotted at candle emission time. F&O instruments
    /// only.
    #[serde(default)]
    pub oi: Option<i64>,
    /// Market depth snapshotted at candle emission time.
    #[serde(default)]
    pub market_level: Option<MarketLevel>,
    /// Option greeks snapshotted at candle emission time.
    #[serde(default)]
    pub option_greeks: Option<OptionGreeks>,
}

impl Candle {
    /// The cache series key segment: `{instrument_key}:{interval}`.
    pub fn series_suffix(&self) -> String {
        format!("{}:{}", self.instrument_key, self.interval.as_str())
    }
}
