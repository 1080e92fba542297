//! The latest-trade snapshot for an instrument.

use serde::{Deserialize, Serialize};

use super::instrument::InstrumentKey;

/// A single price level on one side of the market depth book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    /// Quantity available at this level.
    pub quantity: i64,
    /// Price at this level.
    pub price: f64,
    /// Number of orders resting at this level.
    #[serde(default)]
    pub orders: i64,
}

/// Bid/ask market depth, present only on `full` and `full_d30` feeds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketLevel {
    /// Buy-side levels, best first.
    #[serde(default)]
    pub bid: Vec<DepthLevel>,
    /// Sell-side levels, best first.
    #[serde(default)]
    pub ask: Vec<DepthLevel>,
}

/// Option greeks, present only on `option_greeks` feeds for option contracts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionGreeks {
    /// Delta.
    #[serde(default)]
    pub delta: Option<f64>,
    /// Theta.
    #[serde(default)]
    pub theta: Option<f64>,
    /// Gamma.
    #[serde(default)]
    pub gamma: Option<f64>,
    /// Vega.
    #[serde(default)]
    pub vega: Option<f64>,
    /// Rho.
    #[serde(default)]
    pub rho: Option<f64>,
}

/// Today's running open/high/low/close bucket, as carried on a tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TodayOhlc {
    /// Today's open.
    pub open: f64,
    /// Today's high so far.
    pub high: f64,
    /// Today's low so far.
    pub low: f64,
    /// Previous close (or current close if the market is open).
    pub close: f64,
}

/// The latest-trade observation for an instrument.
///
/// Constructed fresh on every broker frame and never mutated afterward.
/// Fields only meaningful in "full" market feeds (as opposed to index feeds)
/// are left `None` rather than defaulted to zero when the decoding feed
/// shape does not provide them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// The instrument this tick describes.
    pub instrument_key: InstrumentKey,
    /// Last traded price.
    pub ltp: f64,
    /// Last traded time, as supplied by the broker (opaque string).
    #[serde(default)]
    pub ltt: Option<String>,
    /// Percentage change from previous close.
    #[serde(default)]
    pub change_percent: Option<f64>,
    /// Last traded quantity. Full feeds only.
    #[serde(default)]
    pub ltq: Option<i64>,
    /// Today's running OHLC bucket. Full feeds only.
    #[serde(default)]
    pub ohlc: Option<TodayOhlc>,
    /// Market depth. Full feeds only.
    #[serde(default)]
    pub market_level: Option<MarketLevel>,
    /// Option greeks. Option-greeks feeds only.
    #[serde(default)]
    pub option_greeks: Option<OptionGreeks>,
    /// Average traded price. Full feeds only.
    #[serde(default)]
    pub atp: Option<f64>,
    /// Cumulative traded volume for the day. Full feeds only.
    #[serde(default)]
    pub vtt: Option<i64>,
    /// Open interest. F&O instruments, full feeds only.
    #[serde(default)]
    pub oi: Option<i64>,
    /// Implied volatility. Option contracts, full feeds only.
    #[serde(default)]
    pub iv: Option<f64>,
    /// Total buy quantity across the depth book. Full feeds only.
    #[serde(default)]
    pub tbq: Option<f64>,
    /// Total sell quantity across the depth book. Full feeds only.
    #[serde(default)]
    pub tsq: Option<f64>,
    /// When this tick was ingested, IST, `YYYY-MM-DDTHH:MM:SS%.f+05:30`.
    pub timestamp: String,
}
