//! Decoding of the broker's JSON market-data wire frames.
//!
//! A frame may contain many (instrument, feed) pairs. Exactly one of
//! `indexFF` (index feed, limited fields) or `marketFF` (market feed, full
//! fields) is present per instrument entry. This is modeled as the tagged
//! [`Feed`] variant per the design note on ad-hoc JSON shape variance: `Tick`
//! carries the superset of optional fields, populated from whichever arm
//! decoded the frame.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};

use crate::types::candle::CandleInterval;
use crate::types::instrument::InstrumentKey;
use crate::types::tick::{DepthLevel, MarketLevel, OptionGreeks, TodayOhlc};

/// Coerces a JSON value that may be a number or a decimal string into `f64`.
fn de_f64_flex<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    flex_f64(&value).ok_or_else(|| serde::de::Error::custom("expected a number or numeric string"))
}

fn de_f64_flex_opt<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| flex_f64(&v)))
}

fn de_i64_flex_opt<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| flex_i64(&v)))
}

fn de_i64_flex<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    flex_i64(&value).ok_or_else(|| serde::de::Error::custom("expected an integer or numeric string"))
}

fn flex_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn flex_i64(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.parse().ok().or_else(|| s.parse::<f64>().ok().map(|f| f as i64)),
        _ => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
struct WireDepthLevel {
    #[serde(deserialize_with = "de_i64_flex", default)]
    quantity: i64,
    #[serde(deserialize_with = "de_f64_flex", default)]
    price: f64,
    #[serde(deserialize_with = "de_i64_flex_opt", default)]
    orders: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WireMarketLevel {
    #[serde(default)]
    bid: Vec<WireDepthLevel>,
    #[serde(default)]
    ask: Vec<WireDepthLevel>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WireOptionGreeks {
    #[serde(default, deserialize_with = "de_f64_flex_opt")]
    delta: Option<f64>,
    #[serde(default, deserialize_with = "de_f64_flex_opt")]
    theta: Option<f64>,
    #[serde(default, deserialize_with = "de_f64_flex_opt")]
    gamma: Option<f64>,
    #[serde(default, deserialize_with = "de_f64_flex_opt")]
    vega: Option<f64>,
    #[serde(default, deserialize_with = "de_f64_flex_opt")]
    rho: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireLtpc {
    #[serde(deserialize_with = "de_f64_flex")]
    ltp: f64,
    #[serde(default)]
    ltt: Option<String>,
    #[serde(default, deserialize_with = "de_f64_flex_opt")]
    cp: Option<f64>,
    #[serde(default, deserialize_with = "de_i64_flex_opt")]
    ltq: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireCandle {
    interval: String,
    #[serde(deserialize_with = "de_f64_flex")]
    open: f64,
    #[serde(deserialize_with = "de_f64_flex")]
    high: f64,
    #[serde(deserialize_with = "de_f64_flex")]
    low: f64,
    #[serde(deserialize_with = "de_f64_flex")]
    close: f64,
    #[serde(deserialize_with = "de_i64_flex", default)]
    vol: i64,
    #[serde(rename = "ts", deserialize_with = "de_i64_flex")]
    timestamp_ms: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WireMarketOhlc {
    #[serde(default)]
    ohlc: Vec<WireCandle>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WireTodayOhlc {
    #[serde(default, deserialize_with = "de_f64_flex_opt")]
    open: Option<f64>,
    #[serde(default, deserialize_with = "de_f64_flex_opt")]
    high: Option<f64>,
    #[serde(default, deserialize_with = "de_f64_flex_opt")]
    low: Option<f64>,
    #[serde(default, deserialize_with = "de_f64_flex_opt")]
    close: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireIndexFeed {
    #[serde(default)]
    ltpc: Option<WireLtpc>,
    #[serde(default, rename = "marketOHLC")]
    market_ohlc: Option<WireMarketOhlc>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireMarketFeed {
    #[serde(default)]
    ltpc: Option<WireLtpc>,
    #[serde(default, rename = "marketOHLC")]
    market_ohlc: Option<WireMarketOhlc>,
    #[serde(default)]
    ohlc: Option<WireTodayOhlc>,
    #[serde(default, rename = "marketLevel")]
    market_level: Option<WireMarketLevel>,
    #[serde(default, rename = "optionGreeks")]
    option_greeks: Option<WireOptionGreeks>,
    #[serde(default, deserialize_with = "de_f64_flex_opt")]
    atp: Option<f64>,
    #[serde(default, deserialize_with = "de_i64_flex_opt")]
    vtt: Option<i64>,
    #[serde(default, deserialize_with = "de_i64_flex_opt")]
    oi: Option<i64>,
    #[serde(default, deserialize_with = "de_f64_flex_opt")]
    iv: Option<f64>,
    #[serde(default, deserialize_with = "de_f64_flex_opt")]
    tbq: Option<f64>,
    #[serde(default, deserialize_with = "de_f64_flex_opt")]
    tsq: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireFullFeed {
    #[serde(default, rename = "indexFF")]
    index_ff: Option<WireIndexFeed>,
    #[serde(default, rename = "marketFF")]
    market_ff: Option<WireMarketFeed>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireFeedEntry {
    #[serde(rename = "fullFeed")]
    full_feed: WireFullFeed,
}

#[derive(Debug, Clone, Deserialize)]
struct WireFrame {
    #[serde(default)]
    feeds: HashMap<String, WireFeedEntry>,
}

/// One decoded last-trade observation, shape-agnostic.
#[derive(Debug, Clone, Default)]
pub struct DecodedLtpc {
    pub ltp: f64,
    pub ltt: Option<String>,
    pub change_percent: Option<f64>,
    pub ltq: Option<i64>,
}

/// One decoded OHLC bucket entry from `marketOHLC`, prior to interval
/// filtering/mapping.
#[derive(Debug, Clone)]
pub struct DecodedCandle {
    pub broker_interval_tag: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub timestamp_ms: i64,
}

/// The superset of extended fields a `market` feed may carry, to be
/// snapshotted onto a [`crate::types::candle::Candle`] at emission time, or
/// merged onto a [`crate::types::tick::Tick`].
#[derive(Debug, Clone, Default)]
pub struct ExtendedFields {
    pub oi: Option<i64>,
    pub market_level: Option<MarketLevel>,
    pub option_greeks: Option<OptionGreeks>,
    pub atp: Option<f64>,
    pub vtt: Option<i64>,
    pub iv: Option<f64>,
    pub tbq: Option<f64>,
    pub tsq: Option<f64>,
}

/// A decoded per-instrument feed entry: the tagged variant replacing the
/// source's ad-hoc `indexFF`/`marketFF` branching.
#[derive(Debug, Clone)]
pub enum Feed {
    /// Limited-field index feed (no depth, greeks, or extended fields).
    Index {
        ltpc: Option<DecodedLtpc>,
        candles: Vec<DecodedCandle>,
    },
    /// Full-field market feed.
    Market {
        ltpc: Option<DecodedLtpc>,
        candles: Vec<DecodedCandle>,
        today_ohlc: Option<TodayOhlc>,
        extended: ExtendedFields,
    },
}

impl Feed {
    /// The decoded last-trade block, if present, regardless of feed shape.
    pub fn ltpc(&self) -> Option<&DecodedLtpc> {
        match self {
            Feed::Index { ltpc, .. } | Feed::Market { ltpc, .. } => ltpc.as_ref(),
        }
    }

    /// The decoded OHLC candles, if any, regardless of feed shape.
    pub fn candles(&self) -> &[DecodedCandle] {
        match self {
            Feed::Index { candles, .. } | Feed::Market { candles, .. } => candles,
        }
    }

    /// The extended fields to snapshot onto a candle at emission time. Index
    /// feeds never carry these.
    pub fn extended_fields(&self) -> ExtendedFields {
        match self {
            Feed::Index { .. } => ExtendedFields::default(),
            Feed::Market { extended, .. } => extended.clone(),
        }
    }
}

fn decode_ltpc(ltpc: Option<WireLtpc>) -> Option<DecodedLtpc> {
    ltpc.map(|l| DecodedLtpc {
        ltp: l.ltp,
        ltt: l.ltt,
        change_percent: l.cp,
        ltq: l.ltq,
    })
}

fn decode_candles(market_ohlc: Option<WireMarketOhlc>) -> Vec<DecodedCandle> {
    market_ohlc
        .map(|m| {
            m.ohlc
                .into_iter()
                .map(|c| DecodedCandle {
                    broker_interval_tag: c.interval,
                    open: c.open,
                    high: c.high,
                    low: c.low,
                    close: c.close,
                    volume: c.vol,
                    timestamp_ms: c.timestamp_ms,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn decode_market_level(level: Option<WireMarketLevel>) -> Option<MarketLevel> {
    level.map(|l| MarketLevel {
        bid: l
            .bid
            .into_iter()
            .map(|d| DepthLevel {
                quantity: d.quantity,
                price: d.price,
                orders: d.orders.unwrap_or(0),
            })
            .collect(),
        ask: l
            .ask
            .into_iter()
            .map(|d| DepthLevel {
                quantity: d.quantity,
                price: d.price,
                orders: d.orders.unwrap_or(0),
            })
            .collect(),
    })
}

fn decode_option_greeks(greeks: Option<WireOptionGreeks>) -> Option<OptionGreeks> {
    greeks.map(|g| OptionGreeks {
        delta: g.delta,
        theta: g.theta,
        gamma: g.gamma,
        vega: g.vega,
        rho: g.rho,
    })
}

fn decode_today_ohlc(ohlc: Option<WireTodayOhlc>) -> Option<TodayOhlc> {
    ohlc.and_then(|o| {
        Some(TodayOhlc {
            open: o.open?,
            high: o.high?,
            low: o.low?,
            close: o.close?,
        })
    })
}

/// Parse one raw text frame from the upstream market-data WebSocket into a
/// map of instrument → decoded [`Feed`].
///
/// Frames with no `feeds` object, or with entries this parser does not
/// recognize, decode to an empty map rather than an error — unrecognized
/// frame shapes are the caller's concern (surfaced as
/// [`crate::error::Error::UpstreamProtocol`] only when the *outer* JSON
/// itself fails to parse).
pub fn parse_frame(raw: &str) -> serde_json::Result<HashMap<InstrumentKey, Feed>> {
    let frame: WireFrame = serde_json::from_str(raw)?;

    Ok(frame
        .feeds
        .into_iter()
        .map(|(instrument_key, entry)| {
            let full = entry.full_feed;
            let feed = if let Some(market) = full.market_ff {
                Feed::Market {
                    ltpc: decode_ltpc(market.ltpc),
                    candles: decode_candles(market.market_ohlc),
                    today_ohlc: decode_today_ohlc(market.ohlc),
                    extended: ExtendedFields {
                        oi: market.oi,
                        market_level: decode_market_level(market.market_level),
                        option_greeks: decode_option_greeks(market.option_greeks),
                        atp: market.atp,
                        vtt: market.vtt,
                        iv: market.iv,
                        tbq: market.tbq,
                        tsq: market.tsq,
                    },
                }
            } else if let Some(index) = full.index_ff {
                Feed::Index {
                    ltpc: decode_ltpc(index.ltpc),
                    candles: decode_candles(index.market_ohlc),
                }
            } else {
                Feed::Index {
                    ltpc: None,
                    candles: Vec::new(),
                }
            };
            (InstrumentKey::from(instrument_key), feed)
        })
        .collect())
}

/// Map a [`DecodedCandle`]'s broker interval tag to a canonical
/// [`CandleInterval`], discarding anything outside {1-minute, 1-day}.
pub fn canonical_interval(candle: &DecodedCandle) -> Option<CandleInterval> {
    crate::constants::canonical_live_interval(&candle.broker_interval_tag).and_then(CandleInterval::parse)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_index_feed_with_ltpc() {
        let raw = r#"{
            "feeds": {
                "NSE_INDEX|Nifty 50": {
                    "fullFeed": {
                        "indexFF": {
                            "ltpc": {"ltp": "25795.15", "ltt": "1700000000", "cp": 0.42}
                        }
                    }
                }
            }
        }"#;
        let decoded = parse_frame(raw).unwrap();
        let feed = decoded.get(&InstrumentKey::from("NSE_INDEX|Nifty 50")).unwrap();
        assert_eq!(feed.ltpc().unwrap().ltp, 25795.15);
        assert_eq!(feed.ltpc().unwrap().change_percent, Some(0.42));
    }

    #[test]
    fn parses_market_feed_with_candles_and_extended_fields() {
        let raw = r#"{
            "feeds": {
                "NSE_EQ|INE020B01018": {
                    "fullFeed": {
                        "marketFF": {
                            "ltpc": {"ltp": 2500.5, "ltt": "t", "cp": "1.1", "ltq": "10"},
                            "marketOHLC": {"ohlc": [
                                {"interval": "I1", "open": "2500", "high": "2510", "low": "2490", "close": "2505", "vol": "100", "ts": 1700000060000}
                            ]},
                            "oi": 1200,
                            "vtt": "5000"
                        }
                    }
                }
            }
        }"#;
        let decoded = parse_frame(raw).unwrap();
        let feed = decoded.get(&InstrumentKey::from("NSE_EQ|INE020B01018")).unwrap();
        assert_eq!(feed.candles().len(), 1);
        let candle = &feed.candles()[0];
        assert_eq!(canonical_interval(candle), Some(CandleInterval::OneMinute));
        assert_eq!(feed.extended_fields().oi, Some(1200));
    }

    #[test]
    fn unrecognized_interval_is_discarded_at_mapping_not_parsing() {
        let candle = DecodedCandle {
            broker_interval_tag: "5d".into(),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 0,
            timestamp_ms: 1,
        };
        assert_eq!(canonical_interval(&candle), None);
    }
}
