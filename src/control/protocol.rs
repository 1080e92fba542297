//! Downstream WebSocket wire protocol: client requests and server pushes.
//!
//! Client frames are parsed by hand rather than through a tagged `serde`
//! enum, because an unrecognized `action` value must produce
//! `{type:"error", message:"Unknown action: <action>"}` naming the actual
//! value received — a derived tagged enum only reports "unknown variant",
//! with no access to the string that didn't match.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::types::candle::Candle;
use crate::types::tick::Tick;

/// One parsed client → server request.
#[derive(Debug, Clone)]
pub enum ClientFrame {
    /// `{action:"subscribe", instruments:[…]}`. Empty or absent `instruments`
    /// means "all instruments" (the wildcard), left for
    /// [`crate::types::client::TickFilter::subscribe`] to apply.
    Subscribe { instruments: Vec<String> },
    /// `{action:"unsubscribe", instruments:[…]}`.
    Unsubscribe { instruments: Vec<String> },
    /// `{action:"get_subscriptions"}`.
    GetSubscriptions,
    /// `{action:"subscribe_ohlc", instruments:[…], intervals:[…], include_history:bool}`.
    SubscribeOhlc {
        instruments: Vec<String>,
        intervals: Vec<String>,
        include_history: bool,
    },
    /// `{action:"unsubscribe_ohlc", instruments?:[…], intervals?:[…]}`.
    UnsubscribeOhlc {
        instruments: Option<Vec<String>>,
        intervals: Option<Vec<String>>,
    },
    /// `{action:"get_ohlc_subscriptions"}`.
    GetOhlcSubscriptions,
    /// `{action:"ping"}`.
    Ping,
}

impl ClientFrame {
    /// Parse one raw text frame. Returns the exact error text the protocol
    /// requires on failure: `"Invalid JSON format"` for frames that aren't
    /// valid JSON at all, `"Unknown action: <action>"` for a well-formed
    /// object with an unrecognized (or missing) `action`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let value: Value = serde_json::from_str(raw).map_err(|_| "Invalid JSON format".to_string())?;
        let action = value.get("action").and_then(Value::as_str).unwrap_or("");

        match action {
            "subscribe" => Ok(Self::Subscribe {
                instruments: string_list(&value, "instruments"),
            }),
            "unsubscribe" => Ok(Self::Unsubscribe {
                instruments: string_list(&value, "instruments"),
            }),
            "get_subscriptions" => Ok(Self::GetSubscriptions),
            "subscribe_ohlc" => Ok(Self::SubscribeOhlc {
                instruments: string_list(&value, "instruments"),
                intervals: string_list(&value, "intervals"),
                include_history: value.get("include_history").and_then(Value::as_bool).unwrap_or(false),
            }),
            "unsubscribe_ohlc" => Ok(Self::UnsubscribeOhlc {
                instruments: optional_string_list(&value, "instruments"),
                intervals: optional_string_list(&value, "intervals"),
            }),
            "get_ohlc_subscriptions" => Ok(Self::GetOhlcSubscriptions),
            "ping" => Ok(Self::Ping),
            other => Err(format!("Unknown action: {other}")),
        }
    }
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
        .unwrap_or_default()
}

fn optional_string_list(value: &Value, key: &str) -> Option<Vec<String>> {
    value.get(key).and_then(Value::as_array).map(|arr| {
        arr.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect()
    })
}

/// One server → client push, serialized with a `type` discriminant.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once, immediately after a client is accepted.
    Connection {
        status: &'static str,
        client_id: Uuid,
        current_subscriptions: Vec<String>,
    },
    /// A fresh tick for a subscribed instrument.
    MarketData { data: Tick },
    /// A live candle (active or completed) for a subscribed (instrument, interval).
    OhlcData { data: Candle },
    /// The History Hydrator's response to an `include_history` OHLC subscription.
    OhlcSnapshot {
        instrument_key: String,
        interval: String,
        candles: Vec<Candle>,
        snapshot_time: String,
        candle_count: usize,
    },
    /// Reply to a subscribe/unsubscribe (tick) request. Shares the
    /// `subscription_update` type tag with [`Self::OhlcSubscriptionUpdate`];
    /// the two are distinguished by which subscriptions field is present,
    /// matching the protocol's own single reply shape for both.
    #[serde(rename = "subscription_update")]
    SubscriptionUpdate {
        action: &'static str,
        success: bool,
        current_subscriptions: Vec<String>,
    },
    /// Reply to a subscribe_ohlc/unsubscribe_ohlc request.
    #[serde(rename = "subscription_update")]
    OhlcSubscriptionUpdate {
        action: &'static str,
        success: bool,
        current_ohlc_subscriptions: HashMap<String, Vec<String>>,
    },
    /// Reply to `get_subscriptions`.
    Subscriptions { current_subscriptions: Vec<String> },
    /// Reply to `get_ohlc_subscriptions`.
    OhlcSubscriptions {
        current_ohlc_subscriptions: HashMap<String, Vec<String>>,
    },
    /// Reply to `ping`.
    Pong { timestamp: String },
    /// A client protocol violation: malformed JSON or an unrecognized action.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_defaults_empty_instruments_to_wildcard_list() {
        let frame = ClientFrame::parse(r#"{"action":"subscribe"}"#).unwrap();
        match frame {
            ClientFrame::Subscribe { instruments } => assert!(instruments.is_empty()),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn subscribe_ohlc_parses_instruments_intervals_and_include_history() {
        let frame = ClientFrame::parse(
            r#"{"action":"subscribe_ohlc","instruments":["A"],"intervals":["1min"],"include_history":true}"#,
        )
        .unwrap();
        match frame {
            ClientFrame::SubscribeOhlc {
                instruments,
                intervals,
                include_history,
            } => {
                assert_eq!(instruments, vec!["A".to_owned()]);
                assert_eq!(intervals, vec!["1min".to_owned()]);
                assert!(include_history);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn unsubscribe_ohlc_distinguishes_absent_from_empty_lists() {
        let clear_all = ClientFrame::parse(r#"{"action":"unsubscribe_ohlc"}"#).unwrap();
        match clear_all {
            ClientFrame::UnsubscribeOhlc { instruments, intervals } => {
                assert!(instruments.is_none());
                assert!(intervals.is_none());
            }
            other => panic!("unexpected frame: {other:?}"),
        }

        let clear_named = ClientFrame::parse(r#"{"action":"unsubscribe_ohlc","instruments":["A"]}"#).unwrap();
        match clear_named {
            ClientFrame::UnsubscribeOhlc { instruments, intervals } => {
                assert_eq!(instruments, Some(vec!["A".to_owned()]));
                assert!(intervals.is_none());
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn malformed_json_reports_invalid_json_format() {
        let err = ClientFrame::parse("not json").unwrap_err();
        assert_eq!(err, "Invalid JSON format");
    }

    #[test]
    fn unknown_action_names_the_offending_value() {
        let err = ClientFrame::parse(r#"{"action":"levitate"}"#).unwrap_err();
        assert_eq!(err, "Unknown action: levitate");
    }
}
