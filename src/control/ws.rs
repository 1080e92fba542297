//! Downstream WebSocket session: a two-task split — one read task parsing
//! client frames and mutating the Subscription Registry, one write task
//! that is the sole owner of the socket's send half.
//!
//! Every outbound message, whether a broadcast tick/candle or a direct
//! reply to this client's own request, is funneled through the same
//! bounded per-client [`crate::hub::FanoutHub`] channel — the read task
//! never touches the socket directly, it only calls `hub.send(..,
//! HubEvent::Raw(..))`, keeping the write task the single writer.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};

use crate::control::protocol::{ClientFrame, ServerMessage};
use crate::core::Core;
use crate::types::candle::CandleInterval;
use crate::types::client::ClientId;
use crate::types::instrument::InstrumentKey;

/// Drive one accepted downstream connection end to end: register it,
/// announce it, then run its read and write tasks until either ends.
pub async fn handle_socket(socket: WebSocket, core: Arc<Core>) {
    let client_id = ClientId::new();
    core.registry.add_client(client_id).await;
    let mut rx = core.hub.register(client_id).await;

    let (mut sender, mut receiver) = socket.split();

    let current_subscriptions = core
        .registry
        .snapshot(client_id)
        .await
        .map(|(ticks, _)| ticks)
        .unwrap_or_default();
    let greeting = ServerMessage::Connection {
        status: "connected",
        client_id: client_id.0,
        current_subscriptions,
    };
    if send_json(&mut sender, &greeting).await.is_err() {
        core.hub.unregister(client_id).await;
        core.registry.remove_client(client_id).await;
        return;
    }

    let write_core = core.clone();
    let write_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match render(event) {
                Some(text) => text,
                None => continue,
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = write_core;
    });

    let read_core = core.clone();
    let read_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    handle_frame(&read_core, client_id, text.as_str()).await;
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });

    tokio::select! {
        _ = write_task => {},
        _ = read_task => {},
    }

    core.hub.unregister(client_id).await;
    core.registry.remove_client(client_id).await;
    tracing::debug!(%client_id, "downstream client disconnected");
}

async fn send_json(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(msg).unwrap_or_else(|_| r#"{"type":"error","message":"internal encode error"}"#.into());
    sender.send(Message::Text(text.into())).await
}

/// Render one hub event into the wire text sent to this client, or `None`
/// for a malformed candidate payload that cannot be represented (never
/// expected in practice, but keeps the write loop infallible).
fn render(event: crate::hub::HubEvent) -> Option<String> {
    use crate::hub::HubEvent;
    match event {
        HubEvent::Tick(tick) => serde_json::to_string(&ServerMessage::MarketData { data: tick }).ok(),
        HubEvent::Candle(candle) => serde_json::to_string(&ServerMessage::OhlcData { data: candle }).ok(),
        HubEvent::Portfolio(raw) => Some(format!(r#"{{"type":"portfolio_data","data":{raw}}}"#)),
        HubEvent::OhlcSnapshot {
            instrument_key,
            interval,
            candles,
        } => {
            let candle_count = candles.len();
            serde_json::to_string(&ServerMessage::OhlcSnapshot {
                instrument_key: instrument_key.to_string(),
                interval: interval.to_string(),
                candles,
                snapshot_time: crate::time::now_ist().to_rfc3339(),
                candle_count,
            })
            .ok()
        }
        HubEvent::Raw(text) => Some(text.to_string()),
    }
}

async fn handle_frame(core: &Arc<Core>, client_id: ClientId, raw: &str) {
    let frame = match ClientFrame::parse(raw) {
        Ok(frame) => frame,
        Err(message) => {
            reply(core, client_id, &ServerMessage::Error { message }).await;
            return;
        }
    };

    match frame {
        ClientFrame::Subscribe { instruments } => {
            let keys: Vec<InstrumentKey> = instruments.iter().map(|s| InstrumentKey::from(s.as_str())).collect();
            core.registry.subscribe_ticks(client_id, &keys).await;
            let current_subscriptions = snapshot_ticks(core, client_id).await;
            reply(
                core,
                client_id,
                &ServerMessage::SubscriptionUpdate {
                    action: "subscribe",
                    success: true,
                    current_subscriptions,
                },
            )
            .await;
        }
        ClientFrame::Unsubscribe { instruments } => {
            let keys: Vec<InstrumentKey> = instruments.iter().map(|s| InstrumentKey::from(s.as_str())).collect();
            core.registry.unsubscribe_ticks(client_id, &keys).await;
            let current_subscriptions = snapshot_ticks(core, client_id).await;
            reply(
                core,
                client_id,
                &ServerMessage::SubscriptionUpdate {
                    action: "unsubscribe",
                    success: true,
                    current_subscriptions,
                },
            )
            .await;
        }
        ClientFrame::GetSubscriptions => {
            let current_subscriptions = snapshot_ticks(core, client_id).await;
            reply(core, client_id, &ServerMessage::Subscriptions { current_subscriptions }).await;
        }
        ClientFrame::SubscribeOhlc {
            instruments,
            intervals,
            include_history,
        } => {
            let keys: Vec<InstrumentKey> = instruments.iter().map(|s| InstrumentKey::from(s.as_str())).collect();
            core.registry.subscribe_ohlc(client_id, &keys, &intervals).await;
            let current_ohlc_subscriptions = snapshot_ohlc(core, client_id).await;
            reply(
                core,
                client_id,
                &ServerMessage::OhlcSubscriptionUpdate {
                    action: "subscribe_ohlc",
                    success: true,
                    current_ohlc_subscriptions,
                },
            )
            .await;

            if include_history {
                spawn_hydration(core.clone(), client_id, keys, intervals);
            }
        }
        ClientFrame::UnsubscribeOhlc { instruments, intervals } => {
            let keys = instruments.map(|items| items.iter().map(|s| InstrumentKey::from(s.as_str())).collect::<Vec<_>>());
            core.registry
                .unsubscribe_ohlc(client_id, keys.as_deref(), intervals.as_deref())
                .await;
            let current_ohlc_subscriptions = snapshot_ohlc(core, client_id).await;
            reply(
                core,
                client_id,
                &ServerMessage::OhlcSubscriptionUpdate {
                    action: "unsubscribe_ohlc",
                    success: true,
                    current_ohlc_subscriptions,
                },
            )
            .await;
        }
        ClientFrame::GetOhlcSubscriptions => {
            let current_ohlc_subscriptions = snapshot_ohlc(core, client_id).await;
            reply(
                core,
                client_id,
                &ServerMessage::OhlcSubscriptions { current_ohlc_subscriptions },
            )
            .await;
        }
        ClientFrame::Ping => {
            reply(
                core,
                client_id,
                &ServerMessage::Pong {
                    timestamp: crate::time::now_ist().to_rfc3339(),
                },
            )
            .await;
        }
    }
}

/// Only instruments and intervals given as concrete names (neither list
/// empty nor containing the wildcard) are hydrated: a client asking for
/// "every interval on every instrument, with history" has no enumerable
/// candle series to fetch, so history is skipped for the wildcarded parts of
/// the request while the live subscription itself still takes effect.
fn spawn_hydration(core: Arc<Core>, client_id: ClientId, instruments: Vec<InstrumentKey>, intervals: Vec<String>) {
    let concrete_instruments: Vec<InstrumentKey> = instruments.into_iter().filter(|i| i.as_str() != "*").collect();
    let concrete_intervals: Vec<CandleInterval> = intervals
        .iter()
        .filter(|i| i.as_str() != "*")
        .filter_map(|i| CandleInterval::parse(i))
        .collect();
    if concrete_instruments.is_empty() || concrete_intervals.is_empty() {
        return;
    }

    tokio::spawn(async move {
        let trading_date = core.trading_date.current().unwrap_or_else(crate::time::trading_date_now);
        for instrument in &concrete_instruments {
            for interval in &concrete_intervals {
                match core.hydrator.get_series(instrument, *interval, &trading_date).await {
                    Ok(candles) => {
                        core.hub
                            .send(
                                client_id,
                                crate::hub::HubEvent::OhlcSnapshot {
                                    instrument_key: instrument.clone(),
                                    interval: interval.as_str(),
                                    candles,
                                },
                            )
                            .await;
                    }
                    Err(e) => {
                        tracing::warn!(%instrument, interval = interval.as_str(), error = %e, "history hydration failed");
                        core.hub
                            .send(
                                client_id,
                                crate::hub::HubEvent::OhlcSnapshot {
                                    instrument_key: instrument.clone(),
                                    interval: interval.as_str(),
                                    candles: Vec::new(),
                                },
                            )
                            .await;
                    }
                }
            }
        }
    });
}

async fn snapshot_ticks(core: &Arc<Core>, client_id: ClientId) -> Vec<String> {
    core.registry.snapshot(client_id).await.map(|(ticks, _)| ticks).unwrap_or_default()
}

async fn snapshot_ohlc(core: &Arc<Core>, client_id: ClientId) -> std::collections::HashMap<String, Vec<String>> {
    core.registry.snapshot(client_id).await.map(|(_, ohlc)| ohlc).unwrap_or_default()
}

async fn reply(core: &Arc<Core>, client_id: ClientId, msg: &ServerMessage) {
    if let Ok(text) = serde_json::to_string(msg) {
        core.hub.send(client_id, crate::hub::HubEvent::Raw(Arc::from(text))).await;
    }
}
