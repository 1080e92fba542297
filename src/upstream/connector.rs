//! One authenticated upstream WebSocket connection to the broker.
//!
//! Each connector is a single connection, one of possibly several in a
//! supervised vector where every connector subscribes every instrument for
//! redundancy rather than sharding instruments round-robin across
//! connections. Frames are the JSON shape this broker's market-data socket
//! actually speaks (see [`crate::upstream::feed`]).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::constants::{MAX_RECONNECT_ATTEMPTS, RECONNECT_INTERVAL};
use crate::error::{Error, Result};
use crate::types::instrument::InstrumentKey;
use crate::types::mode::SubscriptionMode;

type WsWriter = futures_util::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsReader = futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Connector lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    /// No connection has been attempted yet, or it was cleanly stopped.
    Disconnected,
    /// The WebSocket is up and reading frames.
    Connected,
    /// A reconnect attempt is in flight.
    Reconnecting,
    /// The reconnect cap was exceeded; an external reload is required.
    AutoReconnectStopped,
}

/// Capability implemented once by the Stream Supervisor and handed to every
/// [`UpstreamConnector`] it owns, rather than a per-connector closure.
/// Every callback receives the connector's index explicitly.
pub trait EventSink: Send + Sync {
    /// The connector's WebSocket came up.
    fn on_open(&self, token_index: usize);
    /// A raw text frame arrived. The read loop awaits this before reading the
    /// next frame, so frames from one connector are always processed in the
    /// order they arrived.
    fn on_message<'a>(&'a self, token_index: usize, frame: String) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
    /// A recoverable error occurred; the connector will retry per policy.
    fn on_error(&self, token_index: usize, err: &Error);
    /// The WebSocket closed.
    fn on_close(&self, token_index: usize, reason: String);
    /// A reconnect attempt is starting.
    fn on_reconnecting(&self, token_index: usize, attempt: u32);
    /// The reconnect cap was exceeded; this connector is now dormant.
    fn on_auto_reconnect_stopped(&self, token_index: usize);
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ControlFrame<'a> {
    method: &'a str,
    instrument_keys: &'a [String],
    mode: Option<&'a str>,
}

/// One authenticated WebSocket connection to the broker's market-data or
/// portfolio feed, parameterized by one access token.
pub struct UpstreamConnector {
    token_index: usize,
    url: String,
    access_token: String,
    writer: Arc<Mutex<Option<WsWriter>>>,
    state: Arc<Mutex<ConnectorState>>,
    reconnect_attempts: Arc<AtomicU32>,
    /// Instruments and modes to resubscribe on (re)connect.
    subscriptions: Arc<Mutex<HashMap<InstrumentKey, SubscriptionMode>>>,
    task: Option<JoinHandle<()>>,
}

impl UpstreamConnector {
    /// Create a connector for the given token index and base URL. Does not
    /// connect yet — call [`UpstreamConnector::connect`].
    pub fn new(token_index: usize, url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            token_index,
            url: url.into(),
            access_token: access_token.into(),
            writer: Arc::new(Mutex::new(None)),
            state: Arc::new(Mutex::new(ConnectorState::Disconnected)),
            reconnect_attempts: Arc::new(AtomicU32::new(0)),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            task: None,
        }
    }

    /// This connector's index within the configured token set.
    pub fn token_index(&self) -> usize {
        self.token_index
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ConnectorState {
        *self.state.lock().await
    }

    /// Establish the WebSocket and spawn the read loop. Fails with
    /// [`Error::UpstreamAuth`] on token rejection (HTTP 401/403 during the
    /// handshake), [`Error::UpstreamNetwork`] otherwise.
    pub async fn connect(&mut self, sink: Arc<dyn EventSink>) -> Result<()> {
        let url = format!("{}?token={}", self.url, self.access_token);
        let (ws, response) = connect_async(&url).await.map_err(|e| {
            if matches!(response_is_auth_rejection(&e), true) {
                Error::UpstreamAuth {
                    token_index: self.token_index,
                    message: e.to_string(),
                }
            } else {
                Error::UpstreamNetwork {
                    token_index: self.token_index,
                    source: e,
                }
            }
        })?;
        let _ = response;

        let (write, read) = ws.split();
        *self.writer.lock().await = Some(write);
        *self.state.lock().await = ConnectorState::Connected;
        self.reconnect_attempts.store(0, Ordering::SeqCst);
        sink.on_open(self.token_index);

        let existing = self.subscriptions.lock().await.clone();
        if !existing.is_empty() {
            let writer = self.writer.clone();
            if let Err(e) = send_subscribe(&writer, &existing).await {
                sink.on_error(self.token_index, &e);
            }
        }

        let token_index = self.token_index;
        let writer = self.writer.clone();
        let state = self.state.clone();
        let reconnect_attempts = self.reconnect_attempts.clone();
        let subscriptions = self.subscriptions.clone();
        let url_base = self.url.clone();
        let access_token = self.access_token.clone();

        let task = tokio::spawn(async move {
            Self::read_loop(
                token_index,
                read,
                writer,
                state,
                reconnect_attempts,
                subscriptions,
                url_base,
                access_token,
                sink,
            )
            .await;
        });
        self.task = Some(task);

        Ok(())
    }

    /// Subscribe a set of instruments at the given mode. Merges into the
    /// resubscribe set used across reconnects.
    pub async fn subscribe(&self, instruments: &[InstrumentKey], mode: SubscriptionMode) -> Result<()> {
        {
            let mut subs = self.subscriptions.lock().await;
            for instrument in instruments {
                subs.insert(instrument.clone(), mode);
            }
        }
        let mut delta = HashMap::new();
        for instrument in instruments {
            delta.insert(instrument.clone(), mode);
        }
        send_subscribe(&self.writer, &delta).await
    }

    /// Unsubscribe a set of instruments.
    pub async fn unsubscribe(&self, instruments: &[InstrumentKey]) -> Result<()> {
        {
            let mut subs = self.subscriptions.lock().await;
            for instrument in instruments {
                subs.remove(instrument);
            }
        }
        let keys: Vec<String> = instruments.iter().map(|i| i.0.clone()).collect();
        let frame = ControlFrame {
            method: "unsub",
            instrument_keys: &keys,
            mode: None,
        };
        send_control_frame(&self.writer, &frame).await
    }

    /// Change the subscription mode for a set of already-subscribed
    /// instruments.
    pub async fn change_mode(&self, instruments: &[InstrumentKey], mode: SubscriptionMode) -> Result<()> {
        {
            let mut subs = self.subscriptions.lock().await;
            for instrument in instruments {
                subs.insert(instrument.clone(), mode);
            }
        }
        let keys: Vec<String> = instruments.iter().map(|i| i.0.clone()).collect();
        let frame = ControlFrame {
            method: "change_mode",
            instrument_keys: &keys,
            mode: Some(mode.as_str()),
        };
        send_control_frame(&self.writer, &frame).await
    }

    /// Idempotent disconnect; cancels any pending reconnect.
    pub async fn disconnect(&mut self) {
        *self.state.lock().await = ConnectorState::Disconnected;
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.send(Message::Close(None)).await;
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// The instruments and modes currently tracked for resubscription.
    pub async fn subscribed(&self) -> HashMap<InstrumentKey, SubscriptionMode> {
        self.subscriptions.lock().await.clone()
    }

    #[allow(clippy::too_many_arguments)]
    async fn read_loop(
        token_index: usize,
        mut read: WsReader,
        writer: Arc<Mutex<Option<WsWriter>>>,
        state: Arc<Mutex<ConnectorState>>,
        reconnect_attempts: Arc<AtomicU32>,
        subscriptions: Arc<Mutex<HashMap<InstrumentKey, SubscriptionMode>>>,
        url_base: String,
        access_token: String,
        sink: Arc<dyn EventSink>,
    ) {
        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    sink.on_message(token_index, text.to_string()).await;
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                    sink.on_close(token_index, reason);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    sink.on_error(
                        token_index,
                        &Error::UpstreamNetwork {
                            token_index,
                            source: e,
                        },
                    );
                    break;
                }
                None => {
                    sink.on_close(token_index, "stream ended".to_owned());
                    break;
                }
            }
        }

        if *state.lock().await == ConnectorState::Disconnected {
            return;
        }

        Box::pin(Self::reconnect_loop(
            token_index,
            writer,
            state,
            reconnect_attempts,
            subscriptions,
            url_base,
            access_token,
            sink,
        ))
        .await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn reconnect_loop(
        token_index: usize,
        writer: Arc<Mutex<Option<WsWriter>>>,
        state: Arc<Mutex<ConnectorState>>,
        reconnect_attempts: Arc<AtomicU32>,
        subscriptions: Arc<Mutex<HashMap<InstrumentKey, SubscriptionMode>>>,
        url_base: String,
        access_token: String,
        sink: Arc<dyn EventSink>,
    ) {
        *state.lock().await = ConnectorState::Reconnecting;

        loop {
            let attempt = reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt > MAX_RECONNECT_ATTEMPTS {
                *state.lock().await = ConnectorState::AutoReconnectStopped;
                sink.on_auto_reconnect_stopped(token_index);
                return;
            }
            sink.on_reconnecting(token_index, attempt);
            tokio::time::sleep(RECONNECT_INTERVAL).await;

            let url = format!("{url_base}?token={access_token}");
            match connect_async(&url).await {
                Ok((ws, _)) => {
                    let (write, read) = ws.split();
                    *writer.lock().await = Some(write);
                    *state.lock().await = ConnectorState::Connected;
                    reconnect_attempts.store(0, Ordering::SeqCst);
                    sink.on_open(token_index);

                    let existing = subscriptions.lock().await.clone();
                    if !existing.is_empty() {
                        if let Err(e) = send_subscribe(&writer, &existing).await {
                            sink.on_error(token_index, &e);
                        }
                    }

                    return Box::pin(Self::read_loop(
                        token_index,
                        read,
                        writer,
                        state,
                        reconnect_attempts,
                        subscriptions,
                        url_base,
                        access_token,
                        sink,
                    ))
                    .await;
                }
                Err(e) => {
                    sink.on_error(
                        token_index,
                        &Error::UpstreamNetwork {
                            token_index,
                            source: e,
                        },
                    );
                }
            }
        }
    }
}

fn response_is_auth_rejection(err: &tokio_tungstenite::tungstenite::Error) -> bool {
    matches!(
        err,
        tokio_tungstenite::tungstenite::Error::Http(resp)
            if resp.status() == reqwest::StatusCode::UNAUTHORIZED
                || resp.status() == reqwest::StatusCode::FORBIDDEN
    )
}

async fn send_subscribe(
    writer: &Arc<Mutex<Option<WsWriter>>>,
    instruments: &HashMap<InstrumentKey, SubscriptionMode>,
) -> Result<()> {
    let mut by_mode: HashMap<SubscriptionMode, Vec<String>> = HashMap::new();
    for (instrument, mode) in instruments {
        by_mode.entry(*mode).or_default().push(instrument.0.clone());
    }
    for (mode, keys) in by_mode {
        let frame = ControlFrame {
            method: "sub",
            instrument_keys: &keys,
            mode: Some(mode.as_str()),
        };
        send_control_frame(writer, &frame).await?;
    }
    Ok(())
}

async fn send_control_frame(writer: &Arc<Mutex<Option<WsWriter>>>, frame: &ControlFrame<'_>) -> Result<()> {
    let json = serde_json::to_string(frame)?;
    let mut guard = writer.lock().await;
    match guard.as_mut() {
        Some(w) => w
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| Error::UpstreamNetwork {
                token_index: 0,
                source: e,
            }),
        None => Err(Error::UpstreamProtocol {
            token_index: 0,
            message: "writer not available".into(),
        }),
    }
}
