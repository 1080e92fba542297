//! Fan-out Hub: delivers decoded ticks, candles and portfolio events to
//! every downstream client whose [`crate::types::client`] filters match,
//! without letting one slow client stall the others.
//!
//! One bounded per-client mpsc channel per connection, so a client that
//! falls behind has its pending messages dropped (and is ultimately
//! evicted) rather than back-pressuring ingestion for everyone else.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};

use crate::constants::CLIENT_SEND_BUFFER;
use crate::types::candle::Candle;
use crate::types::client::ClientId;
use crate::types::instrument::InstrumentKey;
use crate::types::tick::Tick;

/// An event pushed from the hub to a downstream client's write task.
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// A fresh tick for an instrument the client is subscribed to.
    Tick(Tick),
    /// A candle (active or completed) for an (instrument, interval) the
    /// client is subscribed to.
    Candle(Candle),
    /// An opaque portfolio stream payload, forwarded verbatim.
    Portfolio(Arc<str>),
    /// A History Hydrator snapshot, addressed to the requesting client only
    /// (never broadcast).
    OhlcSnapshot {
        /// The instrument the snapshot covers.
        instrument_key: InstrumentKey,
        /// The interval the snapshot covers.
        interval: &'static str,
        /// Ascending-by-timestamp candles.
        candles: Vec<Candle>,
    },
    /// A pre-serialized control-plane reply (`subscription_update`,
    /// `subscriptions`, `pong`, `error`, …), addressed to one client. The
    /// write task forwards it verbatim rather than re-encoding it, so the
    /// control-plane read task stays the only writer of these replies while
    /// the write task stays the only task that ever touches the socket.
    Raw(Arc<str>),
}

struct ClientSlot {
    sender: mpsc::Sender<HubEvent>,
}

/// Registry of live per-client outbound channels.
#[derive(Default)]
pub struct FanoutHub {
    clients: RwLock<HashMap<ClientId, ClientSlot>>,
}

impl FanoutHub {
    /// Build an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new client and return the receiving half it should drain
    /// into its WebSocket write loop.
    pub async fn register(&self, client_id: ClientId) -> mpsc::Receiver<HubEvent> {
        let (tx, rx) = mpsc::channel(CLIENT_SEND_BUFFER);
        self.clients.write().await.insert(client_id, ClientSlot { sender: tx });
        rx
    }

    /// Drop a client's outbound channel. Called on disconnect.
    pub async fn unregister(&self, client_id: ClientId) {
        self.clients.write().await.remove(&client_id);
    }

    /// Attempt to deliver `event` to `client_id`. The hub never awaits a
    /// slow client: if its buffer is full (or its write task has already
    /// exited), this event is dropped and the client's outbound channel is
    /// torn down, marking it for removal. Dropping the sender here lets the
    /// client's write task drain whatever is still queued before its
    /// `recv()` returns `None` and the session's cleanup path removes it
    /// from the registry — other clients are served in the meantime,
    /// unaffected by this one's eviction.
    pub async fn send(&self, client_id: ClientId, event: HubEvent) {
        let dead = {
            let clients = self.clients.read().await;
            match clients.get(&client_id) {
                Some(slot) => slot.sender.try_send(event).is_err(),
                None => false,
            }
        };
        if dead {
            tracing::debug!(%client_id, "client send buffer overflowed, evicting");
            self.clients.write().await.remove(&client_id);
        }
    }

    /// Number of currently-registered clients, for the admin health surface.
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::instrument::InstrumentKey;
    use crate::types::tick::Tick;

    fn sample_tick(instrument: &str) -> Tick {
        Tick {
            instrument_key: InstrumentKey::from(instrument),
            ltp: 1.0,
            ltt: None,
            change_percent: None,
            ltq: None,
            ohlc: None,
            market_level: None,
            option_greeks: None,
            atp: None,
            vtt: None,
            oi: None,
            iv: None,
            tbq: None,
            tsq: None,
            timestamp: "2026-07-29T10:00:00+05:30".to_owned(),
        }
    }

    #[tokio::test]
    async fn delivers_to_a_registered_client() {
        let hub = FanoutHub::new();
        let client_id = ClientId::new();
        let mut rx = hub.register(client_id).await;

        hub.send(client_id, HubEvent::Tick(sample_tick("A"))).await;
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, HubEvent::Tick(_)));
    }

    #[tokio::test]
    async fn a_slow_client_is_evicted_without_touching_others() {
        let hub = FanoutHub::new();
        let slow = ClientId::new();
        let fast = ClientId::new();
        let slow_rx = hub.register(slow).await;
        let mut fast_rx = hub.register(fast).await;

        // Never drain `slow_rx`: flood past its bounded buffer.
        for _ in 0..(CLIENT_SEND_BUFFER + 10) {
            hub.send(slow, HubEvent::Tick(sample_tick("A"))).await;
        }
        assert_eq!(hub.client_count().await, 1, "overflowed client is evicted");

        hub.send(fast, HubEvent::Tick(sample_tick("A"))).await;
        assert!(fast_rx.recv().await.is_some(), "other clients are unaffected");

        drop(slow_rx);
    }

    #[tokio::test]
    async fn unregister_removes_the_client() {
        let hub = FanoutHub::new();
        let client_id = ClientId::new();
        hub.register(client_id).await;
        assert_eq!(hub.client_count().await, 1);
        hub.unregister(client_id).await;
        assert_eq!(hub.client_count().await, 0);
    }
}
