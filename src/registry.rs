//! Subscription Registry: owns every connected client's tick and OHLC
//! filters, and answers "which clients want this event" for the Ingestion
//! Pipeline and the Fan-out Hub.
//!
//! A single `RwLock<HashMap<...>>` gives single-writer/multi-reader
//! discipline directly: admin/control-plane calls take the write lock
//! briefly to mutate one client's filter, while the (much hotter) ingestion
//! path only ever reads.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::types::client::{ClientId, OhlcFilter, TickFilter};
use crate::types::instrument::InstrumentKey;

struct ClientState {
    tick_filter: TickFilter,
    ohlc_filter: OhlcFilter,
}

/// Registry of every connected downstream client's subscription state.
#[derive(Default)]
pub struct SubscriptionRegistry {
    clients: RwLock<HashMap<ClientId, ClientState>>,
}

impl SubscriptionRegistry {
    /// Build an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly-accepted client with the default wildcard tick
    /// filter and an empty OHLC filter: a client subscribes to no candle
    /// series until it asks.
    pub async fn add_client(&self, client_id: ClientId) {
        self.clients.write().await.insert(
            client_id,
            ClientState {
                tick_filter: TickFilter::wildcard(),
                ohlc_filter: OhlcFilter::default(),
            },
        );
    }

    /// Drop a client's subscription state entirely.
    pub async fn remove_client(&self, client_id: ClientId) {
        self.clients.write().await.remove(&client_id);
    }

    /// Union `items` into the client's tick filter.
    pub async fn subscribe_ticks(&self, client_id: ClientId, items: &[InstrumentKey]) {
        if let Some(state) = self.clients.write().await.get_mut(&client_id) {
            state.tick_filter.subscribe(items);
        }
    }

    /// Remove `items` from the client's tick filter.
    pub async fn unsubscribe_ticks(&self, client_id: ClientId, items: &[InstrumentKey]) {
        if let Some(state) = self.clients.write().await.get_mut(&client_id) {
            state.tick_filter.unsubscribe(items);
        }
    }

    /// Add `intervals` (or the wildcard) for `instruments` on the client's
    /// OHLC filter.
    pub async fn subscribe_ohlc(&self, client_id: ClientId, instruments: &[InstrumentKey], intervals: &[String]) {
        if let Some(state) = self.clients.write().await.get_mut(&client_id) {
            state.ohlc_filter.subscribe(instruments, intervals);
        }
    }

    /// Apply the three-level OHLC unsubscribe semantics for this client.
    pub async fn unsubscribe_ohlc(
        &self,
        client_id: ClientId,
        instruments: Option<&[InstrumentKey]>,
        intervals: Option<&[String]>,
    ) {
        if let Some(state) = self.clients.write().await.get_mut(&client_id) {
            state.ohlc_filter.unsubscribe(instruments, intervals);
        }
    }

    /// Every connected client whose tick filter matches `instrument`.
    pub async fn clients_for_tick(&self, instrument: &InstrumentKey) -> Vec<ClientId> {
        self.clients
            .read()
            .await
            .iter()
            .filter(|(_, state)| state.tick_filter.matches(instrument))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Every connected client whose tick filter is wildcarded — the
    /// audience for an (instrument-less) portfolio event.
    pub async fn clients_for_portfolio(&self) -> Vec<ClientId> {
        self.clients
            .read()
            .await
            .iter()
            .filter(|(_, state)| state.tick_filter.has_wildcard())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Every connected client whose OHLC filter matches (instrument,
    /// interval).
    pub async fn clients_for_candle(&self, instrument: &InstrumentKey, interval: &str) -> Vec<ClientId> {
        self.clients
            .read()
            .await
            .iter()
            .filter(|(_, state)| state.ohlc_filter.matches(instrument, interval))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Snapshot of a client's current filters, for the control-plane's
    /// subscription-confirmation reply.
    pub async fn snapshot(&self, client_id: ClientId) -> Option<(Vec<String>, HashMap<String, Vec<String>>)> {
        self.clients
            .read()
            .await
            .get(&client_id)
            .map(|state| (state.tick_filter.snapshot(), state.ohlc_filter.snapshot()))
    }

    /// Number of currently-registered clients, for the admin health surface.
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> InstrumentKey {
        InstrumentKey::from(s)
    }

    #[tokio::test]
    async fn new_client_defaults_to_wildcard_tick_filter_and_empty_ohlc() {
        let registry = SubscriptionRegistry::new();
        let id = ClientId::new();
        registry.add_client(id).await;
        let (ticks, ohlc) = registry.snapshot(id).await.unwrap();
        assert_eq!(ticks, vec!["*".to_owned()]);
        assert!(ohlc.is_empty());
    }

    #[tokio::test]
    async fn subscribe_then_unsubscribe_round_trips_to_prior_state() {
        let registry = SubscriptionRegistry::new();
        let id = ClientId::new();
        registry.add_client(id).await;

        // Narrow off the default wildcard first, matching the wire
        // contract where a client's very first `subscribe` sets the
        // working set it wants.
        registry.unsubscribe_ticks(id, &[key("*")]).await;
        let instruments = [key("A"), key("B")];
        registry.subscribe_ticks(id, &instruments).await;
        let (after_subscribe, _) = registry.snapshot(id).await.unwrap();
        assert_eq!(after_subscribe.len(), 2);

        registry.unsubscribe_ticks(id, &instruments).await;
        let (after_unsubscribe, _) = registry.snapshot(id).await.unwrap();
        assert!(after_unsubscribe.is_empty());
    }

    #[tokio::test]
    async fn clients_for_tick_matches_wildcard_and_explicit_members() {
        let registry = SubscriptionRegistry::new();
        let wildcard_client = ClientId::new();
        let narrow_client = ClientId::new();
        registry.add_client(wildcard_client).await;
        registry.add_client(narrow_client).await;

        registry.unsubscribe_ticks(narrow_client, &[key("*")]).await;
        registry.subscribe_ticks(narrow_client, &[key("NSE_INDEX|Nifty 50")]).await;

        let matches = registry.clients_for_tick(&key("NSE_INDEX|Nifty 50")).await;
        assert!(matches.contains(&wildcard_client));
        assert!(matches.contains(&narrow_client));

        let no_match = registry.clients_for_tick(&key("NSE_INDEX|Nifty Bank")).await;
        assert!(no_match.contains(&wildcard_client));
        assert!(!no_match.contains(&narrow_client));
    }

    #[tokio::test]
    async fn subscribe_ohlc_then_unsubscribe_ohlc_removes_only_matching_entries() {
        let registry = SubscriptionRegistry::new();
        let id = ClientId::new();
        registry.add_client(id).await;

        let instruments = [key("A"), key("B")];
        let intervals = ["1min".to_owned(), "1day".to_owned()];
        registry.subscribe_ohlc(id, &instruments, &intervals).await;

        assert!(registry.clients_for_candle(&key("A"), "1min").await.contains(&id));
        assert!(registry.clients_for_candle(&key("B"), "1day").await.contains(&id));

        // Remove only the "1min" interval from "A"; "A"/1day and "B" survive.
        registry
            .unsubscribe_ohlc(id, Some(&[key("A")]), Some(&["1min".to_owned()]))
            .await;
        assert!(!registry.clients_for_candle(&key("A"), "1min").await.contains(&id));
        assert!(registry.clients_for_candle(&key("A"), "1day").await.contains(&id));
        assert!(registry.clients_for_candle(&key("B"), "1day").await.contains(&id));
    }

    #[tokio::test]
    async fn remove_client_drops_both_filters_atomically() {
        let registry = SubscriptionRegistry::new();
        let id = ClientId::new();
        registry.add_client(id).await;
        registry.subscribe_ohlc(id, &[key("A")], &["1min".to_owned()]).await;

        registry.remove_client(id).await;
        assert!(registry.snapshot(id).await.is_none());
        assert!(!registry.clients_for_tick(&key("A")).await.contains(&id));
        assert!(!registry.clients_for_candle(&key("A"), "1min").await.contains(&id));
    }
}
