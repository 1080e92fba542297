//! Supervises the full set of upstream connectors: the market-feed
//! connectors (one per configured account token) and the portfolio-feed
//! connectors, a second supervised connector vector.
//!
//! Every connector in a vector is subscribed to the same instrument set for
//! redundancy, rather than instruments being sharded round-robin across
//! connectors, and a subscribe/unsubscribe/change_mode call succeeds as
//! long as at least one connector accepted it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::connector::{ConnectorState, EventSink, UpstreamConnector};
use crate::constants::{WS_MARKET_FEED_URL, WS_PORTFOLIO_FEED_URL};
use crate::error::{Error, Result};
use crate::types::instrument::InstrumentKey;
use crate::types::mode::SubscriptionMode;

/// Health of a single connector, as reported in an admin health summary.
#[derive(Debug, Clone)]
pub struct ConnectorHealth {
    /// Index within its vector (market or portfolio).
    pub token_index: usize,
    /// Current lifecycle state.
    pub state: ConnectorState,
}

/// Health of the full supervised connector set.
#[derive(Debug, Clone, Default)]
pub struct HealthSummary {
    /// Per-connector health for the market-feed vector.
    pub market: Vec<ConnectorHealth>,
    /// Per-connector health for the portfolio-feed vector.
    pub portfolio: Vec<ConnectorHealth>,
}

impl HealthSummary {
    /// Whether at least one market connector is connected.
    pub fn has_live_market_connector(&self) -> bool {
        self.market.iter().any(|c| c.state == ConnectorState::Connected)
    }
}

/// Construction parameters for [`StreamSupervisor`].
#[derive(Debug, Clone)]
pub struct StreamSupervisorConfig {
    /// Access tokens for the market-feed connectors, one per account.
    pub market_tokens: Vec<String>,
    /// Access tokens for the portfolio-feed connectors, one per account.
    pub portfolio_tokens: Vec<String>,
}

/// Result of a fan-out control operation (subscribe/unsubscribe/change_mode)
/// across every market connector: which connectors accepted it, and the
/// error each connector that rejected it returned. The admin HTTP surface
/// reports this breakdown verbatim on a 500.
#[derive(Debug, Default)]
pub struct ControlOutcome {
    /// Token indices of connectors that accepted the operation.
    pub succeeded: Vec<usize>,
    /// Token indices of connectors that rejected it, paired with the error.
    pub failed: Vec<(usize, String)>,
}

impl ControlOutcome {
    /// Whether at least one connector accepted the operation.
    pub fn any_succeeded(&self) -> bool {
        !self.succeeded.is_empty()
    }
}

/// Owns every upstream connector and exposes the fan-out subscribe surface
/// used by the Subscription Registry and the Master-Data Scheduler.
pub struct StreamSupervisor {
    market: Vec<Arc<RwLock<UpstreamConnector>>>,
    portfolio: Vec<Arc<RwLock<UpstreamConnector>>>,
    /// Instruments and modes subscribed across the market-feed vector, kept
    /// so a token reload can rebuild connectors without losing state.
    subscribed_instruments: Arc<RwLock<HashMap<InstrumentKey, SubscriptionMode>>>,
}


impl StreamSupervisor {
    /// Build connectors for every configured token, without connecting them.
    pub fn new(config: StreamSupervisorConfig) -> Self {
        let market = config
            .market_tokens
            .into_iter()
            .enumerate()
            .map(|(i, token)| Arc::new(RwLock::new(UpstreamConnector::new(i, WS_MARKET_FEED_URL, token))))
            .collect();
        let portfolio = config
            .portfolio_tokens
            .into_iter()
            .enumerate()
            .map(|(i, token)| Arc::new(RwLock::new(UpstreamConnector::new(i, WS_PORTFOLIO_FEED_URL, token))))
            .collect();
        Self {
            market,
            portfolio,
            subscribed_instruments: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Connect every configured connector: the market vector dispatches
    /// through `market_sink`, the portfolio vector through `portfolio_sink`
    /// (they are two distinct event streams multiplexed over the same
    /// fan-out substrate). Failures are logged per-connector and do not
    /// prevent the others from connecting.
    pub async fn connect_all(&self, market_sink: Arc<dyn EventSink>, portfolio_sink: Arc<dyn EventSink>) {
        for connector in &self.market {
            let mut guard = connector.write().await;
            let idx = guard.token_index();
            if let Err(e) = guard.connect(market_sink.clone()).await {
                tracing::warn!(token_index = idx, error = %e, "initial market connect failed, will retry on schedule");
            }
        }
        for connector in &self.portfolio {
            let mut guard = connector.write().await;
            let idx = guard.token_index();
            if let Err(e) = guard.connect(portfolio_sink.clone()).await {
                tracing::warn!(token_index = idx, error = %e, "initial portfolio connect failed, will retry on schedule");
            }
        }
    }

    /// Subscribe `instruments` at `mode` on every market connector. Reports
    /// which connectors accepted it; the caller treats the operation as
    /// failed only if every connector rejected it.
    pub async fn subscribe(&self, instruments: &[InstrumentKey], mode: SubscriptionMode) -> Result<ControlOutcome> {
        {
            let mut subs = self.subscribed_instruments.write().await;
            for instrument in instruments {
                subs.insert(instrument.clone(), mode);
            }
        }
        if self.market.is_empty() {
            return Err(Error::Config("no market connectors configured".into()));
        }
        let mut outcome = ControlOutcome::default();
        for connector in &self.market {
            let guard = connector.read().await;
            match guard.subscribe(instruments, mode).await {
                Ok(()) => outcome.succeeded.push(guard.token_index()),
                Err(e) => outcome.failed.push((guard.token_index(), e.to_string())),
            }
        }
        Ok(outcome)
    }

    /// Unsubscribe `instruments` from every market connector.
    pub async fn unsubscribe(&self, instruments: &[InstrumentKey]) -> Result<ControlOutcome> {
        {
            let mut subs = self.subscribed_instruments.write().await;
            for instrument in instruments {
                subs.remove(instrument);
            }
        }
        if self.market.is_empty() {
            return Err(Error::Config("no market connectors configured".into()));
        }
        let mut outcome = ControlOutcome::default();
        for connector in &self.market {
            let guard = connector.read().await;
            match guard.unsubscribe(instruments).await {
                Ok(()) => outcome.succeeded.push(guard.token_index()),
                Err(e) => outcome.failed.push((guard.token_index(), e.to_string())),
            }
        }
        Ok(outcome)
    }

    /// Change the subscription mode for `instruments` on every market
    /// connector.
    pub async fn change_mode(&self, instruments: &[InstrumentKey], mode: SubscriptionMode) -> Result<ControlOutcome> {
        {
            let mut subs = self.subscribed_instruments.write().await;
            for instrument in instruments {
                subs.insert(instrument.clone(), mode);
            }
        }
        if self.market.is_empty() {
            return Err(Error::Config("no market connectors configured".into()));
        }
        let mut outcome = ControlOutcome::default();
        for connector in &self.market {
            let guard = connector.read().await;
            match guard.change_mode(instruments, mode).await {
                Ok(()) => outcome.succeeded.push(guard.token_index()),
                Err(e) => outcome.failed.push((guard.token_index(), e.to_string())),
            }
        }
        Ok(outcome)
    }

    /// Snapshot of every connector's health, for the admin HTTP surface.
    pub async fn health(&self) -> HealthSummary {
        let mut market = Vec::with_capacity(self.market.len());
        for connector in &self.market {
            let guard = connector.read().await;
            market.push(ConnectorHealth {
                token_index: guard.token_index(),
                state: guard.state().await,
            });
        }
        let mut portfolio = Vec::with_capacity(self.portfolio.len());
        for connector in &self.portfolio {
            let guard = connector.read().await;
            portfolio.push(ConnectorHealth {
                token_index: guard.token_index(),
                state: guard.state().await,
            });
        }
        HealthSummary { market, portfolio }
    }

    /// Instruments and modes currently subscribed across the market vector,
    /// used to rebuild connectors on a token reload.
    pub async fn subscribed_snapshot(&self) -> HashMap<InstrumentKey, SubscriptionMode> {
        self.subscribed_instruments.read().await.clone()
    }

    /// Disconnect and drop every connector in the market vector, replacing
    /// it with fresh connectors built from `tokens`, then resubscribe the
    /// previously-tracked instrument set. Used by the Token Reloader.
    pub async fn rebuild_market_connectors(&mut self, tokens: Vec<String>, sink: Arc<dyn EventSink>) -> Result<()> {
        for connector in &self.market {
            connector.write().await.disconnect().await;
        }
        self.market = tokens
            .into_iter()
            .enumerate()
            .map(|(i, token)| Arc::new(RwLock::new(UpstreamConnector::new(i, WS_MARKET_FEED_URL, token))))
            .collect();
        for connector in &self.market {
            let mut guard = connector.write().await;
            let idx = guard.token_index();
            if let Err(e) = guard.connect(sink.clone()).await {
                tracing::warn!(token_index = idx, error = %e, "reconnect after token reload failed");
            }
        }
        let existing = self.subscribed_instruments.read().await.clone();
        for (instrument, mode) in existing {
            self.subscribe(&[instrument], mode).await?;
        }
        Ok(())
    }

    /// Disconnect and drop every connector in the portfolio vector,
    /// replacing it with fresh connectors built from `tokens`. The
    /// portfolio stream carries no per-instrument subscription state to
    /// preserve.
    pub async fn rebuild_portfolio_connectors(&mut self, tokens: Vec<String>, sink: Arc<dyn EventSink>) {
        for connector in &self.portfolio {
            connector.write().await.disconnect().await;
        }
        self.portfolio = tokens
            .into_iter()
            .enumerate()
            .map(|(i, token)| Arc::new(RwLock::new(UpstreamConnector::new(i, WS_PORTFOLIO_FEED_URL, token))))
            .collect();
        for connector in &self.portfolio {
            let mut guard = connector.write().await;
            let idx = guard.token_index();
            if let Err(e) = guard.connect(sink.clone()).await {
                tracing::warn!(token_index = idx, error = %e, "portfolio reconnect after token reload failed");
            }
        }
    }
}
