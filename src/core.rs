//! Composition root: builds and owns every long-lived component, and wires
//! upstream frames into the Ingestion Pipeline.
//!
//! Modeled on the `moexco-okane` app crate's `main.rs` DI container — one
//! struct built once at startup that owns every shared handle (cache, store,
//! registry, hub, supervisor) and exposes the few operations the outer
//! `main` and the control plane actually need, rather than letting every
//! caller construct its own wiring.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::cache::CacheGateway;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::history::api::HistoryApiClient;
use crate::history::hydrator::HistoryHydrator;
use crate::hub::FanoutHub;
use crate::ingestion::pipeline::IngestionPipeline;
use crate::registry::SubscriptionRegistry;
use crate::state::TradingDateTracker;
use crate::store::Store;
use crate::types::instrument::InstrumentKey;
use crate::types::mode::SubscriptionMode;
use crate::upstream::connector::EventSink;
use crate::upstream::supervisor::{HealthSummary, StreamSupervisor, StreamSupervisorConfig};

/// Every long-lived handle the service needs, built once at startup.
pub struct Core {
    /// Fully-validated startup configuration, kept for the Token Reloader.
    pub settings: Settings,
    /// Cache Gateway handle.
    pub cache: Arc<CacheGateway>,
    /// Relational store handle.
    pub store: Arc<Store>,
    /// Subscription Registry handle.
    pub registry: Arc<SubscriptionRegistry>,
    /// Fan-out Hub handle.
    pub hub: Arc<FanoutHub>,
    /// Ingestion Pipeline handle.
    pub pipeline: Arc<IngestionPipeline>,
    /// History Hydrator handle.
    pub hydrator: Arc<HistoryHydrator>,
    /// Process-wide trading-date pointer.
    pub trading_date: Arc<TradingDateTracker>,
    /// Upstream connector supervisor. Held behind a lock since a token
    /// reload replaces its connector vectors wholesale.
    pub supervisor: RwLock<StreamSupervisor>,
}

impl Core {
    /// Build every component from `settings`: connect the cache and the
    /// relational store, resolve the initial upstream token set, and wire
    /// the ingestion pipeline. Does not connect any upstream WebSocket yet —
    /// call [`Core::connect_upstreams`] for that once the returned `Core` is
    /// wrapped in an `Arc`.
    pub async fn build(settings: Settings) -> Result<Self> {
        let cache = Arc::new(CacheGateway::connect(&settings.cache_url()).await?);
        let store = Arc::new(Store::connect(&settings.normalized_database_url()?).await?);
        let registry = Arc::new(SubscriptionRegistry::new());
        let hub = Arc::new(FanoutHub::new());
        let trading_date = Arc::new(TradingDateTracker::new());

        let tokens = resolve_tokens(&cache, &settings).await?;
        if tokens.is_empty() {
            return Err(Error::Config(
                "no upstream access tokens resolved from account ids or legacy cache keys".into(),
            ));
        }

        let history_api = Arc::new(HistoryApiClient::new(&tokens[0])?);
        let hydrator = Arc::new(HistoryHydrator::new(cache.clone(), history_api));

        let pipeline = Arc::new(IngestionPipeline::new(
            cache.clone(),
            hub.clone(),
            registry.clone(),
            trading_date.clone(),
        ));

        let supervisor = StreamSupervisor::new(StreamSupervisorConfig {
            market_tokens: tokens.clone(),
            portfolio_tokens: tokens,
        });

        Ok(Self {
            settings,
            cache,
            store,
            registry,
            hub,
            pipeline,
            hydrator,
            trading_date,
            supervisor: RwLock::new(supervisor),
        })
    }

    /// Connect every configured upstream connector, routing market frames and
    /// portfolio frames into the ingestion pipeline through two distinct
    /// [`EventSink`] implementations.
    pub async fn connect_upstreams(&self) {
        let market_sink: Arc<dyn EventSink> = Arc::new(MarketEventSink {
            pipeline: self.pipeline.clone(),
        });
        let portfolio_sink: Arc<dyn EventSink> = Arc::new(PortfolioEventSink {
            pipeline: self.pipeline.clone(),
        });
        self.supervisor.read().await.connect_all(market_sink, portfolio_sink).await;
    }

    /// Subscribe the configured initial instrument list (`full` mode) on the
    /// market connectors. A no-op if none were configured.
    pub async fn bootstrap_initial_instruments(&self) -> Result<()> {
        if self.settings.initial_instruments.is_empty() {
            return Ok(());
        }
        let instruments: Vec<InstrumentKey> = self
            .settings
            .initial_instruments
            .iter()
            .map(|s| InstrumentKey::from(s.as_str()))
            .collect();
        let outcome = self.supervisor.read().await.subscribe(&instruments, SubscriptionMode::Full).await?;
        if !outcome.any_succeeded() {
            return Err(Error::Config("no market connector accepted the initial instrument subscription".into()));
        }
        Ok(())
    }

    /// Re-resolve upstream tokens and rebuild every connector from scratch,
    /// resubscribing the previously-tracked market instrument set. Used by
    /// the admin `reload-tokens` endpoint when the broker issues fresh
    /// tokens without a service restart.
    pub async fn reload_tokens(&self) -> Result<()> {
        let tokens = resolve_tokens(&self.cache, &self.settings).await?;
        if tokens.is_empty() {
            return Err(Error::Config("token reload resolved no usable tokens".into()));
        }

        let market_sink: Arc<dyn EventSink> = Arc::new(MarketEventSink {
            pipeline: self.pipeline.clone(),
        });
        let portfolio_sink: Arc<dyn EventSink> = Arc::new(PortfolioEventSink {
            pipeline: self.pipeline.clone(),
        });

        let mut supervisor = self.supervisor.write().await;
        supervisor.rebuild_market_connectors(tokens.clone(), market_sink).await?;
        supervisor.rebuild_portfolio_connectors(tokens, portfolio_sink).await;
        Ok(())
    }

    /// Snapshot of every connector's health, for the admin health endpoint.
    pub async fn health(&self) -> HealthSummary {
        self.supervisor.read().await.health().await
    }
}

/// Resolve upstream access tokens per the configured account ids, falling
/// back to the legacy single/secondary cache keys when none are configured.
async fn resolve_tokens(cache: &CacheGateway, settings: &Settings) -> Result<Vec<String>> {
    if settings.upstox_account_ids.is_empty() {
        return cache.get_legacy_tokens().await;
    }
    let mut tokens = Vec::with_capacity(settings.upstox_account_ids.len());
    for account_id in &settings.upstox_account_ids {
        if let Some(token) = cache.get_access_token(account_id).await? {
            tokens.push(token);
        } else {
            tracing::warn!(%account_id, "no cached access token for configured account id");
        }
    }
    Ok(tokens)
}

/// Routes decoded market-feed frames into the ingestion pipeline. Each frame
/// is awaited inline by the connector's read loop rather than spawned, so
/// frames from a single connector are ingested in the order they arrived —
/// required for the active/completed candle transitions in
/// [`IngestionPipeline`] to stay correct under a connector that is itself
/// single-threaded per socket.
struct MarketEventSink {
    pipeline: Arc<IngestionPipeline>,
}

impl EventSink for MarketEventSink {
    fn on_open(&self, token_index: usize) {
        tracing::info!(token_index, "market connector open");
    }

    fn on_message<'a>(&'a self, token_index: usize, frame: String) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if let Err(e) = self.pipeline.handle_frame(&frame).await {
                tracing::warn!(token_index, error = %e, "failed to ingest market frame");
            }
        })
    }

    fn on_error(&self, token_index: usize, err: &Error) {
        tracing::warn!(token_index, error = %err, "market connector error");
    }

    fn on_close(&self, token_index: usize, reason: String) {
        tracing::info!(token_index, %reason, "market connector closed");
    }

    fn on_reconnecting(&self, token_index: usize, attempt: u32) {
        tracing::info!(token_index, attempt, "market connector reconnecting");
    }

    fn on_auto_reconnect_stopped(&self, token_index: usize) {
        tracing::error!(token_index, "market connector auto-reconnect stopped, needs a token reload");
    }
}

/// Routes raw portfolio-feed frames into the ingestion pipeline, unparsed:
/// these are cached and broadcast verbatim, never decoded into a `Tick` or
/// `Candle`.
struct PortfolioEventSink {
    pipeline: Arc<IngestionPipeline>,
}

impl EventSink for PortfolioEventSink {
    fn on_open(&self, token_index: usize) {
        tracing::info!(token_index, "portfolio connector open");
    }

    fn on_message<'a>(&'a self, token_index: usize, frame: String) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if let Err(e) = self.pipeline.handle_portfolio_frame(&frame).await {
                tracing::warn!(token_index, error = %e, "failed to ingest portfolio frame");
            }
        })
    }

    fn on_error(&self, token_index: usize, err: &Error) {
        tracing::warn!(token_index, error = %err, "portfolio connector error");
    }

    fn on_close(&self, token_index: usize, reason: String) {
        tracing::info!(token_index, %reason, "portfolio connector closed");
    }

    fn on_reconnecting(&self, token_index: usize, attempt: u32) {
        tracing::info!(token_index, attempt, "portfolio connector reconnecting");
    }

    fn on_auto_reconnect_stopped(&self, token_index: usize) {
        tracing::error!(token_index, "portfolio connector auto-reconnect stopped, needs a token reload");
    }
}
