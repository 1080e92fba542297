//! Decodes upstream frames, maintains the active/completed candle state
//! machine, and routes the results to the Cache Gateway and the Fan-out Hub.

use std::sync::Arc;

use dashmap::DashMap;

use crate::cache::CacheGateway;
use crate::error::Result;
use crate::hub::{FanoutHub, HubEvent};
use crate::registry::SubscriptionRegistry;
use crate::state::TradingDateTracker;
use crate::types::candle::{Candle, CandleInterval, CandleStatus};
use crate::types::instrument::InstrumentKey;
use crate::types::tick::Tick;
use crate::upstream::feed::{self, DecodedCandle, ExtendedFields, Feed};

/// Owns the per-(instrument, interval) "currently forming" candle and wires
/// decoded feed frames into the cache and the hub.
pub struct IngestionPipeline {
    cache: Arc<CacheGateway>,
    hub: Arc<FanoutHub>,
    registry: Arc<SubscriptionRegistry>,
    trading_date: Arc<TradingDateTracker>,
    active: DashMap<(InstrumentKey, CandleInterval), Candle>,
}

impl IngestionPipeline {
    /// Build a pipeline over the given cache, hub, registry and trading-date
    /// tracker.
    pub fn new(
        cache: Arc<CacheGateway>,
        hub: Arc<FanoutHub>,
        registry: Arc<SubscriptionRegistry>,
        trading_date: Arc<TradingDateTracker>,
    ) -> Self {
        Self {
            cache,
            hub,
            registry,
            trading_date,
            active: DashMap::new(),
        }
    }

    /// Ingest one raw upstream portfolio-feed frame: an opaque JSON payload,
    /// cached under a single key and broadcast to every client whose tick
    /// filter is wildcarded, with no per-instrument filtering.
    pub async fn handle_portfolio_frame(&self, raw: &str) -> Result<()> {
        self.cache.set_portfolio_snapshot(raw).await?;
        let payload: Arc<str> = Arc::from(raw);
        let clients = self.registry.clients_for_portfolio().await;
        for client_id in clients {
            self.hub.send(client_id, HubEvent::Portfolio(payload.clone())).await;
        }
        Ok(())
    }

    /// Decode one raw upstream market-feed frame and ingest every
    /// (instrument, feed) pair it contains.
    pub async fn handle_frame(&self, raw: &str) -> Result<()> {
        let decoded = feed::parse_frame(raw)?;
        for (instrument, feed) in decoded {
            self.handle_feed(&instrument, &feed).await?;
        }
        Ok(())
    }

    async fn handle_feed(&self, instrument: &InstrumentKey, feed: &Feed) -> Result<()> {
        let extended = feed.extended_fields();

        if let Some(ltpc) = feed.ltpc() {
            let tick = Tick {
                instrument_key: instrument.clone(),
                ltp: ltpc.ltp,
                ltt: ltpc.ltt.clone(),
                change_percent: ltpc.change_percent,
                ltq: ltpc.ltq,
                ohlc: today_ohlc(feed),
                market_level: extended.market_level.clone(),
                option_greeks: extended.option_greeks.clone(),
                atp: extended.atp,
                vtt: extended.vtt,
                oi: extended.oi,
                iv: extended.iv,
                tbq: extended.tbq,
                tsq: extended.tsq,
                timestamp: crate::time::now_ist().to_rfc3339(),
            };
            self.emit_tick(tick).await?;
        }

        for candle in feed.candles() {
            self.ingest_candle(instrument, candle, &extended).await?;
        }
        Ok(())
    }

    async fn ingest_candle(&self, instrument: &InstrumentKey, decoded: &DecodedCandle, extended: &ExtendedFields) -> Result<()> {
        let Some(interval) = feed::canonical_interval(decoded) else {
            return Ok(());
        };
        if !interval.is_live_ingested() {
            return Ok(());
        }
        if decoded.timestamp_ms == 0 {
            tracing::debug!(%instrument, "rejecting candle with zero start-timestamp");
            return Ok(());
        }
        let Some(trading_date) = crate::time::trading_date_for(decoded.timestamp_ms) else {
            tracing::warn!(%instrument, timestamp_ms = decoded.timestamp_ms, "candle timestamp out of range, dropping");
            return Ok(());
        };
        self.trading_date.observe(&trading_date);

        // 1-day bars arrive as a single always-final snapshot; 1-minute bars
        // go through an active -> completed transition as later frames
        // supersede them.
        let status = if interval == CandleInterval::OneDay {
            CandleStatus::Completed
        } else {
            CandleStatus::Active
        };

        let key = (instrument.clone(), interval);
        if let Some(prev) = self.active.get(&key) {
            if prev.candle_status == CandleStatus::Active && prev.timestamp != decoded.timestamp_ms {
                let mut completed = prev.clone();
                completed.candle_status = CandleStatus::Completed;
                drop(prev);
                // Finalizing the previous bar: it will never change again, so
                // it is persisted as well as broadcast.
                self.persist_candle(&trading_date, completed).await?;
            }
        }

        let candle = Candle {
            instrument_key: instrument.clone(),
            interval,
            open: decoded.open,
            high: decoded.high,
            low: decoded.low,
            close: decoded.close,
            volume: decoded.volume,
            timestamp: decoded.timestamp_ms,
            candle_status: status,
            oi: extended.oi,
            market_level: extended.market_level.clone(),
            option_greeks: extended.option_greeks.clone(),
        };
        self.active.insert(key, candle.clone());

        // A still-forming 1-minute candle is memory-only: it is broadcast so
        // subscribers can watch it update, but never written to the cache,
        // since it will be superseded in place rather than at a new key. A
        // 1-day candle is always `Completed` and is persisted immediately.
        if candle.candle_status == CandleStatus::Completed {
            self.persist_candle(&trading_date, candle).await
        } else {
            self.broadcast_candle(candle).await;
            Ok(())
        }
    }

    async fn emit_tick(&self, tick: Tick) -> Result<()> {
        self.cache.set_tick(&tick).await?;
        let clients = self.registry.clients_for_tick(&tick.instrument_key).await;
        for client_id in clients {
            self.hub.send(client_id, HubEvent::Tick(tick.clone())).await;
        }
        Ok(())
    }

    /// Write a completed candle to the cache (advancing the `:latest`
    /// pointer) and broadcast it.
    async fn persist_candle(&self, trading_date: &str, candle: Candle) -> Result<()> {
        self.cache.upsert_candle(trading_date, &candle).await?;
        self.broadcast_candle(candle).await;
        Ok(())
    }

    /// Deliver a candle to every subscribed client without touching the
    /// cache.
    async fn broadcast_candle(&self, candle: Candle) {
        let clients = self
            .registry
            .clients_for_candle(&candle.instrument_key, candle.interval.as_str())
            .await;
        for client_id in clients {
            self.hub.send(client_id, HubEvent::Candle(candle.clone())).await;
        }
    }
}

fn today_ohlc(feed: &Feed) -> Option<crate::types::tick::TodayOhlc> {
    match feed {
        Feed::Market { today_ohlc, .. } => today_ohlc.clone(),
        Feed::Index { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_interval_rejects_unrecognized_tags() {
        let decoded = DecodedCandle {
            broker_interval_tag: "5d".into(),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 0,
            timestamp_ms: 1_700_000_000_000,
        };
        assert_eq!(feed::canonical_interval(&decoded), None);
    }

    #[test]
    fn today_ohlc_is_none_for_index_feeds() {
        let feed = Feed::Index {
            ltpc: None,
            candles: Vec::new(),
        };
        assert!(today_ohlc(&feed).is_none());
    }
}
