//! Cache-first, History-API-fallback candle series hydration.
//!
//! A bounded `tokio::sync::Semaphore` caps concurrent History API calls at
//! [`HYDRATOR_WORKER_POOL_SIZE`], so a burst of cold-cache client requests
//! cannot open unbounded broker connections.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::cache::CacheGateway;
use crate::constants::{self, HYDRATOR_WORKER_POOL_SIZE};
use crate::error::{Error, Result};
use crate::history::api::HistoryApiClient;
use crate::types::candle::{Candle, CandleInterval, CandleStatus};
use crate::types::instrument::InstrumentKey;

/// Serves OHLC history, preferring the cache and falling back to the
/// broker's History API.
pub struct HistoryHydrator {
    cache: Arc<CacheGateway>,
    api: Arc<HistoryApiClient>,
    permits: Arc<Semaphore>,
}

impl HistoryHydrator {
    /// Build a hydrator over `cache`, using `api` for cache misses.
    pub fn new(cache: Arc<CacheGateway>, api: Arc<HistoryApiClient>) -> Self {
        Self {
            cache,
            api,
            permits: Arc::new(Semaphore::new(HYDRATOR_WORKER_POOL_SIZE)),
        }
    }

    /// Fetch the candle series for `instrument` at `interval` on
    /// `trading_date`.
    ///
    /// Returns the cached series directly if it is non-empty. Otherwise
    /// falls through to the History API, caches every candle it returns as
    /// `Completed` (a day a client asks about in the past is, by
    /// definition, no longer forming), and returns the fetched series.
    pub async fn get_series(
        &self,
        instrument: &InstrumentKey,
        interval: CandleInterval,
        trading_date: &str,
    ) -> Result<Vec<Candle>> {
        let cached = self.cache.get_candle_series(trading_date, instrument, interval.as_str()).await?;
        if !cached.is_empty() {
            return Ok(cached);
        }
        self.hydrate_from_api(instrument, interval, trading_date).await
    }

    async fn hydrate_from_api(
        &self,
        instrument: &InstrumentKey,
        interval: CandleInterval,
        trading_date: &str,
    ) -> Result<Vec<Candle>> {
        let Some((unit, step)) = constants::history_unit_interval(interval.as_str()) else {
            return Err(Error::HistoryApi(format!("no History API mapping for interval {}", interval.as_str())));
        };

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::HistoryApi("hydrator worker pool closed".into()))?;

        let raw = self
            .api
            .get_candles(instrument.as_str(), unit, step, trading_date, trading_date)
            .await?;

        let mut candles = Vec::with_capacity(raw.len());
        for entry in raw {
            let Some(timestamp) = parse_iso_to_epoch_millis(entry.timestamp()) else {
                tracing::warn!(ts = entry.timestamp(), "unparseable History API timestamp, skipping");
                continue;
            };
            let candle = Candle {
                instrument_key: instrument.clone(),
                interval,
                open: entry.open(),
                high: entry.high(),
                low: entry.low(),
                close: entry.close(),
                volume: entry.volume(),
                timestamp,
                candle_status: CandleStatus::Completed,
                oi: Some(entry.open_interest()),
                market_level: None,
                option_greeks: None,
            };
            self.cache.upsert_candle(trading_date, &candle).await?;
            candles.push(candle);
        }
        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }

    /// Resolve the `:latest` candle for (instrument, interval), preferring
    /// the cached pointer and falling back to hydrating the full series and
    /// taking its last element.
    ///
    /// This asymmetry (read the pointer directly on the fast path, but
    /// never write it from here) keeps the pointer's only writer the
    /// ingestion pipeline's `upsert_candle`, so a hydration request can
    /// never regress a live-advancing pointer.
    pub async fn get_latest(
        &self,
        instrument: &InstrumentKey,
        interval: CandleInterval,
        trading_date: &str,
    ) -> Result<Option<Candle>> {
        if let Some(latest) = self.cache.get_latest_candle(trading_date, instrument, interval.as_str()).await? {
            return Ok(Some(latest));
        }
        let series = self.hydrate_from_api(instrument, interval, trading_date).await?;
        Ok(series.into_iter().next_back())
    }
}

fn parse_iso_to_epoch_millis(ts: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(ts).ok().map(|dt| dt.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_history_timestamp() {
        let ms = parse_iso_to_epoch_millis("2024-03-01T09:15:00+05:30").unwrap();
        assert_eq!(ms, 1_709_266_500_000);
    }

    #[test]
    fn rejects_malformed_timestamp() {
        assert!(parse_iso_to_epoch_millis("not-a-date").is_none());
    }
}
