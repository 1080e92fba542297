//! Master-Data Scheduler: refreshes the trading-date pointer and the FNO
//! underlying cache from the relational store once a day, at 08:00 IST.
//!
//! A single `tokio::spawn`'d loop sleeping on a computed calendar deadline
//! rather than a fixed interval. A refresh that panics or returns an error
//! is caught and logged; the scheduler does not retry within the same day, it simply
//! sleeps until the next scheduled deadline and tries again — a daily
//! master-data miss should never take the whole process down with it, and
//! the next day's attempt is a fresh one regardless of today's outcome. The
//! eager startup refresh is the one exception: it retries on a short
//! backoff until it succeeds, so downstream consumers never observe an
//! empty FNO table just because the process happened to start during a
//! transient store outage.

use std::sync::Arc;

use crate::cache::CacheGateway;
use crate::constants::{MASTER_DATA_REFRESH_HOUR, MASTER_DATA_RETRY_BACKOFF};
use crate::error::Result;
use crate::state::TradingDateTracker;
use crate::store::Store;
use crate::time;

/// Owns the relational store and cache handles needed to repopulate master
/// data.
pub struct MasterDataScheduler {
    store: Arc<Store>,
    cache: Arc<CacheGateway>,
    trading_date: Arc<TradingDateTracker>,
}

impl MasterDataScheduler {
    /// Build a scheduler over `store` and `cache`.
    pub fn new(store: Arc<Store>, cache: Arc<CacheGateway>, trading_date: Arc<TradingDateTracker>) -> Self {
        Self {
            store,
            cache,
            trading_date,
        }
    }

    /// Run the scheduler forever: an eager refresh at startup (retried on a
    /// short backoff until it succeeds), then one single-attempt refresh
    /// every day at [`MASTER_DATA_REFRESH_HOUR`] IST — a failed daily
    /// attempt is simply logged and left for the next day's deadline.
    /// Intended to be spawned once from `main` and never awaited to
    /// completion.
    pub async fn run(self: Arc<Self>) {
        self.refresh_until_success().await;

        loop {
            let now = time::now_ist();
            let deadline = time::next_master_data_deadline(now, MASTER_DATA_REFRESH_HOUR);
            let sleep_for = (deadline - now).to_std().unwrap_or(std::time::Duration::ZERO);
            tracing::info!(?sleep_for, "master-data scheduler sleeping until next refresh");
            tokio::time::sleep(sleep_for).await;
            self.refresh_once_logged().await;
        }
    }

    /// Attempt a refresh once, retrying with a fixed backoff until it
    /// succeeds. Used only for the eager startup refresh; the daily
    /// scheduled refresh uses [`Self::refresh_once_logged`] instead, which
    /// does not retry within the day.
    async fn refresh_until_success(&self) {
        loop {
            if self.refresh_once_logged().await {
                return;
            }
            tokio::time::sleep(MASTER_DATA_RETRY_BACKOFF).await;
        }
    }

    /// Attempt exactly one refresh. A refresh that panics is treated the
    /// same as one that returns an error: logged, with no further retry
    /// from this call. Returns whether it succeeded.
    async fn refresh_once_logged(&self) -> bool {
        let store = self.store.clone();
        let cache = self.cache.clone();
        let trading_date = self.trading_date.clone();

        let outcome = tokio::spawn(async move { refresh_once(&store, &cache, &trading_date).await }).await;

        match outcome {
            Ok(Ok(())) => {
                tracing::info!("master-data refresh completed");
                true
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "master-data refresh failed, will retry at the next scheduled deadline");
                false
            }
            Err(join_error) => {
                tracing::error!(error = %join_error, "master-data refresh task panicked, will retry at the next scheduled deadline");
                false
            }
        }
    }
}

async fn refresh_once(store: &Store, cache: &CacheGateway, trading_date: &TradingDateTracker) -> Result<()> {
    let underlyings = store.list_fno_underlyings().await?;
    for underlying in &underlyings {
        cache.set_fno_underlying(underlying).await?;
    }

    let today = time::trading_date_now();
    cache.set_trading_date(&today, &time::now_ist().to_rfc3339()).await?;
    trading_date.observe(&today);

    tracing::info!(count = underlyings.len(), trading_date = %today, "refreshed master data");
    Ok(())
}
