//! Cache Gateway: a typed wrapper over the Redis-compatible key/value store
//! that holds the latest-tick snapshot, OHLC candle series, FNO underlying
//! records, trading-date master data, and upstream access tokens.
//!
//! One thin connection handle, a handful of typed methods at the top, with
//! serialization and key-naming details kept out of callers.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::constants::{
    CANDLE_LATEST_TTL_SECS, CANDLE_SERIES_TTL_SECS, FNO_UNDERLYING_TTL_SECS, PORTFOLIO_TTL_SECS, TICK_TTL_SECS,
};
use crate::error::Result;
use crate::types::candle::Candle;
use crate::types::fno::FnoUnderlying;
use crate::types::instrument::InstrumentKey;
use crate::types::tick::Tick;

/// A connected handle to the cache store.
#[derive(Clone)]
pub struct CacheGateway {
    conn: ConnectionManager,
}

impl CacheGateway {
    /// Connect to `url` (`redis://[:password@]host:port[/db]`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    // -- latest-tick / portfolio snapshots -----------------------------------

    /// Write the latest tick snapshot for an instrument, refreshing its TTL.
    pub async fn set_tick(&self, tick: &Tick) -> Result<()> {
        let key = tick_key(&tick.instrument_key);
        let payload = serde_json::to_string(tick)?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, payload, TICK_TTL_SECS).await?;
        Ok(())
    }

    /// Read the latest cached tick for an instrument, if present and not
    /// expired.
    pub async fn get_tick(&self, instrument: &InstrumentKey) -> Result<Option<Tick>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(tick_key(instrument)).await?;
        Ok(match raw {
            Some(s) => Some(serde_json::from_str(&s)?),
            None => None,
        })
    }

    /// Overwrite the opaque portfolio snapshot blob.
    pub async fn set_portfolio_snapshot(&self, payload: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>("portfolio_data", payload, PORTFOLIO_TTL_SECS).await?;
        Ok(())
    }

    // -- OHLC candle series ---------------------------------------------------

    /// Append or replace a candle in its series ZSET, scored by timestamp,
    /// and update the `:latest` pointer.
    ///
    /// Asymmetric update rule (per the hydration contract): the `:latest`
    /// pointer only advances forward in time, so a late-arriving completed
    /// candle that supersedes an already-cached active bar never regresses
    /// it, while a genuinely new bar always replaces the pointer.
    pub async fn upsert_candle(&self, trading_date: &str, candle: &Candle) -> Result<()> {
        let series_key = candle_series_key(trading_date, candle);
        let member = serde_json::to_string(candle)?;
        let mut conn = self.conn.clone();

        // Remove any existing member at this timestamp before re-adding: the
        // active candle at a given minute is mutated in place, not appended
        // to, so the ZSET must not accumulate stale revisions at the same
        // score.
        let existing: Vec<String> = conn
            .zrangebyscore(&series_key, candle.timestamp, candle.timestamp)
            .await?;
        if !existing.is_empty() {
            conn.zrem::<_, _, ()>(&series_key, existing).await?;
        }
        conn.zadd::<_, _, _, ()>(&series_key, member, candle.timestamp).await?;
        conn.expire::<_, ()>(&series_key, CANDLE_SERIES_TTL_SECS).await?;

        let latest_key = candle_latest_key(trading_date, candle);
        let should_advance = match self.get_latest_candle(trading_date, &candle.instrument_key, candle.interval.as_str()).await? {
            Some(existing_latest) => candle.timestamp >= existing_latest.timestamp,
            None => true,
        };
        if should_advance {
            let payload = serde_json::to_string(candle)?;
            conn.set_ex::<_, _, ()>(latest_key, payload, CANDLE_LATEST_TTL_SECS).await?;
        }
        Ok(())
    }

    /// Read the `:latest` candle pointer for (instrument, interval) on a
    /// trading date.
    pub async fn get_latest_candle(
        &self,
        trading_date: &str,
        instrument: &InstrumentKey,
        interval: &str,
    ) -> Result<Option<Candle>> {
        let mut conn = self.conn.clone();
        let key = format!("ohlc:{trading_date}:{instrument}:{interval}:latest");
        let raw: Option<String> = conn.get(key).await?;
        Ok(match raw {
            Some(s) => Some(serde_json::from_str(&s)?),
            None => None,
        })
    }

    /// Read the full candle series for (instrument, interval) on a trading
    /// date, ordered oldest-first.
    pub async fn get_candle_series(
        &self,
        trading_date: &str,
        instrument: &InstrumentKey,
        interval: &str,
    ) -> Result<Vec<Candle>> {
        let mut conn = self.conn.clone();
        let key = format!("ohlc:{trading_date}:{instrument}:{interval}");
        let members: Vec<String> = conn.zrange(key, 0, -1).await?;
        members
            .iter()
            .map(|m| serde_json::from_str(m).map_err(Into::into))
            .collect()
    }

    // -- master data -----------------------------------------------------------

    /// Cache today's trading date (and the refresh timestamp), overwriting
    /// any previous value.
    pub async fn set_trading_date(&self, trading_date: &str, updated_at: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>("master_data:trading_date", trading_date).await?;
        conn.set::<_, _, ()>("master_data:trading_date:updated_at", updated_at).await?;
        Ok(())
    }

    /// Read the cached trading date, if any.
    pub async fn get_trading_date(&self) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get("master_data:trading_date").await?)
    }

    /// Cache an FNO underlying record by trading symbol.
    pub async fn set_fno_underlying(&self, underlying: &FnoUnderlying) -> Result<()> {
        let key = format!("fno_und:{}", underlying.trading_symbol);
        let payload = serde_json::to_string(underlying)?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, payload, FNO_UNDERLYING_TTL_SECS).await?;
        Ok(())
    }

    /// Read a cached FNO underlying record by trading symbol.
    pub async fn get_fno_underlying(&self, trading_symbol: &str) -> Result<Option<FnoUnderlying>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(format!("fno_und:{trading_symbol}")).await?;
        Ok(match raw {
            Some(s) => Some(serde_json::from_str(&s)?),
            None => None,
        })
    }

    // -- upstream access tokens -------------------------------------------------

    /// Read a cached access token for an account, preferring the current key
    /// shape and falling back to the legacy single-token key.
    pub async fn get_access_token(&self, account_id: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let current: Option<String> = conn.get(format!("upstox_access_token:{account_id}")).await?;
        if current.is_some() {
            return Ok(current);
        }
        Ok(conn.get("upstox_access_token").await?)
    }

    /// Overwrite a cached access token for an account (used by the token
    /// reloader after a successful resolution from a non-cache source, so
    /// subsequent reloads hit the fast path).
    pub async fn set_access_token(&self, account_id: &str, token: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(format!("upstox_access_token:{account_id}"), token).await?;
        Ok(())
    }

    /// Read the legacy primary/secondary single-account token keys, used
    /// when no account identifiers are configured (at most two connectors
    /// result).
    pub async fn get_legacy_tokens(&self) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let primary: Option<String> = conn.get("upstox_access_token").await?;
        let secondary: Option<String> = conn.get("upstox_access_token_secondary").await?;
        Ok(primary.into_iter().chain(secondary).collect())
    }
}

fn tick_key(instrument: &InstrumentKey) -> String {
    format!("market_data:{instrument}")
}

fn candle_series_key(trading_date: &str, candle: &Candle) -> String {
    format!("ohlc:{trading_date}:{}", candle.series_suffix())
}

fn candle_latest_key(trading_date: &str, candle: &Candle) -> String {
    format!("ohlc:{trading_date}:{}:latest", candle.series_suffix())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_key_shape() {
        let key = tick_key(&InstrumentKey::from("NSE_INDEX|Nifty 50"));
        assert_eq!(key, "market_data:NSE_INDEX|Nifty 50");
    }

    #[test]
    fn candle_key_shapes() {
        let candle = Candle {
            instrument_key: InstrumentKey::from("NSE_EQ|INE002A01018"),
            interval: crate::types::candle::CandleInterval::OneMinute,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 0,
            timestamp: 0,
            candle_status: crate::types::candle::CandleStatus::Active,
            oi: None,
            market_level: None,
            option_greeks: None,
        };
        assert_eq!(
            candle_series_key("2026-07-29", &candle),
            "ohlc:2026-07-29:NSE_EQ|INE002A01018:1min"
        );
        assert_eq!(
            candle_latest_key("2026-07-29", &candle),
            "ohlc:2026-07-29:NSE_EQ|INE002A01018:1min:latest"
        );
    }
}
