//! Relational store for the FNO underlying lookup.
//!
//! Adapted from the `moexco-okane` store crate's sqlx pool pattern
//! (`SqliteMarketStore`'s pool-per-database construction, simplified here to
//! one shared Postgres pool since this is a single whole-market table, not a
//! one-database-per-stock layout). The `instruments` table itself is owned
//! and populated by an upstream instrument-master service, not by this one:
//! this store only reads it, via the same self-join the original
//! implementation used to find every NSE instrument that has at least one
//! F&O contract referencing it as an underlying.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::Result;
use crate::types::fno::FnoUnderlying;

const FNO_UNDERLYING_QUERY: &str = r#"
    SELECT
        i.instrument_key,
        i.trading_symbol,
        i.name AS display_name,
        i.segment,
        i.instrument_type,
        i.tick_size
    FROM instruments i
    WHERE i.exchange = 'NSE'
    AND EXISTS (
        SELECT 1 FROM instruments f
        WHERE f.segment = 'NSE_FO'
        AND f.underlying_symbol = i.trading_symbol
    )
"#;

/// A connected handle to the relational store.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Connect to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(5).connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Fetch every FNO underlying, ordered by trading symbol. Used by the
    /// Master-Data Scheduler to repopulate the cache once a day.
    pub async fn list_fno_underlyings(&self) -> Result<Vec<FnoUnderlying>> {
        let rows = sqlx::query_as::<_, FnoUnderlying>(&format!("{FNO_UNDERLYING_QUERY} ORDER BY i.trading_symbol"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Fetch one FNO underlying by trading symbol, bypassing the cache.
    /// Used when a cache miss needs a direct answer outside the daily
    /// refresh cycle.
    pub async fn get_fno_underlying(&self, trading_symbol: &str) -> Result<Option<FnoUnderlying>> {
        let row = sqlx::query_as::<_, FnoUnderlying>(&format!("{FNO_UNDERLYING_QUERY} AND i.trading_symbol = $1"))
            .bind(trading_symbol)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}
