//! The FNO underlying table entity.

use serde::{Deserialize, Serialize};

/// An underlying instrument for which futures/options contracts exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FnoUnderlying {
    /// Opaque instrument key of the underlying.
    pub instrument_key: String,
    /// Trading symbol (cache key suffix).
    pub trading_symbol: String,
    /// Human-readable display name.
    pub display_name: String,
    /// Exchange segment (e.g. `"NSE_FO"`).
    pub segment: String,
    /// Instrument type (e.g. `"INDEX"`, `"EQUITY"`).
    pub instrument_type: String,
    /// Minimum price movement for contracts on this underlying.
    pub tick_size: f64,
}
