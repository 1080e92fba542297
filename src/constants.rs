//! Constants for the upstream broker integration and the cache layout.
//!
//! Contains WebSocket/History-API endpoint bases, cache TTLs, and the
//! numeric/interval mappings needed at the ingestion and hydration
//! boundaries. These are used internally by [`crate::upstream`] and
//! [`crate::history`], but are exported for advanced use.

// ---------------------------------------------------------------------------
// Upstream base URLs
// ---------------------------------------------------------------------------

/// Base URL for the broker REST API (History API lives under this).
pub const API_BASE_URL: &str = "https://api.upstox.com/v2";

/// WebSocket endpoint for the live market-data feed.
pub const WS_MARKET_FEED_URL: &str = "wss://api.upstox.com/v2/feed/market-data-feed";

/// WebSocket endpoint for the portfolio (order/position/holding) stream.
pub const WS_PORTFOLIO_FEED_URL: &str = "wss://api.upstox.com/v2/feed/portfolio-stream-feed";

// ---------------------------------------------------------------------------
// Cache TTLs (seconds)
// ---------------------------------------------------------------------------

/// TTL for the latest-tick snapshot key.
pub const TICK_TTL_SECS: u64 = 300;

/// TTL for the opaque portfolio snapshot key.
pub const PORTFOLIO_TTL_SECS: u64 = 300;

/// TTL for a candle series ZSET, set only once, at creation.
pub const CANDLE_SERIES_TTL_SECS: i64 = 86_400;

/// TTL for the `:latest` candle pointer key.
pub const CANDLE_LATEST_TTL_SECS: i64 = 86_400;

/// TTL for a cached FNO underlying record.
pub const FNO_UNDERLYING_TTL_SECS: i64 = 604_800;

// ---------------------------------------------------------------------------
// Reconnect policy
// ---------------------------------------------------------------------------

/// Upstream Connector reconnect interval.
pub const RECONNECT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(10);

/// Upstream Connector reconnect attempt cap before `auto_reconnect_stopped`.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

// ---------------------------------------------------------------------------
// Master-data scheduler
// ---------------------------------------------------------------------------

/// Hour of day (IST) at which the daily master-data refresh runs.
pub const MASTER_DATA_REFRESH_HOUR: u32 = 8;

/// Backoff before retrying a failed master-data refresh iteration.
pub const MASTER_DATA_RETRY_BACKOFF: std::time::Duration = std::time::Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Fan-out Hub
// ---------------------------------------------------------------------------

/// Bounded per-client outbound channel capacity; a client that cannot keep up
/// is dropped rather than allowed to stall the hub.
pub const CLIENT_SEND_BUFFER: usize = 1024;

/// Number of concurrent workers in the History Hydrator's pool.
pub const HYDRATOR_WORKER_POOL_SIZE: usize = 4;

/// Maps a live-ingestion interval tag from the broker into the canonical
/// interval name, or `None` to silently discard unrecognized intervals.
pub fn canonical_live_interval(broker_tag: &str) -> Option<&'static str> {
    match broker_tag {
        "I1" => Some("1min"),
        "1d" => Some("1day"),
        _ => None,
    }
}

/// Maps a hydration-requested interval name to the broker History API's own
/// `(unit, interval)` pair. Supports a broader set of granularities than are
/// ever live-ingested, since the broker's intraday History API itself
/// supports them.
pub fn history_unit_interval(interval: &str) -> Option<(&'static str, u32)> {
    match interval {
        "1min" => Some(("minute", 1)),
        "5min" => Some(("minute", 5)),
        "15min" => Some(("minute", 15)),
        "30min" => Some(("minute", 30)),
        "1day" => Some(("day", 1)),
        _ => None,
    }
}
