//! History Hydrator: serves OHLC candle series cache-first, falling back to
//! the broker's History API for ranges the live cache cannot satisfy.

pub mod api;
pub mod hydrator;

pub use hydrator::HistoryHydrator;
