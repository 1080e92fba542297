//! Core domain types shared across the ingestion, registry, hub and
//! hydration components.
//!
//! ## Organization
//!
//! - [`instrument`] — the opaque `InstrumentKey` newtype
//! - [`mode`] — upstream `SubscriptionMode`
//! - [`tick`] — the latest-trade `Tick` record
//! - [`candle`] — OHLC `Candle` records and interval/status enums
//! - [`client`] — downstream `Downstream Client` filter state
//! - [`fno`] — the cached FNO underlying record
//!
//! All of the above are re-exported at the module root.

pub mod candle;
pub mod client;
pub mod fno;
pub mod instrument;
pub mod mode;
pub mod tick;

pub use candle::{Candle, CandleInterval, CandleStatus};
pub use client::{ClientId, OhlcFilter, TickFilter};
pub use fno::FnoUnderlying;
pub use instrument::InstrumentKey;
pub use mode::SubscriptionMode;
pub use tick::Tick;
