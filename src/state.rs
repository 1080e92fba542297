//! Small pieces of process-wide shared state that don't warrant their own
//! module: currently just the trading-date pointer.

use std::sync::RwLock;

/// The process-wide "current trading date" pointer.
///
/// Every ingested event computes its own trading date from its own
/// timestamp ([`crate::time::trading_date_for`]); this tracker is a
/// separate, monotonic side effect of those computations, advanced forward
/// only, and used by components that need "today" without an event at hand
/// (e.g. the History Hydrator resolving a bare `"latest"` granularity
/// request).
#[derive(Default)]
pub struct TradingDateTracker {
    current: RwLock<Option<String>>,
}

impl TradingDateTracker {
    /// Build a tracker with no observed trading date yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe a trading date derived from an ingested event. Advances the
    /// pointer only if `date` is lexicographically (and thus
    /// chronologically, given the `YYYY-MM-DD` format) greater than the
    /// current value.
    pub fn observe(&self, date: &str) {
        let mut current = self.current.write().expect("trading date lock poisoned");
        let should_advance = match current.as_deref() {
            Some(existing) => date > existing,
            None => true,
        };
        if should_advance {
            *current = Some(date.to_owned());
        }
    }

    /// The current trading date, if any event has been observed yet.
    pub fn current(&self) -> Option<String> {
        self.current.read().expect("trading date lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_forward_only() {
        let tracker = TradingDateTracker::new();
        tracker.observe("2026-07-28");
        tracker.observe("2026-07-27");
        assert_eq!(tracker.current().as_deref(), Some("2026-07-28"));
        tracker.observe("2026-07-29");
        assert_eq!(tracker.current().as_deref(), Some("2026-07-29"));
    }
}
