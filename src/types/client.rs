//! Downstream client filter state.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use super::instrument::InstrumentKey;

/// Server-assigned, unique identifier for a downstream WebSocket client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Generate a fresh, random client identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tick filter: either the all-instruments wildcard, or an explicit set of
/// [`InstrumentKey`]s.
#[derive(Debug, Clone, Default)]
pub struct TickFilter {
    /// Explicitly-subscribed instrument keys.
    items: HashSet<InstrumentKey>,
    /// Whether the wildcard `"*"` is present.
    wildcard: bool,
}

impl TickFilter {
    /// The default filter assigned on client accept: the all-instruments
    /// wildcard.
    pub fn wildcard() -> Self {
        Self {
            items: HashSet::new(),
            wildcard: true,
        }
    }

    /// Union `items` into this filter. `["*"]` (or an empty list) sets the
    /// wildcard.
    pub fn subscribe(&mut self, items: &[InstrumentKey]) {
        if items.is_empty() {
            self.wildcard = true;
            return;
        }
        for item in items {
            if item.as_str() == "*" {
                self.wildcard = true;
            } else {
                self.items.insert(item.clone());
            }
        }
    }

    /// Remove `items` from this filter. An empty list is a no-op (matching
    /// the Registry's contract that only `subscribe` treats empty as "all").
    pub fn unsubscribe(&mut self, items: &[InstrumentKey]) {
        for item in items {
            if item.as_str() == "*" {
                self.wildcard = false;
            } else {
                self.items.remove(item);
            }
        }
    }

    /// Whether this filter matches the given instrument (or is the
    /// wildcard).
    pub fn matches(&self, instrument: &InstrumentKey) -> bool {
        self.wildcard || self.items.contains(instrument)
    }

    /// Whether the wildcard is present.
    pub fn has_wildcard(&self) -> bool {
        self.wildcard
    }

    /// The current subscription set as it should be reported back to the
    /// client: `["*"]` if wildcarded, else the explicit instrument list.
    pub fn snapshot(&self) -> Vec<String> {
        if self.wildcard {
            vec!["*".to_owned()]
        } else {
            self.items.iter().map(|k| k.0.clone()).collect()
        }
    }
}

/// A per-instrument OHLC interval filter: either the all-intervals wildcard,
/// or an explicit set of interval names.
#[derive(Debug, Clone, Default)]
pub struct OhlcFilter {
    per_instrument: HashMap<InstrumentKey, IntervalSet>,
}

#[derive(Debug, Clone, Default)]
struct IntervalSet {
    items: HashSet<String>,
    wildcard: bool,
}

impl OhlcFilter {
    /// Add `intervals` (or the wildcard, if empty) for each of `instruments`.
    pub fn subscribe(&mut self, instruments: &[InstrumentKey], intervals: &[String]) {
        for instrument in instruments {
            let entry = self.per_instrument.entry(instrument.clone()).or_default();
            if intervals.is_empty() || intervals.iter().any(|i| i == "*") {
                entry.wildcard = true;
            } else {
                entry.items.extend(intervals.iter().cloned());
            }
        }
    }

    /// Three-level wildcard unsubscribe:
    /// - `(None, _)` clears every instrument entirely.
    /// - `(Some(instruments), None)` clears those instruments entirely.
    /// - `(Some(instruments), Some(intervals))` removes only the listed
    ///   intervals from each listed instrument, dropping the instrument
    ///   entry if it becomes empty.
    pub fn unsubscribe(&mut self, instruments: Option<&[InstrumentKey]>, intervals: Option<&[String]>) {
        match (instruments, intervals) {
            (None, _) => self.per_instrument.clear(),
            (Some(instruments), None) => {
                for instrument in instruments {
                    self.per_instrument.remove(instrument);
                }
            }
            (Some(instruments), Some(intervals)) => {
                for instrument in instruments {
                    if let Some(entry) = self.per_instrument.get_mut(instrument) {
                        for interval in intervals {
                            if interval == "*" {
                                entry.wildcard = false;
                            } else {
                                entry.items.remove(interval);
                            }
                        }
                        if !entry.wildcard && entry.items.is_empty() {
                            self.per_instrument.remove(instrument);
                        }
                    }
                }
            }
        }
    }

    /// Whether this filter matches (instrument, interval).
    pub fn matches(&self, instrument: &InstrumentKey, interval: &str) -> bool {
        self.per_instrument
            .get(instrument)
            .is_some_and(|entry| entry.wildcard || entry.items.contains(interval))
    }

    /// Snapshot as `{instrument_key: ["*"] | [intervals...]}` for reporting
    /// back to the client.
    pub fn snapshot(&self) -> HashMap<String, Vec<String>> {
        self.per_instrument
            .iter()
            .map(|(k, v)| {
                let intervals = if v.wildcard {
                    vec!["*".to_owned()]
                } else {
                    v.items.iter().cloned().collect()
                };
                (k.0.clone(), intervals)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> InstrumentKey {
        InstrumentKey::from(s)
    }

    #[test]
    fn tick_filter_empty_subscribe_sets_wildcard() {
        let mut filter = TickFilter::default();
        filter.subscribe(&[]);
        assert!(filter.has_wildcard());
        assert_eq!(filter.snapshot(), vec!["*".to_owned()]);
    }

    #[test]
    fn tick_filter_unsubscribe_wildcard_falls_back_to_explicit_set() {
        let mut filter = TickFilter::wildcard();
        filter.subscribe(&[key("A")]);
        filter.unsubscribe(&[key("*")]);
        assert!(!filter.has_wildcard());
        assert!(filter.matches(&key("A")));
        assert!(!filter.matches(&key("B")));
    }

    #[test]
    fn ohlc_filter_three_level_unsubscribe_wildcards() {
        let mut filter = OhlcFilter::default();
        filter.subscribe(&[key("A"), key("B")], &["1min".to_owned(), "1day".to_owned()]);

        // (Some(instruments), Some(intervals)): remove one interval from one
        // instrument only.
        filter.unsubscribe(Some(&[key("A")]), Some(&["1min".to_owned()]));
        assert!(!filter.matches(&key("A"), "1min"));
        assert!(filter.matches(&key("A"), "1day"));
        assert!(filter.matches(&key("B"), "1min"));

        // (Some(instruments), None): clear that instrument entirely.
        filter.unsubscribe(Some(&[key("B")]), None);
        assert!(!filter.matches(&key("B"), "1min"));
        assert!(!filter.matches(&key("B"), "1day"));

        // (None, _): clear everything.
        filter.unsubscribe(None, None);
        assert!(!filter.matches(&key("A"), "1day"));
    }

    #[test]
    fn ohlc_filter_drops_instrument_entry_once_its_intervals_are_empty() {
        let mut filter = OhlcFilter::default();
        filter.subscribe(&[key("A")], &["1min".to_owned()]);
        filter.unsubscribe(Some(&[key("A")]), Some(&["1min".to_owned()]));
        assert!(filter.snapshot().is_empty());
    }
}
