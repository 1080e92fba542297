//! The opaque instrument identifier.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier for a tradable entity (an index, an equity ISIN, or an
/// F&O contract), e.g. `"NSE_INDEX|Nifty 50"`.
///
/// The core treats this as an opaque token: equality and hashing are the
/// only operations it performs on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentKey(pub String);

impl InstrumentKey {
    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for InstrumentKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for InstrumentKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
