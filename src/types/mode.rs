//! Upstream per-instrument subscription verbosity.

use serde::{Deserialize, Serialize};

/// The verbosity of an upstream per-instrument subscription.
///
/// Assigned per instrument on the upstream connectors; default is
/// [`SubscriptionMode::Full`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionMode {
    /// Full depth, greeks and extended fields.
    Full,
    /// Last-traded price/time/change-percent only.
    Ltpc,
    /// Option greeks only.
    OptionGreeks,
    /// Full depth at 30 levels.
    FullD30,
}

impl Default for SubscriptionMode {
    fn default() -> Self {
        Self::Full
    }
}

impl SubscriptionMode {
    /// Parse the HTTP/WS wire representation (`"full"`, `"ltpc"`,
    /// `"option_greeks"`, `"full_d30"`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full" => Some(Self::Full),
            "ltpc" => Some(Self::Ltpc),
            "option_greeks" => Some(Self::OptionGreeks),
            "full_d30" => Some(Self::FullD30),
            _ => None,
        }
    }

    /// The wire representation of this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Ltpc => "ltpc",
            Self::OptionGreeks => "option_greeks",
            Self::FullD30 => "full_d30",
        }
    }
}
