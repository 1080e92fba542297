//! Error types for the `tickgate` crate.
//!
//! All fallible operations in this crate return [`Result<T>`], which is an
//! alias for `std::result::Result<T, Error>`.
//!
//! [`Error`] covers every failure kind the service can surface: startup
//! configuration, upstream broker connectivity, cache/store unavailability,
//! and downstream client protocol violations. Every third-party error type
//! (`reqwest`, `tokio_tungstenite`, `redis`, `sqlx`, `serde_json`, `url`) is
//! converted into one of these variants at the boundary where it first
//! occurs; no component further inward names a third-party error type
//! directly.

use std::fmt;

/// All possible errors produced by the `tickgate` service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or malformed startup configuration. Fatal at startup; during a
    /// token reload, surfaced as an HTTP 500 with the previous connectors
    /// left stopped.
    #[error("configuration error: {0}")]
    Config(String),

    /// The broker rejected an upstream access token.
    #[error("upstream auth rejected for token index {token_index}: {message}")]
    UpstreamAuth {
        /// Index of the token/connector within the configured set.
        token_index: usize,
        /// Human-readable detail from the broker, if any.
        message: String,
    },

    /// Transport-level failure talking to an upstream WebSocket.
    #[error("upstream network error on token index {token_index}: {source}")]
    UpstreamNetwork {
        /// Index of the token/connector within the configured set.
        token_index: usize,
        /// Underlying transport error.
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    /// A broker frame could not be decoded into a recognized shape.
    #[error("upstream protocol error on token index {token_index}: {message}")]
    UpstreamProtocol {
        /// Index of the token/connector within the configured set.
        token_index: usize,
        /// Description of the malformed frame.
        message: String,
    },

    /// The cache (key/value store) is unavailable or returned an error.
    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// The relational store (FNO underlying table) is unavailable or
    /// returned an error.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// The broker's History API failed or returned an unexpected body.
    #[error("history API error: {0}")]
    HistoryApi(String),

    /// A downstream client sent malformed JSON or an unrecognized action.
    #[error("client protocol error: {0}")]
    ClientProtocol(String),

    /// A downstream client's socket write failed or its send buffer
    /// overflowed; that session is closed, others are unaffected.
    #[error("client send error: {0}")]
    ClientSend(String),

    /// An admin HTTP request failed validation (e.g. empty `instruments`,
    /// unrecognized `mode`).
    #[error("admin validation error: {0}")]
    AdminValidation(String),

    /// An HTTP/transport failure talking to the broker's REST APIs.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to deserialize a JSON payload.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error building or parsing a URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error body returned by the broker's REST APIs.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    /// Category of the error (e.g. `"UDAPI100050"`).
    #[serde(default)]
    pub error_code: Option<String>,
    /// Human-readable description of the error.
    #[serde(default)]
    pub error_message: Option<String>,
}

impl fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.error_code.as_deref().unwrap_or("UNKNOWN"),
            self.error_message.as_deref().unwrap_or("no message"),
        )
    }
}
