//! REST client for the broker's History API.
//!
//! A thin `reqwest::Client` wrapper scoped to the one endpoint this service
//! needs: historical/intraday candles. The bearer token is swapped out at
//! hydration time by pointing this client to a fresh instance rather than
//! mutating headers in place, since each account keeps its own token
//! lifecycle via the Token Reloader.

use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Deserialize;

use crate::constants::API_BASE_URL;
use crate::error::{ApiErrorBody, Error, Result};

/// One candle as returned by the broker's History API: an ordered
/// `[timestamp, open, high, low, close, volume, oi]` tuple, per candle.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryApiCandle(pub (String, f64, f64, f64, f64, i64, i64));

impl HistoryApiCandle {
    /// ISO-8601 timestamp of the candle start.
    pub fn timestamp(&self) -> &str {
        &self.0.0
    }
    pub fn open(&self) -> f64 {
        self.0.1
    }
    pub fn high(&self) -> f64 {
        self.0.2
    }
    pub fn low(&self) -> f64 {
        self.0.3
    }
    pub fn close(&self) -> f64 {
        self.0.4
    }
    pub fn volume(&self) -> i64 {
        self.0.5
    }
    pub fn open_interest(&self) -> i64 {
        self.0.6
    }
}

#[derive(Debug, Deserialize)]
struct HistoryApiData {
    #[serde(default)]
    candles: Vec<HistoryApiCandle>,
}

#[derive(Debug, Deserialize)]
struct HistoryApiResponse {
    status: String,
    #[serde(default)]
    data: Option<HistoryApiData>,
}

/// Thin wrapper over `reqwest::Client` for the History API, authenticated
/// with one account's access token.
#[derive(Debug, Clone)]
pub struct HistoryApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl HistoryApiClient {
    /// Build a client authenticated with `access_token`.
    pub fn new(access_token: &str) -> Result<Self> {
        Self::with_base_url(access_token, API_BASE_URL)
    }

    /// Build a client pointed at a custom base URL (for tests).
    pub fn with_base_url(access_token: &str, base_url: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {access_token}"))
            .map_err(|e| Error::Config(format!("invalid access token: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    /// Fetch candles for `instrument_key` at the broker's `(unit, interval)`
    /// granularity, between `from_date` and `to_date` (both `YYYY-MM-DD`).
    pub async fn get_candles(
        &self,
        instrument_key: &str,
        unit: &str,
        interval: u32,
        from_date: &str,
        to_date: &str,
    ) -> Result<Vec<HistoryApiCandle>> {
        let url = format!(
            "{}/historical-candle/{}/{unit}/{interval}/{to_date}/{from_date}",
            self.base_url,
            urlencoding_path(instrument_key),
        );
        tracing::debug!(%url, "GET historical candles");

        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await.unwrap_or_default();

        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes);
            return Err(Self::parse_error_body(status, &body));
        }

        let parsed: HistoryApiResponse = serde_json::from_slice(&bytes)?;
        if parsed.status != "success" {
            return Err(Error::HistoryApi(format!("non-success status: {}", parsed.status)));
        }
        Ok(parsed.data.map(|d| d.candles).unwrap_or_default())
    }

    fn parse_error_body(status: reqwest::StatusCode, body: &str) -> Error {
        if let Ok(api_err) = serde_json::from_str::<ApiErrorBody>(body) {
            if api_err.error_code.is_some() || api_err.error_message.is_some() {
                return Error::HistoryApi(api_err.to_string());
            }
        }
        Error::HistoryApi(format!("HTTP {status}: {body}"))
    }
}

fn urlencoding_path(instrument_key: &str) -> String {
    url::form_urlencoded::byte_serialize(instrument_key.as_bytes()).collect()
}
