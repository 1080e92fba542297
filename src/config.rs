//! Startup configuration.
//!
//! Every setting is sourced from the process environment and validated once,
//! at construction, via [`Settings::from_env`]. A missing required value or a
//! malformed URL produces a [`crate::error::Error::Config`] and aborts
//! startup before any connector, cache client, or HTTP listener exists.

use serde::Deserialize;

use crate::error::{Error, Result};

/// Fully-validated startup configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Comma-separated upstream account identifiers. When empty, the legacy
    /// single/secondary token keys are used instead by the Token Reloader.
    #[serde(default)]
    pub upstox_account_ids: Vec<String>,

    /// Cache (key/value store) host.
    #[serde(default = "default_cache_host")]
    pub cache_host: String,
    /// Cache (key/value store) port.
    #[serde(default = "default_cache_port")]
    pub cache_port: u16,
    /// Cache password, if the deployment requires auth.
    #[serde(default)]
    pub cache_password: Option<String>,

    /// Relational store connection URL (FNO underlying table). Accepts
    /// either `postgres://` or the source's own `postgresql+asyncpg://`
    /// convention, normalized at parse time.
    pub database_url: String,

    /// Base URL of the companion token-authority service, consulted by the
    /// Token Reloader when the cache holds no usable token.
    #[serde(default)]
    pub authority_service_url: Option<String>,

    /// Comma-separated initial instrument list subscribed at startup.
    #[serde(default)]
    pub initial_instruments: Vec<String>,

    /// HTTP port for the admin surface and downstream WebSocket endpoint.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

fn default_cache_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_cache_port() -> u16 {
    6379
}

fn default_http_port() -> u16 {
    8080
}

impl Settings {
    /// Load and validate configuration from the process environment.
    ///
    /// Uses the `config` crate to layer environment variables (prefixed
    /// `TICKGATE_`, double-underscore nested) over the field defaults above.
    pub fn from_env() -> Result<Self> {
        let raw = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("TICKGATE")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("upstox_account_ids")
                    .with_list_parse_key("initial_instruments"),
            )
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        let settings: Settings = raw
            .try_deserialize()
            .map_err(|e| Error::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(Error::Config("DATABASE_URL must not be empty".into()));
        }
        let _ = self.normalized_database_url()?;
        if self.http_port == 0 {
            return Err(Error::Config("HTTP_PORT must be non-zero".into()));
        }
        Ok(())
    }

    /// The cache connection URL, built from the individual host/port/password
    /// settings (`redis://[:password@]host:port`).
    pub fn cache_url(&self) -> String {
        match &self.cache_password {
            Some(password) => format!("redis://:{password}@{}:{}", self.cache_host, self.cache_port),
            None => format!("redis://{}:{}", self.cache_host, self.cache_port),
        }
    }

    /// The relational-store URL with the source's `postgresql+asyncpg://`
    /// scheme normalized to the plain `postgres://` scheme `sqlx` expects.
    pub fn normalized_database_url(&self) -> Result<String> {
        let url = if let Some(rest) = self.database_url.strip_prefix("postgresql+asyncpg://") {
            format!("postgres://{rest}")
        } else {
            self.database_url.clone()
        };
        url::Url::parse(&url)?;
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_asyncpg_scheme() {
        let settings = Settings {
            upstox_account_ids: vec![],
            cache_host: default_cache_host(),
            cache_port: default_cache_port(),
            cache_password: None,
            database_url: "postgresql+asyncpg://user:pw@localhost/db".into(),
            authority_service_url: None,
            initial_instruments: vec![],
            http_port: 8080,
        };
        assert_eq!(
            settings.normalized_database_url().unwrap(),
            "postgres://user:pw@localhost/db"
        );
    }

    #[test]
    fn rejects_empty_database_url() {
        let settings = Settings {
            upstox_account_ids: vec![],
            cache_host: default_cache_host(),
            cache_port: default_cache_port(),
            cache_password: None,
            database_url: "".into(),
            authority_service_url: None,
            initial_instruments: vec![],
            http_port: 8080,
        };
        assert!(settings.validate().is_err());
    }
}
