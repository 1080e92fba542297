//! Admin HTTP surface: health, subscription introspection, upstream
//! subscription control, FNO underlying lookup, and token reload.
//!
//! Routing and error-response shape are grounded in `moexco-okane`'s `api`
//! crate (`server.rs`'s `AppState`/router composition, `error.rs`'s
//! `ApiError`/`IntoResponse` mapping), narrowed to the handful of kinds this
//! service's error taxonomy actually produces.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::Core;
use crate::error::Error;
use crate::types::instrument::InstrumentKey;
use crate::types::mode::SubscriptionMode;
use crate::upstream::supervisor::ControlOutcome;

/// Build the admin HTTP router over a shared [`Core`].
pub fn router(core: Arc<Core>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/market-data", get(market_data_all))
        .route("/api/market-data/{instrument_key}", get(market_data_one))
        .route("/api/subscriptions", get(subscriptions))
        .route("/api/instruments", get(subscriptions))
        .route("/api/instruments/modes", get(instrument_modes))
        .route("/api/instruments/subscribe", post(subscribe))
        .route("/api/instruments/unsubscribe", post(unsubscribe))
        .route("/api/instruments/change-mode", post(change_mode))
        .route("/api/fno-underlying", get(fno_underlying))
        .route("/api/admin/reload-tokens", post(reload_tokens))
        .with_state(core)
}

/// Wraps [`Error`] to implement [`IntoResponse`] with a kind → status
/// mapping: `AdminValidation` is the only 400, everything else this surface
/// can produce is a 500.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::AdminValidation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn health(State(core): State<Arc<Core>>) -> Json<serde_json::Value> {
    let summary = core.health().await;
    let market: Vec<_> = summary
        .market
        .iter()
        .map(|c| json!({ "token_index": c.token_index, "state": format!("{:?}", c.state) }))
        .collect();
    let portfolio: Vec<_> = summary
        .portfolio
        .iter()
        .map(|c| json!({ "token_index": c.token_index, "state": format!("{:?}", c.state) }))
        .collect();
    Json(json!({
        "status": if summary.has_live_market_connector() { "healthy" } else { "degraded" },
        "market": market,
        "portfolio": portfolio,
        "connected_clients": core.hub.client_count().await,
        "trading_date": core.trading_date.current(),
    }))
}

async fn market_data_all(State(core): State<Arc<Core>>) -> Result<Json<serde_json::Value>, ApiError> {
    let subscribed = core.supervisor.read().await.subscribed_snapshot().await;
    let mut out = serde_json::Map::new();
    for instrument in subscribed.keys() {
        if let Some(tick) = core.cache.get_tick(instrument).await? {
            out.insert(instrument.to_string(), serde_json::to_value(tick).unwrap_or(serde_json::Value::Null));
        }
    }
    Ok(Json(serde_json::Value::Object(out)))
}

async fn market_data_one(
    State(core): State<Arc<Core>>,
    Path(instrument_key): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tick = core.cache.get_tick(&InstrumentKey::from(instrument_key)).await?;
    Ok(Json(json!({ "data": tick })))
}

async fn subscriptions(State(core): State<Arc<Core>>) -> Json<serde_json::Value> {
    let subscribed = core.supervisor.read().await.subscribed_snapshot().await;
    let instruments: Vec<String> = subscribed.keys().map(ToString::to_string).collect();
    Json(json!({ "instruments": instruments }))
}

async fn instrument_modes(State(core): State<Arc<Core>>) -> Json<serde_json::Value> {
    let subscribed = core.supervisor.read().await.subscribed_snapshot().await;
    let modes: HashMap<String, &'static str> =
        subscribed.iter().map(|(k, v)| (k.to_string(), v.as_str())).collect();
    Json(json!({ "modes": modes }))
}

#[derive(Debug, Deserialize)]
struct InstrumentsBody {
    #[serde(default)]
    instruments: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ChangeModeBody {
    #[serde(default)]
    instruments: Vec<String>,
    mode: String,
}

fn parse_instruments(body: &InstrumentsBody) -> Result<Vec<InstrumentKey>, ApiError> {
    if body.instruments.is_empty() {
        return Err(ApiError(Error::AdminValidation("instruments must not be empty".into())));
    }
    Ok(body.instruments.iter().map(|s| InstrumentKey::from(s.as_str())).collect())
}

fn outcome_response(outcome: ControlOutcome) -> Result<Json<serde_json::Value>, ApiError> {
    if !outcome.any_succeeded() {
        return Err(ApiError(Error::Config(format!(
            "all connectors rejected the request: {:?}",
            outcome.failed
        ))));
    }
    Ok(Json(json!({
        "success": true,
        "succeeded": outcome.succeeded,
        "failed": outcome.failed.into_iter().map(|(idx, msg)| json!({ "token_index": idx, "error": msg })).collect::<Vec<_>>(),
    })))
}

async fn subscribe(
    State(core): State<Arc<Core>>,
    Json(body): Json<InstrumentsBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let instruments = parse_instruments(&body)?;
    let outcome = core.supervisor.read().await.subscribe(&instruments, SubscriptionMode::Full).await?;
    outcome_response(outcome)
}

async fn unsubscribe(
    State(core): State<Arc<Core>>,
    Json(body): Json<InstrumentsBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let instruments = parse_instruments(&body)?;
    let outcome = core.supervisor.read().await.unsubscribe(&instruments).await?;
    outcome_response(outcome)
}

async fn change_mode(
    State(core): State<Arc<Core>>,
    Json(body): Json<ChangeModeBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.instruments.is_empty() {
        return Err(ApiError(Error::AdminValidation("instruments must not be empty".into())));
    }
    let mode = SubscriptionMode::parse(&body.mode)
        .ok_or_else(|| ApiError(Error::AdminValidation(format!("unrecognized mode: {}", body.mode))))?;
    let instruments: Vec<InstrumentKey> = body.instruments.iter().map(|s| InstrumentKey::from(s.as_str())).collect();
    let outcome = core.supervisor.read().await.change_mode(&instruments, mode).await?;
    outcome_response(outcome)
}

#[derive(Debug, Deserialize)]
struct FnoQuery {
    trading_symbol: String,
}

#[derive(Debug, Serialize)]
struct FnoResponse {
    underlying: Option<crate::types::fno::FnoUnderlying>,
}

async fn fno_underlying(
    State(core): State<Arc<Core>>,
    Query(query): Query<FnoQuery>,
) -> Result<Json<FnoResponse>, ApiError> {
    if let Some(underlying) = core.cache.get_fno_underlying(&query.trading_symbol).await? {
        return Ok(Json(FnoResponse { underlying: Some(underlying) }));
    }
    let underlying = core.store.get_fno_underlying(&query.trading_symbol).await?;
    Ok(Json(FnoResponse { underlying }))
}

async fn reload_tokens(State(core): State<Arc<Core>>) -> Result<Json<serde_json::Value>, ApiError> {
    core.reload_tokens().await?;
    Ok(Json(json!({ "status": "reloaded" })))
}
