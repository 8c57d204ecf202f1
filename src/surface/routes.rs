//! Control surface route handlers.
//!
//! All endpoints return JSON. Registry mutations go through the shared
//! lock; invalid input is rejected synchronously with a specific reason.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::advisor::AdvisoryService;
use crate::broker::BrokerGateway;
use crate::registry::EquityRegistry;
use crate::types::{Equity, MartenError};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct SurfaceState {
    pub registry: Arc<Mutex<EquityRegistry>>,
    pub broker: Arc<dyn BrokerGateway>,
    pub advisor: Arc<dyn AdvisoryService>,
}

pub type AppState = Arc<SurfaceState>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AddEquityRequest {
    pub symbol: String,
    pub levels: u32,
    /// Drawdown between levels as a percentage (5.0 = 5%).
    pub drawdown_pct: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub symbol: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub symbol: String,
    pub price: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_status(e: &MartenError) -> StatusCode {
    match e {
        MartenError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
        MartenError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn error_json(e: MartenError) -> (StatusCode, Json<ErrorResponse>) {
    (
        error_status(&e),
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

pub async fn health() -> &'static str {
    "ok"
}

/// `GET /api/equities` — registry snapshot for display.
pub async fn list_equities(State(state): State<AppState>) -> Json<Vec<Equity>> {
    Json(state.registry.lock().await.snapshot())
}

/// `POST /api/equities` — register a symbol.
pub async fn add_equity(
    State(state): State<AppState>,
    Json(req): Json<AddEquityRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let drawdown = req.drawdown_pct / Decimal::ONE_HUNDRED;
    state
        .registry
        .lock()
        .await
        .add(&req.symbol, drawdown, req.levels)
        .map_err(error_json)?;
    Ok(StatusCode::CREATED)
}

/// `POST /api/equities/:symbol/toggle` — flip enabled/disabled.
pub async fn toggle_equity(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ToggleResponse>, (StatusCode, Json<ErrorResponse>)> {
    let status = state
        .registry
        .lock()
        .await
        .toggle(&symbol)
        .map_err(error_json)?;
    Ok(Json(ToggleResponse {
        symbol,
        status: status.to_string(),
    }))
}

/// `DELETE /api/equities/:symbol` — remove a symbol.
pub async fn remove_equity(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    state
        .registry
        .lock()
        .await
        .remove(&symbol)
        .map_err(error_json)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/quote/:symbol` — latest trade price from the broker.
pub async fn quote(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<QuoteResponse>, (StatusCode, Json<ErrorResponse>)> {
    let symbol = symbol.to_uppercase();
    let price = state
        .broker
        .latest_price(&symbol)
        .await
        .map_err(error_json)?;
    Ok(Json(QuoteResponse { symbol, price }))
}

/// `POST /api/ask` — advisory question over the registry snapshot.
/// Advisory failures are surfaced as a message, never a crash.
pub async fn ask_advisor(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, (StatusCode, Json<ErrorResponse>)> {
    let snapshot = state.registry.lock().await.snapshot();
    let context = serde_json::to_string(&snapshot).unwrap_or_else(|_| "[]".to_string());

    match state.advisor.ask(&context, &req.question).await {
        Ok(answer) => Ok(Json(AskResponse { answer })),
        Err(e) => {
            warn!(error = %e, "Advisory request failed");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: format!("Advisory service error: {e}"),
                }),
            ))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
