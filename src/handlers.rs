use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    AppState,
    currency::Currency,
    error::TrackerError,
    history::HistoryPoint,
    tracker::{AccountsSummary, ManualUpdate, Snapshot},
};

#[derive(Debug)]
pub enum AppError {
    Tracker(TrackerError),
    BadRequest(String),
}

impl From<TrackerError> for AppError {
    fn from(err: TrackerError) -> Self {
        AppError::Tracker(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Tracker(TrackerError::ProviderUnavailable(msg)) => (
                StatusCode::BAD_GATEWAY,
                serde_json::json!({ "success": false, "error": format!("Provider unavailable: {}", msg) }),
            ),
            AppError::Tracker(TrackerError::NoTextDetected) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({ "success": false, "error": "No text detected in image" }),
            ),
            AppError::Tracker(TrackerError::NoBalanceFound { lines }) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({
                    "success": false,
                    "error": "No balance found in recognized text",
                    "text_lines": lines,
                }),
            ),
            AppError::Tracker(TrackerError::UnknownCurrency(code)) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "success": false, "error": format!("Unknown currency: {}", code) }),
            ),
            AppError::Tracker(TrackerError::Persistence(msg)) => {
                tracing::error!("Persistence failure: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "success": false, "error": "Database error" }),
                )
            }
            AppError::BadRequest(msg) => {
                tracing::info!("Bad request: {}", &msg);
                (
                    StatusCode::BAD_REQUEST,
                    serde_json::json!({ "success": false, "error": msg }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ProcessImageParams {
    pub source: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProcessImageResponse {
    pub success: bool,
    #[serde(flatten)]
    pub snapshot: Snapshot,
}

/// Accepts raw image bytes in the request body. `?source=` tags the
/// resulting transaction; "web" is the default.
#[axum::debug_handler]
pub async fn process_image(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProcessImageParams>,
    body: Bytes,
) -> Result<Json<ProcessImageResponse>, AppError> {
    if body.is_empty() {
        return Err(AppError::BadRequest(String::from("No image data received")));
    }

    let source = params.source.unwrap_or_else(|| String::from("web"));
    tracing::info!("Processing image ({} bytes, source={})", body.len(), source);

    let snapshot = state.tracker.process_image(&body, &source).await?;

    Ok(Json(ProcessImageResponse {
        success: true,
        snapshot,
    }))
}

#[derive(Debug, Deserialize)]
pub struct AddBalanceRequest {
    pub amount: f64,
    pub currency: String,
}

#[derive(Debug, Serialize)]
pub struct AddBalanceResponse {
    pub success: bool,
    #[serde(flatten)]
    pub update: ManualUpdate,
}

#[axum::debug_handler]
pub async fn add_balance(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AddBalanceRequest>,
) -> Result<Json<AddBalanceResponse>, AppError> {
    let currency = Currency::from_code(&payload.currency)
        .ok_or_else(|| AppError::Tracker(TrackerError::UnknownCurrency(payload.currency.clone())))?;

    let update = state
        .tracker
        .set_balance(payload.amount, currency, "manual")
        .await?;

    Ok(Json(AddBalanceResponse {
        success: true,
        update,
    }))
}

#[axum::debug_handler]
pub async fn get_accounts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AccountsSummary>, AppError> {
    let summary = state.tracker.list_accounts().await.inspect_err(|err| {
        tracing::error!("Error listing accounts: {:#?}", err);
    })?;
    Ok(Json(summary))
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub history: Vec<HistoryPoint>,
}

#[axum::debug_handler]
pub async fn get_history(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HistoryResponse>, AppError> {
    let history = state.tracker.history().await.inspect_err(|err| {
        tracing::error!("Error building balance history: {:#?}", err);
    })?;
    Ok(Json(HistoryResponse {
        success: true,
        history,
    }))
}

#[axum::debug_handler]
pub async fn get_rates(State(state): State<Arc<AppState>>) -> Json<HashMap<String, f64>> {
    Json(state.tracker.rates().rates().await)
}

#[derive(Debug, Serialize)]
pub struct RefreshRatesResponse {
    pub success: bool,
    pub fallback: bool,
}

#[axum::debug_handler]
pub async fn refresh_rates(State(state): State<Arc<AppState>>) -> Json<RefreshRatesResponse> {
    let ok = state.tracker.rates().force_refresh().await;
    Json(RefreshRatesResponse {
        success: ok,
        fallback: !ok,
    })
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
