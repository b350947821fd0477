//! HTTP surface for the history service.

use crate::core::{FetchContext, RangeResult, RateError, normalize};
use crate::history::HistoryService;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const GENERIC_FAILURE: &str = "something went wrong, please try again later";

#[derive(Clone)]
pub struct AppState {
    pub history: Arc<HistoryService>,
    pub request_timeout: Option<Duration>,
}

/// Missing parameters stay empty and fail normalization.
#[derive(Debug, Default, PartialEq)]
pub struct HistoryQuery {
    pub from: String,
    pub to: String,
    pub start_date: String,
    pub end_date: String,
}

impl HistoryQuery {
    /// Builds the query from raw pairs. The first value of a repeated key wins.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut query = HistoryQuery::default();
        let mut seen = [false; 4];
        for (key, value) in pairs {
            let (slot, field) = match key.as_str() {
                "from" => (0, &mut query.from),
                "to" => (1, &mut query.to),
                "start_date" => (2, &mut query.start_date),
                "end_date" => (3, &mut query.end_date),
                _ => continue,
            };
            if !seen[slot] {
                seen[slot] = true;
                *field = value;
            }
        }
        query
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/currency/history", get(currency_history))
        .fallback(health_check)
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn currency_history(
    State(state): State<AppState>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Json<RangeResult>, ApiError> {
    let Query(pairs) = query
        .map_err(|rejection| RateError::invalid(format!("invalid parameters: {rejection}")))?;
    let query = HistoryQuery::from_pairs(pairs);
    let today = Utc::now().date_naive();
    let (range, pair) = normalize(
        &query.from,
        &query.to,
        &query.start_date,
        &query.end_date,
        today,
    )?;

    let mut ctx = FetchContext::new();
    if let Some(timeout) = state.request_timeout {
        ctx = ctx.with_timeout(timeout);
    }

    info!(%pair, start = %range.start(), end = %range.end(), "Currency history requested");
    let rates = state.history.fetch_range(&ctx, &pair, &range).await?;
    Ok(Json(rates))
}

/// Maps [`RateError`] to a JSON error body. Upstream failures are not exposed to callers.
#[derive(Debug)]
pub struct ApiError(RateError);

impl From<RateError> for ApiError {
    fn from(err: RateError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = if self.0.is_invalid_parameter() {
            warn!(error = %self.0, "Rejected history request");
            (StatusCode::BAD_REQUEST, self.0.to_string())
        } else {
            error!(error = %self.0, "History request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                GENERIC_FAILURE.to_string(),
            )
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
