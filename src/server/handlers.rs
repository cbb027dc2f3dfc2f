//! HTTP request handlers for the budget REST API.
//!
//! Handles POST /check, POST /spend, GET /health.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::guard::CheckResult;
use crate::manager::StoreHealth;
use crate::server::AppState;
use crate::{BudgetError, ErrorCategory};

/// Request body for POST /check.
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    /// User the request runs as.
    pub user_id: String,
    /// Optional project the request bills to.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Estimated cost of the call in USD; zero asks whether any headroom
    /// remains at all.
    #[serde(default)]
    pub estimated_cost: Decimal,
}

/// Request body for POST /spend.
#[derive(Debug, Deserialize)]
pub struct SpendRequest {
    /// User the spend is attributed to.
    pub user_id: String,
    /// Actual cost of the completed call in USD.
    pub cost: Decimal,
    /// Optional project the spend is attributed to.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Model name, for the spend metric only.
    #[serde(default)]
    pub model: Option<String>,
}

/// Success body for POST /check and POST /spend.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// `allowed` or `recorded`.
    pub status: String,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`.
    pub status: String,
    /// `connected` or `disconnected`.
    pub store: String,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Error description.
    pub detail: String,
}

fn status_for(error: &BudgetError) -> StatusCode {
    match error.category() {
        ErrorCategory::Policy => StatusCode::TOO_MANY_REQUESTS,
        ErrorCategory::Validation => StatusCode::BAD_REQUEST,
        ErrorCategory::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCategory::Configuration | ErrorCategory::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn detail_for(error: &BudgetError) -> String {
    match error {
        // The breach message alone; clients show it to end users.
        BudgetError::Exceeded(breach) => breach.to_string(),
        BudgetError::PartialCharge { failed, .. } => {
            let scopes = failed
                .iter()
                .map(|f| f.scope.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            format!("{error} (failed: {scopes})")
        }
        other => other.to_string(),
    }
}

fn error_response(error: &BudgetError) -> Response {
    (
        status_for(error),
        Json(ErrorDetail {
            detail: detail_for(error),
        }),
    )
        .into_response()
}

/// POST /check
///
/// Pre-flight budget check. `200` when every applicable scope has room,
/// `429` with the violated scope when one does not, `503` when the store
/// cannot be read (fail-closed: the caller must not proceed).
pub async fn post_check(
    State(state): State<AppState>,
    Json(body): Json<CheckRequest>,
) -> Response {
    let outcome = state
        .manager
        .check_availability(
            &body.user_id,
            body.project_id.as_deref(),
            body.estimated_cost,
        )
        .await;

    match outcome {
        Ok(CheckResult::Allowed) => (
            StatusCode::OK,
            Json(StatusResponse {
                status: "allowed".to_string(),
            }),
        )
            .into_response(),
        Ok(CheckResult::Denied(breach)) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorDetail {
                detail: breach.to_string(),
            }),
        )
            .into_response(),
        Err(error) => error_response(&error),
    }
}

/// POST /spend
///
/// Post-flight charge. `200` once every applicable scope recorded the
/// cost, `503` when none did, `500` with the failed scopes on a mixed
/// outcome.
pub async fn post_spend(State(state): State<AppState>, Json(body): Json<SpendRequest>) -> Response {
    let outcome = state
        .manager
        .record_spend(
            &body.user_id,
            body.cost,
            body.project_id.as_deref(),
            body.model.as_deref(),
        )
        .await;

    match outcome {
        Ok(_receipt) => (
            StatusCode::OK,
            Json(StatusResponse {
                status: "recorded".to_string(),
            }),
        )
            .into_response(),
        Err(error) => error_response(&error),
    }
}

/// GET /health
///
/// Pings the counter store. `200` when it answers, `503` when it does
/// not; a degraded store means checks are failing closed.
pub async fn get_health(State(state): State<AppState>) -> Response {
    match state.manager.store_health().await {
        StoreHealth::Connected => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                store: "connected".to_string(),
            }),
        )
            .into_response(),
        StoreHealth::Disconnected => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "degraded".to_string(),
                store: "disconnected".to_string(),
            }),
        )
            .into_response(),
    }
}
