//! REST API endpoints for the weather station service.
//!
//! Store operations are synchronous SQLite calls. Handlers run them on the
//! blocking pool with an `Arc<Store>` clone, so nothing is held across an
//! `.await`.
//!
//! ## Error Handling
//!
//! Errors are returned as JSON objects with a `message` key via [`AppError`].
//! Rejected requests are 400s; store failures are logged and returned as an
//! opaque 500.
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use weatherstation_service::api;
//!
//! let app = api::router().with_state(state);
//! ```

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Value, json};
use time::OffsetDateTime;
use tracing::{error, warn};

use crate::ingest::{self, IngestError};
use crate::query::{self, QueryError, QueryOutcome};
use crate::range::RangeRequest;
use crate::state::AppState;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/weather", get(get_weather))
        .route("/api/weather/latest", get(get_latest))
        .route("/api/pushData", post(push_data))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Most recent reading, or `{"message": "no data"}` on an empty store.
async fn get_latest(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let store = Arc::clone(&state.store);
    let latest = blocking(move || query::latest(&store)).await??;

    Ok(match latest {
        Some(reading) => Json(reading).into_response(),
        None => Json(json!({ "message": "no data" })).into_response(),
    })
}

/// Readings or aggregate buckets for a date range.
///
/// Accepts `start`/`end` (`YYYY-MM-DD`) with optional `everySec`, or
/// `mode=hourly` with `day`, or `mode=daily` with `end`.
async fn get_weather(
    State(state): State<Arc<AppState>>,
    params: Result<Query<RangeRequest>, QueryRejection>,
) -> Result<Json<QueryOutcome>, AppError> {
    let Query(request) = params.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let store = Arc::clone(&state.store);
    let clock = state.clock;
    let outcome = blocking(move || query::dispatch(&store, &request, &clock)).await??;

    Ok(Json(outcome))
}

/// Ingest one reading pushed by a station.
///
/// An empty body is treated as `{}`, so it fails with the missing-fields
/// error rather than a parse error.
async fn push_data(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let body: Value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("invalid JSON body: {}", e)))?
    };

    let received_at = state.now();
    let store = Arc::clone(&state.store);
    blocking(move || ingest::ingest(&store, &body, received_at)).await??;

    Ok((StatusCode::CREATED, Json(json!({ "ok": true }))))
}

/// Run a synchronous store operation on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("blocking task failed: {}", e)))
}

/// API error type.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Ingest(IngestError),
    Store(weatherstation_store::Error),
    Internal(String),
}

impl From<weatherstation_store::Error> for AppError {
    fn from(e: weatherstation_store::Error) -> Self {
        AppError::Store(e)
    }
}

impl From<QueryError> for AppError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::BadRequest(e) => AppError::BadRequest(e.to_string()),
            QueryError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Store(e) => AppError::Store(e),
            other => AppError::Ingest(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(message) => {
                warn!("Rejected request: {}", message);
                (StatusCode::BAD_REQUEST, json!({ "message": message }))
            }
            AppError::Ingest(e) => {
                warn!("Rejected reading: {}", e);
                let body = match e {
                    IngestError::MissingField(fields) => {
                        json!({ "message": "missing fields", "missing": fields })
                    }
                    IngestError::InvalidType(fields) => {
                        json!({ "message": "invalid field types", "invalid": fields })
                    }
                    IngestError::InvalidTimestamp(detail) => {
                        json!({ "message": "timestamp invalid", "detail": detail })
                    }
                    IngestError::Store(e) => return AppError::Store(e).into_response(),
                };
                (StatusCode::BAD_REQUEST, body)
            }
            AppError::Store(e) => {
                error!("Store failure: {}", e);
                server_error()
            }
            AppError::Internal(message) => {
                error!("Internal error: {}", message);
                server_error()
            }
        };

        (status, Json(body)).into_response()
    }
}

fn server_error() -> (StatusCode, Value) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "message": "server error" }),
    )
}
