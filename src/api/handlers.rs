use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::data::{Granularity, RecordError, Value};
use crate::query::{BucketCount, KeySummary};
use crate::recorder::{Recorder, RecorderStats};
use crate::scheduler::FlushOutcome;

/// Application state shared across handlers
pub struct AppState {
    pub recorder: Arc<Recorder>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Record
// ============================================================================

#[derive(Deserialize)]
pub struct RecordRequest {
    pub key: String,
    /// Unix seconds; defaults to now
    #[serde(default)]
    pub timestamp: Option<i64>,
    pub value: Value,
}

#[derive(Serialize)]
pub struct RecordResponse {
    pub key: String,
    pub timestamp: i64,
    pub total: u64,
}

pub async fn record_event(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RecordRequest>,
) -> Result<Json<RecordResponse>, ApiError> {
    if request.key.is_empty() {
        return Err(ApiError::BadRequest("key must not be empty".to_string()));
    }

    let timestamp = request
        .timestamp
        .unwrap_or_else(|| chrono::Utc::now().timestamp());

    state
        .recorder
        .record_event(&request.key, timestamp, request.value)?;

    Ok(Json(RecordResponse {
        total: state.recorder.total_count(&request.key),
        key: request.key,
        timestamp,
    }))
}

// ============================================================================
// Queries
// ============================================================================

#[derive(Serialize)]
pub struct KeysResponse {
    pub keys: Vec<KeySummary>,
}

pub async fn list_keys(State(state): State<Arc<AppState>>) -> Json<KeysResponse> {
    Json(KeysResponse {
        keys: state.recorder.keys(),
    })
}

#[derive(Serialize)]
pub struct EventEntry {
    pub timestamp: i64,
    pub local_time: String,
    pub value: Value,
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub key: String,
    pub events: Vec<EventEntry>,
}

pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<EventsResponse>, ApiError> {
    if state.recorder.data_type(&key).is_none() {
        return Err(ApiError::NotFound(format!("Key '{}' not found", key)));
    }

    let mut events = Vec::new();
    state.recorder.iterate(&key, |local, value| {
        events.push(EventEntry {
            timestamp: local.timestamp(),
            local_time: local.to_rfc3339(),
            value: value.clone(),
        });
    });

    Ok(Json(EventsResponse { key, events }))
}

#[derive(Serialize)]
pub struct CountResponse {
    pub key: String,
    pub total: u64,
}

pub async fn total_count(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Json<CountResponse> {
    let total = state.recorder.total_count(&key);
    Json(CountResponse { key, total })
}

#[derive(Deserialize)]
pub struct BucketParams {
    /// Instant whose bucket to look up; all buckets when absent
    pub at: Option<i64>,
}

#[derive(Serialize)]
pub struct BucketsResponse {
    pub key: String,
    pub granularity: Granularity,
    pub buckets: Vec<BucketCount>,
}

pub async fn bucket_counts(
    State(state): State<Arc<AppState>>,
    Path((key, granularity)): Path<(String, String)>,
    Query(params): Query<BucketParams>,
) -> Result<Json<BucketsResponse>, ApiError> {
    let granularity: Granularity = granularity
        .parse()
        .map_err(|e: crate::data::ParseGranularityError| ApiError::BadRequest(e.to_string()))?;

    let buckets = match params.at {
        Some(instant) => {
            let start = crate::data::local_bucket_start(instant, granularity).ok_or_else(|| {
                ApiError::BadRequest(format!("timestamp {} is out of range", instant))
            })?;
            vec![BucketCount {
                start,
                count: state.recorder.bucket_count(&key, granularity, instant),
            }]
        }
        None => state.recorder.bucket_counts(&key, granularity),
    };

    Ok(Json(BucketsResponse {
        key,
        granularity,
        buckets,
    }))
}

// ============================================================================
// Flush & Stats
// ============================================================================

#[derive(Serialize)]
pub struct FlushResponse {
    pub written: bool,
    pub bytes: usize,
}

pub async fn flush(State(state): State<Arc<AppState>>) -> Result<Json<FlushResponse>, ApiError> {
    let recorder = Arc::clone(&state.recorder);
    let outcome = tokio::task::spawn_blocking(move || recorder.flush_now())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let response = match outcome {
        FlushOutcome::Clean => FlushResponse {
            written: false,
            bytes: 0,
        },
        FlushOutcome::Written { bytes } => FlushResponse {
            written: true,
            bytes,
        },
    };
    Ok(Json(response))
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<RecorderStats> {
    Json(state.recorder.stats())
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<RecordError> for ApiError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::TypeMismatch { .. } => ApiError::Conflict(err.to_string()),
            RecordError::InvalidTimestamp(_) => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
