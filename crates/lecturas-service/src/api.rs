//! HTTP endpoints.
//!
//! - [`router`]: read API under `/api`, meant to sit behind the CORS layer
//! - [`sync_router`]: the manual sync trigger
//!
//! Errors are JSON bodies `{"error": "..."}` via [`AppError`]. The manual
//! trigger never uses the HTTP status to report a failed run; the outcome is
//! embedded in the body.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::error;

use lecturas_store::ReadingQuery;
use lecturas_types::PersistedReading;

use crate::state::AppState;
use crate::sync::{SyncResult, SyncStats};

/// Read API routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/lecturas", get(get_lecturas))
}

/// Manual sync trigger, accepted as GET and POST.
pub fn sync_router() -> Router<Arc<AppState>> {
    Router::new().route("/sync-dynamo", get(sync_dynamo).post(sync_dynamo))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    pub scheduler: SchedulerStatus,
    pub storage: StorageStatus,
    pub sync: SyncStats,
}

#[derive(Debug, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    pub interval_secs: u64,
    /// Whether a sync run is executing right now.
    pub sync_in_progress: bool,
}

#[derive(Debug, Serialize)]
pub struct StorageStatus {
    pub backend: &'static str,
    /// `None` when the count query failed.
    pub readings: Option<u64>,
    pub error: Option<String>,
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let (readings, error) = match state.store.count_readings().await {
        Ok(count) => (Some(count), None),
        Err(e) => (None, Some(e.to_string())),
    };

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        scheduler: SchedulerStatus {
            running: state.scheduler.is_running(),
            started_at: state.scheduler.started_at(),
            interval_secs: state.scheduler.period().as_secs(),
            sync_in_progress: state.syncer.is_running(),
        },
        storage: StorageStatus {
            backend: state.store.backend(),
            readings,
            error,
        },
        sync: state.syncer.stats().await,
    })
}

/// Query parameters for `/api/lecturas`. Times are Unix seconds.
#[derive(Debug, Deserialize, Default)]
pub struct LecturasQuery {
    pub device: Option<String>,
    pub since: Option<i64>,
    pub until: Option<i64>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl LecturasQuery {
    /// Convert to a store query, rejecting inverted or unrepresentable ranges.
    pub fn to_reading_query(&self) -> Result<ReadingQuery, AppError> {
        if let (Some(since), Some(until)) = (self.since, self.until)
            && since > until
        {
            return Err(AppError::BadRequest(format!(
                "Invalid time range: 'since' ({}) must be less than or equal to 'until' ({})",
                since, until
            )));
        }

        let mut query = ReadingQuery::new();
        if let Some(device) = &self.device {
            query = query.device(device);
        }
        if let Some(since) = self.since {
            query = query.since(parse_time("since", since)?);
        }
        if let Some(until) = self.until {
            query = query.until(parse_time("until", until)?);
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        if let Some(offset) = self.offset {
            query = query.offset(offset);
        }
        Ok(query)
    }
}

fn parse_time(name: &str, ts: i64) -> Result<OffsetDateTime, AppError> {
    OffsetDateTime::from_unix_timestamp(ts)
        .map_err(|_| AppError::BadRequest(format!("'{}' ({}) is out of range", name, ts)))
}

/// Persisted readings ordered by reading time ascending.
async fn get_lecturas(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LecturasQuery>,
) -> Result<Json<Vec<PersistedReading>>, AppError> {
    let query = params.to_reading_query()?;
    let readings = state.store.query_readings(&query).await?;
    Ok(Json(readings))
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub message: &'static str,
    pub result: SyncResult,
}

async fn sync_dynamo(State(state): State<Arc<AppState>>) -> Json<SyncResponse> {
    let result = state.syncer.run_sync().await;
    Json(SyncResponse {
        message: "Sincronización manual completada.",
        result,
    })
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Store(lecturas_store::Error),
}

impl From<lecturas_store::Error> for AppError {
    fn from(e: lecturas_store::Error) -> Self {
        AppError::Store(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Store(e) => {
                error!("Store read failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}
