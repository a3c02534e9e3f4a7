//! Administrative read API over scraper execution records.
//!
//! Consumed by the operations dashboard. Field names are load-bearing
//! for clients; `error_summary` is caller-provided text and must only
//! ever be rendered as plain text.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use edhrec_scraper::{ExecutionFilter, ExecutionRecord, ExecutionStatus, ScraperStorage};

/// State shared with the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub storage: Arc<dyn ScraperStorage>,
}

/// Build the axum router for the admin endpoints.
pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/scraper_executions", get(list_executions))
        .route("/admin/scraper_executions/stats", get(execution_stats))
        .route("/admin/scraper_executions/:id", get(get_execution))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ExecutionListParams {
    status: Option<String>,
    /// ISO date; inclusive lower bound on `started_at`.
    start_date: Option<String>,
}

/// JSON shape for one execution record.
#[derive(Debug, Serialize)]
struct ExecutionResponse {
    id: Uuid,
    status: ExecutionStatus,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    commanders_attempted: i32,
    commanders_succeeded: i32,
    commanders_failed: i32,
    execution_time_seconds: Option<f64>,
    success_rate: f64,
    error_summary: Option<String>,
}

impl From<ExecutionRecord> for ExecutionResponse {
    fn from(record: ExecutionRecord) -> Self {
        Self {
            id: record.id,
            status: record.status,
            started_at: record.started_at,
            finished_at: record.finished_at,
            commanders_attempted: record.commanders_attempted,
            commanders_succeeded: record.commanders_succeeded,
            commanders_failed: record.commanders_failed,
            execution_time_seconds: record.execution_time_seconds(),
            success_rate: record.success_rate(),
            error_summary: record.error_summary,
        }
    }
}

enum AdminError {
    BadRequest(String),
    NotFound,
    Internal(anyhow::Error),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            Self::Internal(err) => {
                tracing::error!(error = %err, "admin query failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn parse_filter(params: &ExecutionListParams) -> Result<ExecutionFilter, AdminError> {
    let status = params
        .status
        .as_deref()
        .map(|s| {
            ExecutionStatus::parse(s)
                .ok_or_else(|| AdminError::BadRequest(format!("unknown status '{s}'")))
        })
        .transpose()?;

    let started_after = params
        .start_date
        .as_deref()
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|date| date.and_hms_opt(0, 0, 0).expect("midnight exists").and_utc())
                .map_err(|_| AdminError::BadRequest(format!("invalid start_date '{s}'")))
        })
        .transpose()?;

    Ok(ExecutionFilter {
        status,
        started_after,
    })
}

async fn list_executions(
    State(state): State<AdminState>,
    Query(params): Query<ExecutionListParams>,
) -> Result<Json<Vec<ExecutionResponse>>, AdminError> {
    let filter = parse_filter(&params)?;
    let records = state
        .storage
        .list_executions(&filter)
        .await
        .map_err(AdminError::Internal)?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

async fn get_execution(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ExecutionResponse>, AdminError> {
    let record = state
        .storage
        .get_execution(id)
        .await
        .map_err(AdminError::Internal)?
        .ok_or(AdminError::NotFound)?;
    Ok(Json(record.into()))
}

async fn execution_stats(
    State(state): State<AdminState>,
) -> Result<Json<edhrec_scraper::ExecutionStats>, AdminError> {
    let stats = state
        .storage
        .execution_stats()
        .await
        .map_err(AdminError::Internal)?;
    Ok(Json(stats))
}
