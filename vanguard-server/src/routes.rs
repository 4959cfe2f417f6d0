use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use vanguard_queue::{
    validation::{validate_payload, validate_queue},
    JobId, JobRecord, JobStatus, Lane, QueueStats,
};

use crate::{ApiError, AppState};

/// Body of `POST /jobs` and `POST /jobs/delayed`
#[derive(Debug, Clone, Deserialize)]
pub struct EnqueueRequest {
    pub queue: String,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub timeout_ms: u64,
    #[serde(default)]
    pub max_retries: u32,
    /// Delayed jobs only
    #[serde(default)]
    pub run_at: Option<DateTime<Utc>>,
}

impl EnqueueRequest {
    fn into_record(self) -> Result<JobRecord, ApiError> {
        let lane = validate_queue(&self.queue)?;
        let payload = match &self.payload {
            Some(value) => serde_json::to_vec(value).map_err(vanguard_queue::QueueError::from)?,
            None => Vec::new(),
        };
        validate_payload(&payload)?;

        let mut record = JobRecord::new(lane, payload)
            .with_timeout_ms(self.timeout_ms)
            .with_max_retries(self.max_retries);
        if let Some(correlation_id) = self.correlation_id {
            record = record.with_correlation_id(correlation_id);
        }
        Ok(record)
    }
}

/// JSON rendering of a job; the payload is returned as JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub id: JobId,
    pub correlation_id: String,
    pub queue: Lane,
    pub payload: Value,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub timeout_ms: u64,
    pub retries: u32,
    pub max_retries: u32,
    pub error: Option<String>,
}

impl From<JobRecord> for JobView {
    fn from(job: JobRecord) -> Self {
        let payload = serde_json::from_slice(&job.payload)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&job.payload).into_owned()));

        Self {
            id: job.id,
            correlation_id: job.correlation_id,
            queue: job.queue,
            payload,
            status: job.status,
            created_at: job.created_at,
            scheduled_at: job.scheduled_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            timeout_ms: job.timeout_ms,
            retries: job.retries,
            max_retries: job.max_retries,
            error: job.error,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CancelQuery {
    queue: Option<String>,
}

pub(crate) async fn health() -> &'static str {
    "ok"
}

pub(crate) async fn enqueue(
    State(state): State<AppState>,
    body: Result<Json<EnqueueRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<JobView>), ApiError> {
    let Json(request) = body?;
    if request.run_at.is_some() {
        return Err(ApiError::bad_request("run_at is only accepted on /jobs/delayed"));
    }

    let job = state.engine.enqueue(request.into_record()?).await?;
    info!(job_id = %job.id, queue = %job.queue, "Job enqueued");
    Ok((StatusCode::CREATED, Json(job.into())))
}

pub(crate) async fn enqueue_delayed(
    State(state): State<AppState>,
    body: Result<Json<EnqueueRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<JobView>), ApiError> {
    let Json(request) = body?;
    let run_at = request
        .run_at
        .ok_or_else(|| ApiError::bad_request("run_at is required"))?;

    let job = state
        .engine
        .enqueue_delayed(request.into_record()?, run_at)
        .await?;
    info!(job_id = %job.id, queue = %job.queue, %run_at, "Delayed job enqueued");
    Ok((StatusCode::CREATED, Json(job.into())))
}

pub(crate) async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    let job = state.engine.get(&JobId::from(id)).await?;
    Ok(Json(job.into()))
}

pub(crate) async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<CancelQuery>, QueryRejection>,
) -> Result<Json<JobView>, ApiError> {
    let Query(query) = query?;
    let lane = query.queue.as_deref().map(validate_queue).transpose()?;

    let job = state.engine.cancel(&JobId::from(id), lane).await?;
    info!(job_id = %job.id, "Job cancelled");
    Ok(Json(job.into()))
}

pub(crate) async fn queue_stats(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<QueueStats>, ApiError> {
    let lane = validate_queue(&name)?;
    Ok(Json(state.engine.stats(lane).await?))
}
