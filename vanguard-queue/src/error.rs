use thiserror::Error;

use crate::types::{JobId, JobStatus};

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors surfaced by the queue engine and its store adapters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Job already exists: {0}")]
    AlreadyExists(JobId),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("No job available")]
    NoJobAvailable,

    /// The job is not held by this consumer: it was acked, failed or
    /// reclaimed by the reaper in the meantime.
    #[error("Job {id} is not in flight (status: {status})")]
    NotInFlight { id: JobId, status: JobStatus },

    #[error("Retry budget exceeded for job {id}: {retries}/{max_retries}")]
    RetryBudgetExceeded {
        id: JobId,
        retries: u32,
        max_retries: u32,
    },

    #[error("Job {id} cannot be cancelled in status {status}")]
    NotCancellable { id: JobId, status: JobStatus },

    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    #[error("Unknown queue: {0}")]
    UnknownQueue(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl QueueError {
    /// Stable machine-readable name, used by the HTTP layer and in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::AlreadyExists(_) => "already_exists",
            Self::NotFound(_) => "not_found",
            Self::NoJobAvailable => "no_job_available",
            Self::NotInFlight { .. } => "not_in_flight",
            Self::RetryBudgetExceeded { .. } => "retry_budget_exceeded",
            Self::NotCancellable { .. } => "not_cancellable",
            Self::UnknownStatus(_) => "unknown_status",
            Self::UnknownQueue(_) => "unknown_queue",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Whether a caller may reasonably retry the same call later
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::NoJobAvailable)
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}
