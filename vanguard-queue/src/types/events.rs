use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobId, Lane};

/// Lifecycle events broadcast by the engine for observability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobEvent {
    /// Job was pushed onto its ready lane
    Enqueued {
        job_id: JobId,
        queue: Lane,
        at: DateTime<Utc>,
    },

    /// Job was placed in the delayed set
    Scheduled {
        job_id: JobId,
        queue: Lane,
        run_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },

    /// Job was reserved by a consumer
    Reserved {
        job_id: JobId,
        lease_until: DateTime<Utc>,
        at: DateTime<Utc>,
    },

    /// Job was acknowledged
    Completed {
        job_id: JobId,
        at: DateTime<Utc>,
    },

    /// Job went to the retry set
    RetryScheduled {
        job_id: JobId,
        retry_at: DateTime<Utc>,
        error: String,
        at: DateTime<Utc>,
    },

    /// Job failed permanently
    Failed {
        job_id: JobId,
        error: String,
        at: DateTime<Utc>,
    },

    /// Job was dead-lettered
    DeadLettered {
        job_id: JobId,
        error: String,
        at: DateTime<Utc>,
    },

    /// Job was cancelled
    Cancelled {
        job_id: JobId,
        at: DateTime<Utc>,
    },

    /// Delayed or retry-waiting job moved to its ready lane
    Promoted {
        job_id: JobId,
        queue: Lane,
        at: DateTime<Utc>,
    },

    /// Expired lease was taken back by the reaper
    Reclaimed {
        job_id: JobId,
        requeued: bool,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Enqueued { .. } => "enqueued",
            Self::Scheduled { .. } => "scheduled",
            Self::Reserved { .. } => "reserved",
            Self::Completed { .. } => "completed",
            Self::RetryScheduled { .. } => "retry_scheduled",
            Self::Failed { .. } => "failed",
            Self::DeadLettered { .. } => "dead_lettered",
            Self::Cancelled { .. } => "cancelled",
            Self::Promoted { .. } => "promoted",
            Self::Reclaimed { .. } => "reclaimed",
        }
    }

    /// Get the job ID from any event
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Enqueued { job_id, .. }
            | Self::Scheduled { job_id, .. }
            | Self::Reserved { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::RetryScheduled { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::DeadLettered { job_id, .. }
            | Self::Cancelled { job_id, .. }
            | Self::Promoted { job_id, .. }
            | Self::Reclaimed { job_id, .. } => job_id,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Enqueued { at, .. }
            | Self::Scheduled { at, .. }
            | Self::Reserved { at, .. }
            | Self::Completed { at, .. }
            | Self::RetryScheduled { at, .. }
            | Self::Failed { at, .. }
            | Self::DeadLettered { at, .. }
            | Self::Cancelled { at, .. }
            | Self::Promoted { at, .. }
            | Self::Reclaimed { at, .. } => at,
        }
    }
}
