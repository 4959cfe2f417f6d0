use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{JobId, Lane};
use crate::error::{QueueError, QueueResult};

/// Upper bound on any lease, however large the job timeout
pub const MAX_LEASE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Job status lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in its ready lane
    Queued,

    /// Waiting in the delayed set until `scheduled_at`
    Delayed,

    /// Reserved by a consumer, held in the in-flight set until its lease ends
    Processing,

    /// Failed and waiting in the retry set
    RetryWait,

    /// Completed successfully
    Success,

    /// Failed permanently
    Failed,

    /// Cancelled before it ran
    Cancelled,

    /// Dead-lettered: retry budget exhausted or moved here explicitly
    Dead,
}

impl JobStatus {
    /// Every status, in declaration order
    pub const ALL: [JobStatus; 8] = [
        Self::Queued,
        Self::Delayed,
        Self::Processing,
        Self::RetryWait,
        Self::Success,
        Self::Failed,
        Self::Cancelled,
        Self::Dead,
    ];

    /// Statuses reachable from this one in a single step
    pub fn allowed_transitions(self) -> &'static [JobStatus] {
        match self {
            Self::Queued => &[Self::Processing, Self::Cancelled],
            Self::Delayed => &[Self::Queued, Self::Cancelled],
            Self::Processing => &[
                Self::Success,
                Self::RetryWait,
                Self::Dead,
                Self::Failed,
                Self::Cancelled,
            ],
            Self::RetryWait => &[Self::Queued],
            Self::Success | Self::Failed | Self::Cancelled | Self::Dead => &[],
        }
    }

    /// Check a single transition against the lifecycle table
    pub fn can_transition(from: JobStatus, to: JobStatus) -> QueueResult<()> {
        if from.allowed_transitions().contains(&to) {
            Ok(())
        } else {
            Err(QueueError::InvalidTransition { from, to })
        }
    }

    /// Terminal statuses have no outgoing transitions
    pub fn is_final(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::Cancelled | Self::Dead
        )
    }

    /// Get the status name as a string
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Delayed => "delayed",
            Self::Processing => "processing",
            Self::RetryWait => "retry_wait",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Dead => "dead",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| QueueError::UnknownStatus(s.to_string()))
    }
}

/// Job record - the canonical entity stored per job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job identifier
    pub id: JobId,

    /// Caller-supplied tracing tag
    pub correlation_id: String,

    /// Priority lane
    pub queue: Lane,

    /// Opaque payload bytes
    pub payload: Vec<u8>,

    /// Current job status
    pub status: JobStatus,

    /// When the job was created
    pub created_at: DateTime<Utc>,

    /// When a delayed job becomes due (None = run immediately)
    pub scheduled_at: Option<DateTime<Utc>>,

    /// Start of the current (or last) reservation
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,

    /// Processing timeout in milliseconds, 0 = none
    pub timeout_ms: u64,

    /// Retry attempts consumed so far
    pub retries: u32,

    /// Retry budget
    pub max_retries: u32,

    /// Last error message
    pub error: Option<String>,
}

impl JobRecord {
    /// Create a new job record for the given lane
    pub fn new(queue: Lane, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: JobId::new(),
            correlation_id: String::new(),
            queue,
            payload: payload.into(),
            status: JobStatus::Queued,
            created_at: Utc::now(),
            scheduled_at: None,
            started_at: None,
            completed_at: None,
            timeout_ms: 0,
            retries: 0,
            max_retries: 0,
            error: None,
        }
    }

    /// Use a caller-chosen id
    pub fn with_id(mut self, id: impl Into<JobId>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the correlation id
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Set the processing timeout
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Lease length for a reservation: the job timeout, but never shorter
    /// than the configured default and never longer than [`MAX_LEASE`]
    pub fn lease_duration(&self, default_lease: Duration) -> Duration {
        Duration::from_millis(self.timeout_ms)
            .max(default_lease)
            .min(MAX_LEASE)
    }

    /// Lease deadline of the current reservation, if reserved
    pub fn lease_deadline(&self, default_lease: Duration) -> Option<DateTime<Utc>> {
        let lease = chrono::Duration::from_std(self.lease_duration(default_lease)).ok()?;
        self.started_at.map(|started| {
            started
                .checked_add_signed(lease)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        })
    }

    /// Whether another retry may be scheduled
    pub fn retry_budget_left(&self) -> bool {
        self.retries < self.max_retries
    }

    /// Transition in place after checking the lifecycle table
    pub(crate) fn transition(&mut self, to: JobStatus) -> QueueResult<()> {
        JobStatus::can_transition(self.status, to)?;
        self.status = to;
        Ok(())
    }
}
