#[cfg(any(test, feature = "memory"))]
pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::{config::RetryPolicy, JobId, JobRecord, JobStatus, Lane, QueueResult, QueueStats};

/// The two ordered sets a job can wait in before it is ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Schedule {
    /// Jobs enqueued with a future run time
    Delayed,
    /// Jobs waiting for their next attempt
    Retry,
}

impl Schedule {
    /// Status a job must have while it sits in this set
    pub fn status(self) -> JobStatus {
        match self {
            Self::Delayed => JobStatus::Delayed,
            Self::Retry => JobStatus::RetryWait,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delayed => "delayed",
            Self::Retry => "retry",
        }
    }
}

/// A membership structure, without its score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Membership {
    Ready(Lane),
    Scheduled(Schedule, Lane),
    InFlight(Lane),
}

/// Where a job goes, with the score ordered sets need
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Tail of the ready lane
    Ready(Lane),
    /// Delayed or retry set, due at `at`
    Scheduled {
        schedule: Schedule,
        lane: Lane,
        at: DateTime<Utc>,
    },
    /// In-flight set, lease ends at `until`
    InFlight { lane: Lane, until: DateTime<Utc> },
}

impl Location {
    pub fn membership(&self) -> Membership {
        match *self {
            Self::Ready(lane) => Membership::Ready(lane),
            Self::Scheduled { schedule, lane, .. } => Membership::Scheduled(schedule, lane),
            Self::InFlight { lane, .. } => Membership::InFlight(lane),
        }
    }

    /// Sort score for ordered sets (unix millis); `None` for lists
    pub fn score(&self) -> Option<i64> {
        match self {
            Self::Ready(_) => None,
            Self::Scheduled { at, .. } => Some(at.timestamp_millis()),
            Self::InFlight { until, .. } => Some(until.timestamp_millis()),
        }
    }
}

/// What the stored record must look like for a transition to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expect {
    pub status: JobStatus,
    /// Lease identity: the reservation the caller believes it holds
    pub started_at: Option<DateTime<Utc>>,
}

/// Compare-and-swap over one record and its membership.
///
/// Applied as one atomic unit: check `expect`, remove the id from `leave`
/// (it must be there), overwrite the record, add the id to `enter`.
#[derive(Debug, Clone)]
pub struct Transition {
    pub record: JobRecord,
    pub expect: Expect,
    pub leave: Option<Membership>,
    pub enter: Option<Location>,
}

/// Result of [`QueueBackend::apply`]. Anything but `Applied` means nothing
/// was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    Missing,
    StatusMismatch(JobStatus),
    StaleLease,
    NotMember,
}

/// Per-job result of a reaper batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reclaimed {
    pub id: JobId,
    pub outcome: ReclaimOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReclaimOutcome {
    /// Moved to the retry set
    Requeued { retries: u32, retry_at: DateTime<Utc> },
    /// Retry budget exhausted
    Dead,
}

/// Store adapter: every method is one atomic unit against the shared store
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Write a new record and add it to `location`; `AlreadyExists` if the
    /// id is taken
    async fn insert(&self, record: &JobRecord, location: Location) -> QueueResult<()>;

    /// Read a record
    async fn load(&self, id: &JobId) -> QueueResult<Option<JobRecord>>;

    /// Pop the head of the first non-empty lane, mark it processing at
    /// `now` and add it to the in-flight set with its lease deadline
    async fn claim(
        &self,
        lanes: &[Lane],
        now: DateTime<Utc>,
        default_lease: Duration,
    ) -> QueueResult<Option<JobRecord>>;

    /// Compare-and-swap a record and its membership
    async fn apply(&self, transition: Transition) -> QueueResult<TransitionOutcome>;

    /// Move up to `limit` entries due at `now` from a scheduled set to the
    /// tail of the lane, as `queued`. Returns the promoted ids in due order.
    async fn promote_due(
        &self,
        lane: Lane,
        schedule: Schedule,
        now: DateTime<Utc>,
        limit: usize,
    ) -> QueueResult<Vec<JobId>>;

    /// Pop up to `limit` in-flight entries whose lease ended by `now` and
    /// either re-queue them for retry or dead-letter them
    async fn reclaim_expired(
        &self,
        lane: Lane,
        now: DateTime<Utc>,
        limit: usize,
        policy: &RetryPolicy,
        reason: &str,
    ) -> QueueResult<Vec<Reclaimed>>;

    /// Membership counts for one lane
    async fn stats(&self, lane: Lane) -> QueueResult<QueueStats>;
}
