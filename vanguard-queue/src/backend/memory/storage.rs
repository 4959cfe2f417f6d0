use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::warn;

use super::scored::ScoredSet;
use crate::{
    backend::{
        Location, Membership, QueueBackend, ReclaimOutcome, Reclaimed, Schedule, Transition,
        TransitionOutcome,
    },
    config::RetryPolicy,
    JobId, JobRecord, JobStatus, Lane, QueueError, QueueResult, QueueStats,
};

#[derive(Debug, Default)]
struct State {
    jobs: HashMap<JobId, JobRecord>,
    ready: HashMap<Lane, VecDeque<JobId>>,
    scheduled: HashMap<(Schedule, Lane), ScoredSet>,
    in_flight: HashMap<Lane, ScoredSet>,
}

impl State {
    fn add(&mut self, id: &JobId, location: Location) {
        match location {
            Location::Ready(lane) => self.ready.entry(lane).or_default().push_back(id.clone()),
            Location::Scheduled { schedule, lane, at } => self
                .scheduled
                .entry((schedule, lane))
                .or_default()
                .insert(id.clone(), at.timestamp_millis()),
            Location::InFlight { lane, until } => self
                .in_flight
                .entry(lane)
                .or_default()
                .insert(id.clone(), until.timestamp_millis()),
        }
    }

    fn remove(&mut self, id: &JobId, membership: Membership) -> bool {
        match membership {
            Membership::Ready(lane) => {
                let Some(queue) = self.ready.get_mut(&lane) else {
                    return false;
                };
                match queue.iter().position(|queued| queued == id) {
                    Some(index) => queue.remove(index).is_some(),
                    None => false,
                }
            }
            Membership::Scheduled(schedule, lane) => self
                .scheduled
                .get_mut(&(schedule, lane))
                .is_some_and(|set| set.remove(id)),
            Membership::InFlight(lane) => self
                .in_flight
                .get_mut(&lane)
                .is_some_and(|set| set.remove(id)),
        }
    }
}

/// In-memory backend for tests and single-process use.
///
/// One mutex guards every structure, so each trait method is atomic with
/// respect to all others.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids currently in a ready lane, head first
    pub fn ready_ids(&self, lane: Lane) -> Vec<JobId> {
        self.state
            .lock()
            .ready
            .get(&lane)
            .map(|queue| queue.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl QueueBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, record: &JobRecord, location: Location) -> QueueResult<()> {
        let mut state = self.state.lock();
        if state.jobs.contains_key(&record.id) {
            return Err(QueueError::AlreadyExists(record.id.clone()));
        }
        state.jobs.insert(record.id.clone(), record.clone());
        state.add(&record.id, location);
        Ok(())
    }

    async fn load(&self, id: &JobId) -> QueueResult<Option<JobRecord>> {
        Ok(self.state.lock().jobs.get(id).cloned())
    }

    async fn claim(
        &self,
        lanes: &[Lane],
        now: DateTime<Utc>,
        default_lease: Duration,
    ) -> QueueResult<Option<JobRecord>> {
        let mut state = self.state.lock();

        for &lane in lanes {
            loop {
                let Some(id) = state.ready.get_mut(&lane).and_then(|queue| queue.pop_front())
                else {
                    break;
                };

                let Some(record) = state.jobs.get_mut(&id) else {
                    warn!(job_id = %id, lane = %lane, "dropping ready entry without a record");
                    continue;
                };
                if let Err(err) = record.transition(JobStatus::Processing) {
                    warn!(job_id = %id, error = %err, "dropping stale ready entry");
                    continue;
                }

                record.started_at = Some(now);
                let until = record
                    .lease_deadline(default_lease)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                let claimed = record.clone();

                state.add(&id, Location::InFlight { lane, until });
                return Ok(Some(claimed));
            }
        }

        Ok(None)
    }

    async fn apply(&self, transition: Transition) -> QueueResult<TransitionOutcome> {
        let Transition {
            record,
            expect,
            leave,
            enter,
        } = transition;
        let mut state = self.state.lock();

        let Some(stored) = state.jobs.get(&record.id) else {
            return Ok(TransitionOutcome::Missing);
        };
        if stored.status != expect.status {
            return Ok(TransitionOutcome::StatusMismatch(stored.status));
        }
        if stored.started_at != expect.started_at {
            return Ok(TransitionOutcome::StaleLease);
        }
        if let Some(membership) = leave {
            if !state.remove(&record.id, membership) {
                return Ok(TransitionOutcome::NotMember);
            }
        }

        if let Some(location) = enter {
            state.add(&record.id, location);
        }
        state.jobs.insert(record.id.clone(), record);
        Ok(TransitionOutcome::Applied)
    }

    async fn promote_due(
        &self,
        lane: Lane,
        schedule: Schedule,
        now: DateTime<Utc>,
        limit: usize,
    ) -> QueueResult<Vec<JobId>> {
        let mut state = self.state.lock();
        let due = state
            .scheduled
            .get_mut(&(schedule, lane))
            .map(|set| set.pop_due(now.timestamp_millis(), limit))
            .unwrap_or_default();

        let mut promoted = Vec::with_capacity(due.len());
        for id in due {
            let Some(record) = state.jobs.get_mut(&id) else {
                warn!(
                    job_id = %id,
                    set = schedule.as_str(),
                    "dropping scheduled entry without a record"
                );
                continue;
            };
            if record.status != schedule.status() {
                warn!(
                    job_id = %id,
                    set = schedule.as_str(),
                    status = %record.status,
                    "dropping stale scheduled entry"
                );
                continue;
            }
            if let Err(err) = record.transition(JobStatus::Queued) {
                warn!(job_id = %id, error = %err, "dropping stale scheduled entry");
                continue;
            }

            // error is only kept while waiting and on terminal failures
            record.error = None;
            state.add(&id, Location::Ready(lane));
            promoted.push(id);
        }
        Ok(promoted)
    }

    async fn reclaim_expired(
        &self,
        lane: Lane,
        now: DateTime<Utc>,
        limit: usize,
        policy: &RetryPolicy,
        reason: &str,
    ) -> QueueResult<Vec<Reclaimed>> {
        let mut state = self.state.lock();
        let expired = state
            .in_flight
            .get_mut(&lane)
            .map(|set| set.pop_due(now.timestamp_millis(), limit))
            .unwrap_or_default();

        let mut reclaimed = Vec::with_capacity(expired.len());
        for id in expired {
            let Some(record) = state.jobs.get_mut(&id) else {
                warn!(job_id = %id, "dropping in-flight entry without a record");
                continue;
            };
            if record.status != JobStatus::Processing {
                warn!(job_id = %id, status = %record.status, "dropping stale in-flight entry");
                continue;
            }

            let next = if record.retry_budget_left() {
                JobStatus::RetryWait
            } else {
                JobStatus::Dead
            };
            if let Err(err) = record.transition(next) {
                warn!(job_id = %id, error = %err, "dropping stale in-flight entry");
                continue;
            }

            record.error = Some(reason.to_string());
            if next == JobStatus::RetryWait {
                record.retries += 1;
                let retries = record.retries;
                let delay = chrono::Duration::from_std(policy.delay_for(retries))
                    .unwrap_or_else(|_| chrono::Duration::zero());
                let retry_at = now
                    .checked_add_signed(delay)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);

                state.add(
                    &id,
                    Location::Scheduled {
                        schedule: Schedule::Retry,
                        lane,
                        at: retry_at,
                    },
                );
                reclaimed.push(Reclaimed {
                    id,
                    outcome: ReclaimOutcome::Requeued { retries, retry_at },
                });
            } else {
                record.completed_at = Some(now);
                reclaimed.push(Reclaimed {
                    id,
                    outcome: ReclaimOutcome::Dead,
                });
            }
        }
        Ok(reclaimed)
    }

    async fn stats(&self, lane: Lane) -> QueueResult<QueueStats> {
        let state = self.state.lock();
        let scheduled = |schedule: Schedule| {
            state
                .scheduled
                .get(&(schedule, lane))
                .map_or(0, |set| set.len() as u64)
        };

        Ok(QueueStats {
            queue: lane,
            ready: state.ready.get(&lane).map_or(0, |queue| queue.len() as u64),
            delayed: scheduled(Schedule::Delayed),
            retry: scheduled(Schedule::Retry),
            in_flight: state.in_flight.get(&lane).map_or(0, |set| set.len() as u64),
        })
    }
}
