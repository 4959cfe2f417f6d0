use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_core::Stream;
use tokio::sync::{broadcast, Notify};
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::{
    backend::{Expect, Location, Membership, QueueBackend, Schedule, Transition, TransitionOutcome},
    clock::{truncate_millis, Clock, SystemClock},
    config::QueueConfig,
    JobEvent, JobId, JobRecord, JobStatus, Lane, QueueError, QueueResult, QueueStats, ReserveFrom,
};

pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

const EVENT_CAPACITY: usize = 1024;

/// Queue engine: the job lifecycle protocol over a [`QueueBackend`]
pub struct QueueEngine<B: QueueBackend + ?Sized> {
    backend: Arc<B>,
    config: QueueConfig,
    clock: Arc<dyn Clock>,
    wakeup: Notify,
    events: broadcast::Sender<JobEvent>,
}

impl<B: QueueBackend + ?Sized> QueueEngine<B> {
    /// Create an engine with default config and the system clock
    pub fn new(backend: Arc<B>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            config: QueueConfig::default(),
            clock: Arc::new(SystemClock),
            wakeup: Notify::new(),
            events,
        }
    }

    pub fn with_config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the time source (tests drive a `ManualClock`)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Make a job ready on its lane
    #[instrument(skip_all, fields(job_id = %job.id, queue = %job.queue))]
    pub async fn enqueue(&self, mut job: JobRecord) -> QueueResult<JobRecord> {
        let now = self.clock.now();
        job.status = JobStatus::Queued;
        job.created_at = now;

        self.backend.insert(&job, Location::Ready(job.queue)).await?;
        self.wake_reservers();
        debug!("Job enqueued");
        self.emit(JobEvent::Enqueued {
            job_id: job.id.clone(),
            queue: job.queue,
            at: now,
        });
        Ok(job)
    }

    /// Park a job in the delayed set until `run_at`
    #[instrument(skip_all, fields(job_id = %job.id, queue = %job.queue, run_at = %run_at))]
    pub async fn enqueue_delayed(
        &self,
        mut job: JobRecord,
        run_at: DateTime<Utc>,
    ) -> QueueResult<JobRecord> {
        let now = self.clock.now();
        let run_at = truncate_millis(run_at);
        job.status = JobStatus::Delayed;
        job.created_at = now;
        job.scheduled_at = Some(run_at);

        let location = Location::Scheduled {
            schedule: Schedule::Delayed,
            lane: job.queue,
            at: run_at,
        };
        self.backend.insert(&job, location).await?;
        debug!("Job scheduled");
        self.emit(JobEvent::Scheduled {
            job_id: job.id.clone(),
            queue: job.queue,
            run_at,
            at: now,
        });
        Ok(job)
    }

    /// Take the next ready job, waiting up to `block` for one to appear.
    ///
    /// A zero `block` makes a single attempt. A `block` too large to add to
    /// the current instant (such as `Duration::MAX`) waits without a deadline.
    #[instrument(skip(self))]
    pub async fn reserve(&self, from: ReserveFrom, block: Duration) -> QueueResult<JobRecord> {
        let deadline = Instant::now().checked_add(block);

        loop {
            // Register interest before looking, so an enqueue between the
            // claim and the wait is not missed.
            let notified = self.wakeup.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let now = self.clock.now();
            if let Some(job) = self
                .backend
                .claim(from.lanes(), now, self.config.default_lease)
                .await?
            {
                let lease_until = job
                    .lease_deadline(self.config.default_lease)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                debug!(job_id = %job.id, %lease_until, "Job reserved");
                self.emit(JobEvent::Reserved {
                    job_id: job.id.clone(),
                    lease_until,
                    at: now,
                });
                return Ok(job);
            }

            let waited_until = Instant::now();
            if deadline.is_some_and(|deadline| waited_until >= deadline) {
                return Err(QueueError::NoJobAvailable);
            }
            let next_poll = waited_until.checked_add(self.config.poll_interval);
            match next_poll.into_iter().chain(deadline).min() {
                Some(wake_at) => tokio::select! {
                    _ = &mut notified => {}
                    _ = tokio::time::sleep_until(wake_at) => {}
                },
                None => notified.await,
            }
        }
    }

    /// Mark a reserved job successful
    #[instrument(skip_all, fields(job_id = %job.id))]
    pub async fn ack(&self, job: &JobRecord) -> QueueResult<JobRecord> {
        let held = self.held(job).await?;
        let now = self.clock.now();

        let mut next = held.clone();
        next.transition(JobStatus::Success)?;
        next.completed_at = Some(now);
        next.error = None;

        let done = self.release(&held, next, None).await?;
        debug!("Job completed");
        self.emit(JobEvent::Completed {
            job_id: done.id.clone(),
            at: now,
        });
        Ok(done)
    }

    /// Send a reserved job to the retry set, due at `run_at`
    #[instrument(skip_all, fields(job_id = %job.id, run_at = %run_at))]
    pub async fn fail_with_retry(
        &self,
        job: &JobRecord,
        run_at: DateTime<Utc>,
        error: &str,
    ) -> QueueResult<JobRecord> {
        let held = self.held(job).await?;
        if !held.retry_budget_left() {
            return Err(QueueError::RetryBudgetExceeded {
                id: held.id,
                retries: held.retries,
                max_retries: held.max_retries,
            });
        }
        let now = self.clock.now();
        let run_at = truncate_millis(run_at);

        let mut next = held.clone();
        next.transition(JobStatus::RetryWait)?;
        next.retries += 1;
        next.error = Some(error.to_string());

        let enter = Location::Scheduled {
            schedule: Schedule::Retry,
            lane: held.queue,
            at: run_at,
        };
        let waiting = self.release(&held, next, Some(enter)).await?;
        debug!(retries = waiting.retries, "Job scheduled for retry");
        self.emit(JobEvent::RetryScheduled {
            job_id: waiting.id.clone(),
            retry_at: run_at,
            error: error.to_string(),
            at: now,
        });
        Ok(waiting)
    }

    /// Fail a reserved job permanently
    #[instrument(skip_all, fields(job_id = %job.id))]
    pub async fn fail_terminal(&self, job: &JobRecord, error: &str) -> QueueResult<JobRecord> {
        let failed = self.close(job, JobStatus::Failed, error).await?;
        self.emit(JobEvent::Failed {
            job_id: failed.id.clone(),
            error: error.to_string(),
            at: failed.completed_at.unwrap_or_else(|| self.clock.now()),
        });
        Ok(failed)
    }

    /// Dead-letter a reserved job
    #[instrument(skip_all, fields(job_id = %job.id))]
    pub async fn move_to_dead(&self, job: &JobRecord, error: &str) -> QueueResult<JobRecord> {
        let dead = self.close(job, JobStatus::Dead, error).await?;
        self.emit(JobEvent::DeadLettered {
            job_id: dead.id.clone(),
            error: error.to_string(),
            at: dead.completed_at.unwrap_or_else(|| self.clock.now()),
        });
        Ok(dead)
    }

    /// Cancel a queued or delayed job. If `queue` is given it must be the
    /// job's lane, otherwise the job is reported as not found.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: &JobId, queue: Option<Lane>) -> QueueResult<JobRecord> {
        loop {
            let stored = self.get(id).await?;
            if queue.is_some_and(|lane| lane != stored.queue) {
                return Err(QueueError::NotFound(id.clone()));
            }

            let leave = match stored.status {
                JobStatus::Queued => Membership::Ready(stored.queue),
                JobStatus::Delayed => Membership::Scheduled(Schedule::Delayed, stored.queue),
                status => {
                    return Err(QueueError::NotCancellable {
                        id: id.clone(),
                        status,
                    })
                }
            };

            let now = self.clock.now();
            let mut next = stored.clone();
            next.transition(JobStatus::Cancelled)?;
            next.completed_at = Some(now);

            let outcome = self
                .backend
                .apply(Transition {
                    record: next.clone(),
                    expect: Expect {
                        status: stored.status,
                        started_at: stored.started_at,
                    },
                    leave: Some(leave),
                    enter: None,
                })
                .await?;

            match outcome {
                TransitionOutcome::Applied => {
                    debug!("Job cancelled");
                    self.emit(JobEvent::Cancelled {
                        job_id: id.clone(),
                        at: now,
                    });
                    return Ok(next);
                }
                TransitionOutcome::Missing => return Err(QueueError::NotFound(id.clone())),
                TransitionOutcome::NotMember => {
                    return Err(QueueError::NotCancellable {
                        id: id.clone(),
                        status: stored.status,
                    })
                }
                // Promoted or reserved in between: look again.
                TransitionOutcome::StatusMismatch(_) | TransitionOutcome::StaleLease => continue,
            }
        }
    }

    /// Read a job
    pub async fn get(&self, id: &JobId) -> QueueResult<JobRecord> {
        self.backend
            .load(id)
            .await?
            .ok_or_else(|| QueueError::NotFound(id.clone()))
    }

    /// Membership counts for one lane
    pub async fn stats(&self, lane: Lane) -> QueueResult<QueueStats> {
        self.backend.stats(lane).await
    }

    /// Receive lifecycle events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Lifecycle events as a stream; lagged events are skipped
    pub fn event_stream(&self) -> BoxStream<JobEvent> {
        use tokio_stream::{wrappers::BroadcastStream, StreamExt};

        let stream = BroadcastStream::new(self.events.subscribe()).filter_map(|event| event.ok());
        Box::pin(stream)
    }

    pub(crate) fn emit(&self, event: JobEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub(crate) fn wake_reservers(&self) {
        self.wakeup.notify_waiters();
    }

    /// Load the stored record and check the caller still holds its lease
    async fn held(&self, job: &JobRecord) -> QueueResult<JobRecord> {
        let stored = self.get(&job.id).await?;
        if stored.status != JobStatus::Processing || stored.started_at != job.started_at {
            return Err(QueueError::NotInFlight {
                id: stored.id,
                status: stored.status,
            });
        }
        Ok(stored)
    }

    async fn close(&self, job: &JobRecord, to: JobStatus, error: &str) -> QueueResult<JobRecord> {
        let held = self.held(job).await?;

        let mut next = held.clone();
        next.transition(to)?;
        next.completed_at = Some(self.clock.now());
        next.error = Some(error.to_string());

        let closed = self.release(&held, next, None).await?;
        debug!(status = %closed.status, "Job closed");
        Ok(closed)
    }

    /// Move a held job out of the in-flight set as one atomic unit
    async fn release(
        &self,
        held: &JobRecord,
        next: JobRecord,
        enter: Option<Location>,
    ) -> QueueResult<JobRecord> {
        let outcome = self
            .backend
            .apply(Transition {
                record: next.clone(),
                expect: Expect {
                    status: JobStatus::Processing,
                    started_at: held.started_at,
                },
                leave: Some(Membership::InFlight(held.queue)),
                enter,
            })
            .await?;

        match outcome {
            TransitionOutcome::Applied => Ok(next),
            TransitionOutcome::Missing => Err(QueueError::NotFound(held.id.clone())),
            TransitionOutcome::StatusMismatch(status) => Err(QueueError::NotInFlight {
                id: held.id.clone(),
                status,
            }),
            TransitionOutcome::StaleLease | TransitionOutcome::NotMember => {
                Err(QueueError::NotInFlight {
                    id: held.id.clone(),
                    status: held.status,
                })
            }
        }
    }
}
