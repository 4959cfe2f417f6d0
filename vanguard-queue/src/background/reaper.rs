use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    backend::{QueueBackend, ReclaimOutcome},
    engine::QueueEngine,
    JobEvent, JobStatus, Lane, QueueResult,
};

/// Error recorded on jobs whose lease ran out
pub const LEASE_EXPIRED: &str = "lease expired";

/// Reclaims in-flight jobs whose lease deadline has passed
pub struct LeaseReaper<B: QueueBackend + ?Sized> {
    engine: Arc<QueueEngine<B>>,
}

impl<B: QueueBackend + ?Sized + 'static> LeaseReaper<B> {
    pub fn new(engine: Arc<QueueEngine<B>>) -> Self {
        Self { engine }
    }

    /// Run until shutdown is signalled
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let period = self.engine.config().reap_interval;
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Starting lease reaper with interval: {:?}", period);

        loop {
            tokio::select! {
                _ = super::stopped(&mut shutdown) => break,
                _ = ticker.tick() => match self.run_once().await {
                    Ok(0) => debug!("No expired leases found"),
                    Ok(count) => info!("Reclaimed {} expired leases", count),
                    Err(e) => warn!("Error during lease reaping: {}", e),
                },
            }
        }

        info!("Lease reaper stopped");
    }

    /// One reaper cycle over every lane; returns how many leases were
    /// reclaimed
    pub async fn run_once(&self) -> QueueResult<usize> {
        JobStatus::can_transition(JobStatus::Processing, JobStatus::RetryWait)?;
        JobStatus::can_transition(JobStatus::Processing, JobStatus::Dead)?;

        let engine = &self.engine;
        let now = engine.now();
        let batch_size = engine.config().batch_size;
        let policy = engine.config().retry_policy;
        let mut reclaimed = 0;

        for &lane in Lane::all() {
            loop {
                let batch = engine
                    .backend()
                    .reclaim_expired(lane, now, batch_size, &policy, LEASE_EXPIRED)
                    .await?;
                let short = batch.len() < batch_size;
                reclaimed += batch.len();

                for item in batch {
                    match item.outcome {
                        ReclaimOutcome::Requeued { retries, retry_at } => {
                            warn!(job_id = %item.id, retries, %retry_at, "Lease expired, job scheduled for retry");
                            engine.emit(JobEvent::Reclaimed {
                                job_id: item.id.clone(),
                                requeued: true,
                                at: now,
                            });
                            engine.emit(JobEvent::RetryScheduled {
                                job_id: item.id,
                                retry_at,
                                error: LEASE_EXPIRED.to_string(),
                                at: now,
                            });
                        }
                        ReclaimOutcome::Dead => {
                            warn!(job_id = %item.id, "Lease expired, retry budget exhausted, job dead-lettered");
                            engine.emit(JobEvent::Reclaimed {
                                job_id: item.id.clone(),
                                requeued: false,
                                at: now,
                            });
                            engine.emit(JobEvent::DeadLettered {
                                job_id: item.id,
                                error: LEASE_EXPIRED.to_string(),
                                at: now,
                            });
                        }
                    }
                }
                if short {
                    break;
                }
            }
        }

        Ok(reclaimed)
    }
}
