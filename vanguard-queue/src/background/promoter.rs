use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    backend::{QueueBackend, Schedule},
    engine::QueueEngine,
    JobEvent, JobStatus, Lane, QueueResult,
};

/// Moves due delayed and retry-waiting jobs onto the tail of their lane
pub struct Promoter<B: QueueBackend + ?Sized> {
    engine: Arc<QueueEngine<B>>,
}

impl<B: QueueBackend + ?Sized + 'static> Promoter<B> {
    pub fn new(engine: Arc<QueueEngine<B>>) -> Self {
        Self { engine }
    }

    /// Run until shutdown is signalled
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let period = self.engine.config().promote_interval;
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Starting promoter with interval: {:?}", period);

        loop {
            tokio::select! {
                _ = super::stopped(&mut shutdown) => break,
                _ = ticker.tick() => match self.run_once().await {
                    Ok(0) => {}
                    Ok(count) => debug!("Promoted {} jobs", count),
                    Err(e) => warn!("Promotion cycle failed: {}", e),
                },
            }
        }

        info!("Promoter stopped");
    }

    /// One promotion cycle over every lane; returns how many jobs moved
    pub async fn run_once(&self) -> QueueResult<usize> {
        let engine = &self.engine;
        let now = engine.now();
        let batch_size = engine.config().batch_size;
        let mut promoted = 0;

        for schedule in [Schedule::Delayed, Schedule::Retry] {
            JobStatus::can_transition(schedule.status(), JobStatus::Queued)?;

            for &lane in Lane::all() {
                loop {
                    let ids = engine
                        .backend()
                        .promote_due(lane, schedule, now, batch_size)
                        .await?;
                    let short = ids.len() < batch_size;
                    promoted += ids.len();

                    for job_id in ids {
                        engine.emit(JobEvent::Promoted {
                            job_id,
                            queue: lane,
                            at: now,
                        });
                    }
                    if short {
                        break;
                    }
                }
            }
        }

        if promoted > 0 {
            engine.wake_reservers();
        }
        Ok(promoted)
    }
}
