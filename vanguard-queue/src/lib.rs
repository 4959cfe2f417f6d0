//! # vanguard-queue: priority, delay-aware job queue engine
//!
//! Producers enqueue jobs onto one of three priority lanes (`high`,
//! `default`, `low`), optionally for a future run time. Consumers reserve one
//! job at a time under a lease, then acknowledge it, schedule a retry, fail
//! it or dead-letter it. Two background loops keep the store moving: the
//! [`Promoter`] makes due delayed and retry-waiting jobs ready, the
//! [`LeaseReaper`] takes back jobs whose consumer went away.
//!
//! Delivery is at-least-once. Each job is held by at most one consumer at a
//! time, and every status change is checked against the lifecycle table in
//! [`JobStatus::can_transition`].
//!
//! ```rust,no_run
//! use std::{sync::Arc, time::Duration};
//! use vanguard_queue::prelude::*;
//!
//! # async fn demo() -> QueueResult<()> {
//! let engine = Arc::new(QueueEngine::new(Arc::new(MemoryBackend::new())));
//! let maintenance = Maintenance::spawn(engine.clone());
//!
//! engine
//!     .enqueue(JobRecord::new(Lane::High, br#"{"email":"a@b.c"}"#.to_vec()).with_max_retries(3))
//!     .await?;
//!
//! let job = engine.reserve(ReserveFrom::Any, Duration::from_secs(5)).await?;
//! engine.ack(&job).await?;
//!
//! maintenance.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod background;
pub mod clock;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod types;
pub mod validation;

pub use backend::QueueBackend;
pub use background::{LeaseReaper, Maintenance, MaintenanceHandle, Promoter};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{QueueConfig, RetryPolicy};
pub use engine::QueueEngine;
pub use error::{QueueError, QueueResult};
pub use types::{
    JobEvent, JobId, JobRecord, JobStatus, Lane, QueueStats, ReserveFrom, MAX_LEASE,
};
pub use validation::ValidationError;

#[cfg(feature = "memory")]
pub use backend::memory::MemoryBackend;

#[cfg(feature = "redis")]
pub use backend::redis::RedisBackend;

/// Engine over a backend chosen at runtime
pub type DynQueueEngine = QueueEngine<dyn QueueBackend>;

pub mod prelude {
    pub use crate::{
        JobEvent, JobId, JobRecord, JobStatus, Lane, Maintenance, QueueBackend, QueueConfig,
        QueueEngine, QueueError, QueueResult, ReserveFrom,
    };

    #[cfg(feature = "memory")]
    pub use crate::MemoryBackend;

    #[cfg(feature = "redis")]
    pub use crate::RedisBackend;
}
