pub mod ids;
pub mod lane;
pub mod record;
pub mod events;
pub mod stats;

pub use ids::JobId;
pub use lane::{Lane, ReserveFrom};
pub use record::{JobRecord, JobStatus, MAX_LEASE};
pub use events::JobEvent;
pub use stats::QueueStats;
