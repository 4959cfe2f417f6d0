use serde::{Deserialize, Serialize};

use super::Lane;

/// Membership counts for one lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue: Lane,
    pub ready: u64,
    pub delayed: u64,
    pub retry: u64,
    pub in_flight: u64,
}

impl QueueStats {
    pub fn empty(queue: Lane) -> Self {
        Self {
            queue,
            ready: 0,
            delayed: 0,
            retry: 0,
            in_flight: 0,
        }
    }

    /// Jobs not yet in a terminal status
    pub fn pending(&self) -> u64 {
        self.ready + self.delayed + self.retry + self.in_flight
    }
}
