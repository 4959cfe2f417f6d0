use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// Priority lane a job is queued on
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    High,
    #[default]
    Default,
    Low,
}

// Reserve(Any) drains lanes in this order: strict priority, no fairness.
const PRIORITY_ORDER: [Lane; 3] = [Lane::High, Lane::Default, Lane::Low];

impl Lane {
    /// All lanes, highest priority first
    pub fn all() -> &'static [Lane] {
        &PRIORITY_ORDER
    }

    /// Wire name, also used in store keys
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Default => "default",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Lane {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Self::High),
            "default" => Ok(Self::Default),
            "low" => Ok(Self::Low),
            _ => Err(QueueError::UnknownQueue(s.to_string())),
        }
    }
}

/// Which lanes a reserve call may pop from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveFrom {
    /// A single lane
    Lane(Lane),
    /// Every lane in strict priority order
    Any,
}

impl ReserveFrom {
    /// Lanes to check, in the order they must be checked
    pub fn lanes(&self) -> &[Lane] {
        match self {
            Self::Lane(lane) => std::slice::from_ref(lane),
            Self::Any => Lane::all(),
        }
    }
}

impl From<Lane> for ReserveFrom {
    fn from(lane: Lane) -> Self {
        Self::Lane(lane)
    }
}

impl std::str::FromStr for ReserveFrom {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any" | "*" => Ok(Self::Any),
            other => other.parse().map(Self::Lane),
        }
    }
}
