use crate::{
    backend::{Membership, Schedule},
    JobId, Lane,
};

/// Key layout under one prefix
///
/// ```text
/// {prefix}:job:{id}          hash, the record
/// {prefix}:ready:{lane}      list, FIFO
/// {prefix}:delayed:{lane}    zset, score = run time
/// {prefix}:retry:{lane}      zset, score = retry time
/// {prefix}:inflight:{lane}   zset, score = lease deadline
/// ```
#[derive(Debug, Clone)]
pub(crate) struct Keys {
    prefix: String,
}

/// How a membership key is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyKind {
    List,
    Zset,
}

impl KeyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Zset => "zset",
        }
    }
}

impl Keys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn job(&self, id: &JobId) -> String {
        format!("{}:job:{}", self.prefix, id)
    }

    pub fn ready(&self, lane: Lane) -> String {
        format!("{}:ready:{}", self.prefix, lane)
    }

    pub fn scheduled(&self, schedule: Schedule, lane: Lane) -> String {
        format!("{}:{}:{}", self.prefix, schedule_segment(schedule), lane)
    }

    pub fn in_flight(&self, lane: Lane) -> String {
        format!("{}:inflight:{}", self.prefix, lane)
    }

    pub fn membership(&self, membership: Membership) -> (KeyKind, String) {
        match membership {
            Membership::Ready(lane) => (KeyKind::List, self.ready(lane)),
            Membership::Scheduled(schedule, lane) => {
                (KeyKind::Zset, self.scheduled(schedule, lane))
            }
            Membership::InFlight(lane) => (KeyKind::Zset, self.in_flight(lane)),
        }
    }
}

fn schedule_segment(schedule: Schedule) -> &'static str {
    match schedule {
        Schedule::Delayed => "delayed",
        Schedule::Retry => "retry",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let keys = Keys::new("vq");
        assert_eq!(keys.job(&JobId::from("abc")), "vq:job:abc");
        assert_eq!(keys.ready(Lane::High), "vq:ready:high");
        assert_eq!(keys.scheduled(Schedule::Delayed, Lane::Low), "vq:delayed:low");
        assert_eq!(keys.scheduled(Schedule::Retry, Lane::Default), "vq:retry:default");
        assert_eq!(
            keys.membership(Membership::InFlight(Lane::Default)),
            (KeyKind::Zset, "vq:inflight:default".to_string())
        );
    }
}
