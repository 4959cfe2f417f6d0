//! Redis store adapter. Every trait method is one Lua script, so a record
//! and its membership always move together.

mod keys;
mod scripts;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, Script, ScriptInvocation};
use tracing::{debug, info};

use keys::Keys;

use crate::{
    backend::{
        Location, QueueBackend, ReclaimOutcome, Reclaimed, Schedule, Transition,
        TransitionOutcome,
    },
    codec::{self, FieldMap},
    config::RetryPolicy,
    JobId, JobRecord, JobStatus, Lane, QueueError, QueueResult, QueueStats, MAX_LEASE,
};

struct Scripts {
    insert: Script,
    claim: Script,
    apply: Script,
    promote: Script,
    reap: Script,
}

impl Scripts {
    fn load() -> Self {
        Self {
            insert: scripts::insert(),
            claim: scripts::claim(),
            apply: scripts::apply(),
            promote: scripts::promote(),
            reap: scripts::reap(),
        }
    }
}

/// Redis-backed queue store
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
    keys: Keys,
    scripts: Arc<Scripts>,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("prefix", &self.keys.prefix())
            .finish()
    }
}

impl RedisBackend {
    /// Connect to `url` (`redis://host:port/db`) and use `prefix` for keys
    pub async fn connect(url: &str, prefix: impl Into<String>) -> QueueResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        let keys = Keys::new(prefix);
        info!(prefix = keys.prefix(), "Connected to redis");

        Ok(Self {
            conn,
            keys,
            scripts: Arc::new(Scripts::load()),
        })
    }

    /// Round trip to the server
    pub async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

fn push_fields(invocation: &mut ScriptInvocation<'_>, record: &JobRecord) {
    for (name, value) in codec::encode(record) {
        invocation.arg(name).arg(value);
    }
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn parse_apply_reply(reply: &str) -> QueueResult<TransitionOutcome> {
    match reply {
        "ok" => Ok(TransitionOutcome::Applied),
        "missing" => Ok(TransitionOutcome::Missing),
        "stale" => Ok(TransitionOutcome::StaleLease),
        "membership" => Ok(TransitionOutcome::NotMember),
        other => match other.strip_prefix("status:") {
            Some(status) => Ok(TransitionOutcome::StatusMismatch(status.parse::<JobStatus>()?)),
            None => Err(QueueError::StoreUnavailable(format!(
                "unexpected script reply: {other}"
            ))),
        },
    }
}

fn parse_reap_reply(reply: Vec<String>) -> Vec<Reclaimed> {
    reply
        .chunks_exact(3)
        .map(|triple| {
            let id = JobId::from(triple[0].as_str());
            let outcome = match triple[1].as_str() {
                "dead" => ReclaimOutcome::Dead,
                retries => ReclaimOutcome::Requeued {
                    retries: retries.parse().unwrap_or_default(),
                    retry_at: codec::parse_time(&triple[2]).unwrap_or_default(),
                },
            };
            Reclaimed { id, outcome }
        })
        .collect()
}

#[async_trait]
impl QueueBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn insert(&self, record: &JobRecord, location: Location) -> QueueResult<()> {
        let (kind, target) = self.keys.membership(location.membership());
        let mut invocation = self.scripts.insert.prepare_invoke();
        invocation
            .key(self.keys.job(&record.id))
            .key(target)
            .arg(kind.as_str())
            .arg(location.score().unwrap_or_default())
            .arg(record.id.as_str());
        push_fields(&mut invocation, record);

        let mut conn = self.conn.clone();
        let created: i64 = invocation.invoke_async(&mut conn).await?;
        if created == 0 {
            return Err(QueueError::AlreadyExists(record.id.clone()));
        }
        Ok(())
    }

    async fn load(&self, id: &JobId) -> QueueResult<Option<JobRecord>> {
        let mut conn = self.conn.clone();
        let map: FieldMap = redis::cmd("HGETALL")
            .arg(self.keys.job(id))
            .query_async(&mut conn)
            .await?;
        if map.is_empty() {
            return Ok(None);
        }
        codec::decode(&map).map(Some)
    }

    async fn claim(
        &self,
        lanes: &[Lane],
        now: DateTime<Utc>,
        default_lease: Duration,
    ) -> QueueResult<Option<JobRecord>> {
        let mut invocation = self.scripts.claim.prepare_invoke();
        for &lane in lanes {
            invocation.key(self.keys.ready(lane));
        }
        for &lane in lanes {
            invocation.key(self.keys.in_flight(lane));
        }
        invocation
            .arg(self.keys.prefix())
            .arg(millis(now))
            .arg(default_lease.min(MAX_LEASE).as_millis() as u64)
            .arg(lanes.len())
            .arg(MAX_LEASE.as_millis() as u64);

        let mut conn = self.conn.clone();
        let claimed: Option<FieldMap> = invocation.invoke_async(&mut conn).await?;
        claimed.map(|map| codec::decode(&map)).transpose()
    }

    async fn apply(&self, transition: Transition) -> QueueResult<TransitionOutcome> {
        let job_key = self.keys.job(&transition.record.id);
        let (leave_kind, leave_key) = match transition.leave {
            Some(membership) => {
                let (kind, key) = self.keys.membership(membership);
                (kind.as_str(), key)
            }
            None => ("none", job_key.clone()),
        };
        let (enter_kind, enter_key, enter_score) = match transition.enter {
            Some(location) => {
                let (kind, key) = self.keys.membership(location.membership());
                (kind.as_str(), key, location.score().unwrap_or_default())
            }
            None => ("none", job_key.clone(), 0),
        };

        let mut invocation = self.scripts.apply.prepare_invoke();
        invocation
            .key(job_key)
            .key(leave_key)
            .key(enter_key)
            .arg(transition.expect.status.as_str())
            .arg(codec::format_time(transition.expect.started_at))
            .arg(leave_kind)
            .arg(enter_kind)
            .arg(enter_score)
            .arg(transition.record.id.as_str());
        push_fields(&mut invocation, &transition.record);

        let mut conn = self.conn.clone();
        let reply: String = invocation.invoke_async(&mut conn).await?;
        parse_apply_reply(&reply)
    }

    async fn promote_due(
        &self,
        lane: Lane,
        schedule: Schedule,
        now: DateTime<Utc>,
        limit: usize,
    ) -> QueueResult<Vec<JobId>> {
        let mut invocation = self.scripts.promote.prepare_invoke();
        invocation
            .key(self.keys.scheduled(schedule, lane))
            .key(self.keys.ready(lane))
            .arg(self.keys.prefix())
            .arg(millis(now))
            .arg(limit)
            .arg(schedule.status().as_str());

        let mut conn = self.conn.clone();
        let promoted: Vec<String> = invocation.invoke_async(&mut conn).await?;
        if !promoted.is_empty() {
            debug!(lane = %lane, set = schedule.as_str(), count = promoted.len(), "Promoted batch");
        }
        Ok(promoted.into_iter().map(JobId::from).collect())
    }

    async fn reclaim_expired(
        &self,
        lane: Lane,
        now: DateTime<Utc>,
        limit: usize,
        policy: &RetryPolicy,
        reason: &str,
    ) -> QueueResult<Vec<Reclaimed>> {
        let mut invocation = self.scripts.reap.prepare_invoke();
        invocation
            .key(self.keys.in_flight(lane))
            .key(self.keys.scheduled(Schedule::Retry, lane))
            .arg(self.keys.prefix())
            .arg(millis(now))
            .arg(limit)
            .arg(reason)
            .arg(policy.base.as_millis() as u64)
            .arg(policy.max.as_millis() as u64);

        let mut conn = self.conn.clone();
        let reply: Vec<String> = invocation.invoke_async(&mut conn).await?;
        Ok(parse_reap_reply(reply))
    }

    async fn stats(&self, lane: Lane) -> QueueResult<QueueStats> {
        let mut conn = self.conn.clone();
        let (ready, delayed, retry, in_flight): (u64, u64, u64, u64) = redis::pipe()
            .cmd("LLEN")
            .arg(self.keys.ready(lane))
            .cmd("ZCARD")
            .arg(self.keys.scheduled(Schedule::Delayed, lane))
            .cmd("ZCARD")
            .arg(self.keys.scheduled(Schedule::Retry, lane))
            .cmd("ZCARD")
            .arg(self.keys.in_flight(lane))
            .query_async(&mut conn)
            .await?;

        Ok(QueueStats {
            queue: lane,
            ready,
            delayed,
            retry,
            in_flight,
        })
    }
}
