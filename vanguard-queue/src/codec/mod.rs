//! Flat field codec for job records.
//!
//! A record is stored as one field map (a redis hash): every field is a
//! string except `payload`, which is carried as raw bytes. Timestamps are
//! unix milliseconds, with an empty string meaning "unset".
//!
//! Decoding is deliberately lossy for integers: a malformed `timeout_ms`,
//! `retries` or `max_retries` decodes to zero instead of failing the read.
//! This keeps a damaged record readable, but a zeroed `max_retries` sends
//! the job to the dead letter set on its next failure.

pub mod fields;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::warn;

use crate::{JobId, JobRecord, JobStatus, Lane, QueueResult};

/// Field name -> raw value
pub type FieldMap = HashMap<String, Vec<u8>>;

/// Encode a record into its stored field map
pub fn encode(job: &JobRecord) -> FieldMap {
    let mut map = FieldMap::with_capacity(fields::ALL.len());
    let mut put = |name: &str, value: Vec<u8>| {
        map.insert(name.to_string(), value);
    };

    put(fields::ID, job.id.as_str().as_bytes().to_vec());
    put(fields::CORRELATION_ID, job.correlation_id.as_bytes().to_vec());
    put(fields::QUEUE, job.queue.as_str().as_bytes().to_vec());
    put(fields::PAYLOAD, job.payload.clone());
    put(fields::STATUS, job.status.as_str().as_bytes().to_vec());
    put(fields::CREATED_AT, format_time(Some(job.created_at)).into_bytes());
    put(fields::SCHEDULED_AT, format_time(job.scheduled_at).into_bytes());
    put(fields::STARTED_AT, format_time(job.started_at).into_bytes());
    put(fields::COMPLETED_AT, format_time(job.completed_at).into_bytes());
    put(fields::TIMEOUT_MS, job.timeout_ms.to_string().into_bytes());
    put(fields::RETRIES, job.retries.to_string().into_bytes());
    put(fields::MAX_RETRIES, job.max_retries.to_string().into_bytes());
    put(
        fields::ERROR,
        job.error.clone().unwrap_or_default().into_bytes(),
    );

    map
}

/// Decode a stored field map back into a record
pub fn decode(map: &FieldMap) -> QueueResult<JobRecord> {
    let status: JobStatus = text(map, fields::STATUS).parse()?;
    let queue: Lane = text(map, fields::QUEUE).parse()?;
    let error = text(map, fields::ERROR);

    Ok(JobRecord {
        id: JobId::from(text(map, fields::ID)),
        correlation_id: text(map, fields::CORRELATION_ID),
        queue,
        payload: map.get(fields::PAYLOAD).cloned().unwrap_or_default(),
        status,
        created_at: parse_time(&text(map, fields::CREATED_AT)).unwrap_or_default(),
        scheduled_at: parse_time(&text(map, fields::SCHEDULED_AT)),
        started_at: parse_time(&text(map, fields::STARTED_AT)),
        completed_at: parse_time(&text(map, fields::COMPLETED_AT)),
        timeout_ms: lossy_int(map, fields::TIMEOUT_MS),
        retries: lossy_int(map, fields::RETRIES),
        max_retries: lossy_int(map, fields::MAX_RETRIES),
        error: (!error.is_empty()).then_some(error),
    })
}

/// Millisecond timestamp string, empty for `None`
pub fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.timestamp_millis().to_string())
        .unwrap_or_default()
}

/// Inverse of [`format_time`]; malformed input reads as unset
pub fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    raw.parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
}

fn text(map: &FieldMap, name: &str) -> String {
    map.get(name)
        .map(|raw| String::from_utf8_lossy(raw).into_owned())
        .unwrap_or_default()
}

fn lossy_int<T: FromStr + Default>(map: &FieldMap, name: &str) -> T {
    let raw = text(map, name);
    if raw.is_empty() {
        return T::default();
    }
    raw.parse().unwrap_or_else(|_| {
        warn!(field = name, value = %raw, "malformed integer field, reading as zero");
        T::default()
    })
}
