//! Stored field names. Changing any of these breaks records written by
//! earlier releases.

pub const ID: &str = "id";
pub const CORRELATION_ID: &str = "correlation_id";
pub const QUEUE: &str = "queue";
pub const PAYLOAD: &str = "payload";
pub const STATUS: &str = "status";
pub const CREATED_AT: &str = "created_at";
pub const SCHEDULED_AT: &str = "scheduled_at";
pub const STARTED_AT: &str = "started_at";
pub const COMPLETED_AT: &str = "completed_at";
pub const TIMEOUT_MS: &str = "timeout_ms";
pub const RETRIES: &str = "retries";
pub const MAX_RETRIES: &str = "max_retries";
pub const ERROR: &str = "error";

pub const ALL: [&str; 13] = [
    ID,
    CORRELATION_ID,
    QUEUE,
    PAYLOAD,
    STATUS,
    CREATED_AT,
    SCHEDULED_AT,
    STARTED_AT,
    COMPLETED_AT,
    TIMEOUT_MS,
    RETRIES,
    MAX_RETRIES,
    ERROR,
];
