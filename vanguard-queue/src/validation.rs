//! Request-level checks applied before a job reaches the engine. The engine
//! itself treats payloads as opaque bytes and trusts these preconditions.

use thiserror::Error;

use crate::Lane;

/// Largest accepted payload, in bytes
pub const MAX_PAYLOAD_SIZE: usize = 256 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Payload cannot be empty")]
    EmptyPayload,

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Payload must be valid JSON: {0}")]
    InvalidJson(String),

    #[error("Invalid queue: {0}")]
    UnknownQueue(String),
}

impl ValidationError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyPayload => "empty_payload",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::InvalidJson(_) => "invalid_json",
            Self::UnknownQueue(_) => "unknown_queue",
        }
    }
}

/// Payload must be non-empty, at most [`MAX_PAYLOAD_SIZE`] bytes and valid JSON
pub fn validate_payload(payload: &[u8]) -> Result<(), ValidationError> {
    if payload.is_empty() {
        return Err(ValidationError::EmptyPayload);
    }
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ValidationError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }
    serde_json::from_slice::<serde::de::IgnoredAny>(payload)
        .map_err(|e| ValidationError::InvalidJson(e.to_string()))?;
    Ok(())
}

/// Parse a lane name: `high`, `default` or `low`
pub fn validate_queue(name: &str) -> Result<Lane, ValidationError> {
    name.parse()
        .map_err(|_| ValidationError::UnknownQueue(name.to_string()))
}
