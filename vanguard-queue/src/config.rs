use std::time::Duration;

/// Configuration for the queue engine and its background loops
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Lease length for jobs whose timeout is shorter (or 0 = no timeout)
    pub default_lease: Duration,
    /// How often a blocked reserve re-checks the store
    pub poll_interval: Duration,
    /// Promotion scheduler tick
    pub promote_interval: Duration,
    /// Lease reaper tick
    pub reap_interval: Duration,
    /// Max entries moved per lane per atomic batch
    pub batch_size: usize,
    /// Backoff for retries scheduled by the reaper
    pub retry_policy: RetryPolicy,
    /// Prefix for every store key
    pub key_prefix: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_lease: Duration::from_secs(300), // 5 minutes
            poll_interval: Duration::from_millis(100),
            promote_interval: Duration::from_secs(1),
            reap_interval: Duration::from_secs(5),
            batch_size: 500,
            retry_policy: RetryPolicy::default(),
            key_prefix: "vq".to_string(),
        }
    }
}

impl QueueConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from `VQ_*` environment variables; unset or
    /// unparseable values keep their defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            default_lease: env_millis("VQ_DEFAULT_LEASE_MS").unwrap_or(defaults.default_lease),
            poll_interval: env_millis("VQ_POLL_INTERVAL_MS").unwrap_or(defaults.poll_interval),
            promote_interval: env_millis("VQ_PROMOTE_INTERVAL_MS")
                .unwrap_or(defaults.promote_interval),
            reap_interval: env_millis("VQ_REAP_INTERVAL_MS").unwrap_or(defaults.reap_interval),
            batch_size: env_parse("VQ_BATCH_SIZE")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.batch_size),
            retry_policy: RetryPolicy {
                base: env_millis("VQ_RETRY_BASE_MS").unwrap_or(defaults.retry_policy.base),
                max: env_millis("VQ_RETRY_MAX_MS").unwrap_or(defaults.retry_policy.max),
            },
            key_prefix: std::env::var("VQ_KEY_PREFIX")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.key_prefix),
        }
    }

    /// Set the default lease
    pub fn with_default_lease(mut self, lease: Duration) -> Self {
        self.default_lease = lease;
        self
    }

    /// Set the blocked-reserve poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the promotion tick
    pub fn with_promote_interval(mut self, interval: Duration) -> Self {
        self.promote_interval = interval;
        self
    }

    /// Set the reaper tick
    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    /// Set the batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the reaper's retry policy
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set the key prefix
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}

/// Exponential backoff for reclaimed jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub base: Duration,
    /// Upper bound for any delay
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(3600), // 1 hour
        }
    }
}

impl RetryPolicy {
    /// Retry immediately
    pub fn immediate() -> Self {
        Self {
            base: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Delay before attempt `retries` (1-based: the value after incrementing)
    pub fn delay_for(&self, retries: u32) -> Duration {
        let exponent = retries.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_millis)
}
