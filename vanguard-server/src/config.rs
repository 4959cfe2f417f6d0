use vanguard_queue::QueueConfig;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_REDIS_ADDR: &str = "localhost:6379";

/// Process configuration, read from the environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `VQ_BIND_ADDR`
    pub bind_addr: String,
    /// `REDIS_URL`, or `redis://` + `REDIS_ADDR`
    pub redis_url: String,
    pub queue: QueueConfig,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), QueueConfig::from_env())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>, queue: QueueConfig) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let redis_url = non_empty("REDIS_URL").unwrap_or_else(|| {
            let addr = non_empty("REDIS_ADDR").unwrap_or_else(|| DEFAULT_REDIS_ADDR.to_string());
            format!("redis://{addr}")
        });

        Self {
            bind_addr: non_empty("VQ_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            redis_url,
            queue,
        }
    }
}
