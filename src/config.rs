//! Relay Configuration
//!
//! Loaded from a TOML file (path given on the command line) with an
//! environment override for the listen address. Duration fields
//! serialize as integer milliseconds.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error type for configuration loading and validation.
#[derive(Debug)]
pub enum ConfigError {
    /// Could not read the config file
    Io(std::io::Error),
    /// Could not parse the config file
    Parse(toml::de::Error),
    /// Values out of range or inconsistent
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config I/O error: {}", e),
            ConfigError::Parse(e) => write!(f, "config parse error: {}", e),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Which store backend the binary writes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-memory sink (diagnostics only; batches are not persisted)
    Memory,
    /// One append-only file per target under `dir`
    Fs { dir: PathBuf },
}

/// Retry policy for downstream batch writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per batch, including the first (default: 3)
    pub max_attempts: u32,
    /// Base backoff between attempts; doubles per attempt, with jitter
    /// (default: 100ms)
    #[serde(with = "duration_millis")]
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Top-level relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Address the ingestion listener binds
    pub listen_addr: String,
    /// Pending-row count that triggers a size flush (default: 1000)
    pub flush_threshold: usize,
    /// Upper bound on how long a pending row may wait before a timer
    /// flush (default: 50ms)
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    /// Hard cap on pending rows per key; beyond it submits are rejected
    /// (default: 10000)
    pub max_buffered_per_key: usize,
    /// Retry policy for batch writes
    pub retry: RetryConfig,
    /// Retire buffers idle past this TTL; `None` disables eviction and
    /// buffers live for the process lifetime (the default)
    #[serde(default, with = "opt_duration_millis")]
    pub idle_ttl: Option<Duration>,
    /// Store backend selection
    pub store: StoreBackend,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            listen_addr: "127.0.0.1:5433".to_string(),
            flush_threshold: 1000,
            max_delay: Duration::from_millis(50),
            max_buffered_per_key: 10_000,
            retry: RetryConfig::default(),
            idle_ttl: None,
            store: StoreBackend::Memory,
        }
    }
}

impl RelayConfig {
    /// Configuration for tests (small thresholds, fast retries).
    pub fn test() -> Self {
        RelayConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            flush_threshold: 8,
            max_delay: Duration::from_millis(25),
            max_buffered_per_key: 64,
            retry: RetryConfig {
                max_attempts: 3,
                backoff: Duration::from_millis(2),
            },
            idle_ttl: None,
            store: StoreBackend::Memory,
        }
    }

    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: RelayConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides (`RELAY_LISTEN_ADDR`).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(addr) = std::env::var("RELAY_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_threshold == 0 {
            return Err(ConfigError::Invalid(
                "flush_threshold must be positive".to_string(),
            ));
        }
        if self.max_buffered_per_key < self.flush_threshold {
            return Err(ConfigError::Invalid(format!(
                "max_buffered_per_key ({}) must be at least flush_threshold ({})",
                self.max_buffered_per_key, self.flush_threshold
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serde helper for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Serde helper for Option<Duration> as milliseconds
mod opt_duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
