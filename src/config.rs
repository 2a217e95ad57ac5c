//! Configuration — built from environment variables with documented defaults.
//!
//! Nothing here is strictly required to start: a missing store token or sink
//! URL degrades that surface to a logged no-op rather than refusing to boot.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Record store (tabular store + hub job API) configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Bearer token for the tabular store. Absent → lookups report
    /// "not found" and writes are refused (and logged by the caller).
    pub api_token: Option<SecretString>,
    /// Tabular store API root.
    pub base_url: String,
    /// Base (workspace) identifier appended to `base_url`.
    pub base_id: String,
    /// Per-call timeout for store reads and writes.
    pub timeout: Duration,
}

/// Outbound notification sink configuration.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Mail-send sink URL. Absent → mail degrades to `WouldSend` receipts.
    pub mail_url: Option<String>,
    /// Team-channel sink URL. Absent → posts degrade to `WouldSend` receipts.
    pub chat_url: Option<String>,
    /// Per-call timeout for sink deliveries.
    pub timeout: Duration,
}

/// Worker endpoint addresses, one per live/testing route.
#[derive(Debug, Clone, Default)]
pub struct WorkerEndpoints {
    pub file: Option<String>,
    pub update: Option<String>,
    pub feedback: Option<String>,
    pub work_to_client: Option<String>,
}

/// Full engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub sinks: SinkConfig,
    pub workers: WorkerEndpoints,
    /// Hub base URL, used for the job API and for deep links in mail bodies.
    pub hub_url: String,
    /// Worker calls get a longer timeout than store/sink calls to tolerate
    /// slower downstream processing.
    pub worker_timeout: Duration,
    /// Webhook listen port.
    pub port: u16,
}

const DEFAULT_STORE_URL: &str = "https://api.airtable.com/v0";
const DEFAULT_HUB_URL: &str = "https://hub.example.com";
const DEFAULT_STORE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SINK_TIMEOUT_SECS: u64 = 30;
const DEFAULT_WORKER_TIMEOUT_SECS: u64 = 60;
const DEFAULT_PORT: u16 = 8080;

impl EngineConfig {
    /// Build configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `TRAFFIC_STORE_TOKEN` | (unset → store degraded) |
    /// | `TRAFFIC_STORE_URL` | `https://api.airtable.com/v0` |
    /// | `TRAFFIC_STORE_BASE` | (empty) |
    /// | `TRAFFIC_HUB_URL` | `https://hub.example.com` |
    /// | `TRAFFIC_MAIL_SINK_URL` | (unset → would-send) |
    /// | `TRAFFIC_CHAT_SINK_URL` | (unset → would-send) |
    /// | `TRAFFIC_WORKER_FILE_URL` etc. | (unset → route has no endpoint) |
    /// | `TRAFFIC_STORE_TIMEOUT_SECS` | 10 |
    /// | `TRAFFIC_SINK_TIMEOUT_SECS` | 30 |
    /// | `TRAFFIC_WORKER_TIMEOUT_SECS` | 60 |
    /// | `TRAFFIC_PORT` | 8080 |
    pub fn from_env() -> Result<Self, ConfigError> {
        let store = StoreConfig {
            api_token: env_opt("TRAFFIC_STORE_TOKEN").map(SecretString::from),
            base_url: env_or("TRAFFIC_STORE_URL", DEFAULT_STORE_URL),
            base_id: env_or("TRAFFIC_STORE_BASE", ""),
            timeout: env_duration("TRAFFIC_STORE_TIMEOUT_SECS", DEFAULT_STORE_TIMEOUT_SECS)?,
        };

        let sinks = SinkConfig {
            mail_url: env_opt("TRAFFIC_MAIL_SINK_URL"),
            chat_url: env_opt("TRAFFIC_CHAT_SINK_URL"),
            timeout: env_duration("TRAFFIC_SINK_TIMEOUT_SECS", DEFAULT_SINK_TIMEOUT_SECS)?,
        };

        let workers = WorkerEndpoints {
            file: env_opt("TRAFFIC_WORKER_FILE_URL"),
            update: env_opt("TRAFFIC_WORKER_UPDATE_URL"),
            feedback: env_opt("TRAFFIC_WORKER_FEEDBACK_URL"),
            work_to_client: env_opt("TRAFFIC_WORKER_DELIVERY_URL"),
        };

        Ok(Self {
            store,
            sinks,
            workers,
            hub_url: env_or("TRAFFIC_HUB_URL", DEFAULT_HUB_URL),
            worker_timeout: env_duration(
                "TRAFFIC_WORKER_TIMEOUT_SECS",
                DEFAULT_WORKER_TIMEOUT_SECS,
            )?,
            port: env_parse("TRAFFIC_PORT", DEFAULT_PORT)?,
        })
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            base_url: DEFAULT_STORE_URL.to_string(),
            base_id: String::new(),
            timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            mail_url: None,
            chat_url: None,
            timeout: Duration::from_secs(DEFAULT_SINK_TIMEOUT_SECS),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            sinks: SinkConfig::default(),
            workers: WorkerEndpoints::default(),
            hub_url: DEFAULT_HUB_URL.to_string(),
            worker_timeout: Duration::from_secs(DEFAULT_WORKER_TIMEOUT_SECS),
            port: DEFAULT_PORT,
        }
    }
}

// ── Env helpers ─────────────────────────────────────────────────────

/// Read an optional env var; empty strings count as unset.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_duration(key: &str, default_secs: u64) -> Result<Duration, ConfigError> {
    Ok(Duration::from_secs(env_parse(key, default_secs)?))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env_opt(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("could not parse '{raw}'"),
        }),
    }
}
