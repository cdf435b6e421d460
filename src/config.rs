/// supervisor configuration.
///
/// the values are injected into the probe, the durable cache and the
/// supervisor loop.  `from_env` reads `APP_REDIS_*` variables, e.g.
/// `APP_REDIS_HOST_NAME`, `APP_REDIS_PORT`, `APP_REDIS_PROBE_PERIOD_SECS`.
use std::fmt;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "APP_REDIS";

pub const DEFAULT_PROBE_PERIOD_SECS: u64 = 10;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_ENTRY_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_FALLBACK_MAX_ENTRIES: usize = 10_000;
pub const DEFAULT_KEY_PREFIX: &str = "cache-supervisor";

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SupervisorConfig {
    pub host_name: String,
    pub port: u16,
    pub password: String,
    pub database: i64,
    pub probe_period_secs: u64,
    pub probe_timeout_ms: u64,
    pub entry_ttl_secs: u64,
    pub fallback_max_entries: usize,
    /// durable keys are stored as `<prefix>::<key>`; empty stores bare keys
    pub key_prefix: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        SupervisorConfig {
            host_name: "127.0.0.1".to_string(),
            port: 6379,
            password: String::new(),
            database: 0,
            probe_period_secs: DEFAULT_PROBE_PERIOD_SECS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            entry_ttl_secs: DEFAULT_ENTRY_TTL_SECS,
            fallback_max_entries: DEFAULT_FALLBACK_MAX_ENTRIES,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl SupervisorConfig {
    /// read the config from `APP_REDIS_*` environment variables; anything
    /// not set keeps its default.
    pub fn from_env() -> Result<SupervisorConfig> {
        let settings = ::config::Config::builder()
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let cfg = settings.try_deserialize::<SupervisorConfig>()?;
        Ok(cfg)
    }

    pub fn probe_period(&self) -> Duration {
        Duration::from_secs(self.probe_period_secs.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms.max(1))
    }

    pub fn entry_ttl(&self) -> Duration {
        Duration::from_secs(self.entry_ttl_secs.max(1))
    }

    /// the redis connection url; a blank password means no auth
    pub fn redis_url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host_name, self.port, self.database)
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                self.password, self.host_name, self.port, self.database
            )
        }
    }
}

// keep the password out of the logs
impl fmt::Debug for SupervisorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = if self.password.is_empty() { "" } else { "***" };
        f.debug_struct("SupervisorConfig")
            .field("host_name", &self.host_name)
            .field("port", &self.port)
            .field("password", &password)
            .field("database", &self.database)
            .field("probe_period_secs", &self.probe_period_secs)
            .field("probe_timeout_ms", &self.probe_timeout_ms)
            .field("entry_ttl_secs", &self.entry_ttl_secs)
            .field("fallback_max_entries", &self.fallback_max_entries)
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}
