use std::time::Duration;

use serde::Deserialize;

use campus_core::config::Config;

use crate::cache::CachePolicy;

/// Enrollments service configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct EnrollmentsConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Hard TTL of the unified view (default 300). Env var: `CACHE_TTL_SECS`.
    #[serde(default = "default_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Age after which reads trigger a background refresh (default 240).
    /// Env var: `CACHE_SOFT_TTL_SECS`. Clamped to the hard TTL.
    #[serde(default = "default_soft_ttl_secs")]
    pub cache_soft_ttl_secs: u64,
    /// How long a read waits on a running refresh (default 30).
    /// Env var: `CACHE_AWAIT_TIMEOUT_SECS`.
    #[serde(default = "default_await_timeout_secs")]
    pub cache_await_timeout_secs: u64,
    /// Keep-warm tick interval, 0 disables it (default 60). Env var: `CACHE_KEEP_WARM_SECS`.
    #[serde(default = "default_keep_warm_secs")]
    pub cache_keep_warm_secs: u64,
    /// Warm the cache before serving (default true). Env var: `CACHE_WARM_ON_START`.
    #[serde(default = "default_warm_on_start")]
    pub cache_warm_on_start: bool,
}

impl Config for EnrollmentsConfig {}

impl EnrollmentsConfig {
    pub fn keep_warm_interval(&self) -> Duration {
        Duration::from_secs(self.cache_keep_warm_secs)
    }
}

impl From<&EnrollmentsConfig> for CachePolicy {
    fn from(config: &EnrollmentsConfig) -> Self {
        CachePolicy::new(
            Duration::from_secs(config.cache_ttl_secs),
            Duration::from_secs(config.cache_soft_ttl_secs),
            Duration::from_secs(config.cache_await_timeout_secs),
        )
    }
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_soft_ttl_secs() -> u64 {
    240
}

fn default_await_timeout_secs() -> u64 {
    30
}

fn default_keep_warm_secs() -> u64 {
    60
}

fn default_warm_on_start() -> bool {
    true
}
