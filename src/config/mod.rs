// Configuration loading and management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::CleanupError;

pub const PROD: &str = "prod";
pub const DEV: &str = "dev";
pub const TEST: &str = "test";

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(rename = "cleanup")]
    pub cleanup: CleanupConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logs {
    pub level: Option<String>,
}

/// Tunables of the cleanup engine. Immutable once the scheduler is built.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CleanupConfig {
    #[serde(default = "default_env")]
    pub env: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub logs: Option<Logs>,

    #[serde(default = "default_startup_delay", with = "humantime_serde")]
    pub startup_delay: Duration,
    #[serde(default = "default_min_idle_gap", with = "humantime_serde")]
    pub min_idle_gap: Duration,
    #[serde(default = "default_max_starvation_gap", with = "humantime_serde")]
    pub max_starvation_gap: Duration,
    #[serde(default = "default_optimal_work_slice", with = "humantime_serde")]
    pub optimal_work_slice: Duration,

    #[serde(default = "default_target_items_per_folder")]
    pub target_items_per_folder: usize,
    #[serde(default = "default_max_items_per_folder")]
    pub max_items_per_folder: usize,

    #[serde(default = "default_avoid_used_within", with = "humantime_serde")]
    pub avoid_removal_if_used_within: Duration,
    #[serde(default = "default_avoid_created_within", with = "humantime_serde")]
    pub avoid_removal_if_created_within: Duration,
    #[serde(default = "default_prohibit_used_within", with = "humantime_serde")]
    pub prohibit_removal_if_used_within: Duration,
    #[serde(default = "default_prohibit_created_within", with = "humantime_serde")]
    pub prohibit_removal_if_created_within: Duration,

    #[serde(default = "default_file_lock_timeout", with = "humantime_serde")]
    pub file_lock_timeout: Duration,
    #[serde(default = "default_process_lock_wait", with = "humantime_serde")]
    pub process_lock_wait: Duration,
    #[serde(default = "default_process_lock_retry_delay", with = "humantime_serde")]
    pub process_lock_retry_delay: Duration,
    #[serde(default = "default_stats_interval", with = "humantime_serde")]
    pub stats_interval: Duration,
    #[serde(default = "default_advisory_interval", with = "humantime_serde")]
    pub advisory_interval: Duration,
}

fn default_env() -> String {
    DEV.to_string()
}
fn default_enabled() -> bool {
    true
}
fn default_startup_delay() -> Duration {
    5 * MINUTE
}
fn default_min_idle_gap() -> Duration {
    Duration::from_secs(20)
}
fn default_max_starvation_gap() -> Duration {
    5 * MINUTE
}
fn default_optimal_work_slice() -> Duration {
    Duration::from_secs(4)
}
fn default_target_items_per_folder() -> usize {
    400
}
fn default_max_items_per_folder() -> usize {
    1000
}
fn default_avoid_used_within() -> Duration {
    4 * DAY
}
fn default_avoid_created_within() -> Duration {
    24 * HOUR
}
fn default_prohibit_used_within() -> Duration {
    5 * MINUTE
}
fn default_prohibit_created_within() -> Duration {
    10 * MINUTE
}
fn default_file_lock_timeout() -> Duration {
    Duration::from_millis(15)
}
fn default_process_lock_wait() -> Duration {
    Duration::from_secs(1)
}
fn default_process_lock_retry_delay() -> Duration {
    Duration::from_secs(30)
}
fn default_stats_interval() -> Duration {
    Duration::from_secs(5)
}
fn default_advisory_interval() -> Duration {
    10 * MINUTE
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            env: default_env(),
            enabled: default_enabled(),
            logs: None,
            startup_delay: default_startup_delay(),
            min_idle_gap: default_min_idle_gap(),
            max_starvation_gap: default_max_starvation_gap(),
            optimal_work_slice: default_optimal_work_slice(),
            target_items_per_folder: default_target_items_per_folder(),
            max_items_per_folder: default_max_items_per_folder(),
            avoid_removal_if_used_within: default_avoid_used_within(),
            avoid_removal_if_created_within: default_avoid_created_within(),
            prohibit_removal_if_used_within: default_prohibit_used_within(),
            prohibit_removal_if_created_within: default_prohibit_created_within(),
            file_lock_timeout: default_file_lock_timeout(),
            process_lock_wait: default_process_lock_wait(),
            process_lock_retry_delay: default_process_lock_retry_delay(),
            stats_interval: default_stats_interval(),
            advisory_interval: default_advisory_interval(),
        }
    }
}

impl CleanupConfig {
    pub fn is_prod(&self) -> bool {
        self.env == PROD
    }

    pub fn log_level(&self) -> &str {
        self.logs
            .as_ref()
            .and_then(|logs| logs.level.as_deref())
            .unwrap_or("info")
    }

    /// Checks the invariants the eviction tiers rely on.
    pub fn validate(&self) -> Result<(), CleanupError> {
        if self.prohibit_removal_if_used_within > self.avoid_removal_if_used_within {
            return Err(CleanupError::InvalidConfig(format!(
                "prohibit_removal_if_used_within ({}) exceeds avoid_removal_if_used_within ({})",
                humantime::format_duration(self.prohibit_removal_if_used_within),
                humantime::format_duration(self.avoid_removal_if_used_within),
            )));
        }
        if self.prohibit_removal_if_created_within > self.avoid_removal_if_created_within {
            return Err(CleanupError::InvalidConfig(format!(
                "prohibit_removal_if_created_within ({}) exceeds avoid_removal_if_created_within ({})",
                humantime::format_duration(self.prohibit_removal_if_created_within),
                humantime::format_duration(self.avoid_removal_if_created_within),
            )));
        }
        if self.target_items_per_folder > self.max_items_per_folder {
            return Err(CleanupError::InvalidConfig(format!(
                "target_items_per_folder ({}) exceeds max_items_per_folder ({})",
                self.target_items_per_folder, self.max_items_per_folder
            )));
        }
        let positive = [
            ("optimal_work_slice", self.optimal_work_slice),
            ("file_lock_timeout", self.file_lock_timeout),
            ("process_lock_wait", self.process_lock_wait),
            ("process_lock_retry_delay", self.process_lock_retry_delay),
            ("stats_interval", self.stats_interval),
        ];
        for (name, value) in positive {
            if value.is_zero() {
                return Err(CleanupError::InvalidConfig(format!("{name} must be positive")));
            }
        }
        Ok(())
    }
}

impl Config {
    /// Loads configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let abs_path = path
            .canonicalize()
            .with_context(|| format!("failed to resolve absolute config filepath: {:?}", path))?;

        let data = std::fs::read_to_string(&abs_path)
            .with_context(|| format!("read config yaml file {:?}", abs_path))?;

        let cfg = Self::parse(&data).with_context(|| format!("load config from {:?}", abs_path))?;
        Ok(cfg)
    }

    /// Parses and validates a YAML document.
    pub fn parse(data: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(data).context("unmarshal yaml")?;
        cfg.cleanup.validate()?;
        Ok(cfg)
    }
}

// Test config is always available for integration tests
mod test_config;
pub use test_config::new_test_config;
