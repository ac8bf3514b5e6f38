use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{AegisError, AegisResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AegisConfig {
    pub database: DatabaseSettings,
    pub logging: LoggingConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_url")]
    pub url: String,

    #[serde(default = "default_pool_min")]
    pub pool_min_connections: u32,

    #[serde(default = "default_pool_max")]
    pub pool_max_connections: u32,

    #[serde(default = "default_acquire_timeout")]
    pub pool_acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json_format: bool,
}

/// Execution engine knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base delay for step retry backoff; doubled per attempt.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Cap on a single backoff delay.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Timeout applied to steps that do not configure their own.
    #[serde(default = "default_step_timeout")]
    pub default_step_timeout_secs: u64,

    /// How many optimistic-write conflicts the escalation coordinator
    /// absorbs before surfacing Conflict to the caller.
    #[serde(default = "default_cas_retries")]
    pub escalation_cas_retries: u32,

    /// Script names the run-script action may dispatch.
    #[serde(default = "default_script_allow_list")]
    pub script_allow_list: Vec<String>,
}

impl EngineConfig {
    /// Exponential backoff delay for a zero-based attempt number.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.min(16);
        let delay_ms = self
            .backoff_base_ms
            .saturating_mul(1u64 << exp)
            .min(self.backoff_max_ms);
        Duration::from_millis(delay_ms)
    }

    pub fn step_timeout(&self, configured_secs: Option<u64>) -> Duration {
        Duration::from_secs(configured_secs.unwrap_or(self.default_step_timeout_secs))
    }
}

impl AegisConfig {
    /// Load configuration, layering an optional file under `AEGIS_*`
    /// environment overrides.
    pub fn load(path: Option<&str>) -> AegisResult<Self> {
        let mut builder = ConfigBuilder::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        let settings = builder
            .add_source(Environment::with_prefix("AEGIS").separator("__"))
            .build()?;

        let config: AegisConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AegisResult<()> {
        if self.engine.backoff_base_ms == 0 {
            return Err(AegisError::InvalidConfigValue {
                key: "engine.backoff_base_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.engine.backoff_max_ms < self.engine.backoff_base_ms {
            return Err(AegisError::InvalidConfigValue {
                key: "engine.backoff_max_ms".to_string(),
                message: "must be at least backoff_base_ms".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            pool_min_connections: default_pool_min(),
            pool_max_connections: default_pool_max(),
            pool_acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            default_step_timeout_secs: default_step_timeout(),
            escalation_cas_retries: default_cas_retries(),
            script_allow_list: default_script_allow_list(),
        }
    }
}

fn default_database_url() -> String {
    String::new()
}

fn default_pool_min() -> u32 {
    1
}

fn default_pool_max() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_backoff_base_ms() -> u64 {
    100
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_step_timeout() -> u64 {
    30
}

fn default_cas_retries() -> u32 {
    3
}

fn default_script_allow_list() -> Vec<String> {
    vec![
        "collect-triage".to_string(),
        "snapshot-memory".to_string(),
        "rotate-credentials".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = EngineConfig {
            backoff_base_ms: 100,
            backoff_max_ms: 500,
            ..Default::default()
        };
        assert_eq!(config.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(config.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(config.backoff_delay(2), Duration::from_millis(400));
        assert_eq!(config.backoff_delay(3), Duration::from_millis(500));
        assert_eq!(config.backoff_delay(30), Duration::from_millis(500));
    }

    #[test]
    fn test_step_timeout_default_and_override() {
        let config = EngineConfig::default();
        assert_eq!(config.step_timeout(None), Duration::from_secs(30));
        assert_eq!(config.step_timeout(Some(5)), Duration::from_secs(5));
    }

    #[test]
    fn test_config_validation() {
        let mut config = AegisConfig::default();
        config.engine.backoff_base_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AegisConfig::default();
        config.engine.backoff_max_ms = 1;
        assert!(config.validate().is_err());

        assert!(AegisConfig::default().validate().is_ok());
    }
}
