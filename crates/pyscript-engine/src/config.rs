//! Engine configuration
//!
//! Every field has a default, so an empty file (or no file at all) yields a working
//! configuration. See [`loader::load_config`] for the file and environment layering.

use pyscript_runtime::CapabilityPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config build error: {0}")]
    Build(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub worker_pool: WorkerPoolConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    /// Capability policy baked into every execution unit
    #[serde(default)]
    pub policy: CapabilityPolicy,
    #[serde(default)]
    pub warmup: WarmupConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.execution.timeout_ms == 0 {
            return invalid("execution.timeout_ms must be > 0");
        }
        if self.execution.unit_strategy == UnitStrategy::Pooled
            && self.execution.pooled_capacity == 0
        {
            return invalid("execution.pooled_capacity must be > 0 for the pooled strategy");
        }
        if self.worker_pool.size == 0 {
            return invalid("worker_pool.size must be > 0");
        }
        if self.worker_pool.name.trim().is_empty() {
            return invalid("worker_pool.name must not be empty");
        }
        if self.worker_pool.stack_size_kb < 256 {
            return invalid("worker_pool.stack_size_kb must be >= 256");
        }
        if self.analyzer.max_diagnostics == 0 {
            return invalid("analyzer.max_diagnostics must be > 0");
        }
        if self.policy.max_recursion_depth == 0 {
            return invalid("policy.max_recursion_depth must be > 0");
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        Ok(())
    }
}

/// How execution units are provided to invocations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitStrategy {
    /// A new session per invocation
    #[default]
    Fresh,
    /// Sessions are reset and reused
    Pooled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_teardown_grace_ms")]
    pub teardown_grace_ms: u64,
    #[serde(default)]
    pub unit_strategy: UnitStrategy,
    #[serde(default = "default_pooled_capacity")]
    pub pooled_capacity: usize,
}

fn default_timeout_ms() -> u64 {
    20_000
}
fn default_teardown_grace_ms() -> u64 {
    1_000
}
fn default_pooled_capacity() -> usize {
    8
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn teardown_grace(&self) -> Duration {
        Duration::from_millis(self.teardown_grace_ms)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            teardown_grace_ms: default_teardown_grace_ms(),
            unit_strategy: UnitStrategy::default(),
            pooled_capacity: default_pooled_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerPoolConfig {
    #[serde(default = "default_pool_name")]
    pub name: String,
    #[serde(default = "default_pool_size")]
    pub size: usize,
    /// Stack of each worker thread, in kilobytes
    #[serde(default = "default_stack_size_kb")]
    pub stack_size_kb: usize,
}

fn default_pool_name() -> String {
    "generic".to_string()
}
fn default_pool_size() -> usize {
    num_cpus::get().max(1)
}
fn default_stack_size_kb() -> usize {
    crate::pool::DEFAULT_STACK_SIZE / 1024
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            name: default_pool_name(),
            size: default_pool_size(),
            stack_size_kb: default_stack_size_kb(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyzerConfig {
    #[serde(default = "default_max_diagnostics")]
    pub max_diagnostics: usize,
}

fn default_max_diagnostics() -> usize {
    crate::analyzer::DEFAULT_MAX_DIAGNOSTICS
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_diagnostics: default_max_diagnostics(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WarmupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_warmup_delay_ms")]
    pub delay_ms: u64,
}

fn default_true() -> bool {
    true
}
fn default_warmup_delay_ms() -> u64 {
    5_000
}

impl WarmupConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_ms: default_warmup_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::{ConfigError, EngineConfig};
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    /// Default configuration file, looked up in the working directory
    pub const DEFAULT_CONFIG_FILE: &str = "pyscript.toml";

    /// Environment variable prefix, e.g. `PYSCRIPT__EXECUTION__TIMEOUT_MS=5000`
    pub const ENV_PREFIX: &str = "PYSCRIPT";

    pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
        let mut builder = Config::builder();
        let file = match path {
            Some(p) => p.to_path_buf(),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };
        if file.exists() {
            builder = builder.add_source(File::from(file));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("policy.modules"),
        );
        let merged: EngineConfig = builder.build()?.try_deserialize()?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.execution.timeout(), Duration::from_secs(20));
        assert_eq!(config.execution.unit_strategy, UnitStrategy::Fresh);
        assert_eq!(config.worker_pool.name, "generic");
        assert!(config.worker_pool.size >= 1);
        assert_eq!(config.analyzer.max_diagnostics, 16);
        assert_eq!(config.policy.max_recursion_depth, 100);
        assert_eq!(config.worker_pool.stack_size_kb, 64 * 1024);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.execution.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.execution.unit_strategy = UnitStrategy::Pooled;
        config.execution.pooled_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.logging.level = "loud".into();
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.worker_pool.stack_size_kb = 64;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_sections_deserialize() {
        let config: EngineConfig = serde_json::from_value(serde_json::json!({
            "execution": { "unit_strategy": "pooled" },
            "policy": { "allow_print": false }
        }))
        .unwrap();
        assert_eq!(config.execution.unit_strategy, UnitStrategy::Pooled);
        assert_eq!(config.execution.timeout_ms, 20_000);
        assert!(!config.policy.allow_print);
        assert_eq!(config.policy.modules, vec!["math", "json", "time"]);
    }
}
