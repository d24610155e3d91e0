//! Service configuration.
//!
//! Values are read in layers: built-in defaults, then an optional TOML file,
//! then `DOCFLOW__*` environment variables (double underscore separates
//! nesting, e.g. `DOCFLOW__AI_SERVICE__MAX_RETRIES=5`).

use crate::errors::ConfigError;
use crate::resilience::{CircuitBreakerConfig, JitterStrategy, RetryConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment prefix used by [`IngestConfig::load`].
pub const ENV_PREFIX: &str = "DOCFLOW";

/// Resilience settings for one external dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Per-attempt deadline in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// Total invocations allowed, including the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Growth factor between retry delays.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// First retry delay in seconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay: f64,
    /// Upper bound for a retry delay in seconds.
    #[serde(default = "default_max_delay")]
    pub max_delay: f64,
    /// Consecutive failures that open the breaker.
    #[serde(default = "default_failure_threshold")]
    pub circuit_failure_threshold: u32,
    /// Seconds the breaker stays open before a trial call.
    #[serde(default = "default_recovery_timeout")]
    pub circuit_recovery_timeout: f64,
    /// Jitter applied to retry delays.
    #[serde(default)]
    pub jitter: JitterStrategy,
}

fn default_timeout() -> f64 {
    30.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_initial_delay() -> f64 {
    1.0
}

fn default_max_delay() -> f64 {
    30.0
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout() -> f64 {
    60.0
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            max_retries: default_max_retries(),
            backoff_multiplier: default_backoff_multiplier(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            circuit_failure_threshold: default_failure_threshold(),
            circuit_recovery_timeout: default_recovery_timeout(),
            jitter: JitterStrategy::default(),
        }
    }
}

impl ResilienceConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-attempt deadline.
    #[must_use]
    pub fn with_timeout_seconds(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets the total number of invocations.
    #[must_use]
    pub fn with_max_retries(mut self, attempts: u32) -> Self {
        self.max_retries = attempts;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Sets the first retry delay.
    #[must_use]
    pub fn with_initial_delay(mut self, seconds: f64) -> Self {
        self.initial_delay = seconds;
        self
    }

    /// Sets the retry delay cap.
    #[must_use]
    pub fn with_max_delay(mut self, seconds: f64) -> Self {
        self.max_delay = seconds;
        self
    }

    /// Sets the breaker threshold.
    #[must_use]
    pub fn with_circuit_failure_threshold(mut self, failures: u32) -> Self {
        self.circuit_failure_threshold = failures;
        self
    }

    /// Sets the breaker recovery timeout.
    #[must_use]
    pub fn with_circuit_recovery_timeout(mut self, seconds: f64) -> Self {
        self.circuit_recovery_timeout = seconds;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Gets the per-attempt deadline as a `Duration`.
    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        let timeout = seconds("timeout_seconds", self.timeout_seconds)?;
        if timeout.is_zero() {
            return Err(ConfigError::invalid("timeout_seconds", "must be > 0"));
        }
        Ok(timeout)
    }

    /// Builds the retry configuration.
    pub fn retry_config(&self) -> Result<RetryConfig, ConfigError> {
        let config = RetryConfig::new()
            .with_max_attempts(self.max_retries)
            .with_backoff_multiplier(self.backoff_multiplier)
            .with_initial_delay(seconds("initial_delay", self.initial_delay)?)
            .with_max_delay(seconds("max_delay", self.max_delay)?)
            .with_jitter(self.jitter);
        config.validate().map_err(|e| match e {
            ConfigError::Invalid { field, reason } if field == "max_attempts" => {
                ConfigError::invalid("max_retries", reason)
            }
            other => other,
        })?;
        Ok(config)
    }

    /// Builds the circuit breaker configuration.
    pub fn breaker_config(&self) -> Result<CircuitBreakerConfig, ConfigError> {
        let config = CircuitBreakerConfig::new(
            self.circuit_failure_threshold,
            seconds("circuit_recovery_timeout", self.circuit_recovery_timeout)?,
        );
        config.validate()?;
        Ok(config)
    }

    /// Validates every value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timeout()?;
        self.retry_config()?;
        self.breaker_config()?;
        Ok(())
    }
}

fn seconds(field: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| ConfigError::invalid(field, format!("{value} is not a valid number of seconds")))
}

/// Logging output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Top-level configuration for the ingestion service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Guards for the AI parsing service.
    #[serde(default)]
    pub ai_service: ResilienceConfig,
    /// Guards for the storage backend.
    #[serde(default)]
    pub storage: ResilienceConfig,
    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl IngestConfig {
    /// Loads configuration from an optional file and `DOCFLOW__*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Loads configuration, reading environment overrides under `prefix`.
    pub fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: Self = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Sets the AI service guards.
    #[must_use]
    pub fn with_ai_service(mut self, config: ResilienceConfig) -> Self {
        self.ai_service = config;
        self
    }

    /// Sets the storage guards.
    #[must_use]
    pub fn with_storage(mut self, config: ResilienceConfig) -> Self {
        self.storage = config;
        self
    }

    /// Validates both dependency sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ai_service
            .validate()
            .map_err(|e| scoped("ai_service", e))?;
        self.storage.validate().map_err(|e| scoped("storage", e))?;
        Ok(())
    }
}

fn scoped(section: &str, error: ConfigError) -> ConfigError {
    match error {
        ConfigError::Invalid { field, reason } => ConfigError::Invalid {
            field: format!("{section}.{field}"),
            reason,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ResilienceConfig::default();
        assert_eq!(config.timeout().unwrap(), Duration::from_secs(30));

        let retry = config.retry_config().unwrap();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_delay, Duration::from_secs(1));
        assert_eq!(retry.max_delay, Duration::from_secs(30));

        let breaker = config.breaker_config().unwrap();
        assert_eq!(breaker.failure_threshold, 5);
        assert_eq!(breaker.recovery_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_validation_names_section() {
        let config = IngestConfig::default()
            .with_storage(ResilienceConfig::new().with_max_retries(0));
        match config.validate().unwrap_err() {
            ConfigError::Invalid { field, .. } => assert_eq!(field, "storage.max_retries"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rejects_bad_durations() {
        assert!(ResilienceConfig::new().with_timeout_seconds(0.0).validate().is_err());
        assert!(ResilienceConfig::new().with_initial_delay(-1.0).validate().is_err());
        assert!(ResilienceConfig::new()
            .with_circuit_recovery_timeout(f64::NAN)
            .validate()
            .is_err());
        assert!(ResilienceConfig::new()
            .with_initial_delay(60.0)
            .with_max_delay(1.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[ai_service]
timeout_seconds = 5.0
max_retries = 4
jitter = "full"

[storage]
circuit_failure_threshold = 3

[logging]
json = true
"#
        )
        .unwrap();

        let config =
            IngestConfig::load_with_prefix(Some(file.path()), "DOCFLOW_TEST_FILE").unwrap();
        assert_eq!(config.ai_service.timeout_seconds, 5.0);
        assert_eq!(config.ai_service.max_retries, 4);
        assert_eq!(config.ai_service.jitter, JitterStrategy::Full);
        assert_eq!(config.ai_service.backoff_multiplier, 2.0);
        assert_eq!(config.storage.circuit_failure_threshold, 3);
        assert_eq!(config.storage.max_retries, 3);
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[storage]\nmax_retries = 2").unwrap();

        std::env::set_var("DOCFLOW_TEST_ENV__STORAGE__MAX_RETRIES", "6");
        let config = IngestConfig::load_with_prefix(Some(file.path()), "DOCFLOW_TEST_ENV");
        std::env::remove_var("DOCFLOW_TEST_ENV__STORAGE__MAX_RETRIES");

        assert_eq!(config.unwrap().storage.max_retries, 6);
    }

    #[test]
    fn test_invalid_file_values_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[ai_service]\nbackoff_multiplier = 0.5").unwrap();

        let err = IngestConfig::load_with_prefix(Some(file.path()), "DOCFLOW_TEST_BAD").unwrap_err();
        assert!(err.to_string().contains("ai_service.backoff_multiplier"));
    }
}
