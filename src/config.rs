//! Engine configuration.
//!
//! Execution limits, completion policy, and spiral-loop bounds for the
//! orchestrator, with defaults that match classroom-scale workloads.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// How a job's terminal status is derived from per-mode outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPolicy {
    /// Any failed mode fails the job.
    Strict,
    /// The job completes if at least one mode produced an artifact.
    BestEffort,
}

impl std::str::FromStr for CompletionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(CompletionPolicy::Strict),
            "best_effort" | "best-effort" => Ok(CompletionPolicy::BestEffort),
            other => Err(format!("unknown completion policy '{}'", other)),
        }
    }
}

/// Configuration for the orchestration engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    // Execution settings
    /// Maximum number of producer invocations in flight at once.
    pub max_in_flight: usize,
    /// How partial failures map to the job's terminal status.
    pub completion_policy: CompletionPolicy,

    // Spiral settings
    /// Maximum remediation loops per gap before giving up.
    pub max_loops: u32,
    /// Mastery score at or above which a gap is considered resolved.
    pub pass_threshold: f64,

    // Polling settings
    /// Interval between job status polls when awaiting a child job.
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            completion_policy: CompletionPolicy::Strict,
            max_loops: 3,
            pass_threshold: 0.8,
            poll_interval: Duration::from_millis(25),
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `EDUFORGE_MAX_IN_FLIGHT`: Concurrent producer limit (default: 4)
    /// - `EDUFORGE_COMPLETION_POLICY`: `strict` or `best_effort` (default: strict)
    /// - `EDUFORGE_MAX_LOOPS`: Spiral loops per gap (default: 3)
    /// - `EDUFORGE_PASS_THRESHOLD`: Mastery threshold (default: 0.8)
    /// - `EDUFORGE_POLL_INTERVAL_MS`: Child-job poll interval (default: 25)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("EDUFORGE_MAX_IN_FLIGHT") {
            config.max_in_flight = parse_env_value(&val, "EDUFORGE_MAX_IN_FLIGHT")?;
        }

        if let Ok(val) = std::env::var("EDUFORGE_COMPLETION_POLICY") {
            config.completion_policy =
                val.parse()
                    .map_err(|message| ConfigError::InvalidValue {
                        key: "EDUFORGE_COMPLETION_POLICY".to_string(),
                        message,
                    })?;
        }

        if let Ok(val) = std::env::var("EDUFORGE_MAX_LOOPS") {
            config.max_loops = parse_env_value(&val, "EDUFORGE_MAX_LOOPS")?;
        }

        if let Ok(val) = std::env::var("EDUFORGE_PASS_THRESHOLD") {
            config.pass_threshold = parse_env_value(&val, "EDUFORGE_PASS_THRESHOLD")?;
        }

        if let Ok(val) = std::env::var("EDUFORGE_POLL_INTERVAL_MS") {
            let ms: u64 = parse_env_value(&val, "EDUFORGE_POLL_INTERVAL_MS")?;
            config.poll_interval = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_in_flight == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_in_flight must be greater than 0".to_string(),
            ));
        }

        if self.max_loops == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_loops must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.pass_threshold) {
            return Err(ConfigError::ValidationFailed(
                "pass_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.poll_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "poll_interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the concurrent producer limit.
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max;
        self
    }

    /// Builder method to set the completion policy.
    pub fn with_completion_policy(mut self, policy: CompletionPolicy) -> Self {
        self.completion_policy = policy;
        self
    }

    /// Builder method to set the spiral loop bound.
    pub fn with_max_loops(mut self, loops: u32) -> Self {
        self.max_loops = loops;
        self
    }

    /// Builder method to set the mastery threshold.
    pub fn with_pass_threshold(mut self, threshold: f64) -> Self {
        self.pass_threshold = threshold;
        self
    }

    /// Builder method to set the child-job poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_in_flight, 4);
        assert_eq!(config.completion_policy, CompletionPolicy::Strict);
        assert_eq!(config.max_loops, 3);
        assert!((config.pass_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.poll_interval, Duration::from_millis(25));
    }

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::new()
            .with_max_in_flight(8)
            .with_completion_policy(CompletionPolicy::BestEffort)
            .with_max_loops(5)
            .with_pass_threshold(0.9)
            .with_poll_interval(Duration::from_millis(100));

        assert_eq!(config.max_in_flight, 8);
        assert_eq!(config.completion_policy, CompletionPolicy::BestEffort);
        assert_eq!(config.max_loops, 5);
        assert!((config.pass_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_zero_in_flight() {
        let result = EngineConfig::default().with_max_in_flight(0).validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("max_in_flight"));
    }

    #[test]
    fn test_validation_zero_loops() {
        let result = EngineConfig::default().with_max_loops(0).validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("max_loops"));
    }

    #[test]
    fn test_validation_threshold_out_of_range() {
        let result = EngineConfig::default().with_pass_threshold(1.5).validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("pass_threshold"));
    }

    #[test]
    fn test_completion_policy_parsing() {
        assert_eq!(
            "strict".parse::<CompletionPolicy>().unwrap(),
            CompletionPolicy::Strict
        );
        assert_eq!(
            "best_effort".parse::<CompletionPolicy>().unwrap(),
            CompletionPolicy::BestEffort
        );
        assert_eq!(
            "BEST-EFFORT".parse::<CompletionPolicy>().unwrap(),
            CompletionPolicy::BestEffort
        );
        assert!("eventually".parse::<CompletionPolicy>().is_err());
    }
}
