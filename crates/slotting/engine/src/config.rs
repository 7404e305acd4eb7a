//! Configuration for the slotting engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use slotting_resilience::{CircuitBreakerConfig, RetryPolicy};

use crate::zone::ZoneTable;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Breaker, retry and timeout settings
    #[serde(default)]
    pub resilience: ResilienceSettings,

    /// Placement scoring
    #[serde(default)]
    pub slotting: SlottingConfig,

    /// Cargo and pallet code generation
    #[serde(default)]
    pub codes: CodeConfig,

    /// Zone table override; the built-in table is used when absent
    #[serde(default)]
    pub zones: Option<ZoneTable>,

    /// Actor recorded on movement log entries
    #[serde(default = "default_actor")]
    pub actor: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resilience: ResilienceSettings::default(),
            slotting: SlottingConfig::default(),
            codes: CodeConfig::default(),
            zones: None,
            actor: default_actor(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from defaults, an optional file and `SLOTTING__*` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&EngineConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("SLOTTING")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

/// Breaker, retry and timeout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceSettings {
    /// Consecutive failures that open the breaker
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Open-state cool-down in seconds
    #[serde(default = "default_reset_timeout")]
    pub reset_timeout_secs: u64,

    /// Attempts per store call, including the first
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay after the first failed attempt, doubled after each further failure
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// Optional bound on each store call, retries included
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay(),
            call_timeout_ms: None,
        }
    }
}

impl ResilienceSettings {
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold.max(1),
            reset_timeout: Duration::from_secs(self.reset_timeout_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}

/// Placement scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlottingConfig {
    /// Suggestions returned when the caller gives no limit
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Weight assumed for pallets without an estimate
    #[serde(default = "default_pallet_weight")]
    pub default_pallet_weight_kg: f64,

    #[serde(default)]
    pub weights: ScoreWeights,
}

impl Default for SlottingConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            default_pallet_weight_kg: default_pallet_weight(),
            weights: ScoreWeights::default(),
        }
    }
}

/// Points awarded per placement criterion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreWeights {
    /// Position lies in the destination's preferential zone
    pub preferential: u32,
    /// Level at or below `low_level_max` (high turnover)
    pub low_level: u32,
    /// Any higher level
    pub upper_level: u32,
    pub low_level_max: u8,
    /// Capacity covers the pallet's weight
    pub capacity: u32,
    /// Position is available
    pub available: u32,
    /// Bonus for a contiguous multi-slot window
    pub contiguity: u32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            preferential: 50,
            low_level: 25,
            upper_level: 10,
            low_level_max: 2,
            capacity: 15,
            available: 10,
            contiguity: 30,
        }
    }
}

/// Code generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeConfig {
    pub cargo_prefix: String,
    pub pallet_prefix: String,
    /// Zero-padded digit count
    pub width: usize,
    /// Existing codes scanned by the fallback path
    pub fallback_scan: usize,
    /// Remote sequence functions
    pub cargo_sequence: String,
    pub pallet_sequence: String,
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            cargo_prefix: "CG".to_string(),
            pallet_prefix: "PLT".to_string(),
            width: 6,
            fallback_scan: 50,
            cargo_sequence: "next_cargo_code".to_string(),
            pallet_sequence: "next_pallet_code".to_string(),
        }
    }
}

// Default value helpers
fn default_actor() -> String {
    "system".to_string()
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_reset_timeout() -> u64 {
    300
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    1000
}

fn default_limit() -> usize {
    10
}

fn default_pallet_weight() -> f64 {
    800.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.actor, "system");
        assert!(config.zones.is_none());
        assert_eq!(config.slotting.default_limit, 10);
        assert_eq!(config.slotting.weights.contiguity, 30);
    }

    #[test]
    fn test_resilience_defaults() {
        let settings = ResilienceSettings::default();
        let breaker = settings.breaker_config();
        assert_eq!(breaker.failure_threshold, 3);
        assert_eq!(breaker.reset_timeout, Duration::from_secs(300));

        let retry = settings.retry_policy();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.base_delay, Duration::from_secs(1));
        assert!(settings.call_timeout().is_none());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = EngineConfig::load(None).unwrap();
        assert_eq!(config.codes.cargo_prefix, "CG");
        assert_eq!(config.resilience.failure_threshold, 3);
    }
}
