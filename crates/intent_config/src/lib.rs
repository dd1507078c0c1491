use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// File name looked up by [`Config::load_from_dir`]
pub const CONFIG_FILE_NAME: &str = "input.yml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Complete controller configuration as read from `input.yml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub device: DeviceConfig,
    pub intent: IntentConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Identification of the managed device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Hostname or identifier of the device
    pub hostname: String,
    /// Platform type (e.g. ios-xr, junos)
    pub platform: String,
}

/// Desired service configuration of the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentConfig {
    /// Service name (e.g. grpc, gnmi)
    pub service: String,
    /// Service port, 1..=65535
    pub port: u32,
    /// TLS enabled flag
    pub tls: bool,
}

/// Timing of the enforcement loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Seconds between two compliance checks
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Upper bound for a single configuration push
    #[serde(default = "default_apply_timeout_secs")]
    pub apply_timeout_secs: u64,
    /// Backoff after consecutive failed pushes
    #[serde(default)]
    pub backoff: BackoffConfig,
}

fn default_interval_secs() -> u64 {
    5
}

fn default_apply_timeout_secs() -> u64 {
    10
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            apply_timeout_secs: default_apply_timeout_secs(),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Exponential backoff for a device that keeps rejecting pushes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_enabled")]
    pub enabled: bool,
    /// Longest wait between two checks while pushes keep failing
    #[serde(default = "default_backoff_max_secs")]
    pub max_secs: u64,
}

fn default_backoff_enabled() -> bool {
    true
}

fn default_backoff_max_secs() -> u64 {
    60
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            enabled: default_backoff_enabled(),
            max_secs: default_backoff_max_secs(),
        }
    }
}

/// Settings for the in-memory device used instead of a real collector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// State the simulated device boots with
    #[serde(default = "default_initial_state")]
    pub initial_state: IntentConfig,
    /// Number of pushes the simulated device rejects before accepting one
    #[serde(default)]
    pub reject_first_applies: u32,
}

fn default_initial_state() -> IntentConfig {
    IntentConfig {
        service: "grpc".to_string(),
        port: 57777,
        tls: false,
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_state: default_initial_state(),
            reject_first_applies: 0,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn load_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        Self::load(&dir.join(CONFIG_FILE_NAME))
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the enforcement loop must never run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.hostname.trim().is_empty() {
            return Err(ConfigError::Invalid("device.hostname must not be empty".to_string()));
        }

        validate_service("intent", &self.intent)?;
        validate_service("simulation.initial_state", &self.simulation.initial_state)?;

        let controller = &self.controller;
        if controller.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "controller.interval_secs must be greater than 0".to_string(),
            ));
        }
        if controller.apply_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "controller.apply_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if controller.backoff.enabled && controller.backoff.max_secs < controller.interval_secs {
            return Err(ConfigError::Invalid(format!(
                "controller.backoff.max_secs ({}) must not be below controller.interval_secs ({})",
                controller.backoff.max_secs, controller.interval_secs
            )));
        }

        Ok(())
    }
}

fn validate_service(section: &str, service: &IntentConfig) -> Result<(), ConfigError> {
    if service.service.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{}.service must not be empty", section)));
    }
    if !(1..=u32::from(u16::MAX)).contains(&service.port) {
        return Err(ConfigError::Invalid(format!(
            "{}.port must be between 1 and 65535, got {}",
            section, service.port
        )));
    }
    Ok(())
}
