use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::ConfigError;

/// A simulated client that shares the simulated control server with us
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub user_id: String,
    pub hostname: String,
    pub authorisation_level: i32,
}

/// Settings of the in-process control server used when no real one is available
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub peers: Vec<PeerConfig>,
    /// Interval between lease renewal pushes; None disables them
    pub lease_renew_seconds: Option<u64>,
    /// Status polls a scan or script keeps reporting busy after an abort
    pub abort_delay_polls: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            peers: vec![
                PeerConfig {
                    user_id: String::from("operator"),
                    hostname: String::from("control-room"),
                    authorisation_level: 1,
                },
                PeerConfig {
                    user_id: String::from("beamline-staff"),
                    hostname: String::from("cabin-ws"),
                    authorisation_level: 3,
                },
            ],
            lease_renew_seconds: Some(30),
            abort_delay_polls: 10,
        }
    }
}

/// Structure representing the console configuration.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub user_id: String,
    pub hostname: String,
    pub visit_id: String,
    pub authorisation_level: i32,
    pub request_popup_enabled: bool,
    pub request_timeout_seconds: u64,
    pub accept_request_on_timeout: bool,
    pub watchdog_enabled: bool,
    pub watchdog_timeout_minutes: f64,
    pub watchdog_prompt_minutes: f64,
    pub watchdog_tick_millis: u64,
    pub shutdown_poll_millis: u64,
    pub shutdown_max_wait_seconds: Option<u64>,
    pub message_log_path: Option<PathBuf>,
    pub simulation: SimulationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_id: String::from("user"),
            hostname: String::from("localhost"),
            visit_id: String::from("cm0000-1"),
            authorisation_level: 1,
            request_popup_enabled: true,
            request_timeout_seconds: 120,
            accept_request_on_timeout: true,
            watchdog_enabled: false,
            watchdog_timeout_minutes: 5.0,
            watchdog_prompt_minutes: 1.0,
            watchdog_tick_millis: 1000,
            shutdown_poll_millis: 100,
            shutdown_max_wait_seconds: None,
            message_log_path: None,
            simulation: SimulationConfig::default(),
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration to a YAML file, replacing any existing one
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    /// Check the values a console cannot start without
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_id.trim().is_empty() {
            return Err(invalid("user_id", "must not be empty"));
        }
        if self.visit_id.trim().is_empty() {
            return Err(invalid("visit_id", "no valid visit given"));
        }
        if self.request_timeout_seconds == 0 {
            return Err(invalid("request_timeout_seconds", "must be at least 1"));
        }
        if self.watchdog_enabled {
            if !is_positive(self.watchdog_timeout_minutes) {
                return Err(invalid("watchdog_timeout_minutes", "must be positive"));
            }
            if !is_positive(self.watchdog_prompt_minutes) {
                return Err(invalid("watchdog_prompt_minutes", "must be positive"));
            }
            if self.watchdog_tick_millis == 0 {
                return Err(invalid("watchdog_tick_millis", "must be at least 1"));
            }
        }
        if self.shutdown_poll_millis == 0 {
            return Err(invalid("shutdown_poll_millis", "must be at least 1"));
        }
        Ok(())
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
