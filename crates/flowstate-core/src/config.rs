//! Engine configuration
//!
//! Defaults can be overridden from the environment or read from YAML.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{info, warn};

use crate::CoreError;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds a flow state may stay untouched before a sweep drops it
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Sweep the active-flow registry whenever a flow is started
    #[serde(default)]
    pub sweep_on_start: bool,

    /// Prefix of generated message keys
    #[serde(default = "default_message_prefix")]
    pub message_prefix: String,

    /// Ignore outer values that do not deserialize into the property type
    #[serde(default = "default_verify_initial_values")]
    pub verify_initial_values: bool,
}

fn default_idle_timeout_secs() -> u64 {
    1800 // 30 minutes
}

fn default_message_prefix() -> String {
    "message:".to_string()
}

fn default_verify_initial_values() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_on_start: false,
            message_prefix: default_message_prefix(),
            verify_initial_values: default_verify_initial_values(),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

impl EngineConfig {
    /// Defaults overridden from `FLOWSTATE_*` environment variables
    pub fn load() -> Self {
        let config = Self::default().with_overrides(|name| env::var(name).ok());
        info!(
            idle_timeout_secs = config.idle_timeout_secs,
            sweep_on_start = config.sweep_on_start,
            "Loaded engine configuration"
        );
        config
    }

    /// Parse a YAML document; missing fields take their defaults
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CoreError> {
        serde_yaml::from_str(yaml).map_err(|e| CoreError::ConfigurationError(e.to_string()))
    }

    /// Apply overrides from `lookup`; invalid values are logged and skipped
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(timeout) = lookup("FLOWSTATE_IDLE_TIMEOUT_SECS") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                self.idle_timeout_secs = timeout;
            } else {
                warn!("Invalid FLOWSTATE_IDLE_TIMEOUT_SECS value: {}", timeout);
            }
        }

        if let Some(sweep) = lookup("FLOWSTATE_SWEEP_ON_START") {
            match parse_flag(&sweep) {
                Some(sweep) => self.sweep_on_start = sweep,
                None => warn!("Invalid FLOWSTATE_SWEEP_ON_START value: {}", sweep),
            }
        }

        if let Some(prefix) = lookup("FLOWSTATE_MESSAGE_PREFIX") {
            self.message_prefix = prefix;
        }

        if let Some(verify) = lookup("FLOWSTATE_VERIFY_INITIAL_VALUES") {
            match parse_flag(&verify) {
                Some(verify) => self.verify_initial_values = verify,
                None => warn!("Invalid FLOWSTATE_VERIFY_INITIAL_VALUES value: {}", verify),
            }
        }

        self
    }

    /// Idle timeout as a duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}
