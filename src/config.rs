//! Configuration loading for RWS controller connections

use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use crate::{Result, RwsError};

pub const DEFAULT_TASK: &str = "T_ROB1";
pub const DEFAULT_NETWORK: &str = "Local";
pub const DEFAULT_UNIT: &str = "DRV_1";
pub const DEFAULT_MECHUNIT: &str = "ROB_1";
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RwsConfig {
    pub controller: ControllerConfig,
    pub defaults: Option<DefaultsConfig>,
    pub subscription: Option<SubscriptionConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Verify the controller's TLS certificate. On unless the file says
    /// otherwise; virtual controllers ship self-signed certificates and need
    /// an explicit `verify_tls: false`.
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DefaultsConfig {
    pub task: Option<String>,
    pub network: Option<String>,
    pub unit: Option<String>,
    pub mechunit: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SubscriptionConfig {
    pub channel_capacity: Option<usize>,
}

fn default_verify_tls() -> bool {
    true
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://127.0.0.1:80".to_string(),
            username: "Default User".to_string(),
            password: "robotics".to_string(),
            verify_tls: default_verify_tls(),
            timeout_secs: None,
        }
    }
}

impl Default for RwsConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            defaults: None,
            subscription: None,
        }
    }
}

impl RwsConfig {
    pub fn load_from_path(config_path: &str) -> Result<Self> {
        let contents = fs::read_to_string(config_path)
            .map_err(|e| RwsError::Config(format!("Failed to read {}: {}", config_path, e)))?;
        Self::load_from_str(&contents)
    }

    pub fn load_from_str(contents: &str) -> Result<Self> {
        let config: RwsConfig = serde_yaml::from_str(contents)?;
        if config.controller.base_url.trim().is_empty() {
            return Err(RwsError::Config("controller.base_url must not be empty".to_string()));
        }
        Ok(config)
    }

    /// Get default values with fallbacks applied
    pub fn defaults(&self) -> DefaultsConfig {
        self.defaults.clone().unwrap_or_default()
    }

    /// Get subscription channel capacity with default fallback
    pub fn channel_capacity(&self) -> usize {
        self.subscription
            .as_ref()
            .and_then(|s| s.channel_capacity)
            .filter(|c| *c > 0)
            .unwrap_or(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl ControllerConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl DefaultsConfig {
    pub fn task(&self) -> &str {
        self.task.as_deref().unwrap_or(DEFAULT_TASK)
    }

    pub fn network(&self) -> &str {
        self.network.as_deref().unwrap_or(DEFAULT_NETWORK)
    }

    pub fn unit(&self) -> &str {
        self.unit.as_deref().unwrap_or(DEFAULT_UNIT)
    }

    pub fn mechunit(&self) -> &str {
        self.mechunit.as_deref().unwrap_or(DEFAULT_MECHUNIT)
    }
}
