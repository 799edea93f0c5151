use std::collections::HashMap;
use std::path::Path;
use serde::Deserialize;
use anyhow::{Context, Result};
use shared::protocol::{DEFAULT_BROWSE_DOMAIN, SERVICES_TYPE};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub api: ApiConfig,
    /// Human-readable names keyed by row label, e.g. "_http._tcp." = "Web Site"
    #[serde(default)]
    pub descriptions: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Restrict mDNS to one interface; all interfaces when unset
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default = "default_services_type")]
    pub services_type: String,
    #[serde(default = "default_browse_domain")]
    pub browse_domain: String,
    /// Keep instance counts from going below zero on out-of-order losses
    #[serde(default = "default_true")]
    pub clamp_counts: bool,
    #[serde(default = "default_true")]
    pub autostart: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_services_type() -> String {
    SERVICES_TYPE.to_string()
}

fn default_browse_domain() -> String {
    DEFAULT_BROWSE_DOMAIN.to_string()
}

fn default_true() -> bool {
    true
}

fn default_listen() -> String {
    "[::]:8054".to_string()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            interface: None,
            services_type: default_services_type(),
            browse_domain: default_browse_domain(),
            clamp_counts: default_true(),
            autostart: default_true(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }
}
