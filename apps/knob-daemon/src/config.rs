//! Daemon configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use knob_core::EngineConfig;
use serde::Deserialize;

/// Default location of the persisted bridge configuration.
pub const DEFAULT_STATE_FILE: &str = "knob-state.json";

/// Daemon configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Bridge base URL. Leave unset to discover the bridge.
    /// Override: `KNOB_BRIDGE`
    pub bridge: Option<String>,

    /// Zone to control. Leave unset to use the stored or first zone.
    /// Override: `KNOB_ZONE`
    pub zone: Option<String>,

    /// Where the bridge configuration is persisted.
    /// Override: `KNOB_STATE_FILE`
    pub state_file: PathBuf,

    /// Identifier sent to the bridge with zone listings.
    /// Override: `KNOB_ID`
    pub knob_id: Option<String>,

    /// Try the UDP fast path before HTTP.
    /// Override: `KNOB_FAST_PATH`
    pub fast_path: bool,

    /// Enable UDP broadcast discovery.
    pub discovery_broadcast: bool,

    /// Enable mDNS discovery.
    pub discovery_mdns: bool,

    /// Address tried when discovery finds nothing. Empty disables it.
    /// Override: `KNOB_FALLBACK_BRIDGE`
    pub fallback_bridge: Option<String>,

    /// Report the device as running on battery (slower polling).
    pub on_battery: bool,

    /// Remaining engine tunables, in the engine's camelCase keys.
    pub engine: EngineConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            bridge: None,
            zone: None,
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            knob_id: None,
            fast_path: engine.fast_path,
            discovery_broadcast: engine.broadcast_discovery,
            discovery_mdns: engine.mdns_discovery,
            fallback_bridge: engine.fallback_bridge_base.clone(),
            on_battery: false,
            engine,
        }
    }
}

impl DaemonConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_yaml(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("KNOB_ID") {
            self.knob_id = Some(val);
        }

        if let Ok(val) = std::env::var("KNOB_FAST_PATH") {
            if let Ok(enabled) = val.parse() {
                self.fast_path = enabled;
            }
        }

        if let Ok(val) = std::env::var("KNOB_FALLBACK_BRIDGE") {
            self.fallback_bridge = Some(val);
        }

        // Note: KNOB_BRIDGE, KNOB_ZONE and KNOB_STATE_FILE are handled by clap
        // via #[arg(env = ...)] in main.rs
    }

    /// Converts to knob-core's engine config.
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            knob_id: self.knob_id.clone().or_else(|| self.engine.knob_id.clone()),
            fast_path: self.fast_path,
            broadcast_discovery: self.discovery_broadcast,
            mdns_discovery: self.discovery_mdns,
            fallback_bridge_base: self
                .fallback_bridge
                .clone()
                .filter(|base| !base.trim().is_empty()),
            ..self.engine.clone()
        }
    }
}
