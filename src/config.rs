//! # Gateway Configuration
//!
//! Structured configuration consumed by the [`Orchestrator`](crate::Orchestrator).
//! The engine only sees [`GatewayConfig`] values; [`GatewayConfig::load`] is a
//! convenience for binaries that keep their configuration in a TOML file.
//!
//! ```toml
//! plugin_dir = "/usr/lib/southbound/plugins"
//! log_level = 1
//!
//! [[devices]]
//! name = "pump1"
//! adapter_type = "modbus_adapter"
//! tags = [
//!     "register_address:100,function_code:3,data_type:uint16",
//!     { register_address = "102", data_type = "float32", register_count = "2" },
//! ]
//!
//! [devices.config]
//! connection_type = "tcp"
//! ip_address = "192.168.1.10"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;
use crate::tag::DeviceTag;

/// Adapter-private configuration bag.
pub type AdapterConfig = BTreeMap<String, String>;

pub const DEFAULT_PLUGIN_DIR: &str = "/usr/lib/southbound/plugins";
pub const DEFAULT_LOG_LEVEL: u8 = 1;
pub const DEFAULT_HEALTH_CHECK_INTERVAL_MS: u64 = 1000;

/// Top-level gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub plugin_dir: PathBuf,
    /// 0 = error, 1 = info, 2 = debug, 3+ = trace
    pub log_level: u8,
    pub daemon_mode: bool,
    pub health_check_interval_ms: u64,
    pub devices: Vec<DeviceDescriptor>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            plugin_dir: PathBuf::from(DEFAULT_PLUGIN_DIR),
            log_level: DEFAULT_LOG_LEVEL,
            daemon_mode: false,
            health_check_interval_ms: DEFAULT_HEALTH_CHECK_INTERVAL_MS,
            devices: Vec::new(),
        }
    }
}

impl GatewayConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: GatewayConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Structural checks: plugin directory set, device names non-empty and
    /// unique, adapter type present on every device.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.plugin_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPluginDir);
        }

        let mut seen = HashSet::with_capacity(self.devices.len());
        for (index, device) in self.devices.iter().enumerate() {
            if device.name.is_empty() {
                return Err(ConfigError::EmptyDeviceName { index });
            }
            if !seen.insert(device.name.as_str()) {
                return Err(ConfigError::DuplicateDevice(device.name.clone()));
            }
            if device.adapter_type.is_empty() {
                return Err(ConfigError::MissingAdapterType(device.name.clone()));
            }
        }
        Ok(())
    }

    pub fn device(&self, name: &str) -> Option<&DeviceDescriptor> {
        self.devices.iter().find(|d| d.name == name)
    }
}

/// One configured device and the adapter that serves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceDescriptor {
    pub name: String,
    pub adapter_type: String,
    #[serde(default)]
    pub config: AdapterConfig,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Vec<DeviceTag>,
}

impl DeviceDescriptor {
    pub fn new(name: impl Into<String>, adapter_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            adapter_type: adapter_type.into(),
            config: AdapterConfig::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_tag(mut self, tag: DeviceTag) -> Self {
        self.tags.push(tag);
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TagSpec {
    Compact(String),
    Table(DeviceTag),
}

/// Tags may be written as `"k:v,k:v"` strings or as inline tables.
fn deserialize_tags<'de, D>(deserializer: D) -> Result<Vec<DeviceTag>, D::Error>
where
    D: Deserializer<'de>,
{
    let specs = Vec::<TagSpec>::deserialize(deserializer)?;
    specs
        .into_iter()
        .map(|spec| match spec {
            TagSpec::Table(tag) => Ok(tag),
            TagSpec::Compact(text) => DeviceTag::parse(&text).ok_or_else(|| {
                serde::de::Error::custom(format!("malformed tag `{}`", text))
            }),
        })
        .collect()
}
