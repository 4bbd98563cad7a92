//! Service configuration
//!
//! Loaded with figment from a YAML, TOML or JSON file (chosen by extension),
//! then overlaid with `PLCSRV_`-prefixed environment variables where `__`
//! separates nesting levels, e.g. `PLCSRV_DEVICE__HOST=10.0.0.5`.
//!
//! ```yaml
//! device:
//!   host: 192.168.1.10
//!   port: 502
//!   unit_id: 1
//! tags:
//!   output_coils:
//!     base_offset: 114
//!     points:
//!       Y6_VentiladorBajo: 6
//!   holding_registers:
//!     points:
//!       Temp_producto: { address: 8222, encoding: int16, scale: 10 }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Json, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::{AddressSpace, DiscoveryConfig, Encoding, TagDefinition, TagRegistry};
use crate::csv_loader::load_tag_table;
use crate::error::{PlcSrvError, Result};
use crate::transport::constants::{
    DEFAULT_MODBUS_PORT, DEFAULT_TIMEOUT_MS, DEFAULT_UNIT_ID, MODBUS_MAX_READ_COILS,
    MODBUS_MAX_READ_REGISTERS,
};
use crate::transport::{BitTable, TcpConfig};

pub const ENV_PREFIX: &str = "PLCSRV_";

/// PLC connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
    /// Connect and per-transaction timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Reuse the connection between read cycles
    #[serde(default = "default_true")]
    pub keep_alive: bool,
    #[serde(default = "default_max_read_registers")]
    pub max_read_registers: u16,
    #[serde(default = "default_max_read_coils")]
    pub max_read_coils: u16,
}

fn default_host() -> String {
    "192.168.1.10".to_string()
}

fn default_port() -> u16 {
    DEFAULT_MODBUS_PORT
}

fn default_unit_id() -> u8 {
    DEFAULT_UNIT_ID
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

fn default_max_read_registers() -> u16 {
    MODBUS_MAX_READ_REGISTERS
}

fn default_max_read_coils() -> u16 {
    MODBUS_MAX_READ_COILS
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            unit_id: default_unit_id(),
            timeout_ms: default_timeout_ms(),
            keep_alive: true,
            max_read_registers: default_max_read_registers(),
            max_read_coils: default_max_read_coils(),
        }
    }
}

impl DeviceConfig {
    pub fn tcp_config(&self) -> TcpConfig {
        TcpConfig {
            host: self.host.clone(),
            port: self.port,
            unit_id: self.unit_id,
            timeout: Duration::from_millis(self.timeout_ms),
            max_read_registers: self.max_read_registers,
            max_read_coils: self.max_read_coils,
        }
    }
}

/// HTTP API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_bind_address() -> String {
    "0.0.0.0:8000".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

/// Logging settings; command-line flags take precedence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub json: bool,
    #[serde(default)]
    pub dir: Option<String>,
}

/// Coil discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySettings {
    /// `coils` or `discrete_inputs`
    #[serde(default = "default_discovery_table")]
    pub table: String,
    #[serde(default)]
    pub start: u16,
    #[serde(default = "default_discovery_count")]
    pub count: u16,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_discovery_table() -> String {
    "coils".to_string()
}

fn default_discovery_count() -> u16 {
    256
}

fn default_interval_ms() -> u64 {
    500
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            table: default_discovery_table(),
            start: 0,
            count: default_discovery_count(),
            interval_ms: default_interval_ms(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl DiscoverySettings {
    pub fn discovery_config(&self) -> Result<DiscoveryConfig> {
        let table = BitTable::from_label(&self.table).ok_or_else(|| {
            PlcSrvError::config(format!("Unknown discovery table '{}'", self.table))
        })?;
        if self.count == 0 {
            return Err(PlcSrvError::config("discovery.count must be at least 1"));
        }
        if u32::from(self.start) + u32::from(self.count) > u32::from(u16::MAX) + 1 {
            return Err(PlcSrvError::config(
                "discovery.start + discovery.count exceeds the address range",
            ));
        }
        Ok(DiscoveryConfig {
            table,
            start: self.start,
            count: self.count,
            interval: Duration::from_millis(self.interval_ms),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        })
    }
}

/// Tags of one address space
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpaceConfig {
    #[serde(default)]
    pub base_offset: u16,
    #[serde(default)]
    pub points: BTreeMap<String, PointEntry>,
}

/// A point is either a bare address or a full description
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointEntry {
    Address(u16),
    Detailed(PointConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointConfig {
    pub address: u16,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub byte_order: Option<String>,
    /// Overrides the space's base offset; must agree with the other tags
    #[serde(default)]
    pub base_offset: Option<u16>,
}

fn default_scale() -> f64 {
    1.0
}

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    /// Keyed by space name (`output_coils`, `holding_registers`, ... or Y/M/X/D)
    #[serde(default)]
    pub tags: BTreeMap<String, SpaceConfig>,
    /// Optional CSV tag table, relative to the configuration file
    #[serde(default)]
    pub tag_table: Option<PathBuf>,
    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl AppConfig {
    /// Load from `path` plus `PLCSRV_*` environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PlcSrvError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_lowercase();
        let figment = match extension.as_str() {
            "yaml" | "yml" => Figment::new().merge(Yaml::file(path)),
            "toml" => Figment::new().merge(Toml::file(path)),
            "json" => Figment::new().merge(Json::file(path)),
            other => {
                return Err(PlcSrvError::config(format!(
                    "Unsupported config format '{}': {}",
                    other,
                    path.display()
                )));
            },
        };
        let figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut config = Self::from_figment(figment)?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Extract and validate a configuration from an assembled figment
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that do not need the tag map
    pub fn validate(&self) -> Result<()> {
        if self.device.host.trim().is_empty() {
            return Err(PlcSrvError::config("device.host must not be empty"));
        }
        if self.device.port == 0 {
            return Err(PlcSrvError::config("device.port must not be 0"));
        }
        if self.device.timeout_ms == 0 {
            return Err(PlcSrvError::config("device.timeout_ms must be positive"));
        }
        if !(1..=MODBUS_MAX_READ_REGISTERS).contains(&self.device.max_read_registers) {
            return Err(PlcSrvError::config(format!(
                "device.max_read_registers must be 1..={MODBUS_MAX_READ_REGISTERS}"
            )));
        }
        if !(1..=MODBUS_MAX_READ_COILS).contains(&self.device.max_read_coils) {
            return Err(PlcSrvError::config(format!(
                "device.max_read_coils must be 1..={MODBUS_MAX_READ_COILS}"
            )));
        }
        self.discovery.discovery_config()?;
        for name in self.tags.keys() {
            if AddressSpace::from_label(name).is_none() {
                return Err(PlcSrvError::config(format!(
                    "Unknown address space '{name}' under tags"
                )));
            }
        }
        Ok(())
    }

    /// Base offset configured per space
    fn space_bases(&self) -> Result<BTreeMap<AddressSpace, u16>> {
        self.tags
            .iter()
            .map(|(name, space)| {
                AddressSpace::from_label(name)
                    .map(|s| (s, space.base_offset))
                    .ok_or_else(|| PlcSrvError::config(format!("Unknown address space '{name}'")))
            })
            .collect()
    }

    /// Tag definitions from the `tags` section, in space then name order
    pub fn tag_definitions(&self) -> Result<Vec<TagDefinition>> {
        let mut tags = Vec::new();
        for (space_name, space_cfg) in &self.tags {
            let space = AddressSpace::from_label(space_name).ok_or_else(|| {
                PlcSrvError::config(format!("Unknown address space '{space_name}'"))
            })?;
            for (name, entry) in &space_cfg.points {
                let tag = match entry {
                    PointEntry::Address(address) => TagDefinition::new(name, space, *address)
                        .with_base_offset(space_cfg.base_offset),
                    PointEntry::Detailed(point) => {
                        let encoding = match point.encoding.as_deref() {
                            Some(enc) => Encoding::parse(enc, point.byte_order.as_deref())
                                .map_err(|e| {
                                    PlcSrvError::config(format!("Tag '{name}': {e}"))
                                })?,
                            None => Encoding::default_for(space),
                        };
                        TagDefinition::new(name, space, point.address)
                            .with_encoding(encoding)
                            .with_scale(point.scale)
                            .with_base_offset(point.base_offset.unwrap_or(space_cfg.base_offset))
                    },
                };
                tags.push(tag);
            }
        }
        Ok(tags)
    }

    /// Validated registry from the `tags` section and the optional CSV table
    pub fn build_registry(&self) -> Result<TagRegistry> {
        let mut tags = self.tag_definitions()?;

        if let Some(table) = &self.tag_table {
            let path = if table.is_absolute() {
                table.clone()
            } else {
                self.base_dir.join(table)
            };
            tags.extend(load_tag_table(&path, &self.space_bases()?)?);
        }

        let registry = TagRegistry::new(tags)?;
        debug!(
            "Tag registry: {} tags in {} spaces",
            registry.len(),
            registry.spaces().count()
        );
        Ok(registry)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::core::ByteOrder;

    fn from_yaml(yaml: &str) -> Result<AppConfig> {
        AppConfig::from_figment(Figment::new().merge(Yaml::string(yaml)))
    }

    #[test]
    fn test_defaults() {
        let config = from_yaml("{}").unwrap();
        assert_eq!(config.device.port, 502);
        assert_eq!(config.device.timeout_ms, 3000);
        assert!(config.device.keep_alive);
        assert_eq!(config.api.bind_address, "0.0.0.0:8000");
        assert_eq!(config.discovery.count, 256);
        assert!(config.build_registry().unwrap().is_empty());
    }

    #[test]
    fn test_points_short_and_detailed() {
        let config = from_yaml(
            r#"
tags:
  Y:
    base_offset: 114
    points:
      Y6_VentiladorBajo: 6
  holding_registers:
    points:
      Temp_producto: { address: 8222, encoding: int16, scale: 10 }
      Flow: { address: 20, encoding: float32, byte_order: CDAB }
"#,
        )
        .unwrap();
        let registry = config.build_registry().unwrap();
        assert_eq!(registry.len(), 3);

        let y6 = registry.get("Y6_VentiladorBajo").unwrap();
        assert_eq!(y6.space, AddressSpace::OutputCoils);
        assert_eq!(y6.wire_address(), 120);

        let temp = registry.get("Temp_producto").unwrap();
        assert_eq!(temp.scale, 10.0);

        let flow = registry.get("Flow").unwrap();
        assert_eq!(
            flow.encoding,
            Encoding::Float32 {
                byte_order: ByteOrder::BigEndianSwap
            }
        );
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(from_yaml("device: { host: '' }").is_err());
        assert!(from_yaml("device: { max_read_registers: 200 }").is_err());
        assert!(from_yaml("discovery: { table: holding }").is_err());
        assert!(from_yaml("tags: { Q: { points: { a: 1 } } }").is_err());
    }

    #[test]
    fn test_bad_encoding_surfaces_at_registry_build() {
        let config = from_yaml(
            "tags: { output_coils: { points: { a: { address: 1, encoding: int16 } } } }",
        )
        .unwrap();
        assert!(config.build_registry().is_err());
    }

    #[test]
    fn test_tcp_config_mapping() {
        let config = from_yaml("device: { host: 10.0.0.5, timeout_ms: 250, unit_id: 3 }").unwrap();
        let tcp = config.device.tcp_config();
        assert_eq!(tcp.host, "10.0.0.5");
        assert_eq!(tcp.unit_id, 3);
        assert_eq!(tcp.timeout, Duration::from_millis(250));
    }
}
