//! Configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use castlight_core::{AckPolicy, DeviceIdentity, DeviceRole, IdentityEntry, IdentityTable};
use castlight_hid::TransportConfig;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Castlight configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Device matching
    #[serde(default)]
    pub device: DeviceConfig,
    /// USB transfer settings
    #[serde(default)]
    pub transport: TransportSettings,
    /// Lighting protocol settings
    #[serde(default)]
    pub protocol: ProtocolConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
    /// Delay between resends in hold mode
    #[serde(default = "default_hold_interval_ms")]
    pub hold_interval_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            hold_interval_ms: default_hold_interval_ms(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_hold_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Device matching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Match the built-in QuadCast S and DuoCast identities
    #[serde(default = "default_true")]
    pub builtin_identities: bool,
    /// Extra identities, tried after the built-in ones
    #[serde(default)]
    pub extra_identities: Vec<IdentityConfig>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self { builtin_identities: true, extra_identities: Vec::new() }
    }
}

fn default_true() -> bool {
    true
}

/// A user-supplied USB identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// USB Vendor ID, hex
    pub vendor_id: String,
    /// USB Product ID, hex
    pub product_id: String,
    #[serde(default = "default_role")]
    pub role: DeviceRole,
    #[serde(default)]
    pub model: Option<String>,
}

fn default_role() -> DeviceRole {
    DeviceRole::Main
}

impl IdentityConfig {
    fn to_entry(&self) -> Result<IdentityEntry> {
        let identity = DeviceIdentity::new(parse_hex_id(&self.vendor_id)?, parse_hex_id(&self.product_id)?);
        let model = self.model.clone().unwrap_or_else(|| match self.role {
            DeviceRole::Main => "QuadCast S".to_string(),
            DeviceRole::Companion => "DuoCast".to_string(),
        });
        Ok(IdentityEntry::new(identity, self.role, model))
    }
}

/// USB transfer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Timeout per control transfer and per acknowledgment read
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self { timeout_ms: default_timeout_ms() }
    }
}

fn default_timeout_ms() -> u64 {
    1000
}

/// Lighting protocol settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProtocolConfig {
    /// Expected acknowledgment per packet role
    #[serde(default)]
    pub ack: AckPolicy,
}

impl Config {
    /// Build the identity table to search, in match order.
    pub fn identity_table(&self) -> Result<IdentityTable> {
        let mut table =
            if self.device.builtin_identities { IdentityTable::builtin() } else { IdentityTable::default() };

        for extra in &self.device.extra_identities {
            let entry = extra
                .to_entry()
                .with_context(|| format!("Invalid identity {}:{}", extra.vendor_id, extra.product_id))?;
            let identity = entry.identity;
            if !table.push(entry) {
                warn!(%identity, "Ignoring duplicate identity in config");
            }
        }

        if table.is_empty() {
            bail!("No device identities configured");
        }
        Ok(table)
    }

    #[must_use]
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            timeout: Duration::from_millis(self.transport.timeout_ms),
            ack_policy: self.protocol.ack,
        }
    }

    #[must_use]
    pub fn hold_interval(&self) -> Duration {
        Duration::from_millis(self.daemon.hold_interval_ms)
    }
}

/// Parse a 16-bit USB ID written in hex, with or without `0x`.
pub fn parse_hex_id(value: &str) -> Result<u16> {
    let digits = value.trim();
    let digits = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")).unwrap_or(digits);
    u16::from_str_radix(digits, 16).with_context(|| format!("Invalid USB ID: {value:?}"))
}

/// Where a loaded configuration came from.
///
/// Configuration is read before logging is set up, so the caller reports
/// this once a subscriber exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// Nothing at the default location
    Defaults(PathBuf),
}

/// Load configuration from `path`, or from the default location.
///
/// An explicit path must exist; a missing default file means defaults.
pub fn load_config(path: Option<&Path>) -> Result<(Config, ConfigSource)> {
    match path {
        Some(path) => Ok((read_config(path)?, ConfigSource::File(path.to_path_buf()))),
        None => load_or_default(config_path()?),
    }
}

fn load_or_default(path: PathBuf) -> Result<(Config, ConfigSource)> {
    if !path.exists() {
        return Ok((Config::default(), ConfigSource::Defaults(path)));
    }
    Ok((read_config(&path)?, ConfigSource::File(path)))
}

fn read_config(path: &Path) -> Result<Config> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config file: {path:?}"))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config file: {path:?}"))
}

/// Get the configuration file path.
fn config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("com", "castlight", "Castlight")
        .context("Could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}
