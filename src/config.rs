// src/config.rs - Bridge configuration (TOML)
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::zone::{DEFAULT_HEATED_BED_MAXIMUM_TEMPERATURE, DEFAULT_HOT_END_MAXIMUM_TEMPERATURE};

pub const DEFAULT_SERIAL_PORT: &str = "/dev/cu.URT1";
pub const DEFAULT_BAUD_RATE: u32 = 115200;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration for one printer bridge instance.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub link: LinkConfig,

    #[serde(default)]
    pub thermal: ThermalConfig,
}

/// Identity of the printer. Manufacturer/model/serial number are passed
/// through to whatever accessory layer sits on top; the core never reads them.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    #[serde(default = "default_display_name")]
    pub name: String,

    /// Firmware dialect name, case-insensitive (marlin, klipper, prusa,
    /// reprap, repetier, smoothieware). Unknown names fail construction.
    #[serde(default = "default_firmware")]
    pub firmware: String,

    #[serde(default)]
    pub manufacturer: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub serial_number: Option<String>,
}

/// Serial link parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinkConfig {
    #[serde(default = "default_port")]
    pub port: String,

    /// Optional; when absent the documented default (115200) is used and a
    /// warning is logged.
    #[serde(default)]
    pub baud: Option<u32>,
}

/// Thermal zone limits and telemetry cadence.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThermalConfig {
    #[serde(default = "default_hot_end_maximum")]
    pub hot_end_maximum: f64,

    #[serde(default = "default_heated_bed_maximum")]
    pub heated_bed_maximum: f64,

    /// Auto-report interval in seconds, for dialects that support it.
    #[serde(default = "default_telemetry_interval")]
    pub telemetry_interval: u32,
}

fn default_display_name() -> String {
    "3D Printer".to_string()
}

fn default_firmware() -> String {
    "marlin".to_string()
}

fn default_port() -> String {
    DEFAULT_SERIAL_PORT.to_string()
}

fn default_hot_end_maximum() -> f64 {
    DEFAULT_HOT_END_MAXIMUM_TEMPERATURE
}

fn default_heated_bed_maximum() -> f64 {
    DEFAULT_HEATED_BED_MAXIMUM_TEMPERATURE
}

fn default_telemetry_interval() -> u32 {
    1
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: default_display_name(),
            firmware: default_firmware(),
            manufacturer: None,
            model: None,
            serial_number: None,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud: None,
        }
    }
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            hot_end_maximum: default_hot_end_maximum(),
            heated_bed_maximum: default_heated_bed_maximum(),
            telemetry_interval: default_telemetry_interval(),
        }
    }
}

/// Load configuration from a TOML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}
