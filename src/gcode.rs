// src/gcode.rs - Firmware dialect command encoding
use thiserror::Error;

/// Raised when a configured firmware name matches no known dialect.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown firmware dialect: {0}")]
pub struct UnknownDialect(pub String);

/// The firmware vocabularies this bridge can drive.
///
/// The basic thermal M-codes are shared across all of them; the dialects
/// differ in whether the firmware can auto-report temperatures (`M155`).
/// Repetier and Smoothieware reuse the RepRap command set wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Marlin,
    Klipper,
    Prusa,
    RepRap,
    Repetier,
    Smoothieware,
}

impl Dialect {
    /// Look up a dialect by its configured name, case-insensitively.
    pub fn resolve(name: &str) -> Result<Dialect, UnknownDialect> {
        match name.to_lowercase().as_str() {
            "marlin" => Ok(Dialect::Marlin),
            "klipper" => Ok(Dialect::Klipper),
            "prusa" => Ok(Dialect::Prusa),
            "reprap" => Ok(Dialect::RepRap),
            "repetier" => Ok(Dialect::Repetier),
            "smoothieware" => Ok(Dialect::Smoothieware),
            _ => Err(UnknownDialect(name.to_string())),
        }
    }

    /// Hot-end target setpoint (`M104`).
    pub fn set_extruder_temperature(self, temperature: f64) -> String {
        format!("M104 S{}", temperature)
    }

    /// Bed target setpoint (`M140`).
    pub fn set_bed_temperature(self, temperature: f64) -> String {
        format!("M140 S{}", temperature)
    }

    /// Part-cooling fan speed in the device's native 0-255 range (`M106`).
    pub fn set_fan_speed(self, speed: u8) -> String {
        format!("M106 S{}", speed)
    }

    /// Part-cooling fan off (`M107`).
    pub fn fan_off(self) -> &'static str {
        "M107"
    }

    /// One-shot temperature report request (`M105`).
    pub fn temperature_report(self) -> &'static str {
        "M105"
    }

    /// Emergency stop (`M112`).
    pub fn emergency_stop(self) -> &'static str {
        "M112"
    }

    /// Periodic temperature auto-report (`M155`), where the firmware
    /// supports it. Klipper and Prusa do not.
    pub fn enable_telemetry(self, interval_secs: u32) -> Option<String> {
        if self.supports_telemetry_auto_report() {
            Some(format!("M155 S{}", interval_secs))
        } else {
            None
        }
    }

    pub fn supports_telemetry_auto_report(self) -> bool {
        match self {
            Dialect::Marlin | Dialect::RepRap | Dialect::Repetier | Dialect::Smoothieware => true,
            Dialect::Klipper | Dialect::Prusa => false,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Dialect::Marlin => "marlin",
            Dialect::Klipper => "klipper",
            Dialect::Prusa => "prusa",
            Dialect::RepRap => "reprap",
            Dialect::Repetier => "repetier",
            Dialect::Smoothieware => "smoothieware",
        }
    }
}
