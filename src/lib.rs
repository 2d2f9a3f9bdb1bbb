//! fdm-bridge - bridges an FDM printer's serial G-code channel to a set of
//! observable thermal, fan and link properties, with push-style change
//! notifications for an accessory layer to subscribe to.

pub mod config;
pub mod gcode;
pub mod link;
pub mod printer;
pub mod telemetry;
pub mod zone;
