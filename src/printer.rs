// src/printer.rs - Printer controller: wires the serial link, telemetry
// parser and zone state machines together and exposes the observable-property
// surface an accessory layer binds to.
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::{Config, ConfigError, DEFAULT_BAUD_RATE};
use crate::gcode::{Dialect, UnknownDialect};
use crate::link::{LinkEvent, LinkManager};
use crate::telemetry::{self, ZoneReading};
use crate::zone::{HeatingState, ThermalZone, ZoneKind, ZoneUpdate, heating_state};

#[derive(Debug, Error)]
pub enum PrinterError {
    #[error(transparent)]
    UnknownDialect(#[from] UnknownDialect),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Push notification for one changed observable property. Emitted only when
/// the value actually changed; subscribers never see redundant updates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StateEvent {
    ActualTemperature { zone: ZoneKind, value: f64 },
    TargetTemperature { zone: ZoneKind, value: f64 },
    HeatingState { zone: ZoneKind, value: HeatingState },
    FanOn(bool),
    FanSpeed(u8),
    LinkOpen(bool),
}

/// Stored display-units flag. Pure pass-through: temperatures are never
/// converted, the accessory layer only wants the preference persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemperatureDisplayUnits {
    #[default]
    Celsius,
    Fahrenheit,
}

#[derive(Debug, Clone, Copy, Default)]
struct FanState {
    on: bool,
    speed_percent: u8,
}

#[derive(Debug, Clone, Copy, Default)]
struct PrintInfo {
    progress: f64,
    elapsed_time: f64,
}

/// Percent (0-100) to the device's native 0-255 fan range.
///
/// Scaled as `255/100` rather than a literal `2.55`, which is not exactly
/// representable and rounds 50% down to 127 instead of 128.
fn native_fan_speed(percent: u8) -> u8 {
    (percent as f64 * 255.0 / 100.0).round() as u8
}

fn zone_events(zone: ZoneKind, update: ZoneUpdate) -> Vec<StateEvent> {
    let mut events = Vec::new();
    if let Some(value) = update.actual {
        events.push(StateEvent::ActualTemperature { zone, value });
    }
    if let Some(value) = update.target {
        events.push(StateEvent::TargetTemperature { zone, value });
    }
    if let Some(value) = update.state {
        events.push(StateEvent::HeatingState { zone, value });
    }
    events
}

/// All mutable controller state, guarded by one mutex. Methods mutate state
/// and report the outbound command plus the change notifications to emit, so
/// the update path stays single-writer and unit-testable.
struct ControllerState {
    dialect: Dialect,
    hot_end: ThermalZone,
    heated_bed: ThermalZone,
    fan: FanState,
    print_info: PrintInfo,
    display_units: TemperatureDisplayUnits,
}

impl ControllerState {
    fn new(dialect: Dialect, hot_end_maximum: f64, heated_bed_maximum: f64) -> Self {
        Self {
            dialect,
            hot_end: ThermalZone::new(hot_end_maximum),
            heated_bed: ThermalZone::new(heated_bed_maximum),
            fan: FanState::default(),
            print_info: PrintInfo::default(),
            display_units: TemperatureDisplayUnits::default(),
        }
    }

    fn zone(&self, kind: ZoneKind) -> &ThermalZone {
        match kind {
            ZoneKind::HotEnd => &self.hot_end,
            ZoneKind::HeatedBed => &self.heated_bed,
        }
    }

    fn zone_mut(&mut self, kind: ZoneKind) -> &mut ThermalZone {
        match kind {
            ZoneKind::HotEnd => &mut self.hot_end,
            ZoneKind::HeatedBed => &mut self.heated_bed,
        }
    }

    /// External setpoint request: clamp, store, and produce the command that
    /// pushes the new target to the device.
    fn set_zone_target(&mut self, kind: ZoneKind, value: f64) -> (f64, String, Vec<StateEvent>) {
        let (clamped, update) = self.zone_mut(kind).apply_target(value);
        let command = match kind {
            ZoneKind::HotEnd => self.dialect.set_extruder_temperature(clamped),
            ZoneKind::HeatedBed => self.dialect.set_bed_temperature(clamped),
        };
        (clamped, command, zone_events(kind, update))
    }

    /// Device telemetry: update the matching zone locally. Reported targets
    /// are never echoed back as commands.
    fn apply_reading(&mut self, reading: ZoneReading) -> Vec<StateEvent> {
        let Some(kind) = ZoneKind::from_code(reading.zone_code) else {
            tracing::trace!("ignoring unmapped zone code {}", reading.zone_code);
            return Vec::new();
        };
        let mut events = zone_events(kind, self.zone_mut(kind).apply_actual(reading.actual));
        if let Some(target) = reading.target {
            events.extend(zone_events(kind, self.zone_mut(kind).apply_reported_target(target)));
        }
        events
    }

    /// Turning the fan on re-issues the speed command at the stored percent;
    /// turning it off sends the dedicated off command regardless of speed.
    fn set_fan_on(&mut self, on: bool) -> (String, Vec<StateEvent>) {
        let command = if on {
            self.dialect.set_fan_speed(native_fan_speed(self.fan.speed_percent))
        } else {
            self.dialect.fan_off().to_string()
        };
        let mut events = Vec::new();
        if self.fan.on != on {
            self.fan.on = on;
            events.push(StateEvent::FanOn(on));
        }
        (command, events)
    }

    /// A speed change while the fan is on re-issues the speed command; while
    /// off it is stored only and takes effect on the next turn-on.
    fn set_fan_speed(&mut self, percent: u8) -> (Option<String>, Vec<StateEvent>) {
        let percent = percent.min(100);
        let command = (self.fan.on && percent != self.fan.speed_percent)
            .then(|| self.dialect.set_fan_speed(native_fan_speed(percent)));
        let mut events = Vec::new();
        if self.fan.speed_percent != percent {
            self.fan.speed_percent = percent;
            events.push(StateEvent::FanSpeed(percent));
        }
        (command, events)
    }
}

/// Stateful controller for one printer: a serial command channel on one side,
/// observable thermal/fan properties plus a change-notification channel on
/// the other.
pub struct PrinterController {
    display_name: String,
    dialect: Dialect,
    state: Arc<Mutex<ControllerState>>,
    link: LinkManager,
    events: broadcast::Sender<StateEvent>,
    pump: Option<JoinHandle<()>>,
}

impl PrinterController {
    /// Build the controller and start the link. Fails fast when the
    /// configured firmware dialect is unknown; a missing baud rate falls back
    /// to the documented default with a warning.
    pub fn new(config: &Config) -> Result<Self, PrinterError> {
        let dialect = Dialect::resolve(&config.device.firmware)?;
        let baud = match config.link.baud {
            Some(baud) => baud,
            None => {
                tracing::warn!(
                    "baud rate for {} is missing or invalid, using default {}",
                    config.device.name,
                    DEFAULT_BAUD_RATE
                );
                DEFAULT_BAUD_RATE
            }
        };

        tracing::info!(
            "{}: {} command set on {} at {} baud",
            config.device.name,
            dialect.name(),
            config.link.port,
            baud
        );

        let state = Arc::new(Mutex::new(ControllerState::new(
            dialect,
            config.thermal.hot_end_maximum,
            config.thermal.heated_bed_maximum,
        )));
        let (events, _) = broadcast::channel(64);

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let mut link = LinkManager::new(&config.link.port, baud);
        link.start(dialect.enable_telemetry(config.thermal.telemetry_interval), line_tx);

        let pump = spawn_line_pump(state.clone(), events.clone(), line_rx);

        Ok(Self {
            display_name: config.device.name.clone(),
            dialect,
            state,
            link,
            events,
            pump: Some(pump),
        })
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn serial_path(&self) -> &str {
        self.link.path()
    }

    pub fn baud_rate(&self) -> u32 {
        self.link.baud_rate()
    }

    pub fn link_open(&self) -> bool {
        self.link.is_open()
    }

    /// Change-notification channel the accessory layer subscribes to.
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    // THERMAL ZONES

    pub async fn actual_temperature(&self, zone: ZoneKind) -> f64 {
        self.state.lock().await.zone(zone).actual()
    }

    pub async fn target_temperature(&self, zone: ZoneKind) -> f64 {
        self.state.lock().await.zone(zone).target()
    }

    /// Current heating/cooling state, derived from the last known reading.
    pub async fn current_heating_state(&self, zone: ZoneKind) -> HeatingState {
        self.state.lock().await.zone(zone).state()
    }

    /// Desired heating/cooling state for the stored setpoint. Same
    /// physically-correct convention as the current-state query.
    pub async fn target_heating_state(&self, zone: ZoneKind) -> HeatingState {
        let state = self.state.lock().await;
        let zone = state.zone(zone);
        heating_state(zone.actual(), zone.target())
    }

    /// Request a new setpoint: clamps to `[0, maximum]`, updates local state,
    /// notifies subscribers and pushes the command to the device. Returns the
    /// clamped value that was actually applied.
    pub async fn set_target_temperature(&self, zone: ZoneKind, value: f64) -> f64 {
        let (clamped, command, events) = {
            let mut state = self.state.lock().await;
            state.set_zone_target(zone, value)
        };
        self.emit(events);
        self.link.write(&command);
        clamped
    }

    pub async fn maximum_temperature(&self, zone: ZoneKind) -> f64 {
        self.state.lock().await.zone(zone).maximum()
    }

    pub async fn set_maximum_temperature(&self, zone: ZoneKind, value: f64) {
        self.state.lock().await.zone_mut(zone).set_maximum(value);
    }

    // FAN

    pub async fn fan_on(&self) -> bool {
        self.state.lock().await.fan.on
    }

    pub async fn set_fan_on(&self, on: bool) {
        let (command, events) = {
            let mut state = self.state.lock().await;
            state.set_fan_on(on)
        };
        self.emit(events);
        self.link.write(&command);
    }

    pub async fn fan_speed(&self) -> u8 {
        self.state.lock().await.fan.speed_percent
    }

    pub async fn set_fan_speed(&self, percent: u8) {
        let (command, events) = {
            let mut state = self.state.lock().await;
            state.set_fan_speed(percent)
        };
        self.emit(events);
        if let Some(command) = command {
            self.link.write(&command);
        }
    }

    // PRINTER

    pub async fn temperature_display_units(&self) -> TemperatureDisplayUnits {
        self.state.lock().await.display_units
    }

    pub async fn set_temperature_display_units(&self, units: TemperatureDisplayUnits) {
        self.state.lock().await.display_units = units;
    }

    pub async fn elapsed_print_time(&self) -> f64 {
        self.state.lock().await.print_info.elapsed_time
    }

    pub async fn set_elapsed_print_time(&self, value: f64) {
        self.state.lock().await.print_info.elapsed_time = value;
    }

    pub async fn print_progress(&self) -> f64 {
        self.state.lock().await.print_info.progress
    }

    pub async fn set_print_progress(&self, value: f64) {
        self.state.lock().await.print_info.progress = value;
    }

    /// Fire the dialect's emergency stop. Dropped like any other write when
    /// the link is down.
    pub async fn emergency_stop(&self) {
        let command = self.dialect.emergency_stop();
        tracing::warn!("{}: emergency stop requested", self.display_name);
        self.link.write(command);
    }

    /// Stop the link task and the line pump and close the port.
    pub async fn shutdown(&mut self) {
        tracing::info!("{}: shutting down", self.display_name);
        self.link.shutdown().await;
        if let Some(pump) = self.pump.take() {
            // The link task dropped its event sender, so the pump drains and
            // exits on its own.
            let _ = pump.await;
        }
    }

    fn emit(&self, events: Vec<StateEvent>) {
        for event in events {
            let _ = self.events.send(event);
        }
    }
}

/// Single-writer mutation path: link events in, state updates and change
/// notifications out.
fn spawn_line_pump(
    state: Arc<Mutex<ControllerState>>,
    events: broadcast::Sender<StateEvent>,
    mut link_rx: mpsc::UnboundedReceiver<LinkEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = link_rx.recv().await {
            match event {
                LinkEvent::Opened => {
                    let _ = events.send(StateEvent::LinkOpen(true));
                }
                LinkEvent::Closed => {
                    let _ = events.send(StateEvent::LinkOpen(false));
                }
                LinkEvent::Line(line) => {
                    let readings = telemetry::parse_line(&line);
                    if readings.is_empty() {
                        continue;
                    }
                    let mut state = state.lock().await;
                    for reading in readings {
                        for event in state.apply_reading(reading) {
                            let _ = events.send(event);
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> ControllerState {
        ControllerState::new(Dialect::Marlin, 400.0, 100.0)
    }

    #[test]
    fn test_native_fan_scaling() {
        assert_eq!(native_fan_speed(0), 0);
        assert_eq!(native_fan_speed(50), 128);
        assert_eq!(native_fan_speed(100), 255);
        // Exact .5 midpoints must round up, not fall to an inexact 2.55.
        assert_eq!(native_fan_speed(10), 26);
        assert_eq!(native_fan_speed(30), 77);
        assert_eq!(native_fan_speed(70), 179);
    }

    #[test]
    fn test_fan_on_uses_stored_speed() {
        let mut state = test_state();
        state.set_fan_speed(50);
        let (command, events) = state.set_fan_on(true);
        assert_eq!(command, "M106 S128");
        assert_eq!(events, vec![StateEvent::FanOn(true)]);
    }

    #[test]
    fn test_fan_off_sends_off_constant() {
        let mut state = test_state();
        state.set_fan_speed(75);
        state.set_fan_on(true);
        let (command, _) = state.set_fan_on(false);
        assert_eq!(command, "M107");
    }

    #[test]
    fn test_fan_speed_while_off_is_stored_only() {
        let mut state = test_state();
        let (command, events) = state.set_fan_speed(40);
        assert_eq!(command, None);
        assert_eq!(events, vec![StateEvent::FanSpeed(40)]);
        assert_eq!(state.fan.speed_percent, 40);
    }

    #[test]
    fn test_fan_speed_while_on_reissues_command() {
        let mut state = test_state();
        state.set_fan_on(true);
        let (command, _) = state.set_fan_speed(80);
        assert_eq!(command.as_deref(), Some("M106 S204"));
    }

    #[test]
    fn test_fan_speed_clamped_to_100() {
        let mut state = test_state();
        let (_, events) = state.set_fan_speed(250);
        assert_eq!(events, vec![StateEvent::FanSpeed(100)]);
    }

    #[test]
    fn test_zone_target_builds_dialect_command() {
        let mut state = test_state();
        let (clamped, command, _) = state.set_zone_target(ZoneKind::HotEnd, 210.0);
        assert_eq!(clamped, 210.0);
        assert_eq!(command, "M104 S210");

        let (clamped, command, _) = state.set_zone_target(ZoneKind::HeatedBed, 150.0);
        assert_eq!(clamped, 100.0);
        assert_eq!(command, "M140 S100");
    }

    #[test]
    fn test_apply_reading_updates_zone_and_notifies() {
        let mut state = test_state();
        let events = state.apply_reading(ZoneReading {
            zone_code: 'T',
            actual: 200.5,
            target: Some(210.0),
        });
        assert!(events.contains(&StateEvent::ActualTemperature {
            zone: ZoneKind::HotEnd,
            value: 200.5
        }));
        assert!(events.contains(&StateEvent::TargetTemperature {
            zone: ZoneKind::HotEnd,
            value: 210.0
        }));
        assert!(events.contains(&StateEvent::HeatingState {
            zone: ZoneKind::HotEnd,
            value: HeatingState::Heating
        }));
    }

    #[test]
    fn test_apply_reading_is_idempotent_for_notifications() {
        let mut state = test_state();
        let reading = ZoneReading { zone_code: 'B', actual: 60.0, target: Some(60.0) };
        assert!(!state.apply_reading(reading).is_empty());
        assert!(state.apply_reading(reading).is_empty());
    }

    #[test]
    fn test_apply_reading_ignores_unmapped_zone_codes() {
        let mut state = test_state();
        let events = state.apply_reading(ZoneReading {
            zone_code: 'C',
            actual: 45.0,
            target: None,
        });
        assert!(events.is_empty());
    }
}
