// src/zone.rs - Per-zone thermal state machine
//
// Two live instances (hot end, heated bed) with identical transition logic.
// The heating/cooling status is always derived from the actual/target pair;
// nothing sets it directly.

/// Dead band around the target within which a zone is considered settled.
pub const HEATING_COOLING_TOLERANCE: f64 = 1.0;

pub const DEFAULT_HOT_END_MAXIMUM_TEMPERATURE: f64 = 400.0;
pub const DEFAULT_HEATED_BED_MAXIMUM_TEMPERATURE: f64 = 100.0;

/// Derived heating/cooling status of a thermal zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeatingState {
    #[default]
    Off,
    Heating,
    Cooling,
}

/// Pure transition function: where the zone stands relative to its setpoint.
///
/// Below the tolerance band the heater is (or should be) driving, above it
/// the zone is shedding heat, inside it the zone is settled.
pub fn heating_state(actual: f64, target: f64) -> HeatingState {
    if actual <= target - HEATING_COOLING_TOLERANCE {
        HeatingState::Heating
    } else if actual >= target + HEATING_COOLING_TOLERANCE {
        HeatingState::Cooling
    } else {
        HeatingState::Off
    }
}

/// The two heating zones a stock FDM printer reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneKind {
    HotEnd,
    HeatedBed,
}

impl ZoneKind {
    /// Map a firmware zone code to a zone. Extend here for multi-tool setups.
    pub fn from_code(code: char) -> Option<ZoneKind> {
        match code {
            'T' => Some(ZoneKind::HotEnd),
            'B' => Some(ZoneKind::HeatedBed),
            _ => None,
        }
    }
}

/// Properties whose value changed in one state-machine step. `None` means
/// unchanged, so downstream notifications fire only on real changes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ZoneUpdate {
    pub actual: Option<f64>,
    pub target: Option<f64>,
    pub state: Option<HeatingState>,
}

/// Thermal state of one heating zone.
#[derive(Debug, Clone)]
pub struct ThermalZone {
    actual: f64,
    target: f64,
    maximum: f64,
    state: HeatingState,
}

impl ThermalZone {
    pub fn new(maximum: f64) -> Self {
        Self {
            actual: 0.0,
            target: 0.0,
            maximum,
            state: heating_state(0.0, 0.0),
        }
    }

    pub fn actual(&self) -> f64 {
        self.actual
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    pub fn state(&self) -> HeatingState {
        self.state
    }

    pub fn set_maximum(&mut self, value: f64) {
        self.maximum = value;
    }

    /// Fold in a measured temperature reported by the device.
    pub fn apply_actual(&mut self, value: f64) -> ZoneUpdate {
        let mut update = ZoneUpdate::default();
        if value != self.actual {
            self.actual = value;
            update.actual = Some(value);
        }
        self.recompute_state(&mut update);
        update
    }

    /// Apply an externally requested setpoint, clamped to `[0, maximum]`.
    /// Returns the clamped value (what gets stored, reported and sent to the
    /// device) alongside the change delta.
    ///
    /// Non-finite input clamps to 0: NaN or infinity must never be stored or
    /// reach the wire as `M104 SNaN`.
    pub fn apply_target(&mut self, value: f64) -> (f64, ZoneUpdate) {
        let clamped = if value.is_finite() {
            value.min(self.maximum).max(0.0)
        } else {
            0.0
        };
        (clamped, self.store_target(clamped))
    }

    /// Fold in a setpoint the device itself reported. Local update only; the
    /// caller must not echo a command back to the printer for this.
    pub fn apply_reported_target(&mut self, value: f64) -> ZoneUpdate {
        self.store_target(value)
    }

    fn store_target(&mut self, value: f64) -> ZoneUpdate {
        let mut update = ZoneUpdate::default();
        if value != self.target {
            self.target = value;
            update.target = Some(value);
        }
        self.recompute_state(&mut update);
        update
    }

    fn recompute_state(&mut self, update: &mut ZoneUpdate) {
        let next = heating_state(self.actual, self.target);
        if next != self.state {
            self.state = next;
            update.state = Some(next);
        }
    }
}
