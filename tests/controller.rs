// Controller construction and the observable-property surface.
//
// These run against a serial path that never opens; the link keeps retrying
// in the background while the accessors serve local state, which is exactly
// the disconnected-printer behavior the controller promises.

use fdm_bridge::config::Config;
use fdm_bridge::gcode::Dialect;
use fdm_bridge::printer::{PrinterController, PrinterError, StateEvent, TemperatureDisplayUnits};
use fdm_bridge::zone::{HeatingState, ZoneKind};

fn test_config() -> Config {
    let mut config = Config::default();
    config.device.firmware = "marlin".to_string();
    config.link.port = "/tmp/fdm-bridge-test-no-such-port".to_string();
    config.link.baud = Some(115200);
    config
}

#[tokio::test]
async fn unknown_dialect_fails_construction() {
    let mut config = test_config();
    config.device.firmware = "unknownfirmware".to_string();
    match PrinterController::new(&config) {
        Err(PrinterError::UnknownDialect(_)) => {}
        other => panic!("expected UnknownDialect, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn missing_baud_rate_falls_back_to_default() {
    let mut config = test_config();
    config.link.baud = None;
    let mut controller = PrinterController::new(&config).unwrap();
    assert_eq!(controller.baud_rate(), 115200);
    controller.shutdown().await;
}

#[tokio::test]
async fn target_temperature_round_trips() {
    let mut config = test_config();
    config.device.firmware = "KLIPPER".to_string(); // case-insensitive
    let mut controller = PrinterController::new(&config).unwrap();
    assert_eq!(controller.dialect(), Dialect::Klipper);

    let applied = controller.set_target_temperature(ZoneKind::HotEnd, 150.0).await;
    assert_eq!(applied, 150.0);
    assert_eq!(controller.target_temperature(ZoneKind::HotEnd).await, 150.0);
    controller.shutdown().await;
}

#[tokio::test]
async fn target_requests_are_clamped_to_the_zone_maximum() {
    let mut controller = PrinterController::new(&test_config()).unwrap();

    let max = controller.maximum_temperature(ZoneKind::HeatedBed).await;
    assert_eq!(max, 100.0);
    let applied = controller.set_target_temperature(ZoneKind::HeatedBed, max + 50.0).await;
    assert_eq!(applied, max);
    assert_eq!(controller.target_temperature(ZoneKind::HeatedBed).await, max);
    controller.shutdown().await;
}

#[tokio::test]
async fn configured_maxima_override_the_defaults() {
    let mut config = test_config();
    config.thermal.hot_end_maximum = 300.0;
    config.thermal.heated_bed_maximum = 110.0;
    let mut controller = PrinterController::new(&config).unwrap();
    assert_eq!(controller.maximum_temperature(ZoneKind::HotEnd).await, 300.0);
    assert_eq!(controller.maximum_temperature(ZoneKind::HeatedBed).await, 110.0);

    controller.set_maximum_temperature(ZoneKind::HotEnd, 260.0).await;
    assert_eq!(controller.maximum_temperature(ZoneKind::HotEnd).await, 260.0);
    controller.shutdown().await;
}

#[tokio::test]
async fn both_heating_state_queries_use_one_convention() {
    let mut controller = PrinterController::new(&test_config()).unwrap();

    // Cold zone, hot setpoint: both queries say heating.
    controller.set_target_temperature(ZoneKind::HotEnd, 150.0).await;
    assert_eq!(
        controller.current_heating_state(ZoneKind::HotEnd).await,
        HeatingState::Heating
    );
    assert_eq!(
        controller.target_heating_state(ZoneKind::HotEnd).await,
        HeatingState::Heating
    );

    // Setpoint back to zero while believed cold: settled, both off.
    controller.set_target_temperature(ZoneKind::HotEnd, 0.0).await;
    assert_eq!(controller.current_heating_state(ZoneKind::HotEnd).await, HeatingState::Off);
    assert_eq!(controller.target_heating_state(ZoneKind::HotEnd).await, HeatingState::Off);
    controller.shutdown().await;
}

#[tokio::test]
async fn set_requests_push_change_notifications() {
    let mut controller = PrinterController::new(&test_config()).unwrap();
    let mut events = controller.subscribe();

    controller.set_target_temperature(ZoneKind::HotEnd, 150.0).await;
    assert_eq!(
        events.try_recv().unwrap(),
        StateEvent::TargetTemperature { zone: ZoneKind::HotEnd, value: 150.0 }
    );
    assert_eq!(
        events.try_recv().unwrap(),
        StateEvent::HeatingState { zone: ZoneKind::HotEnd, value: HeatingState::Heating }
    );

    // Re-applying the same setpoint must not notify again.
    controller.set_target_temperature(ZoneKind::HotEnd, 150.0).await;
    assert!(events.try_recv().is_err());
    controller.shutdown().await;
}

#[tokio::test]
async fn fan_state_round_trips_and_notifies_on_change_only() {
    let mut controller = PrinterController::new(&test_config()).unwrap();
    let mut events = controller.subscribe();

    controller.set_fan_speed(50).await;
    assert_eq!(controller.fan_speed().await, 50);
    assert_eq!(events.try_recv().unwrap(), StateEvent::FanSpeed(50));

    controller.set_fan_on(true).await;
    assert!(controller.fan_on().await);
    assert_eq!(events.try_recv().unwrap(), StateEvent::FanOn(true));

    // Same value again: state unchanged, no notification.
    controller.set_fan_on(true).await;
    assert!(events.try_recv().is_err());

    controller.set_fan_on(false).await;
    assert!(!controller.fan_on().await);
    assert_eq!(events.try_recv().unwrap(), StateEvent::FanOn(false));
    controller.shutdown().await;
}

#[tokio::test]
async fn pass_through_properties_round_trip() {
    let mut controller = PrinterController::new(&test_config()).unwrap();

    assert_eq!(
        controller.temperature_display_units().await,
        TemperatureDisplayUnits::Celsius
    );
    controller
        .set_temperature_display_units(TemperatureDisplayUnits::Fahrenheit)
        .await;
    assert_eq!(
        controller.temperature_display_units().await,
        TemperatureDisplayUnits::Fahrenheit
    );

    controller.set_elapsed_print_time(3600.0).await;
    assert_eq!(controller.elapsed_print_time().await, 3600.0);

    controller.set_print_progress(0.42).await;
    assert_eq!(controller.print_progress().await, 0.42);
    controller.shutdown().await;
}

#[tokio::test]
async fn disconnected_link_reports_closed_and_keeps_serving_state() {
    let mut controller = PrinterController::new(&test_config()).unwrap();
    assert!(!controller.link_open());
    assert_eq!(controller.serial_path(), "/tmp/fdm-bridge-test-no-such-port");

    // Writes are dropped, state still updates and reads back.
    controller.set_target_temperature(ZoneKind::HeatedBed, 60.0).await;
    assert_eq!(controller.target_temperature(ZoneKind::HeatedBed).await, 60.0);
    assert_eq!(controller.actual_temperature(ZoneKind::HeatedBed).await, 0.0);
    controller.shutdown().await;
}
