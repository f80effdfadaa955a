//! Scenario tests for toggling a device through a day of use

use approx::assert_relative_eq;
use chrono::{Duration, TimeZone, Utc};
use energy_monitor::shared::activation::{apply_toggle, ToggleOutcome};
use energy_monitor::shared::consumption::session_consumption;
use energy_monitor::shared::domain::{ActivationState, Tariff, TariffSlab};
use energy_monitor::shared::tariff::marginal_charge;
use energy_monitor::shared::time::{Clock, FixedClock};
use energy_monitor::test_utils::fixtures;

fn clock() -> FixedClock {
    FixedClock::from_rfc3339("2024-03-04T07:00:00Z").unwrap()
}

#[test]
fn test_on_then_off_produces_session() {
    let mut clock = clock();
    let home = fixtures::home("home_1", "user_1", Tariff::flat(6.0), clock.now());
    let mut device = fixtures::device("dev_heater", &home, 2000.0, clock.now());

    assert_eq!(apply_toggle(&mut device, true, clock.now()), ToggleOutcome::TurnedOn);
    assert_eq!(
        device.activation(),
        ActivationState::On { since: clock.now() }
    );

    clock.advance_minutes(45);
    let live = session_consumption(&device, &home.tariff, 0.0, clock.now());
    assert!(live.is_active);
    assert_relative_eq!(live.energy_kwh, 1.5, epsilon = 1e-9);
    assert_relative_eq!(live.cost, 9.0, epsilon = 1e-9);

    clock.advance_minutes(45);
    let ToggleOutcome::TurnedOff(session) = apply_toggle(&mut device, false, clock.now()) else {
        panic!("expected the session to finish");
    };

    assert_eq!(session.ended_at, clock.now());
    assert_eq!(session.started_at, clock.now() - Duration::minutes(90));
    assert_relative_eq!(session.duration_minutes, 90.0, epsilon = 1e-9);
    assert_relative_eq!(session.energy_kwh, 3.0, epsilon = 1e-9);

    assert!(!device.is_active);
    assert_eq!(device.last_turned_on, None);
}

#[test]
fn test_repeated_requests_keep_session_start() {
    let mut clock = clock();
    let home = fixtures::home("home_1", "user_1", Tariff::flat(6.0), clock.now());
    let mut device = fixtures::device("dev_lamp", &home, 60.0, clock.now());
    let started = clock.now();

    apply_toggle(&mut device, true, started);
    clock.advance_minutes(10);

    assert_eq!(apply_toggle(&mut device, true, clock.now()), ToggleOutcome::Unchanged);
    assert_eq!(device.last_turned_on, Some(started));

    apply_toggle(&mut device, false, clock.now());
    assert_eq!(apply_toggle(&mut device, false, clock.now()), ToggleOutcome::Unchanged);
    assert!(!device.is_active);
}

#[test]
fn test_stray_active_flag_is_normalized() {
    let at = Utc.with_ymd_and_hms(2024, 3, 4, 7, 0, 0).unwrap();
    let home = fixtures::home("home_1", "user_1", Tariff::flat(6.0), at);
    let mut device = fixtures::device("dev_fan", &home, 75.0, at);
    device.is_active = true;

    assert_eq!(device.activation(), ActivationState::Off);
    assert_eq!(apply_toggle(&mut device, false, at), ToggleOutcome::Unchanged);
    assert!(!device.is_active);
}

#[test]
fn test_sessions_priced_at_the_margin() {
    let mut clock = clock();
    let tariff = Tariff::slab(vec![
        TariffSlab::new(0.0, Some(5.0), 2.0),
        TariffSlab::new(5.0, None, 10.0),
    ]);
    let home = fixtures::home("home_1", "user_1", tariff, clock.now());
    let mut device = fixtures::device("dev_ac", &home, 2000.0, clock.now());

    let mut month_kwh = 0.0;
    let mut costs = Vec::new();
    for _ in 0..2 {
        apply_toggle(&mut device, true, clock.now());
        clock.advance(Duration::hours(2));
        let ToggleOutcome::TurnedOff(session) = apply_toggle(&mut device, false, clock.now())
        else {
            panic!("expected the session to finish");
        };
        costs.push(marginal_charge(&home.tariff, month_kwh, session.energy_kwh));
        month_kwh += session.energy_kwh;
        clock.advance(Duration::hours(1));
    }

    // 4 kWh in the first slab, then 1 kWh + 3 kWh across the boundary
    assert_relative_eq!(costs[0], 8.0, epsilon = 1e-9);
    assert_relative_eq!(costs[1], 32.0, epsilon = 1e-9);
}
