//! Scenario tests for alert rules from evaluation to acknowledgement

use chrono::{DateTime, Duration, TimeZone, Utc};
use energy_monitor::shared::alerts::{
    acknowledge, evaluate_rule, new_triggered_alert, record_trigger, summarize_usage, Evaluation,
    LiveUsage,
};
use energy_monitor::shared::domain::{AlertPeriod, AlertType, Home, Tariff};
use energy_monitor::test_utils::fixtures;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 22, 20, 0, 0).unwrap()
}

fn home() -> Home {
    fixtures::home("home_1", "user_1", Tariff::flat(10.0), now())
}

#[test]
fn test_cost_limit_lifecycle() {
    let home = home();
    let device = fixtures::device("dev_1", &home, 3000.0, now());

    let mut rule = fixtures::usage_rule(&home, 1.0, AlertPeriod::Monthly, now());
    rule.alert_type = AlertType::CostLimit;
    rule.limit_kwh = None;
    rule.limit_cost = Some(100.0);
    rule.threshold_pct = 80.0;

    let readings = vec![
        fixtures::reading(&device, now() - Duration::days(3), now() - Duration::days(3) + Duration::hours(1), 3.0, 30.0),
        fixtures::reading(&device, now() - Duration::days(1), now() - Duration::days(1) + Duration::hours(2), 6.0, 60.0),
    ];

    let usage = summarize_usage(&rule, &readings, LiveUsage::default(), now());
    let evaluation = evaluate_rule(&rule, &usage, now());
    assert_eq!(
        evaluation,
        Evaluation::Triggered {
            observed: 90.0,
            limit: 80.0
        }
    );

    let mut alert = new_triggered_alert(&rule, &evaluation, "alert_1".to_string(), now()).unwrap();
    record_trigger(&mut rule, now());
    assert_eq!(alert.rule_id, rule.rule_id);
    assert_eq!(alert.owner_id, "user_1");
    assert!(!alert.acknowledged);

    // Same window: no second alert
    let later = now() + Duration::hours(1);
    let usage = summarize_usage(&rule, &readings, LiveUsage::default(), later);
    assert_eq!(evaluate_rule(&rule, &usage, later), Evaluation::AlreadyTriggered);

    let first_ack = now() + Duration::minutes(5);
    assert!(acknowledge(&mut alert, first_ack));
    assert!(!acknowledge(&mut alert, first_ack + Duration::hours(1)));
    assert!(alert.acknowledged);
    assert_eq!(alert.acknowledged_at, Some(first_ack));
}

#[test]
fn test_disabled_rule_never_fires() {
    let home = home();
    let device = fixtures::device("dev_1", &home, 3000.0, now());
    let mut rule = fixtures::usage_rule(&home, 1.0, AlertPeriod::Daily, now());
    rule.is_enabled = false;

    let readings = vec![fixtures::reading(&device, now() - Duration::hours(3), now() - Duration::hours(1), 6.0, 60.0)];
    let usage = summarize_usage(&rule, &readings, LiveUsage::default(), now());

    assert_eq!(evaluate_rule(&rule, &usage, now()), Evaluation::Disabled);
    assert!(new_triggered_alert(&rule, &Evaluation::Disabled, "alert_1".to_string(), now()).is_none());
}

#[test]
fn test_unusual_activity_against_baseline() {
    let home = home();
    let device = fixtures::device("dev_1", &home, 1000.0, now());
    let mut rule = fixtures::usage_rule(&home, 1.0, AlertPeriod::Daily, now());
    rule.alert_type = AlertType::UnusualActivity;
    rule.limit_kwh = None;
    rule.threshold_pct = 150.0;

    // 2 kWh on each of the four previous days, 4 kWh today
    let mut readings: Vec<_> = (1..=4)
        .map(|days| {
            let end = now() - Duration::days(days);
            fixtures::reading(&device, end - Duration::hours(2), end, 2.0, 20.0)
        })
        .collect();
    readings.push(fixtures::reading(&device, now() - Duration::hours(5), now() - Duration::hours(1), 4.0, 40.0));

    let usage = summarize_usage(&rule, &readings, LiveUsage::default(), now());
    assert!((usage.baseline_kwh - 2.0).abs() < 1e-9);
    assert_eq!(
        evaluate_rule(&rule, &usage, now()),
        Evaluation::Triggered {
            observed: 4.0,
            limit: 3.0
        }
    );
}

#[test]
fn test_device_offline_is_not_evaluated() {
    let home = home();
    let mut rule = fixtures::usage_rule(&home, 1.0, AlertPeriod::Daily, now());
    rule.alert_type = AlertType::DeviceOffline;

    let usage = summarize_usage(&rule, &[], LiveUsage::default(), now());
    assert_eq!(evaluate_rule(&rule, &usage, now()), Evaluation::NotEvaluated);
}
