use chrono::{DateTime, Datelike, Duration, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AlertPeriod, AlertRule, AlertType, Reading, TriggeredAlert};
use crate::time::{next_month_start, previous_month_start};
use crate::validators::{validate_name, validate_positive, validate_threshold_pct, ValidationError};

/// Number of earlier windows averaged into the unusual-activity baseline
pub const BASELINE_WINDOWS: usize = 4;

impl AlertPeriod {
    /// Start of the UTC window containing `now`. Weeks start on Monday.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        match self {
            AlertPeriod::Hourly => midnight + Duration::hours(i64::from(now.hour())),
            AlertPeriod::Daily => midnight,
            AlertPeriod::Weekly => {
                midnight - Duration::days(i64::from(now.weekday().num_days_from_monday()))
            }
            AlertPeriod::Monthly => midnight - Duration::days(i64::from(now.day0())),
        }
    }

    /// Start of the window following the one beginning at `start`
    pub fn next_window(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            AlertPeriod::Hourly => start + Duration::hours(1),
            AlertPeriod::Daily => start + Duration::days(1),
            AlertPeriod::Weekly => start + Duration::weeks(1),
            AlertPeriod::Monthly => next_month_start(start).unwrap_or(start + Duration::days(31)),
        }
    }

    /// Start of the window preceding the one beginning at `start`
    pub fn previous_window(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            AlertPeriod::Hourly => start - Duration::hours(1),
            AlertPeriod::Daily => start - Duration::days(1),
            AlertPeriod::Weekly => start - Duration::weeks(1),
            AlertPeriod::Monthly => {
                previous_month_start(start).unwrap_or(start - Duration::days(31))
            }
        }
    }

    /// The `count` complete windows before the current one, newest first,
    /// as `[start, end)` pairs.
    pub fn preceding_windows(
        &self,
        now: DateTime<Utc>,
        count: usize,
    ) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        let mut windows = Vec::with_capacity(count);
        let mut end = self.window_start(now);
        for _ in 0..count {
            let start = self.previous_window(end);
            windows.push((start, end));
            end = start;
        }
        windows
    }

    /// Earliest instant any evaluation at `now` needs readings from
    pub fn history_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.preceding_windows(now, BASELINE_WINDOWS)
            .last()
            .map(|(start, _)| *start)
            .unwrap_or_else(|| self.window_start(now))
    }
}

pub fn validate_rule(rule: &AlertRule) -> Result<(), ValidationError> {
    validate_name("name", &rule.name)?;
    validate_threshold_pct(rule.threshold_pct)?;

    match rule.alert_type {
        AlertType::UsageLimit => match rule.limit_kwh {
            Some(limit) => validate_positive("limit_kwh", limit),
            None => Err(ValidationError::new(
                "limit_kwh",
                "Usage limit rules require limit_kwh",
            )),
        },
        AlertType::CostLimit => match rule.limit_cost {
            Some(limit) => validate_positive("limit_cost", limit),
            None => Err(ValidationError::new(
                "limit_cost",
                "Cost limit rules require limit_cost",
            )),
        },
        AlertType::UnusualActivity | AlertType::DeviceOffline => Ok(()),
    }
}

/// Consumption of a session still in progress, added on top of stored readings
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LiveUsage {
    pub energy_kwh: f64,
    pub cost: f64,
}

/// Usage observed for a rule in its current window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeriodUsage {
    pub window_start: DateTime<Utc>,
    pub energy_kwh: f64,
    pub cost: f64,
    /// Mean energy over the preceding windows that have history
    pub baseline_kwh: f64,
}

fn in_scope(rule: &AlertRule, reading: &Reading) -> bool {
    reading.home_id == rule.home_id
        && rule
            .device_id
            .as_ref()
            .map_or(true, |device_id| *device_id == reading.device_id)
}

/// Sum the readings attributed to the rule's scope, bucketed by `ended_at`
pub fn summarize_usage(
    rule: &AlertRule,
    readings: &[Reading],
    live: LiveUsage,
    now: DateTime<Utc>,
) -> PeriodUsage {
    let period = rule.period;
    let window_start = period.window_start(now);
    let window_end = period.next_window(window_start);
    let scoped: Vec<&Reading> = readings.iter().filter(|r| in_scope(rule, r)).collect();

    let (mut energy_kwh, mut cost) = (0.0, 0.0);
    for reading in scoped
        .iter()
        .filter(|r| r.ended_at >= window_start && r.ended_at < window_end)
    {
        energy_kwh += reading.energy_kwh;
        cost += reading.cost;
    }

    // Windows from before the scope's first reading carry no history
    let first_reading = scoped.iter().map(|r| r.ended_at).min();
    let baseline_windows: Vec<f64> = period
        .preceding_windows(now, BASELINE_WINDOWS)
        .iter()
        .filter(|(_, end)| first_reading.is_some_and(|first| *end > first))
        .map(|(start, end)| {
            scoped
                .iter()
                .filter(|r| r.ended_at >= *start && r.ended_at < *end)
                .map(|r| r.energy_kwh)
                .sum::<f64>()
        })
        .collect();
    let baseline_kwh = if baseline_windows.is_empty() {
        0.0
    } else {
        baseline_windows.iter().sum::<f64>() / baseline_windows.len() as f64
    };

    PeriodUsage {
        window_start,
        energy_kwh: energy_kwh + live.energy_kwh.max(0.0),
        cost: cost + live.cost.max(0.0),
        baseline_kwh,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Disabled,
    /// Rule already fired in the current window
    AlreadyTriggered,
    /// No data or mechanism to judge the rule
    NotEvaluated,
    Within { observed: f64, limit: f64 },
    Triggered { observed: f64, limit: f64 },
}

pub fn evaluate_rule(rule: &AlertRule, usage: &PeriodUsage, now: DateTime<Utc>) -> Evaluation {
    if !rule.is_enabled {
        return Evaluation::Disabled;
    }

    let scale = rule.threshold_pct / 100.0;
    let (observed, limit) = match rule.alert_type {
        AlertType::UsageLimit => match rule.limit_kwh {
            Some(limit) => (usage.energy_kwh, limit * scale),
            None => return Evaluation::NotEvaluated,
        },
        AlertType::CostLimit => match rule.limit_cost {
            Some(limit) => (usage.cost, limit * scale),
            None => return Evaluation::NotEvaluated,
        },
        AlertType::UnusualActivity => {
            if usage.baseline_kwh <= 0.0 {
                return Evaluation::NotEvaluated;
            }
            (usage.energy_kwh, usage.baseline_kwh * scale)
        }
        AlertType::DeviceOffline => return Evaluation::NotEvaluated,
    };

    let window_start = rule.period.window_start(now);
    if rule.last_triggered.is_some_and(|t| t >= window_start) {
        return Evaluation::AlreadyTriggered;
    }

    if observed >= limit {
        Evaluation::Triggered { observed, limit }
    } else {
        Evaluation::Within { observed, limit }
    }
}

pub fn record_trigger(rule: &mut AlertRule, now: DateTime<Utc>) {
    rule.trigger_count = rule.trigger_count.saturating_add(1);
    rule.last_triggered = Some(now);
    rule.updated_at = now;
}

fn describe(rule: &AlertRule, observed: f64, limit: f64) -> String {
    let period = rule.period.as_str();
    match rule.alert_type {
        AlertType::UsageLimit => format!(
            "{}: {} usage of {:.2} kWh reached the {:.2} kWh limit",
            rule.name, period, observed, limit
        ),
        AlertType::CostLimit => format!(
            "{}: {} cost of {:.2} reached the {:.2} limit",
            rule.name, period, observed, limit
        ),
        AlertType::UnusualActivity => format!(
            "{}: {} usage of {:.2} kWh is unusually high (typical {:.2} kWh)",
            rule.name,
            period,
            observed,
            limit * 100.0 / rule.threshold_pct
        ),
        AlertType::DeviceOffline => format!("{}: device appears offline", rule.name),
    }
}

/// Build the alert record for a triggered evaluation
pub fn new_triggered_alert(
    rule: &AlertRule,
    evaluation: &Evaluation,
    alert_id: String,
    now: DateTime<Utc>,
) -> Option<TriggeredAlert> {
    let Evaluation::Triggered { observed, limit } = *evaluation else {
        return None;
    };

    Some(TriggeredAlert {
        alert_id,
        rule_id: rule.rule_id.clone(),
        owner_id: rule.owner_id.clone(),
        home_id: rule.home_id.clone(),
        device_id: rule.device_id.clone(),
        alert_type: rule.alert_type,
        message: describe(rule, observed, limit),
        observed_value: observed,
        limit_value: limit,
        triggered_at: now,
        acknowledged: false,
        acknowledged_at: None,
    })
}

/// Mark an alert acknowledged. Returns false when it already was, leaving the
/// original acknowledgement time intact.
pub fn acknowledge(alert: &mut TriggeredAlert, now: DateTime<Utc>) -> bool {
    if alert.acknowledged {
        return false;
    }
    alert.acknowledged = true;
    alert.acknowledged_at = Some(now);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ReadingSource;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn rule(alert_type: AlertType, period: AlertPeriod) -> AlertRule {
        let created = at(2024, 1, 1, 0, 0);
        AlertRule {
            rule_id: "rule_1".to_string(),
            owner_id: "user_1".to_string(),
            home_id: "home_1".to_string(),
            device_id: None,
            name: "Cap".to_string(),
            alert_type,
            limit_kwh: Some(10.0),
            limit_cost: Some(100.0),
            period,
            threshold_pct: 100.0,
            is_enabled: true,
            trigger_count: 0,
            last_triggered: None,
            created_at: created,
            updated_at: created,
        }
    }

    fn reading(device_id: &str, ended_at: DateTime<Utc>, energy_kwh: f64, cost: f64) -> Reading {
        Reading {
            reading_id: format!("rdg_{}", ended_at.timestamp()),
            device_id: device_id.to_string(),
            home_id: "home_1".to_string(),
            started_at: ended_at - Duration::hours(1),
            ended_at,
            duration_minutes: 60.0,
            energy_kwh,
            cost,
            source: ReadingSource::Session,
            recorded_at: ended_at,
        }
    }

    #[test]
    fn test_window_starts() {
        // Wednesday
        let now = at(2024, 1, 17, 14, 35);
        assert_eq!(AlertPeriod::Hourly.window_start(now), at(2024, 1, 17, 14, 0));
        assert_eq!(AlertPeriod::Daily.window_start(now), at(2024, 1, 17, 0, 0));
        assert_eq!(AlertPeriod::Weekly.window_start(now), at(2024, 1, 15, 0, 0));
        assert_eq!(AlertPeriod::Monthly.window_start(now), at(2024, 1, 1, 0, 0));
    }

    #[test]
    fn test_weekly_window_on_monday_and_sunday() {
        assert_eq!(
            AlertPeriod::Weekly.window_start(at(2024, 1, 15, 0, 0)),
            at(2024, 1, 15, 0, 0)
        );
        assert_eq!(
            AlertPeriod::Weekly.window_start(at(2024, 1, 21, 23, 59)),
            at(2024, 1, 15, 0, 0)
        );
    }

    #[test]
    fn test_preceding_monthly_windows_cross_year() {
        let windows = AlertPeriod::Monthly.preceding_windows(at(2024, 2, 10, 0, 0), 3);
        assert_eq!(windows[0], (at(2024, 1, 1, 0, 0), at(2024, 2, 1, 0, 0)));
        assert_eq!(windows[1], (at(2023, 12, 1, 0, 0), at(2024, 1, 1, 0, 0)));
        assert_eq!(windows[2], (at(2023, 11, 1, 0, 0), at(2023, 12, 1, 0, 0)));
        assert_eq!(
            AlertPeriod::Monthly.history_start(at(2024, 2, 10, 0, 0)),
            at(2023, 10, 1, 0, 0)
        );
    }

    #[test]
    fn test_validate_rule() {
        assert!(validate_rule(&rule(AlertType::UsageLimit, AlertPeriod::Daily)).is_ok());

        let mut r = rule(AlertType::UsageLimit, AlertPeriod::Daily);
        r.limit_kwh = None;
        assert_eq!(validate_rule(&r).unwrap_err().field, "limit_kwh");

        let mut r = rule(AlertType::CostLimit, AlertPeriod::Daily);
        r.limit_cost = Some(0.0);
        assert_eq!(validate_rule(&r).unwrap_err().field, "limit_cost");

        let mut r = rule(AlertType::UnusualActivity, AlertPeriod::Daily);
        r.limit_kwh = None;
        r.threshold_pct = 0.0;
        assert_eq!(validate_rule(&r).unwrap_err().field, "threshold_pct");
    }

    #[test]
    fn test_summarize_scopes_and_windows() {
        let now = at(2024, 1, 17, 14, 0);
        let readings = vec![
            reading("dev_a", at(2024, 1, 17, 9, 0), 4.0, 24.0),
            reading("dev_b", at(2024, 1, 17, 10, 0), 3.0, 18.0),
            // Previous day, counts only toward the baseline
            reading("dev_a", at(2024, 1, 16, 10, 0), 8.0, 48.0),
        ];

        let home_rule = rule(AlertType::UsageLimit, AlertPeriod::Daily);
        let usage = summarize_usage(&home_rule, &readings, LiveUsage::default(), now);
        assert_eq!(usage.window_start, at(2024, 1, 17, 0, 0));
        assert_relative_eq!(usage.energy_kwh, 7.0);
        assert_relative_eq!(usage.cost, 42.0);
        // History starts yesterday, so the baseline is that one day
        assert_relative_eq!(usage.baseline_kwh, 8.0);

        let mut device_rule = home_rule.clone();
        device_rule.device_id = Some("dev_b".to_string());
        let usage = summarize_usage(
            &device_rule,
            &readings,
            LiveUsage {
                energy_kwh: 0.5,
                cost: 3.0,
            },
            now,
        );
        assert_relative_eq!(usage.energy_kwh, 3.5);
        assert_relative_eq!(usage.cost, 21.0);
    }

    #[test]
    fn test_usage_limit_respects_threshold_pct() {
        let now = at(2024, 1, 17, 14, 0);
        let mut r = rule(AlertType::UsageLimit, AlertPeriod::Daily);
        r.threshold_pct = 80.0;
        let usage = PeriodUsage {
            window_start: at(2024, 1, 17, 0, 0),
            energy_kwh: 8.0,
            cost: 0.0,
            baseline_kwh: 0.0,
        };

        assert_eq!(
            evaluate_rule(&r, &usage, now),
            Evaluation::Triggered {
                observed: 8.0,
                limit: 8.0
            }
        );

        let below = PeriodUsage {
            energy_kwh: 7.9,
            ..usage
        };
        assert!(matches!(
            evaluate_rule(&r, &below, now),
            Evaluation::Within { .. }
        ));
    }

    #[test]
    fn test_cost_limit() {
        let now = at(2024, 1, 17, 14, 0);
        let r = rule(AlertType::CostLimit, AlertPeriod::Monthly);
        let usage = PeriodUsage {
            window_start: at(2024, 1, 1, 0, 0),
            energy_kwh: 1.0,
            cost: 120.0,
            baseline_kwh: 0.0,
        };
        assert!(matches!(
            evaluate_rule(&r, &usage, now),
            Evaluation::Triggered { .. }
        ));
    }

    #[test]
    fn test_baseline_skips_windows_before_first_reading() {
        let now = at(2024, 1, 17, 14, 0);
        let r = rule(AlertType::UnusualActivity, AlertPeriod::Daily);

        // Only the two days before today have any history
        let young = vec![
            reading("dev_a", at(2024, 1, 15, 20, 0), 3.0, 0.0),
            reading("dev_a", at(2024, 1, 16, 20, 0), 5.0, 0.0),
        ];
        let usage = summarize_usage(&r, &young, LiveUsage::default(), now);
        assert_relative_eq!(usage.baseline_kwh, 4.0);

        // A quiet day after the first reading still counts
        let with_gap = vec![
            reading("dev_a", at(2024, 1, 14, 20, 0), 8.0, 0.0),
            reading("dev_a", at(2024, 1, 16, 20, 0), 4.0, 0.0),
        ];
        let usage = summarize_usage(&r, &with_gap, LiveUsage::default(), now);
        assert_relative_eq!(usage.baseline_kwh, 4.0);

        let usage = summarize_usage(&r, &[], LiveUsage::default(), now);
        assert_eq!(usage.baseline_kwh, 0.0);
    }

    #[test]
    fn test_unusual_activity_needs_baseline() {
        let now = at(2024, 1, 17, 14, 0);
        let mut r = rule(AlertType::UnusualActivity, AlertPeriod::Daily);
        r.threshold_pct = 150.0;

        let no_history = PeriodUsage {
            window_start: at(2024, 1, 17, 0, 0),
            energy_kwh: 50.0,
            cost: 0.0,
            baseline_kwh: 0.0,
        };
        assert_eq!(evaluate_rule(&r, &no_history, now), Evaluation::NotEvaluated);

        let spike = PeriodUsage {
            baseline_kwh: 4.0,
            energy_kwh: 6.0,
            ..no_history.clone()
        };
        assert_eq!(
            evaluate_rule(&r, &spike, now),
            Evaluation::Triggered {
                observed: 6.0,
                limit: 6.0
            }
        );
    }

    #[test]
    fn test_device_offline_is_never_triggered() {
        let now = at(2024, 1, 17, 14, 0);
        let r = rule(AlertType::DeviceOffline, AlertPeriod::Hourly);
        let usage = PeriodUsage {
            window_start: now,
            energy_kwh: 1000.0,
            cost: 1000.0,
            baseline_kwh: 1.0,
        };
        assert_eq!(evaluate_rule(&r, &usage, now), Evaluation::NotEvaluated);
    }

    #[test]
    fn test_disabled_and_already_triggered() {
        let now = at(2024, 1, 17, 14, 0);
        let usage = PeriodUsage {
            window_start: at(2024, 1, 17, 0, 0),
            energy_kwh: 50.0,
            cost: 0.0,
            baseline_kwh: 0.0,
        };

        let mut r = rule(AlertType::UsageLimit, AlertPeriod::Daily);
        r.is_enabled = false;
        assert_eq!(evaluate_rule(&r, &usage, now), Evaluation::Disabled);

        let mut r = rule(AlertType::UsageLimit, AlertPeriod::Daily);
        record_trigger(&mut r, at(2024, 1, 17, 9, 0));
        assert_eq!(r.trigger_count, 1);
        assert_eq!(evaluate_rule(&r, &usage, now), Evaluation::AlreadyTriggered);

        // Next day the rule may fire again
        let tomorrow = at(2024, 1, 18, 9, 0);
        assert!(matches!(
            evaluate_rule(&r, &usage, tomorrow),
            Evaluation::Triggered { .. }
        ));
    }

    #[test]
    fn test_new_triggered_alert_only_for_triggered() {
        let now = at(2024, 1, 17, 14, 0);
        let r = rule(AlertType::UsageLimit, AlertPeriod::Daily);

        let within = Evaluation::Within {
            observed: 1.0,
            limit: 10.0,
        };
        assert!(new_triggered_alert(&r, &within, "alert_1".to_string(), now).is_none());

        let fired = Evaluation::Triggered {
            observed: 12.5,
            limit: 10.0,
        };
        let alert = new_triggered_alert(&r, &fired, "alert_1".to_string(), now).unwrap();
        assert_eq!(alert.rule_id, "rule_1");
        assert!(!alert.acknowledged);
        assert_eq!(alert.observed_value, 12.5);
        assert!(alert.message.contains("12.50 kWh"));
    }

    #[test]
    fn test_acknowledge_is_idempotent() {
        let now = at(2024, 1, 17, 14, 0);
        let r = rule(AlertType::UsageLimit, AlertPeriod::Daily);
        let fired = Evaluation::Triggered {
            observed: 12.0,
            limit: 10.0,
        };
        let mut alert = new_triggered_alert(&r, &fired, "alert_1".to_string(), now).unwrap();

        let first = now + Duration::minutes(5);
        assert!(acknowledge(&mut alert, first));
        assert_eq!(alert.acknowledged_at, Some(first));

        assert!(!acknowledge(&mut alert, now + Duration::hours(1)));
        assert!(alert.acknowledged);
        assert_eq!(alert.acknowledged_at, Some(first));
    }
}
