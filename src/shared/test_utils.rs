//! Test utilities for property-based and scenario tests
//!
//! Generators for wattages, durations, timestamps and tariffs, plus fixtures
//! that build complete domain objects with sensible defaults.

pub mod generators {
    use chrono::{DateTime, Utc};
    use proptest::prelude::*;

    use crate::domain::{Tariff, TariffSlab};

    /// Realistic appliance wattage, 0 W to 100 kW
    pub fn wattage() -> impl Strategy<Value = f64> {
        prop_oneof![0.0..=100_000.0f64, Just(0.0), Just(100_000.0)]
    }

    /// Wattages the calculator must treat as 0
    pub fn unusable_wattage() -> impl Strategy<Value = f64> {
        prop_oneof![
            -100_000.0..-0.001f64,
            Just(f64::NAN),
            Just(f64::INFINITY),
            Just(f64::NEG_INFINITY),
        ]
    }

    /// Session length in minutes, up to 31 days
    pub fn elapsed_minutes() -> impl Strategy<Value = i64> {
        0i64..=(31 * 24 * 60)
    }

    /// Instant between 2020-01-01 and 2030-12-31
    pub fn timestamp() -> impl Strategy<Value = DateTime<Utc>> {
        (1_577_836_800i64..1_924_991_999i64)
            .prop_map(|secs| DateTime::from_timestamp(secs, 0).unwrap_or_default())
    }

    /// Per-kWh rate
    pub fn rate() -> impl Strategy<Value = f64> {
        0.0..=50.0f64
    }

    pub fn flat_tariff() -> impl Strategy<Value = Tariff> {
        (rate(), 0.0..=500.0f64)
            .prop_map(|(rate, fixed)| Tariff::flat(rate).with_fixed_charges(fixed))
    }

    /// Valid slab tariff: 1-5 contiguous slabs starting at 0, last unbounded
    pub fn slab_tariff() -> impl Strategy<Value = Tariff> {
        prop::collection::vec((1.0..=500.0f64, rate()), 1..=5).prop_map(|bands| {
            let mut slabs = Vec::with_capacity(bands.len());
            let mut min_units = 0.0;
            let last = bands.len() - 1;
            for (i, (width, rate)) in bands.into_iter().enumerate() {
                if i == last {
                    slabs.push(TariffSlab::new(min_units, None, rate));
                } else {
                    let max_units = min_units + width;
                    slabs.push(TariffSlab::new(min_units, Some(max_units), rate));
                    min_units = max_units;
                }
            }
            Tariff::slab(slabs)
        })
    }

    pub fn any_tariff() -> impl Strategy<Value = Tariff> {
        prop_oneof![flat_tariff(), slab_tariff()]
    }

    /// Monthly usage in kWh
    pub fn units() -> impl Strategy<Value = f64> {
        0.0..=5_000.0f64
    }
}

pub mod fixtures {
    use chrono::{DateTime, Duration, Utc};

    use crate::domain::{
        AlertPeriod, AlertRule, AlertType, Device, Home, Reading, ReadingSource, Tariff,
    };

    pub fn home(home_id: &str, owner_id: &str, tariff: Tariff, at: DateTime<Utc>) -> Home {
        Home {
            home_id: home_id.to_string(),
            owner_id: owner_id.to_string(),
            name: "Test Home".to_string(),
            address: "12 MG Road".to_string(),
            tariff,
            created_at: at,
            updated_at: at,
        }
    }

    /// An inactive device in `home`
    pub fn device(device_id: &str, home: &Home, wattage: f64, at: DateTime<Utc>) -> Device {
        Device {
            device_id: device_id.to_string(),
            home_id: home.home_id.clone(),
            owner_id: home.owner_id.clone(),
            name: format!("Device {}", device_id),
            wattage,
            category: "general".to_string(),
            device_type: "appliance".to_string(),
            location: None,
            template_id: None,
            is_active: false,
            last_turned_on: None,
            created_at: at,
            updated_at: at,
        }
    }

    /// A stored session reading ending at `ended_at`
    pub fn reading(
        device: &Device,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        energy_kwh: f64,
        cost: f64,
    ) -> Reading {
        Reading {
            reading_id: format!("rdg_{}_{}", device.device_id, ended_at.timestamp()),
            device_id: device.device_id.clone(),
            home_id: device.home_id.clone(),
            started_at,
            ended_at,
            duration_minutes: (ended_at - started_at).num_seconds() as f64 / 60.0,
            energy_kwh,
            cost,
            source: ReadingSource::Session,
            recorded_at: ended_at,
        }
    }

    pub fn usage_rule(home: &Home, limit_kwh: f64, period: AlertPeriod, at: DateTime<Utc>) -> AlertRule {
        AlertRule {
            rule_id: "rule_1".to_string(),
            owner_id: home.owner_id.clone(),
            home_id: home.home_id.clone(),
            device_id: None,
            name: "Usage cap".to_string(),
            alert_type: AlertType::UsageLimit,
            limit_kwh: Some(limit_kwh),
            limit_cost: None,
            period,
            threshold_pct: 100.0,
            is_enabled: true,
            trigger_count: 0,
            last_triggered: None,
            created_at: at - Duration::days(30),
            updated_at: at - Duration::days(30),
        }
    }
}
