use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ActivationState, Device, Tariff};
use crate::tariff::marginal_charge;

/// Consumption of the session currently in progress on a device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConsumption {
    pub device_id: String,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub duration_minutes: f64,
    pub energy_kwh: f64,
    pub cost: f64,
    /// Instantaneous draw in watts, 0 when off
    pub current_power_w: f64,
    pub currency: String,
}

/// Wattage usable in calculations. Negative, NaN and infinite values count as 0.
pub fn sanitize_wattage(wattage: f64) -> f64 {
    if wattage.is_finite() && wattage > 0.0 {
        wattage
    } else {
        0.0
    }
}

/// Hours between `since` and `now`, never negative
pub fn elapsed_hours(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - since).num_milliseconds();
    if millis <= 0 {
        return 0.0;
    }
    millis as f64 / 3_600_000.0
}

/// kWh drawn by a `wattage` W load running for `hours`
pub fn energy_kwh(wattage: f64, hours: f64) -> f64 {
    if !hours.is_finite() || hours <= 0.0 {
        return 0.0;
    }
    sanitize_wattage(wattage) * hours / 1000.0
}

/// Live consumption of the device's current session.
///
/// `month_to_date_kwh` is the home's usage already billed this month; slab
/// tariffs price the session at the margin on top of it.
pub fn session_consumption(
    device: &Device,
    tariff: &Tariff,
    month_to_date_kwh: f64,
    now: DateTime<Utc>,
) -> SessionConsumption {
    let mut consumption = SessionConsumption {
        device_id: device.device_id.clone(),
        is_active: false,
        started_at: None,
        duration_minutes: 0.0,
        energy_kwh: 0.0,
        cost: 0.0,
        current_power_w: 0.0,
        currency: tariff.currency.clone(),
    };

    if let ActivationState::On { since } = device.activation() {
        let hours = elapsed_hours(since, now);
        let energy = energy_kwh(device.wattage, hours);

        consumption.is_active = true;
        consumption.started_at = Some(since);
        consumption.duration_minutes = hours * 60.0;
        consumption.energy_kwh = energy;
        consumption.cost = marginal_charge(tariff, month_to_date_kwh, energy);
        consumption.current_power_w = sanitize_wattage(device.wattage);
    }

    consumption
}

/// Live consumption of several devices on one meter. Each session is priced
/// on top of the stored usage plus the sessions before it, so the costs sum
/// to the marginal charge of the combined live energy.
pub fn live_consumption<'a>(
    devices: impl IntoIterator<Item = &'a Device>,
    tariff: &Tariff,
    month_to_date_kwh: f64,
    now: DateTime<Utc>,
) -> Vec<SessionConsumption> {
    let mut prior_kwh = month_to_date_kwh;
    devices
        .into_iter()
        .map(|device| {
            let consumption = session_consumption(device, tariff, prior_kwh, now);
            prior_kwh += consumption.energy_kwh;
            consumption
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TariffSlab;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn device(wattage: f64, on_since: Option<DateTime<Utc>>) -> Device {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Device {
            device_id: "dev_1".to_string(),
            home_id: "home_1".to_string(),
            owner_id: "user_1".to_string(),
            name: "Lamp".to_string(),
            wattage,
            category: "lighting".to_string(),
            device_type: "lamp".to_string(),
            location: None,
            template_id: None,
            is_active: on_since.is_some(),
            last_turned_on: on_since,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_hundred_watts_for_half_an_hour() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let now = start + Duration::minutes(30);

        let c = session_consumption(&device(100.0, Some(start)), &Tariff::flat(6.0), 0.0, now);
        assert!(c.is_active);
        assert_relative_eq!(c.duration_minutes, 30.0);
        assert_relative_eq!(c.energy_kwh, 0.05, epsilon = 1e-12);
        assert_relative_eq!(c.cost, 0.30, epsilon = 1e-12);
        assert_relative_eq!(c.current_power_w, 100.0);
    }

    #[test]
    fn test_two_kilowatts_for_two_hours() {
        assert_relative_eq!(energy_kwh(2000.0, 2.0), 4.0);
    }

    #[test]
    fn test_inactive_device_reports_zeros() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let c = session_consumption(&device(100.0, None), &Tariff::flat(6.0), 0.0, now);
        assert!(!c.is_active);
        assert_eq!(c.energy_kwh, 0.0);
        assert_eq!(c.cost, 0.0);
        assert_eq!(c.current_power_w, 0.0);
        assert!(c.started_at.is_none());
    }

    #[test]
    fn test_active_flag_without_start_time_reports_zeros() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let mut d = device(100.0, None);
        d.is_active = true;
        let c = session_consumption(&d, &Tariff::flat(6.0), 0.0, now);
        assert!(!c.is_active);
        assert_eq!(c.energy_kwh, 0.0);
    }

    #[test]
    fn test_bad_wattage_treated_as_zero() {
        assert_eq!(sanitize_wattage(-50.0), 0.0);
        assert_eq!(sanitize_wattage(f64::NAN), 0.0);
        assert_eq!(sanitize_wattage(f64::INFINITY), 0.0);
        assert_eq!(energy_kwh(-100.0, 3.0), 0.0);
    }

    #[test]
    fn test_clock_skew_yields_zero_duration() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let before = start - Duration::minutes(5);
        assert_eq!(elapsed_hours(start, before), 0.0);

        let c = session_consumption(&device(100.0, Some(start)), &Tariff::flat(6.0), 0.0, before);
        assert!(c.is_active);
        assert_eq!(c.energy_kwh, 0.0);
        assert_eq!(c.duration_minutes, 0.0);
    }

    #[test]
    fn test_slab_session_cost_is_marginal() {
        let tariff = Tariff::slab(vec![
            TariffSlab::new(0.0, Some(100.0), 3.0),
            TariffSlab::new(100.0, None, 5.0),
        ]);
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        // 2 kW for 5 h = 10 kWh
        let now = start + Duration::hours(5);
        let d = device(2000.0, Some(start));

        let fresh = session_consumption(&d, &tariff, 0.0, now);
        assert_relative_eq!(fresh.cost, 30.0);

        let later_in_month = session_consumption(&d, &tariff, 95.0, now);
        // 5 kWh at 3 + 5 kWh at 5
        assert_relative_eq!(later_in_month.cost, 40.0);
    }

    #[test]
    fn test_concurrent_sessions_share_slab_headroom() {
        let tariff = Tariff::slab(vec![
            TariffSlab::new(0.0, Some(100.0), 3.0),
            TariffSlab::new(100.0, None, 5.0),
        ]);
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let now = start + Duration::hours(5);
        let heater = device(1000.0, Some(start));
        let mut kettle = device(1000.0, Some(start));
        kettle.device_id = "dev_2".to_string();

        let live = live_consumption([&heater, &kettle], &tariff, 95.0, now);
        assert_eq!(live.len(), 2);
        // 5 kWh left in the cheap slab, then 5 kWh at 5
        assert_relative_eq!(live[0].cost, 15.0, epsilon = 1e-9);
        assert_relative_eq!(live[1].cost, 25.0, epsilon = 1e-9);
        let total: f64 = live.iter().map(|c| c.cost).sum();
        assert_relative_eq!(total, marginal_charge(&tariff, 95.0, 10.0), epsilon = 1e-9);
    }
}
