use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consumption::{elapsed_hours, energy_kwh, live_consumption, sanitize_wattage};
use crate::domain::{ActivationState, Device, Home, Reading, TariffStructure};
use crate::tariff::{energy_charge, monthly_bill, slab_index_for, Bill};
use crate::time::{month_start, next_month_start};

/// Share of monthly energy above which a device is called out
pub const HIGH_SHARE_PCT: f64 = 40.0;
/// Average daily runtime above which a device is called out
pub const LONG_RUNTIME_HOURS_PER_DAY: f64 = 12.0;
/// Live session length above which a device is reported as left on
pub const LEFT_ON_HOURS: f64 = 8.0;
/// Distance to the next slab boundary, as a fraction of it, that triggers a warning
pub const SLAB_PROXIMITY_FRACTION: f64 = 0.10;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReportError {
    #[error("Invalid report month {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },

    #[error("Report month {year}-{month:02} has not started yet")]
    FutureMonth { year: i32, month: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceBreakdown {
    pub device_id: String,
    pub name: String,
    pub category: String,
    pub energy_kwh: f64,
    pub cost: f64,
    pub share_pct: f64,
    pub session_count: u32,
    pub runtime_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub energy_kwh: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TipKind {
    HighShare,
    LongRuntime,
    LeftOn,
    NearSlabBoundary,
    SlabOvershoot,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavingsTip {
    pub kind: TipKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_saving: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyReport {
    pub home_id: String,
    pub home_name: String,
    pub year: i32,
    pub month: u32,
    pub period_start: DateTime<Utc>,
    /// End of the month, or the generation time for the month in progress
    pub period_end: DateTime<Utc>,
    pub total_energy_kwh: f64,
    pub bill: Bill,
    pub devices: Vec<DeviceBreakdown>,
    pub daily: Vec<DailyUsage>,
    pub tips: Vec<SavingsTip>,
    pub generated_at: DateTime<Utc>,
}

/// Dashboard figures for a home
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HomeSummary {
    pub home_id: String,
    pub total_devices: usize,
    pub active_devices: usize,
    pub current_load_w: f64,
    pub live_energy_kwh: f64,
    pub live_cost: f64,
    pub month_to_date_kwh: f64,
    pub month_to_date_cost: f64,
    pub projected_month_kwh: f64,
    pub projected_bill: Bill,
    pub as_of: DateTime<Utc>,
}

/// `[start, end)` of a calendar month in UTC
pub fn month_bounds(year: i32, month: u32) -> Result<(DateTime<Utc>, DateTime<Utc>), ReportError> {
    let invalid = ReportError::InvalidMonth { year, month };
    let start = month_start(year, month).ok_or_else(|| invalid.clone())?;
    let end = next_month_start(start).ok_or(invalid)?;
    Ok((start, end))
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn span_nanos(span: Duration) -> f64 {
    span.num_nanoseconds()
        .map_or_else(|| span.num_milliseconds() as f64 * 1e6, |n| n as f64)
}

/// Share of `whole` covered by `part`, `None` when `whole` is empty
fn time_fraction(part: Duration, whole: Duration) -> Option<f64> {
    let whole = span_nanos(whole);
    (whole > 0.0).then(|| (span_nanos(part) / whole).clamp(0.0, 1.0))
}

/// Spread `kwh` over the UTC days touched by `[start, end)` in proportion to
/// time spent in each. A zero-length interval lands entirely on its day.
pub fn split_by_day(start: DateTime<Utc>, end: DateTime<Utc>, kwh: f64) -> Vec<(NaiveDate, f64)> {
    let total = end - start;
    if span_nanos(total) <= 0.0 {
        return vec![(start.date_naive(), kwh)];
    }

    let mut parts = Vec::new();
    let mut cursor = start;
    while cursor < end {
        let date = cursor.date_naive();
        let next_midnight = day_start(date) + Duration::days(1);
        let piece_end = next_midnight.min(end);
        let fraction = time_fraction(piece_end - cursor, total).unwrap_or(0.0);
        parts.push((date, kwh * fraction));
        cursor = piece_end;
    }
    parts
}

/// Part of a session that falls inside a reporting window
#[derive(Debug, Clone)]
struct Segment {
    device_id: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    energy_kwh: f64,
}

/// Clip a stored reading to `[from, to)`, scaling energy by the overlap
fn clip_reading(reading: &Reading, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<Segment> {
    if reading.ended_at <= reading.started_at {
        return (reading.ended_at >= from && reading.ended_at < to).then(|| Segment {
            device_id: reading.device_id.clone(),
            start: reading.ended_at,
            end: reading.ended_at,
            energy_kwh: reading.energy_kwh,
        });
    }

    let start = reading.started_at.max(from);
    let end = reading.ended_at.min(to);
    if end <= start {
        return None;
    }

    let fraction =
        time_fraction(end - start, reading.ended_at - reading.started_at).unwrap_or(1.0);
    Some(Segment {
        device_id: reading.device_id.clone(),
        start,
        end,
        energy_kwh: reading.energy_kwh * fraction,
    })
}

/// The in-progress session of `device` clipped to `[from, now]`
fn live_segment(device: &Device, from: DateTime<Utc>, now: DateTime<Utc>) -> Option<Segment> {
    let ActivationState::On { since } = device.activation() else {
        return None;
    };
    let start = since.max(from);
    if now <= start {
        return None;
    }
    Some(Segment {
        device_id: device.device_id.clone(),
        start,
        end: now,
        energy_kwh: energy_kwh(device.wattage, elapsed_hours(start, now)),
    })
}

/// kWh already stored for the calendar month containing `now`, attributed by
/// reading end time
pub fn month_to_date_kwh(readings: &[Reading], now: DateTime<Utc>) -> f64 {
    let Some(start) = month_start(now.year(), now.month()) else {
        return 0.0;
    };
    readings
        .iter()
        .filter(|r| r.ended_at >= start && r.ended_at <= now)
        .map(|r| r.energy_kwh.max(0.0))
        .sum()
}

#[derive(Default)]
struct DeviceTotals {
    energy_kwh: f64,
    session_count: u32,
    runtime_hours: f64,
}

pub fn build_monthly_report(
    home: &Home,
    devices: &[Device],
    readings: &[Reading],
    year: i32,
    month: u32,
    now: DateTime<Utc>,
) -> Result<MonthlyReport, ReportError> {
    let (start, end) = month_bounds(year, month)?;
    if now < start {
        return Err(ReportError::FutureMonth { year, month });
    }
    let period_end = end.min(now);

    let mut segments: Vec<Segment> = readings
        .iter()
        .filter(|r| r.home_id == home.home_id)
        .filter_map(|r| clip_reading(r, start, end))
        .collect();
    let mut live_hours: BTreeMap<String, f64> = BTreeMap::new();
    if now < end {
        for device in devices.iter().filter(|d| d.home_id == home.home_id) {
            if let Some(segment) = live_segment(device, start, now) {
                if let ActivationState::On { since } = device.activation() {
                    live_hours.insert(device.device_id.clone(), elapsed_hours(since, now));
                }
                segments.push(segment);
            }
        }
    }

    let mut per_device: BTreeMap<String, DeviceTotals> = BTreeMap::new();
    let mut per_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for segment in &segments {
        let totals = per_device.entry(segment.device_id.clone()).or_default();
        totals.energy_kwh += segment.energy_kwh;
        totals.session_count += 1;
        totals.runtime_hours += elapsed_hours(segment.start, segment.end);

        for (date, kwh) in split_by_day(segment.start, segment.end, segment.energy_kwh) {
            *per_day.entry(date).or_insert(0.0) += kwh;
        }
    }

    let total_energy_kwh: f64 = per_device.values().map(|t| t.energy_kwh).sum();
    let bill = monthly_bill(&home.tariff, total_energy_kwh);
    let allocate = |kwh: f64| {
        if total_energy_kwh > 0.0 {
            bill.energy_charge * kwh / total_energy_kwh
        } else {
            0.0
        }
    };

    let mut breakdown: Vec<DeviceBreakdown> = per_device
        .iter()
        .map(|(device_id, totals)| {
            let device = devices.iter().find(|d| d.device_id == *device_id);
            DeviceBreakdown {
                device_id: device_id.clone(),
                name: device.map_or_else(|| device_id.clone(), |d| d.name.clone()),
                category: device.map_or_else(|| "unknown".to_string(), |d| d.category.clone()),
                energy_kwh: totals.energy_kwh,
                cost: allocate(totals.energy_kwh),
                share_pct: if total_energy_kwh > 0.0 {
                    totals.energy_kwh / total_energy_kwh * 100.0
                } else {
                    0.0
                },
                session_count: totals.session_count,
                runtime_hours: totals.runtime_hours,
            }
        })
        .collect();
    breakdown.sort_by(|a, b| b.energy_kwh.total_cmp(&a.energy_kwh));

    let mut daily = Vec::new();
    if period_end > start {
        let last_day = (period_end - Duration::milliseconds(1)).date_naive();
        let mut date = start.date_naive();
        while date <= last_day {
            let kwh = per_day.get(&date).copied().unwrap_or(0.0);
            daily.push(DailyUsage {
                date,
                energy_kwh: kwh,
                cost: allocate(kwh),
            });
            date += Duration::days(1);
        }
    }

    let days_elapsed = (elapsed_hours(start, period_end) / 24.0).max(1.0 / 24.0);
    let tips = savings_tips(home, &breakdown, &live_hours, total_energy_kwh, days_elapsed);

    Ok(MonthlyReport {
        home_id: home.home_id.clone(),
        home_name: home.name.clone(),
        year,
        month,
        period_start: start,
        period_end,
        total_energy_kwh,
        bill,
        devices: breakdown,
        daily,
        tips,
        generated_at: now,
    })
}

fn savings_tips(
    home: &Home,
    breakdown: &[DeviceBreakdown],
    live_hours: &BTreeMap<String, f64>,
    total_energy_kwh: f64,
    days_elapsed: f64,
) -> Vec<SavingsTip> {
    let mut tips = Vec::new();

    for device in breakdown {
        if device.share_pct > HIGH_SHARE_PCT {
            tips.push(SavingsTip {
                kind: TipKind::HighShare,
                device_id: Some(device.device_id.clone()),
                message: format!(
                    "{} accounts for {:.0}% of this month's usage. Cutting its use has the biggest effect on your bill.",
                    device.name, device.share_pct
                ),
                estimated_saving: None,
            });
        }

        let hours_per_day = device.runtime_hours / days_elapsed;
        if hours_per_day > LONG_RUNTIME_HOURS_PER_DAY {
            tips.push(SavingsTip {
                kind: TipKind::LongRuntime,
                device_id: Some(device.device_id.clone()),
                message: format!(
                    "{} runs {:.1} hours a day on average. A timer or schedule could trim idle hours.",
                    device.name, hours_per_day
                ),
                estimated_saving: None,
            });
        }

        if let Some(hours) = live_hours.get(&device.device_id) {
            if *hours > LEFT_ON_HOURS {
                tips.push(SavingsTip {
                    kind: TipKind::LeftOn,
                    device_id: Some(device.device_id.clone()),
                    message: format!(
                        "{} has been on for {:.1} hours. Turn it off if it is not in use.",
                        device.name, hours
                    ),
                    estimated_saving: None,
                });
            }
        }
    }

    let tariff = &home.tariff;
    if tariff.structure == TariffStructure::Slab {
        if let Some(index) = slab_index_for(tariff, total_energy_kwh) {
            let current = &tariff.slabs[index];

            if let (Some(boundary), Some(next)) = (current.max_units, tariff.slabs.get(index + 1)) {
                let remaining = boundary - total_energy_kwh;
                if next.rate > current.rate
                    && remaining > 0.0
                    && remaining <= boundary * SLAB_PROXIMITY_FRACTION
                {
                    tips.push(SavingsTip {
                        kind: TipKind::NearSlabBoundary,
                        device_id: None,
                        message: format!(
                            "You are {:.1} kWh away from the next slab, where the rate rises from {:.2} to {:.2} per kWh.",
                            remaining, current.rate, next.rate
                        ),
                        estimated_saving: None,
                    });
                }
            }

            if index > 0 {
                let previous = &tariff.slabs[index - 1];
                let boundary = current.min_units;
                if current.rate > previous.rate && total_energy_kwh > boundary {
                    let saving = energy_charge(tariff, total_energy_kwh)
                        - energy_charge(tariff, boundary);
                    tips.push(SavingsTip {
                        kind: TipKind::SlabOvershoot,
                        device_id: None,
                        message: format!(
                            "Usage passed the {:.0} kWh slab boundary by {:.1} kWh. Staying under it would have saved {:.2} {}.",
                            boundary,
                            total_energy_kwh - boundary,
                            saving,
                            tariff.currency
                        ),
                        estimated_saving: Some(saving),
                    });
                }
            }
        }
    }

    tips
}

pub fn build_home_summary(
    home: &Home,
    devices: &[Device],
    month_readings: &[Reading],
    now: DateTime<Utc>,
) -> HomeSummary {
    let (start, end) = month_bounds(now.year(), now.month()).unwrap_or((now, now));

    let stored_kwh: f64 = month_readings
        .iter()
        .filter(|r| r.home_id == home.home_id)
        .filter_map(|r| clip_reading(r, start, end))
        .map(|s| s.energy_kwh)
        .sum();

    let home_devices: Vec<&Device> = devices
        .iter()
        .filter(|d| d.home_id == home.home_id)
        .collect();

    let sessions = live_consumption(home_devices.iter().copied(), &home.tariff, stored_kwh, now);

    let mut active_devices = 0;
    let mut current_load_w = 0.0;
    let mut live_energy_kwh = 0.0;
    let mut live_cost = 0.0;
    let mut live_in_month_kwh = 0.0;
    for (device, session) in home_devices.iter().zip(&sessions) {
        if !session.is_active {
            continue;
        }
        active_devices += 1;
        current_load_w += sanitize_wattage(device.wattage);
        live_energy_kwh += session.energy_kwh;
        live_cost += session.cost;
        if let Some(segment) = live_segment(device, start, now) {
            live_in_month_kwh += segment.energy_kwh;
        }
    }

    let month_to_date_kwh = stored_kwh + live_in_month_kwh;
    let elapsed = elapsed_hours(start, now);
    let month_hours = elapsed_hours(start, end);
    let projected_month_kwh = if elapsed > 0.0 {
        month_to_date_kwh * month_hours / elapsed
    } else {
        month_to_date_kwh
    };

    HomeSummary {
        home_id: home.home_id.clone(),
        total_devices: home_devices.len(),
        active_devices,
        current_load_w,
        live_energy_kwh,
        live_cost,
        month_to_date_kwh,
        month_to_date_cost: energy_charge(&home.tariff, month_to_date_kwh),
        projected_month_kwh,
        projected_bill: monthly_bill(&home.tariff, projected_month_kwh),
        as_of: now,
    }
}
