use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Tariff
// ============================================================================

/// How a home is billed for energy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TariffStructure {
    Flat,
    Slab,
}

impl TariffStructure {
    pub fn as_str(&self) -> &'static str {
        match self {
            TariffStructure::Flat => "flat",
            TariffStructure::Slab => "slab",
        }
    }
}

/// A pricing band covering `[min_units, max_units)` kWh of monthly usage.
/// `max_units = None` marks the open-ended top band.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TariffSlab {
    pub min_units: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_units: Option<f64>,
    pub rate: f64,
}

impl TariffSlab {
    pub fn new(min_units: f64, max_units: Option<f64>, rate: f64) -> Self {
        Self {
            min_units,
            max_units,
            rate,
        }
    }
}

/// Tariff configuration owned by a home
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tariff {
    pub structure: TariffStructure,
    /// Flat rate, currency per kWh
    #[serde(default)]
    pub electricity_rate: f64,
    #[serde(default)]
    pub slabs: Vec<TariffSlab>,
    /// Fixed monthly charges added to every bill
    #[serde(default)]
    pub fixed_charges: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "INR".to_string()
}

impl Tariff {
    pub fn flat(electricity_rate: f64) -> Self {
        Self {
            structure: TariffStructure::Flat,
            electricity_rate,
            slabs: Vec::new(),
            fixed_charges: 0.0,
            currency: default_currency(),
        }
    }

    pub fn slab(slabs: Vec<TariffSlab>) -> Self {
        Self {
            structure: TariffStructure::Slab,
            electricity_rate: 0.0,
            slabs,
            fixed_charges: 0.0,
            currency: default_currency(),
        }
    }

    pub fn with_fixed_charges(mut self, fixed_charges: f64) -> Self {
        self.fixed_charges = fixed_charges;
        self
    }
}

// ============================================================================
// Registry
// ============================================================================

/// A registered home
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Home {
    pub home_id: String,
    pub owner_id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub tariff: Tariff,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A smart device attached to a home
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub device_id: String,
    pub home_id: String,
    pub owner_id: String,
    pub name: String,
    /// Rated power in watts
    pub wattage: f64,
    pub category: String,
    pub device_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_turned_on: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Activation state of a device.
///
/// Stored as the `is_active` / `last_turned_on` pair; a record where the two
/// disagree reads as `Off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    Off,
    On { since: DateTime<Utc> },
}

impl Device {
    pub fn activation(&self) -> ActivationState {
        match (self.is_active, self.last_turned_on) {
            (true, Some(since)) => ActivationState::On { since },
            _ => ActivationState::Off,
        }
    }

    pub fn set_activation(&mut self, state: ActivationState) {
        match state {
            ActivationState::Off => {
                self.is_active = false;
                self.last_turned_on = None;
            }
            ActivationState::On { since } => {
                self.is_active = true;
                self.last_turned_on = Some(since);
            }
        }
    }
}

/// Catalog entry used to prefill new devices
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceTemplate {
    pub template_id: String,
    pub name: String,
    pub device_type: String,
    pub category: String,
    pub avg_wattage: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Readings
// ============================================================================

/// Where a reading came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReadingSource {
    /// Finalized when a device was toggled off
    Session,
    /// Entered by the user
    Manual,
}

/// Historical consumption record for a device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    pub reading_id: String,
    pub device_id: String,
    pub home_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_minutes: f64,
    pub energy_kwh: f64,
    pub cost: f64,
    pub source: ReadingSource,
    pub recorded_at: DateTime<Utc>,
}

impl Reading {
    /// Sort key used by the readings table: zero-padded end time, then id.
    pub fn sort_key(&self) -> String {
        format!(
            "{:013}#{}",
            self.ended_at.timestamp_millis(),
            self.reading_id
        )
    }
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    UsageLimit,
    CostLimit,
    UnusualActivity,
    DeviceOffline,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::UsageLimit => "usage_limit",
            AlertType::CostLimit => "cost_limit",
            AlertType::UnusualActivity => "unusual_activity",
            AlertType::DeviceOffline => "device_offline",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AlertPeriod {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl AlertPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertPeriod::Hourly => "hourly",
            AlertPeriod::Daily => "daily",
            AlertPeriod::Weekly => "weekly",
            AlertPeriod::Monthly => "monthly",
        }
    }
}

fn default_threshold_pct() -> f64 {
    100.0
}

/// User-defined alert threshold
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertRule {
    pub rule_id: String,
    pub owner_id: String,
    pub home_id: String,
    /// Device scope; the rule covers the whole home when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub name: String,
    pub alert_type: AlertType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_kwh: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_cost: Option<f64>,
    pub period: AlertPeriod,
    /// Percentage of the limit at which the rule fires
    #[serde(default = "default_threshold_pct")]
    pub threshold_pct: f64,
    pub is_enabled: bool,
    #[serde(default)]
    pub trigger_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_triggered: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A fired alert, mutated only by acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggeredAlert {
    pub alert_id: String,
    pub rule_id: String,
    pub owner_id: String,
    pub home_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub alert_type: AlertType,
    pub message: String,
    pub observed_value: f64,
    pub limit_value: f64,
    pub triggered_at: DateTime<Utc>,
    pub acknowledged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Accounts
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Stored login session; the raw token is never persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub token_hash: String,
    pub user_id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn device() -> Device {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        Device {
            device_id: "dev_1".to_string(),
            home_id: "home_1".to_string(),
            owner_id: "user_1".to_string(),
            name: "Heater".to_string(),
            wattage: 2000.0,
            category: "heating".to_string(),
            device_type: "heater".to_string(),
            location: None,
            template_id: None,
            is_active: false,
            last_turned_on: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_activation_requires_start_time() {
        let mut d = device();
        d.is_active = true;
        assert_eq!(d.activation(), ActivationState::Off);

        let since = Utc.with_ymd_and_hms(2024, 1, 15, 11, 0, 0).unwrap();
        d.set_activation(ActivationState::On { since });
        assert!(d.is_active);
        assert_eq!(d.activation(), ActivationState::On { since });

        d.set_activation(ActivationState::Off);
        assert!(!d.is_active);
        assert!(d.last_turned_on.is_none());
    }

    #[test]
    fn test_tariff_serialization() {
        let tariff = Tariff::slab(vec![
            TariffSlab::new(0.0, Some(100.0), 3.0),
            TariffSlab::new(100.0, None, 5.0),
        ]);
        let json = serde_json::to_string(&tariff).unwrap();
        assert!(json.contains(r#""structure":"slab""#));
        assert!(json.contains(r#""max_units":100.0"#));

        let back: Tariff = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tariff);
        assert!(back.slabs[1].max_units.is_none());
    }

    #[test]
    fn test_tariff_defaults_when_fields_missing() {
        let tariff: Tariff =
            serde_json::from_str(r#"{"structure":"flat","electricity_rate":6.0}"#).unwrap();
        assert_eq!(tariff.currency, "INR");
        assert_eq!(tariff.fixed_charges, 0.0);
        assert!(tariff.slabs.is_empty());
    }

    #[test]
    fn test_reading_sort_key_is_zero_padded() {
        let at = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
        let reading = Reading {
            reading_id: "rdg_1".to_string(),
            device_id: "dev_1".to_string(),
            home_id: "home_1".to_string(),
            started_at: at,
            ended_at: at,
            duration_minutes: 0.0,
            energy_kwh: 0.0,
            cost: 0.0,
            source: ReadingSource::Manual,
            recorded_at: at,
        };
        assert_eq!(reading.sort_key(), "0978307200000#rdg_1");
    }

    #[test]
    fn test_alert_enums_wire_names() {
        assert_eq!(
            serde_json::to_string(&AlertType::UnusualActivity).unwrap(),
            r#""unusual_activity""#
        );
        assert_eq!(AlertType::DeviceOffline.as_str(), "device_offline");
        assert_eq!(
            serde_json::to_string(&AlertPeriod::Weekly).unwrap(),
            r#""weekly""#
        );
    }

    #[test]
    fn test_alert_rule_threshold_defaults_to_full_limit() {
        let json = r#"{
            "rule_id": "rule_1", "owner_id": "user_1", "home_id": "home_1",
            "name": "Daily cap", "alert_type": "usage_limit", "limit_kwh": 10.0,
            "period": "daily", "is_enabled": true,
            "created_at": "2024-01-15T10:00:00Z", "updated_at": "2024-01-15T10:00:00Z"
        }"#;
        let rule: AlertRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.threshold_pct, 100.0);
        assert_eq!(rule.trigger_count, 0);
        assert!(rule.device_id.is_none());
    }
}
