use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::consumption::{elapsed_hours, energy_kwh};
use crate::domain::{ActivationState, Device};

/// A completed on/off interval, ready to be stored as a reading
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinishedSession {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_minutes: f64,
    pub energy_kwh: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToggleOutcome {
    TurnedOn,
    TurnedOff(FinishedSession),
    /// Requested state already held; the session start is preserved
    Unchanged,
}

/// Apply an on/off request to a device.
///
/// Transitions:
/// - Off + on: `On { since: now }`
/// - On + off: `Off`, yielding the finished session
/// - On + on, Off + off: unchanged
pub fn apply_toggle(device: &mut Device, turn_on: bool, now: DateTime<Utc>) -> ToggleOutcome {
    match (device.activation(), turn_on) {
        (ActivationState::Off, true) => {
            device.set_activation(ActivationState::On { since: now });
            device.updated_at = now;
            ToggleOutcome::TurnedOn
        }
        (ActivationState::On { since }, false) => {
            let hours = elapsed_hours(since, now);
            device.set_activation(ActivationState::Off);
            device.updated_at = now;
            ToggleOutcome::TurnedOff(FinishedSession {
                started_at: since,
                ended_at: now.max(since),
                duration_minutes: hours * 60.0,
                energy_kwh: energy_kwh(device.wattage, hours),
            })
        }
        (ActivationState::Off, false) => {
            // Normalize a stray is_active flag with no start time
            device.set_activation(ActivationState::Off);
            ToggleOutcome::Unchanged
        }
        (ActivationState::On { .. }, true) => ToggleOutcome::Unchanged,
    }
}
