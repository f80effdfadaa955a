use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Tariff, TariffSlab, TariffStructure};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TariffError {
    #[error("{field} must be a finite, non-negative number")]
    InvalidAmount { field: String },

    #[error("Slab tariff requires at least one slab")]
    NoSlabs,

    #[error("First slab must start at 0 units")]
    FirstSlabNotAtZero,

    #[error("Slab {index} must start where slab {previous} ends")]
    NotContiguous { index: usize, previous: usize },

    #[error("Slab {index} upper bound must be greater than its lower bound")]
    EmptyRange { index: usize },

    #[error("Only the last slab may be open-ended (slab {index} has no upper bound)")]
    UnboundedBeforeLast { index: usize },

    #[error("Last slab must be open-ended")]
    LastSlabBounded,
}

/// Charge for the units that fell inside one slab
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlabCharge {
    pub min_units: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_units: Option<f64>,
    pub rate: f64,
    pub units: f64,
    pub amount: f64,
}

/// Monthly bill for a given usage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bill {
    pub units: f64,
    pub energy_charge: f64,
    pub fixed_charges: f64,
    pub total: f64,
    pub currency: String,
    pub breakdown: Vec<SlabCharge>,
}

fn check_amount(field: impl Into<String>, value: f64) -> Result<(), TariffError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(TariffError::InvalidAmount {
            field: field.into(),
        })
    }
}

/// Validate a tariff before it is stored.
///
/// Slabs must partition `[0, ∞)` into contiguous half-open ranges, with only
/// the final slab unbounded.
pub fn validate_tariff(tariff: &Tariff) -> Result<(), TariffError> {
    check_amount("fixed_charges", tariff.fixed_charges)?;

    match tariff.structure {
        TariffStructure::Flat => check_amount("electricity_rate", tariff.electricity_rate),
        TariffStructure::Slab => validate_slabs(&tariff.slabs),
    }
}

fn validate_slabs(slabs: &[TariffSlab]) -> Result<(), TariffError> {
    let Some(first) = slabs.first() else {
        return Err(TariffError::NoSlabs);
    };
    if first.min_units != 0.0 {
        return Err(TariffError::FirstSlabNotAtZero);
    }

    let last_index = slabs.len() - 1;
    for (index, slab) in slabs.iter().enumerate() {
        check_amount(format!("slabs[{}].rate", index), slab.rate)?;
        check_amount(format!("slabs[{}].min_units", index), slab.min_units)?;

        match slab.max_units {
            Some(max) => {
                if !max.is_finite() || max <= slab.min_units {
                    return Err(TariffError::EmptyRange { index });
                }
                if index == last_index {
                    return Err(TariffError::LastSlabBounded);
                }
            }
            None if index != last_index => {
                return Err(TariffError::UnboundedBeforeLast { index });
            }
            None => {}
        }

        if index > 0 && slabs[index - 1].max_units != Some(slab.min_units) {
            return Err(TariffError::NotContiguous {
                index,
                previous: index - 1,
            });
        }
    }

    Ok(())
}

fn sanitize_units(units: f64) -> f64 {
    if units.is_finite() && units > 0.0 {
        units
    } else {
        0.0
    }
}

/// Units of `total` that fall inside `[min, max)`
fn units_in_slab(slab: &TariffSlab, total: f64) -> f64 {
    let upper = match slab.max_units {
        Some(max) => total.min(max),
        None => total,
    };
    (upper - slab.min_units).max(0.0)
}

/// Energy charge for `units` kWh consumed in one billing month.
/// Slab tariffs are progressive: each slab's rate applies only to the units
/// inside that slab.
pub fn energy_charge(tariff: &Tariff, units: f64) -> f64 {
    let units = sanitize_units(units);
    match tariff.structure {
        TariffStructure::Flat => units * tariff.electricity_rate,
        TariffStructure::Slab => tariff
            .slabs
            .iter()
            .map(|slab| slab.rate * units_in_slab(slab, units))
            .sum(),
    }
}

/// Cost of `additional_units` consumed on top of `prior_units` already used
/// in the month.
pub fn marginal_charge(tariff: &Tariff, prior_units: f64, additional_units: f64) -> f64 {
    let prior = sanitize_units(prior_units);
    let additional = sanitize_units(additional_units);
    if additional == 0.0 {
        return 0.0;
    }
    (energy_charge(tariff, prior + additional) - energy_charge(tariff, prior)).max(0.0)
}

/// Index of the slab the next unit after `units` is billed in
pub fn slab_index_for(tariff: &Tariff, units: f64) -> Option<usize> {
    if tariff.structure != TariffStructure::Slab {
        return None;
    }
    let units = sanitize_units(units);
    tariff.slabs.iter().position(|slab| {
        units >= slab.min_units && slab.max_units.map_or(true, |max| units < max)
    })
}

pub fn monthly_bill(tariff: &Tariff, units: f64) -> Bill {
    let units = sanitize_units(units);

    let breakdown: Vec<SlabCharge> = match tariff.structure {
        TariffStructure::Flat => vec![SlabCharge {
            min_units: 0.0,
            max_units: None,
            rate: tariff.electricity_rate,
            units,
            amount: units * tariff.electricity_rate,
        }],
        TariffStructure::Slab => tariff
            .slabs
            .iter()
            .map(|slab| {
                let in_slab = units_in_slab(slab, units);
                SlabCharge {
                    min_units: slab.min_units,
                    max_units: slab.max_units,
                    rate: slab.rate,
                    units: in_slab,
                    amount: in_slab * slab.rate,
                }
            })
            .collect(),
    };

    let energy_charge = breakdown.iter().map(|c| c.amount).sum::<f64>();
    Bill {
        units,
        energy_charge,
        fixed_charges: tariff.fixed_charges,
        total: energy_charge + tariff.fixed_charges,
        currency: tariff.currency.clone(),
        breakdown,
    }
}
