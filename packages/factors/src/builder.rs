//! Fleet-weighted emission factor construction.
//!
//! For each geographic unit, every (fuel, model year, category) vehicle
//! group is weighted by its share of the unit's vehicles and multiplied by
//! the matching reference per-mile rate:
//!
//! ```text
//! weight          = vehicle_count / total_vehicle_count_in_unit
//! weighted_factor = Σ weight × rate
//! ```
//!
//! Groups with no reference rate are reported in
//! [`FactorTableBuild::unmatched`] instead of being folded in as zero.

use std::collections::BTreeMap;

use commute_emissions_models::{EmissionFactorRow, Pollutants};
use serde::{Deserialize, Serialize};

use crate::FactorError;

/// Inventory totals are in tons, per-mile rates in kilograms.
const KG_PER_TON: f64 = 1000.0;

/// Vehicle population for one fleet group within a geographic unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetCount {
    pub geoid: String,
    pub fuel: String,
    pub model_year: u16,
    pub category: String,
    pub vehicle_count: f64,
}

/// Per-mile emission rate for one (category, model year, fuel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRate {
    pub category: String,
    pub model_year: u16,
    pub fuel: String,
    pub per_mile: Pollutants,
}

impl ReferenceRate {
    /// Derives per-mile rates (kg/mile) from inventory totals (tons) and
    /// total vehicle miles traveled.
    ///
    /// # Errors
    ///
    /// Returns [`FactorError::InvalidVmt`] if `total_vmt` is not positive.
    pub fn from_inventory(
        category: impl Into<String>,
        model_year: u16,
        fuel: impl Into<String>,
        total_tons: Pollutants,
        total_vmt: f64,
    ) -> Result<Self, FactorError> {
        let category = category.into();
        let fuel = fuel.into();

        if !(total_vmt.is_finite() && total_vmt > 0.0) {
            return Err(FactorError::InvalidVmt {
                category,
                model_year,
                fuel,
                vmt: total_vmt,
            });
        }

        Ok(Self {
            category,
            model_year,
            fuel,
            per_mile: total_tons * (KG_PER_TON / total_vmt),
        })
    }
}

/// Options for [`build_factor_table`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// Reference category code → fleet category code.
    pub category_aliases: BTreeMap<String, String>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            category_aliases: BTreeMap::from([
                ("LDA".to_string(), "P".to_string()),
                ("LDT1".to_string(), "T1".to_string()),
            ]),
        }
    }
}

/// A fleet group that had no reference rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedCombination {
    pub geoid: String,
    pub fuel: String,
    pub model_year: u16,
    pub category: String,
    pub vehicle_count: f64,
    /// Share of the unit's vehicles in this group.
    pub weight: f64,
}

/// Output of [`build_factor_table`].
#[derive(Debug, Clone, Default)]
pub struct FactorTableBuild {
    /// One row per unit with a positive vehicle total, sorted by GEOID.
    pub rows: Vec<EmissionFactorRow>,
    /// Fleet groups excluded from the weighted sum.
    pub unmatched: Vec<UnmatchedCombination>,
    /// Per unit, the total weight of its unmatched groups. Only units with
    /// at least one unmatched group appear.
    pub unmatched_weight: BTreeMap<String, f64>,
    /// Units skipped because their vehicle total was not positive.
    pub skipped_units: Vec<String>,
}

impl FactorTableBuild {
    /// Returns `true` if every fleet group had a reference rate.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unmatched.is_empty()
    }
}

type RateKey = (String, u16, String);

/// Builds fleet-weighted factor rows.
///
/// Fleet rows sharing a (unit, fuel, model year, category) are summed
/// first. Reference categories are renamed through
/// [`BuilderConfig::category_aliases`] before matching.
///
/// # Errors
///
/// Returns [`FactorError::DuplicateRate`] if two reference rates collide
/// after aliasing.
pub fn build_factor_table(
    fleet: &[FleetCount],
    rates: &[ReferenceRate],
    config: &BuilderConfig,
) -> Result<FactorTableBuild, FactorError> {
    let rate_index = index_rates(rates, config)?;

    // unit -> (fuel, year, category) -> vehicles
    let mut groups: BTreeMap<&str, BTreeMap<(&str, u16, &str), f64>> = BTreeMap::new();
    for row in fleet {
        *groups
            .entry(row.geoid.as_str())
            .or_default()
            .entry((row.fuel.as_str(), row.model_year, row.category.as_str()))
            .or_insert(0.0) += row.vehicle_count;
    }

    let mut build = FactorTableBuild::default();

    for (geoid, unit_groups) in groups {
        let total: f64 = unit_groups.values().sum();
        if !(total.is_finite() && total > 0.0) {
            log::warn!("Skipping geographic unit {geoid}: vehicle total {total}");
            build.skipped_units.push(geoid.to_string());
            continue;
        }

        let mut weighted = Pollutants::ZERO;

        for ((fuel, model_year, category), count) in unit_groups {
            let weight = count / total;
            let key = (category.to_string(), model_year, fuel.to_string());

            if let Some(rate) = rate_index.get(&key) {
                weighted += *rate * weight;
            } else {
                log::debug!("No reference rate for {geoid}: {category}/{model_year}/{fuel}");
                *build
                    .unmatched_weight
                    .entry(geoid.to_string())
                    .or_insert(0.0) += weight;
                build.unmatched.push(UnmatchedCombination {
                    geoid: geoid.to_string(),
                    fuel: fuel.to_string(),
                    model_year,
                    category: category.to_string(),
                    vehicle_count: count,
                    weight,
                });
            }
        }

        build.rows.push(EmissionFactorRow {
            geoid: geoid.to_string(),
            per_mile: weighted,
        });
    }

    if !build.unmatched.is_empty() {
        log::warn!(
            "{} fleet groups across {} units have no reference rate; \
             their share is excluded from the weighted factors",
            build.unmatched.len(),
            build.unmatched_weight.len()
        );
    }
    log::info!("Built {} emission factor rows", build.rows.len());

    Ok(build)
}

fn index_rates(
    rates: &[ReferenceRate],
    config: &BuilderConfig,
) -> Result<BTreeMap<RateKey, Pollutants>, FactorError> {
    let mut index = BTreeMap::new();

    for rate in rates {
        let category = config
            .category_aliases
            .get(&rate.category)
            .unwrap_or(&rate.category)
            .clone();
        let key = (category, rate.model_year, rate.fuel.clone());

        if index.contains_key(&key) {
            let (category, model_year, fuel) = key;
            return Err(FactorError::DuplicateRate {
                category,
                model_year,
                fuel,
            });
        }
        index.insert(key, rate.per_mile);
    }

    Ok(index)
}
