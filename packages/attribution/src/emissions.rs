//! Per-region pollutant mass from attributed miles.

use std::collections::BTreeMap;

use commute_emissions_factors::FactorTable;
use commute_emissions_models::{EmissionFactorRow, Pollutants};

use crate::TripError;

/// Looks up the factor row for a trip's home unit.
///
/// # Errors
///
/// Returns [`TripError::MissingFactor`] if the table has no row for the
/// unit prefix.
pub fn factor_for<'a>(
    table: &'a FactorTable,
    home_geoid: &str,
) -> Result<&'a EmissionFactorRow, TripError> {
    table
        .lookup(home_geoid)
        .ok_or_else(|| TripError::MissingFactor {
            prefix: table.prefix_of(home_geoid).to_string(),
        })
}

/// Multiplies each region's miles by the per-mile factors.
#[must_use]
pub fn attribute_emissions(
    by_region: &BTreeMap<String, f64>,
    factor: &EmissionFactorRow,
) -> BTreeMap<String, Pollutants> {
    by_region
        .iter()
        .map(|(region, miles)| (region.clone(), factor.per_mile * *miles))
        .collect()
}
