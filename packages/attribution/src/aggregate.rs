//! Additive reduction of trip results into output tables.
//!
//! Only successful results contribute; failures are counted by
//! [`crate::summary`]. Results are reduced in trip id order, ties broken
//! on their contents, so the tables do not depend on the order the pool
//! completed them in.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use commute_emissions_models::{Pollutant, Pollutants, TripEmissions, TripResult};

/// One output table: key columns plus six pollutant totals.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateTable {
    /// File stem and key column names, e.g. `receptor_zip`.
    pub name: &'static str,
    pub key_columns: &'static [&'static str],
    pub rows: BTreeMap<Vec<String>, Pollutants>,
}

impl AggregateTable {
    const fn new(name: &'static str, key_columns: &'static [&'static str]) -> Self {
        Self {
            name,
            key_columns,
            rows: BTreeMap::new(),
        }
    }

    fn add(&mut self, key: Vec<String>, mass: Pollutants) {
        *self.rows.entry(key).or_insert(Pollutants::ZERO) += mass;
    }

    /// An empty table means no trip contributed; it is not written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Column headers: the key columns, then one per pollutant.
    #[must_use]
    pub fn header(&self) -> Vec<String> {
        self.key_columns
            .iter()
            .map(ToString::to_string)
            .chain(Pollutant::ALL.iter().map(ToString::to_string))
            .collect()
    }

    /// Sum of every row.
    #[must_use]
    pub fn total(&self) -> Pollutants {
        self.rows.values().sum()
    }

    #[must_use]
    pub fn get(&self, key: &[&str]) -> Option<&Pollutants> {
        let key: Vec<String> = key.iter().map(ToString::to_string).collect();
        self.rows.get(&key)
    }
}

/// The four output tables of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregates {
    /// Mass received by each region from all trips.
    pub receptor: AggregateTable,
    /// Mass emitted by trips starting in each region, wherever it landed.
    pub origin: AggregateTable,
    /// Mass emitted by trips ending in each region.
    pub destination: AggregateTable,
    /// Mass per (origin region, receptor region) pair.
    pub origin_receptor: AggregateTable,
}

impl Aggregates {
    #[must_use]
    pub fn tables(&self) -> [&AggregateTable; 4] {
        [
            &self.receptor,
            &self.origin,
            &self.destination,
            &self.origin_receptor,
        ]
    }
}

/// Sums the successful results into the output tables.
#[must_use]
pub fn aggregate(results: &[TripResult]) -> Aggregates {
    let mut receptor = AggregateTable::new("receptor_zip", &["receptor_zip"]);
    let mut origin = AggregateTable::new("origin_zip", &["origin_zip"]);
    let mut destination = AggregateTable::new("dest_zip", &["dest_zip"]);
    let mut origin_receptor =
        AggregateTable::new("origin_receptor_zip", &["origin_zip", "receptor_zip"]);

    let mut successes: Vec<_> = results
        .iter()
        .filter_map(|r| Some((r.trip_id.as_str(), r.emissions()?)))
        .collect();
    successes.sort_by(|(a_id, a), (b_id, b)| a_id.cmp(b_id).then_with(|| reduction_order(a, b)));

    for (_, emissions) in successes {
        let trip_total: Pollutants = emissions.by_region.values().sum();

        for (region, mass) in &emissions.by_region {
            receptor.add(vec![region.clone()], *mass);
            origin_receptor.add(
                vec![emissions.origin_region.clone(), region.clone()],
                *mass,
            );
        }
        origin.add(vec![emissions.origin_region.clone()], trip_total);
        destination.add(vec![emissions.destination_region.clone()], trip_total);
    }

    Aggregates {
        receptor,
        origin,
        destination,
        origin_receptor,
    }
}

/// Total order over trip emissions, used to break ties between results
/// sharing a trip id. Equal only when every field is bitwise equal.
fn reduction_order(a: &TripEmissions, b: &TripEmissions) -> Ordering {
    a.origin_region
        .cmp(&b.origin_region)
        .then_with(|| a.destination_region.cmp(&b.destination_region))
        .then_with(|| a.route_miles.total_cmp(&b.route_miles))
        .then_with(|| a.attributed_miles.total_cmp(&b.attributed_miles))
        .then_with(|| {
            a.by_region
                .iter()
                .zip(&b.by_region)
                .map(|((ra, ma), (rb, mb))| ra.cmp(rb).then_with(|| mass_order(ma, mb)))
                .find(|o| o.is_ne())
                .unwrap_or_else(|| a.by_region.len().cmp(&b.by_region.len()))
        })
}

fn mass_order(a: &Pollutants, b: &Pollutants) -> Ordering {
    a.values()
        .iter()
        .zip(b.values().iter())
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}
