//! Completion report for a pipeline run.

use std::collections::BTreeMap;
use std::fmt;

use commute_emissions_models::{ErrorKind, TripResult};
use serde::Serialize;

use crate::PipelineError;
use crate::aggregate::Aggregates;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Trip records handed to the run, including rejected ones.
    pub submitted: usize,
    /// Results collected.
    pub received: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures_by_kind: BTreeMap<ErrorKind, usize>,
    /// Total route length of successful trips.
    pub route_miles: f64,
    pub attributed_miles: f64,
    /// Route miles whose segment midpoint matched no region.
    pub unattributed_miles: f64,
    pub tables_written: Vec<String>,
    pub tables_skipped: Vec<String>,
}

impl RunSummary {
    #[must_use]
    pub fn from_results(submitted: usize, results: &[TripResult]) -> Self {
        let mut summary = Self {
            submitted,
            received: results.len(),
            ..Self::default()
        };

        for result in results {
            match (result.emissions(), result.error_kind()) {
                (Some(emissions), _) => {
                    summary.succeeded += 1;
                    summary.route_miles += emissions.route_miles;
                    summary.attributed_miles += emissions.attributed_miles;
                }
                (None, Some(kind)) => {
                    summary.failed += 1;
                    *summary.failures_by_kind.entry(kind).or_default() += 1;
                }
                (None, None) => {}
            }
        }
        summary.unattributed_miles = (summary.route_miles - summary.attributed_miles).max(0.0);

        summary
    }

    /// Records which tables were written and which were skipped as empty.
    pub fn record_tables(&mut self, aggregates: &Aggregates) {
        for table in aggregates.tables() {
            if table.is_empty() {
                self.tables_skipped.push(table.name.to_string());
            } else {
                self.tables_written.push(table.name.to_string());
            }
        }
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::Incomplete`] if fewer results were
    /// collected than trips were submitted.
    pub const fn check_complete(&self) -> Result<(), PipelineError> {
        if self.received < self.submitted {
            return Err(PipelineError::Incomplete {
                submitted: self.submitted,
                received: self.received,
            });
        }
        Ok(())
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Trips submitted:     {}", self.submitted)?;
        writeln!(f, "Trips succeeded:     {}", self.succeeded)?;
        writeln!(f, "Trips failed:        {}", self.failed)?;
        for (kind, count) in &self.failures_by_kind {
            writeln!(f, "  {kind:<20} {count}")?;
        }
        writeln!(f, "Route miles:         {:.2}", self.route_miles)?;
        writeln!(f, "Attributed miles:    {:.2}", self.attributed_miles)?;
        writeln!(f, "Unattributed miles:  {:.2}", self.unattributed_miles)?;
        writeln!(f, "Tables written:      {}", list(&self.tables_written))?;
        write!(f, "Tables skipped:      {}", list(&self.tables_skipped))
    }
}

fn list(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use commute_emissions_models::{Pollutants, TripEmissions};

    use super::*;
    use crate::aggregate::aggregate;

    fn success(id: &str, route_miles: f64, attributed_miles: f64) -> TripResult {
        TripResult::success(
            id.to_string(),
            TripEmissions {
                origin_region: "95110".to_string(),
                destination_region: "95110".to_string(),
                by_region: BTreeMap::from([(
                    "95110".to_string(),
                    Pollutants::new(1.0, 1.0, 1.0, 1.0, 1.0, 1.0),
                )]),
                route_miles,
                attributed_miles,
            },
        )
    }

    fn results() -> Vec<TripResult> {
        vec![
            success("1", 3.0, 3.0),
            success("2", 5.0, 4.5),
            TripResult::failure("3".to_string(), ErrorKind::MissingFactor, "x"),
            TripResult::failure("4".to_string(), ErrorKind::MissingFactor, "y"),
            TripResult::failure("5".to_string(), ErrorKind::FatalRouting, "403"),
        ]
    }

    #[test]
    fn counts_by_kind_and_miles() {
        let summary = RunSummary::from_results(5, &results());

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.failures_by_kind[&ErrorKind::MissingFactor], 2);
        assert_eq!(summary.failures_by_kind[&ErrorKind::FatalRouting], 1);
        assert!((summary.route_miles - 8.0).abs() < 1e-12);
        assert!((summary.unattributed_miles - 0.5).abs() < 1e-12);
        assert!(summary.check_complete().is_ok());
    }

    #[test]
    fn fewer_results_than_submitted_is_incomplete() {
        let summary = RunSummary::from_results(7, &results());
        assert!(matches!(
            summary.check_complete(),
            Err(PipelineError::Incomplete {
                submitted: 7,
                received: 5
            })
        ));
    }

    #[test]
    fn reports_written_and_skipped_tables() {
        let mut summary = RunSummary::from_results(1, &results()[2..3]);
        summary.record_tables(&aggregate(&results()[2..3]));

        assert!(summary.tables_written.is_empty());
        assert_eq!(
            summary.tables_skipped,
            ["receptor_zip", "origin_zip", "dest_zip", "origin_receptor_zip"]
        );
        assert!(summary.to_string().contains("Tables written:      (none)"));
    }

    #[test]
    fn failure_kinds_serialize_as_snake_case_keys() {
        let summary = RunSummary::from_results(5, &results());
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["failures_by_kind"]["missing_factor"], 2);
    }
}
