//! CSV writers for run and factor-build outputs.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use commute_emissions_attribution::aggregate::AggregateTable;
use commute_emissions_factors::builder::UnmatchedCombination;
use commute_emissions_models::{EmissionFactorRow, Pollutant};

type BoxError = Box<dyn std::error::Error>;

/// Writes `table` as `<dir>/<name>.csv`.
///
/// Returns `None` without touching the filesystem when the table is
/// empty; a missing file means no trip contributed.
pub fn write_table(dir: &Path, table: &AggregateTable) -> Result<Option<PathBuf>, BoxError> {
    if table.is_empty() {
        log::info!("Table {} is empty, not writing", table.name);
        return Ok(None);
    }

    let path = dir.join(format!("{}.csv", table.name));
    write_table_to(File::create(&path)?, table)?;
    log::info!("Wrote {} rows to {}", table.len(), path.display());

    Ok(Some(path))
}

fn write_table_to(writer: impl Write, table: &AggregateTable) -> Result<(), BoxError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(table.header())?;

    for (key, mass) in &table.rows {
        let record = key
            .iter()
            .cloned()
            .chain(mass.values().into_iter().map(|v| v.to_string()));
        csv.write_record(record)?;
    }

    csv.flush()?;
    Ok(())
}

/// Writes factor rows with the headers [`crate::input::read_factor_rows`]
/// accepts.
pub fn write_factor_rows(
    writer: impl Write,
    rows: &[EmissionFactorRow],
) -> Result<(), BoxError> {
    let mut csv = csv::Writer::from_writer(writer);

    let header = std::iter::once("geoid".to_string())
        .chain(Pollutant::ALL.iter().map(|p| format!("{p}_per_mile")));
    csv.write_record(header)?;

    for row in rows {
        let record = std::iter::once(row.geoid.clone())
            .chain(row.per_mile.values().into_iter().map(|v| v.to_string()));
        csv.write_record(record)?;
    }

    csv.flush()?;
    Ok(())
}

pub fn write_unmatched(
    writer: impl Write,
    unmatched: &[UnmatchedCombination],
) -> Result<(), BoxError> {
    let mut csv = csv::Writer::from_writer(writer);
    for row in unmatched {
        csv.serialize(row)?;
    }
    csv.flush()?;
    Ok(())
}
