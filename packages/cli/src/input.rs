//! CSV readers for the run inputs.
//!
//! Column names follow the upstream exports (LODES-derived trip table,
//! DMV fleet counts, EMFAC inventory); snake case aliases are accepted
//! too.

use std::io::{BufRead, BufReader, Read};

use commute_emissions_factors::builder::{FleetCount, ReferenceRate};
use commute_emissions_models::{EmissionFactorRow, Pollutants, TripRecord};
use serde::Deserialize;

type BoxError = Box<dyn std::error::Error>;

#[derive(Debug, Deserialize)]
struct TripRow {
    #[serde(default)]
    id: Option<String>,
    h_geocode: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    home_lat: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    home_lon: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    work_lat: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    work_lon: Option<f64>,
}

/// Reads the origin/destination table.
///
/// Rows without an `id` column are numbered from 1 in file order. Blank
/// or non-numeric coordinates are read as absent so the trip fails on
/// its own instead of rejecting the file.
pub fn read_trips(
    reader: impl Read,
    limit: Option<usize>,
) -> Result<Vec<TripRecord>, BoxError> {
    let mut csv = csv::Reader::from_reader(reader);
    let mut records = Vec::new();

    for (i, row) in csv.deserialize::<TripRow>().enumerate() {
        if limit.is_some_and(|limit| records.len() >= limit) {
            break;
        }
        let row = row?;
        records.push(TripRecord {
            id: row.id.unwrap_or_else(|| (i + 1).to_string()),
            h_geocode: row.h_geocode,
            home_lat: row.home_lat,
            home_lon: row.home_lon,
            work_lat: row.work_lat,
            work_lon: row.work_lon,
        });
    }

    Ok(records)
}

#[derive(Debug, Deserialize)]
struct FactorCsvRow {
    #[serde(alias = "Census Block Group Code")]
    geoid: String,
    #[serde(rename = "PM25_per_mile", alias = "PM25")]
    pm25: f64,
    #[serde(rename = "SOx_per_mile", alias = "SOx")]
    sox: f64,
    #[serde(rename = "NOX_per_mile", alias = "NOX")]
    nox: f64,
    #[serde(rename = "VOC_per_mile", alias = "VOC")]
    voc: f64,
    #[serde(rename = "NH3_per_mile", alias = "NH3")]
    nh3: f64,
    #[serde(rename = "CO2_per_mile", alias = "CO2")]
    co2: f64,
}

/// Reads a per-unit emission factor table.
pub fn read_factor_rows(reader: impl Read) -> Result<Vec<EmissionFactorRow>, BoxError> {
    let mut csv = csv::Reader::from_reader(reader);
    csv.deserialize::<FactorCsvRow>()
        .map(|row| -> Result<EmissionFactorRow, BoxError> {
            let row = row?;
            Ok(EmissionFactorRow {
                geoid: row.geoid,
                per_mile: Pollutants::new(row.pm25, row.sox, row.nox, row.voc, row.nh3, row.co2),
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct FleetCsvRow {
    #[serde(alias = "Census Block Group Code")]
    geoid: String,
    #[serde(alias = "Fuel")]
    fuel: String,
    #[serde(alias = "Model Year")]
    model_year: u16,
    #[serde(alias = "Vehicle Category")]
    category: String,
    #[serde(alias = "Vehicle Population")]
    vehicle_count: f64,
}

/// Reads fleet population rows. Repeated groups are summed by the
/// builder.
pub fn read_fleet(reader: impl Read) -> Result<Vec<FleetCount>, BoxError> {
    let mut csv = csv::Reader::from_reader(reader);
    csv.deserialize::<FleetCsvRow>()
        .map(|row| -> Result<FleetCount, BoxError> {
            let row = row?;
            Ok(FleetCount {
                geoid: row.geoid,
                fuel: row.fuel,
                model_year: row.model_year,
                category: row.category,
                vehicle_count: row.vehicle_count,
            })
        })
        .collect()
}

/// An inventory row: annual tons per pollutant plus total miles.
#[derive(Debug, Deserialize)]
struct InventoryRow {
    #[serde(alias = "Vehicle Category")]
    category: String,
    #[serde(alias = "Model Year")]
    model_year: u16,
    #[serde(alias = "Fuel")]
    fuel: String,
    #[serde(alias = "Total VMT")]
    vmt: f64,
    #[serde(alias = "PM2.5_TOTAL")]
    pm25: f64,
    #[serde(alias = "SOx_TOTEX")]
    sox: f64,
    #[serde(alias = "NOx_TOTEX")]
    nox: f64,
    #[serde(alias = "ROG_TOTAL")]
    voc: f64,
    #[serde(alias = "NH3_RUNEX")]
    nh3: f64,
    #[serde(alias = "CO2_TOTEX")]
    co2: f64,
}

/// Reads emission inventory rows and converts them to per-mile rates.
///
/// `skip_rows` preamble lines are discarded before the header.
pub fn read_rates(
    reader: impl Read,
    skip_rows: usize,
) -> Result<Vec<ReferenceRate>, BoxError> {
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    for _ in 0..skip_rows {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
    }

    let mut csv = csv::Reader::from_reader(reader);
    csv.deserialize::<InventoryRow>()
        .map(|row| -> Result<ReferenceRate, BoxError> {
            let row = row?;
            let tons = Pollutants::new(row.pm25, row.sox, row.nox, row.voc, row.nh3, row.co2);
            Ok(ReferenceRate::from_inventory(
                row.category,
                row.model_year,
                row.fuel,
                tons,
                row.vmt,
            )?)
        })
        .collect()
}
