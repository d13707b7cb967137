#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-mile emission factor tables.
//!
//! [`builder`] turns fleet composition counts and reference per-mile rates
//! into one fleet-weighted [`EmissionFactorRow`] per geographic unit.
//! [`FactorTable`] holds those rows for the attribution pipeline and
//! resolves a trip's home block GEOID to its block group row by prefix.

pub mod builder;

use std::collections::BTreeMap;

use commute_emissions_models::EmissionFactorRow;
use thiserror::Error;

/// Number of leading GEOID characters identifying a census block group.
pub const DEFAULT_PREFIX_LEN: usize = 12;

/// Errors from building or loading factor tables.
#[derive(Debug, Error)]
pub enum FactorError {
    /// Two factor rows share the same geographic unit.
    #[error("Duplicate factor row for geographic unit '{geoid}'")]
    DuplicateUnit {
        /// The repeated unit identifier.
        geoid: String,
    },

    /// Two reference rates share the same (category, model year, fuel).
    #[error("Duplicate reference rate for {category}/{model_year}/{fuel}")]
    DuplicateRate {
        category: String,
        model_year: u16,
        fuel: String,
    },

    /// A reference inventory row has no positive vehicle miles.
    #[error("Reference row {category}/{model_year}/{fuel} has non-positive VMT {vmt}")]
    InvalidVmt {
        category: String,
        model_year: u16,
        fuel: String,
        vmt: f64,
    },

    /// A factor row carries a non-finite value.
    #[error("Non-finite factor for geographic unit '{geoid}'")]
    NonFinite {
        /// The unit whose row is invalid.
        geoid: String,
    },
}

/// Read-only lookup of emission factors by geographic unit.
///
/// Constructed once per run and shared across all pipeline tasks.
#[derive(Debug, Clone)]
pub struct FactorTable {
    prefix_len: usize,
    rows: BTreeMap<String, EmissionFactorRow>,
}

impl FactorTable {
    /// Builds a table, rejecting duplicate units and non-finite factors
    /// so every trip maps to at most one row.
    ///
    /// # Errors
    ///
    /// Returns [`FactorError::DuplicateUnit`] or [`FactorError::NonFinite`].
    pub fn new(
        rows: impl IntoIterator<Item = EmissionFactorRow>,
        prefix_len: usize,
    ) -> Result<Self, FactorError> {
        let mut map = BTreeMap::new();

        for row in rows {
            if !row.per_mile.is_finite() {
                return Err(FactorError::NonFinite { geoid: row.geoid });
            }
            if map.contains_key(&row.geoid) {
                return Err(FactorError::DuplicateUnit { geoid: row.geoid });
            }
            map.insert(row.geoid.clone(), row);
        }

        log::info!(
            "Loaded {} emission factor rows (prefix length {prefix_len})",
            map.len()
        );

        Ok(Self {
            prefix_len,
            rows: map,
        })
    }

    /// Finds the factor row for a (typically longer) home GEOID by its
    /// first `prefix_len` characters.
    ///
    /// Identifiers shorter than the prefix never match.
    #[must_use]
    pub fn lookup(&self, geoid: &str) -> Option<&EmissionFactorRow> {
        let prefix = geoid.get(..self.prefix_len)?;
        self.rows.get(prefix)
    }

    /// The prefix that [`Self::lookup`] would use for `geoid`.
    #[must_use]
    pub fn prefix_of<'a>(&self, geoid: &'a str) -> &'a str {
        geoid.get(..self.prefix_len).unwrap_or(geoid)
    }

    #[must_use]
    pub const fn prefix_len(&self) -> usize {
        self.prefix_len
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &EmissionFactorRow> {
        self.rows.values()
    }
}
