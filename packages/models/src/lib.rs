#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for commute emission attribution.
//!
//! These types describe a commute trip from its input record through the
//! routed and segmented geometry to the per-region pollutant masses it
//! produces. They carry no behavior beyond simple arithmetic and
//! validation so every pipeline stage can depend on them.

use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
}

impl GeoPoint {
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns `true` if both components are finite and inside the WGS84
    /// range.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Arithmetic mean of two points.
    ///
    /// This is a flat approximation; it is only used for the midpoint of
    /// short route segments.
    #[must_use]
    pub fn midpoint(&self, other: &Self) -> Self {
        Self::new(
            (self.latitude + other.latitude) / 2.0,
            (self.longitude + other.longitude) / 2.0,
        )
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// A raw origin/destination row as read from the trip table.
///
/// Coordinates are optional because the upstream table may contain
/// blocks that never resolved to a centroid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    /// Row identifier.
    pub id: String,
    /// Home census block GEOID (15 characters for LODES blocks).
    pub h_geocode: String,
    pub home_lat: Option<f64>,
    pub home_lon: Option<f64>,
    pub work_lat: Option<f64>,
    pub work_lon: Option<f64>,
}

/// Raised when a [`TripRecord`] cannot become a [`Trip`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidCoordinate {
    /// Name of the offending column.
    pub field: &'static str,
}

impl fmt::Display for InvalidCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "missing or invalid coordinate '{}'", self.field)
    }
}

impl std::error::Error for InvalidCoordinate {}

/// A validated home→work commute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    /// Home geographic unit identifier, used to look up emission factors.
    pub home_geoid: String,
    pub home: GeoPoint,
    pub work: GeoPoint,
}

impl TryFrom<TripRecord> for Trip {
    type Error = InvalidCoordinate;

    fn try_from(record: TripRecord) -> Result<Self, Self::Error> {
        fn coordinate(value: Option<f64>, field: &'static str) -> Result<f64, InvalidCoordinate> {
            value
                .filter(|v| v.is_finite())
                .ok_or(InvalidCoordinate { field })
        }

        let home = GeoPoint::new(
            coordinate(record.home_lat, "home_lat")?,
            coordinate(record.home_lon, "home_lon")?,
        );
        let work = GeoPoint::new(
            coordinate(record.work_lat, "work_lat")?,
            coordinate(record.work_lon, "work_lon")?,
        );

        if !home.is_valid() {
            return Err(InvalidCoordinate { field: "home" });
        }
        if !work.is_valid() {
            return Err(InvalidCoordinate { field: "work" });
        }

        Ok(Self {
            id: record.id,
            home_geoid: record.h_geocode,
            home,
            work,
        })
    }
}

/// Ordered route geometry returned by a routing backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub points: Vec<GeoPoint>,
}

impl Route {
    #[must_use]
    pub const fn new(points: Vec<GeoPoint>) -> Self {
        Self { points }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl From<Vec<GeoPoint>> for Route {
    fn from(points: Vec<GeoPoint>) -> Self {
        Self::new(points)
    }
}

/// A pair of consecutive route points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: GeoPoint,
    pub end: GeoPoint,
    pub midpoint: GeoPoint,
    /// Geodesic length in miles. Never negative.
    pub distance_miles: f64,
}

/// The six pollutants tracked per mile and per region.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
)]
pub enum Pollutant {
    #[strum(serialize = "PM25")]
    #[serde(rename = "PM25")]
    Pm25,
    #[strum(serialize = "SOx")]
    #[serde(rename = "SOx")]
    Sox,
    #[strum(serialize = "NOX")]
    #[serde(rename = "NOX")]
    Nox,
    #[strum(serialize = "VOC")]
    #[serde(rename = "VOC")]
    Voc,
    #[strum(serialize = "NH3")]
    #[serde(rename = "NH3")]
    Nh3,
    #[strum(serialize = "CO2")]
    #[serde(rename = "CO2")]
    Co2,
}

impl Pollutant {
    /// Column order used by every table.
    pub const ALL: [Self; 6] = [
        Self::Pm25,
        Self::Sox,
        Self::Nox,
        Self::Voc,
        Self::Nh3,
        Self::Co2,
    ];
}

/// One value per [`Pollutant`].
///
/// Used both for per-mile factors and for emitted masses; the arithmetic
/// impls make reductions over masses order independent up to floating
/// point rounding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pollutants {
    #[serde(rename = "PM25")]
    pub pm25: f64,
    #[serde(rename = "SOx")]
    pub sox: f64,
    #[serde(rename = "NOX")]
    pub nox: f64,
    #[serde(rename = "VOC")]
    pub voc: f64,
    #[serde(rename = "NH3")]
    pub nh3: f64,
    #[serde(rename = "CO2")]
    pub co2: f64,
}

impl Pollutants {
    pub const ZERO: Self = Self {
        pm25: 0.0,
        sox: 0.0,
        nox: 0.0,
        voc: 0.0,
        nh3: 0.0,
        co2: 0.0,
    };

    #[must_use]
    pub const fn new(pm25: f64, sox: f64, nox: f64, voc: f64, nh3: f64, co2: f64) -> Self {
        Self {
            pm25,
            sox,
            nox,
            voc,
            nh3,
            co2,
        }
    }

    #[must_use]
    pub const fn get(&self, pollutant: Pollutant) -> f64 {
        match pollutant {
            Pollutant::Pm25 => self.pm25,
            Pollutant::Sox => self.sox,
            Pollutant::Nox => self.nox,
            Pollutant::Voc => self.voc,
            Pollutant::Nh3 => self.nh3,
            Pollutant::Co2 => self.co2,
        }
    }

    pub const fn set(&mut self, pollutant: Pollutant, value: f64) {
        match pollutant {
            Pollutant::Pm25 => self.pm25 = value,
            Pollutant::Sox => self.sox = value,
            Pollutant::Nox => self.nox = value,
            Pollutant::Voc => self.voc = value,
            Pollutant::Nh3 => self.nh3 = value,
            Pollutant::Co2 => self.co2 = value,
        }
    }

    /// Builds a value by evaluating `f` for every pollutant.
    #[must_use]
    pub fn from_fn(mut f: impl FnMut(Pollutant) -> f64) -> Self {
        let mut out = Self::ZERO;
        for pollutant in Pollutant::ALL {
            out.set(pollutant, f(pollutant));
        }
        out
    }

    /// Values in [`Pollutant::ALL`] order.
    #[must_use]
    pub fn values(&self) -> [f64; 6] {
        Pollutant::ALL.map(|p| self.get(p))
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.values().iter().all(|v| v.is_finite())
    }
}

impl Add for Pollutants {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::from_fn(|p| self.get(p) + rhs.get(p))
    }
}

impl AddAssign for Pollutants {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Mul<f64> for Pollutants {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::from_fn(|p| self.get(p) * rhs)
    }
}

impl Sum for Pollutants {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Self> for Pollutants {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// Fleet-weighted per-mile emission factors for one geographic unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionFactorRow {
    /// Geographic unit identifier (12-character block group code).
    pub geoid: String,
    /// Mass emitted per mile driven, per pollutant.
    pub per_mile: Pollutants,
}

/// Why a trip failed. Used to bucket failures in the run summary.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Routing backend kept answering 5xx or without a route.
    TransientRouting,
    /// Routing backend refused the request (credential, quota, input).
    FatalRouting,
    /// Route geometry could not be decoded.
    Decode,
    /// Route had fewer than two points.
    EmptyRoute,
    /// Origin or destination lies outside every receptor region.
    NoZipMatch,
    /// Every segment midpoint fell outside every receptor region.
    NoSegmentMatch,
    /// No emission factor row for the trip's home unit.
    MissingFactor,
    /// Input row had a missing or invalid coordinate.
    MissingCoordinate,
    /// The worker task running the trip panicked.
    TaskAborted,
}

/// Emissions attributed for one successful trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripEmissions {
    pub origin_region: String,
    pub destination_region: String,
    /// Pollutant mass per receptor region.
    pub by_region: BTreeMap<String, Pollutants>,
    /// Total geodesic length of the route.
    pub route_miles: f64,
    /// Portion of [`Self::route_miles`] that landed in some region.
    pub attributed_miles: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TripOutcome {
    Success(TripEmissions),
    Failure { kind: ErrorKind, detail: String },
}

/// Final, immutable result of processing one trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripResult {
    pub trip_id: String,
    pub outcome: TripOutcome,
}

impl TripResult {
    #[must_use]
    pub const fn success(trip_id: String, emissions: TripEmissions) -> Self {
        Self {
            trip_id,
            outcome: TripOutcome::Success(emissions),
        }
    }

    #[must_use]
    pub fn failure(trip_id: String, kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            trip_id,
            outcome: TripOutcome::Failure {
                kind,
                detail: detail.into(),
            },
        }
    }

    #[must_use]
    pub const fn emissions(&self) -> Option<&TripEmissions> {
        match &self.outcome {
            TripOutcome::Success(emissions) => Some(emissions),
            TripOutcome::Failure { .. } => None,
        }
    }

    #[must_use]
    pub const fn error_kind(&self) -> Option<ErrorKind> {
        match &self.outcome {
            TripOutcome::Success(_) => None,
            TripOutcome::Failure { kind, .. } => Some(*kind),
        }
    }
}
