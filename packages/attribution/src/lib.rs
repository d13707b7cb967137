#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Commute route emission attribution.
//!
//! Each trip runs through the same stages:
//!
//! 1. Route the home→work pair through a [`Router`](commute_emissions_router::Router).
//! 2. Split the route into segments ([`segments`]).
//! 3. Assign every segment to the receptor region under its midpoint
//!    ([`attribute`]).
//! 4. Multiply per-region miles by the trip's per-mile factors
//!    ([`emissions`]).
//!
//! [`pipeline::RouteProcessor`] runs trips concurrently on a bounded
//! pool and turns every per-trip error into a failure result. The
//! results are reduced into region tables by [`aggregate`] and
//! summarized by [`summary`].

pub mod aggregate;
pub mod attribute;
pub mod emissions;
pub mod pipeline;
pub mod progress;
pub mod segments;
pub mod summary;

use commute_emissions_models::{ErrorKind, GeoPoint, InvalidCoordinate};
use commute_emissions_router::RouteError;
use thiserror::Error;

use crate::attribute::Endpoint;

/// Why a single trip could not be attributed.
#[derive(Debug, Error)]
pub enum TripError {
    #[error(transparent)]
    Routing(#[from] RouteError),

    #[error("Route has {points} point(s), need at least 2")]
    EmptyRoute { points: usize },

    #[error("Trip {endpoint} {point} is not inside any receptor region")]
    NoZipMatch { endpoint: Endpoint, point: GeoPoint },

    #[error("None of the {segments} route segments fall in a receptor region")]
    NoSegmentMatch { segments: usize },

    #[error("No emission factor row for unit '{prefix}'")]
    MissingFactor { prefix: String },

    #[error(transparent)]
    MissingCoordinate(#[from] InvalidCoordinate),
}

impl TripError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Routing(e) => e.kind(),
            Self::EmptyRoute { .. } => ErrorKind::EmptyRoute,
            Self::NoZipMatch { .. } => ErrorKind::NoZipMatch,
            Self::NoSegmentMatch { .. } => ErrorKind::NoSegmentMatch,
            Self::MissingFactor { .. } => ErrorKind::MissingFactor,
            Self::MissingCoordinate(_) => ErrorKind::MissingCoordinate,
        }
    }
}

/// Batch-level failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Fewer results came back than trips were submitted. Output built
    /// from such a run must not be treated as final.
    #[error("Incomplete run: {received} of {submitted} trip results collected")]
    Incomplete { submitted: usize, received: usize },
}
