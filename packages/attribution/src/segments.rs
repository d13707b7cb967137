//! Route decomposition into consecutive point pairs.

use commute_emissions_models::{GeoPoint, Route, Segment};
use commute_emissions_spatial::to_geo;
use geo::{Distance as _, Geodesic};

use crate::TripError;

const METERS_PER_MILE: f64 = 1609.344;

/// Geodesic (WGS84 ellipsoid) distance between two points, in miles.
#[must_use]
pub fn geodesic_miles(a: GeoPoint, b: GeoPoint) -> f64 {
    Geodesic.distance(to_geo(a), to_geo(b)) / METERS_PER_MILE
}

/// Splits a route of `n` points into `n - 1` segments.
///
/// # Errors
///
/// Returns [`TripError::EmptyRoute`] if the route has fewer than two
/// points.
pub fn decompose(route: &Route) -> Result<Vec<Segment>, TripError> {
    if route.len() < 2 {
        return Err(TripError::EmptyRoute {
            points: route.len(),
        });
    }

    Ok(route
        .points
        .windows(2)
        .map(|pair| {
            let (start, end) = (pair[0], pair[1]);
            Segment {
                start,
                end,
                midpoint: start.midpoint(&end),
                distance_miles: geodesic_miles(start, end),
            }
        })
        .collect())
}

/// Sum of segment distances.
#[must_use]
pub fn total_miles(segments: &[Segment]) -> f64 {
    segments.iter().map(|s| s.distance_miles).sum()
}
