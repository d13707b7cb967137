//! Spatial attribution of segments and trip endpoints to receptor regions.
//!
//! Segments are assigned by their midpoint with the boundary-inclusive
//! intersects predicate. Endpoints use the stricter contains predicate.
//! A midpoint that touches no region is not reassigned; its miles are
//! reported as unattributed.

use std::collections::BTreeMap;

use commute_emissions_models::{GeoPoint, Segment};
use commute_emissions_spatial::ReceptorIndex;

use crate::TripError;

/// Miles driven per receptor region for one route.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentAttribution {
    pub by_region: BTreeMap<String, f64>,
    pub attributed_miles: f64,
    pub unattributed_miles: f64,
    pub unmatched_segments: usize,
}

/// Sums segment distances per region.
#[must_use]
pub fn attribute_segments(index: &ReceptorIndex, segments: &[Segment]) -> SegmentAttribution {
    let mut out = SegmentAttribution::default();

    for segment in segments {
        if let Some(region) = index.region_intersecting(segment.midpoint) {
            *out.by_region.entry(region.to_string()).or_insert(0.0) += segment.distance_miles;
            out.attributed_miles += segment.distance_miles;
        } else {
            out.unattributed_miles += segment.distance_miles;
            out.unmatched_segments += 1;
        }
    }

    out
}

/// Which end of the trip a lookup was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Origin,
    Destination,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Origin => "origin",
            Self::Destination => "destination",
        })
    }
}

/// Finds the region strictly containing each trip endpoint.
///
/// # Errors
///
/// Returns [`TripError::NoZipMatch`] for the first endpoint outside every
/// region.
pub fn locate_endpoints(
    index: &ReceptorIndex,
    origin: GeoPoint,
    destination: GeoPoint,
) -> Result<(String, String), TripError> {
    let locate = |endpoint, point| {
        index
            .region_containing(point)
            .map(String::from)
            .ok_or(TripError::NoZipMatch { endpoint, point })
    };

    Ok((
        locate(Endpoint::Origin, origin)?,
        locate(Endpoint::Destination, destination)?,
    ))
}

#[cfg(test)]
mod tests {
    use commute_emissions_spatial::ReceptorRegion;
    use geo::{LineString, MultiPolygon, Polygon};

    use super::*;
    use crate::segments::{decompose, total_miles};

    fn region(id: &str, min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> ReceptorRegion {
        ReceptorRegion {
            id: id.to_string(),
            boundary: MultiPolygon(vec![Polygon::new(
                LineString::from(vec![
                    (min_lon, min_lat),
                    (max_lon, min_lat),
                    (max_lon, max_lat),
                    (min_lon, max_lat),
                    (min_lon, min_lat),
                ]),
                vec![],
            )]),
        }
    }

    fn index() -> ReceptorIndex {
        ReceptorIndex::new([
            region("95110", -122.1, 36.9, -121.9, 37.01),
            region("95112", -122.1, 37.01, -121.9, 37.1),
        ])
        .unwrap()
    }

    fn route(lats: &[f64]) -> Vec<Segment> {
        let points: Vec<GeoPoint> = lats.iter().map(|&lat| GeoPoint::new(lat, -122.0)).collect();
        decompose(&points.into()).unwrap()
    }

    #[test]
    fn sums_miles_per_region() {
        let segments = route(&[37.00, 37.01, 37.02, 37.03]);
        let attribution = attribute_segments(&index(), &segments);

        assert_eq!(attribution.by_region.len(), 2);
        assert_eq!(attribution.unmatched_segments, 0);
        assert!((attribution.by_region["95110"] - segments[0].distance_miles).abs() < 1e-12);
        assert!(
            (attribution.by_region["95112"]
                - segments[1].distance_miles
                - segments[2].distance_miles)
                .abs()
                < 1e-12
        );
        assert!((attribution.attributed_miles - total_miles(&segments)).abs() < 1e-9);
    }

    #[test]
    fn unmatched_midpoints_are_dropped_not_reassigned() {
        let segments = route(&[37.06, 37.08, 37.16]);
        let attribution = attribute_segments(&index(), &segments);

        assert_eq!(attribution.unmatched_segments, 1);
        assert!((attribution.unattributed_miles - segments[1].distance_miles).abs() < 1e-12);
        let region_sum: f64 = attribution.by_region.values().sum();
        assert!(region_sum <= total_miles(&segments));
    }

    #[test]
    fn endpoints_inside_one_region() {
        let (origin, destination) = locate_endpoints(
            &index(),
            GeoPoint::new(36.95, -122.05),
            GeoPoint::new(36.99, -121.95),
        )
        .unwrap();
        assert_eq!(origin, "95110");
        assert_eq!(destination, "95110");
    }

    #[test]
    fn endpoint_on_border_has_no_containing_region() {
        let err = locate_endpoints(
            &index(),
            GeoPoint::new(36.95, -122.05),
            GeoPoint::new(37.01, -122.0),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TripError::NoZipMatch {
                endpoint: Endpoint::Destination,
                ..
            }
        ));
    }
}
