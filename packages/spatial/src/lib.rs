#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial index of receptor regions.
//!
//! Loads ZIP-like region polygons once, builds an R-tree over their
//! bounding boxes and answers two point lookups with different boundary
//! rules:
//!
//! - [`ReceptorIndex::region_intersecting`]: boundary inclusive. Used for
//!   route segment midpoints.
//! - [`ReceptorIndex::region_containing`]: strict interior. Used for trip
//!   origins and destinations.
//!
//! When several regions qualify (shared borders, overlapping input) the
//! region with the smallest id wins, so lookups are deterministic and a
//! point is never counted twice.

use std::collections::BTreeSet;

use commute_emissions_models::GeoPoint;
use geo::{BoundingRect, Contains, Intersects, MultiPolygon};
use geojson::GeoJson;
use rstar::{AABB, RTree, RTreeObject};
use thiserror::Error;

/// Property holding the region id in TIGER 2020 ZCTA files.
pub const DEFAULT_ID_PROPERTY: &str = "ZCTA5CE20";

/// Errors from building a [`ReceptorIndex`].
#[derive(Debug, Error)]
pub enum SpatialError {
    /// Input was not parseable `GeoJSON`.
    #[error("GeoJSON parse error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// Two regions share an id.
    #[error("Duplicate receptor region id '{id}'")]
    DuplicateRegion {
        /// The repeated id.
        id: String,
    },

    /// No usable region was found in the input.
    #[error("No receptor regions loaded")]
    Empty,
}

/// A polygon-bounded receptor area.
#[derive(Debug, Clone)]
pub struct ReceptorRegion {
    pub id: String,
    pub boundary: MultiPolygon<f64>,
}

/// A region polygon stored in the R-tree.
struct RegionEntry {
    id: String,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for RegionEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Read-only receptor region index.
///
/// Constructed once per run and shared across all pipeline tasks.
pub struct ReceptorIndex {
    regions: RTree<RegionEntry>,
}

impl ReceptorIndex {
    /// Builds the index from already-parsed regions.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::DuplicateRegion`] if two regions share an
    /// id, or [`SpatialError::Empty`] if there are none.
    pub fn new(regions: impl IntoIterator<Item = ReceptorRegion>) -> Result<Self, SpatialError> {
        let mut seen = BTreeSet::new();
        let mut entries = Vec::new();

        for region in regions {
            if !seen.insert(region.id.clone()) {
                return Err(SpatialError::DuplicateRegion { id: region.id });
            }
            entries.push(RegionEntry {
                envelope: compute_envelope(&region.boundary),
                id: region.id,
                polygon: region.boundary,
            });
        }

        if entries.is_empty() {
            return Err(SpatialError::Empty);
        }

        let regions = RTree::bulk_load(entries);
        log::info!("Loaded {} receptor regions into spatial index", regions.size());

        Ok(Self { regions })
    }

    /// Parses a `GeoJSON` `FeatureCollection` of region polygons.
    ///
    /// The region id is read from `id_property` (string or number).
    /// Features without an id or without (multi)polygon geometry are
    /// skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the text is not `GeoJSON`, or if
    /// [`Self::new`] rejects the parsed regions.
    pub fn from_geojson(text: &str, id_property: &str) -> Result<Self, SpatialError> {
        let geojson: GeoJson = text.parse()?;
        let features = match geojson {
            GeoJson::FeatureCollection(fc) => fc.features,
            GeoJson::Feature(feature) => vec![feature],
            GeoJson::Geometry(_) => Vec::new(),
        };

        let mut regions = Vec::with_capacity(features.len());
        for (i, feature) in features.into_iter().enumerate() {
            let Some(id) = feature.property(id_property).and_then(property_to_id) else {
                log::warn!("Skipping feature {i}: no '{id_property}' property");
                continue;
            };
            let Some(boundary) = feature.geometry.and_then(to_multipolygon) else {
                log::warn!("Skipping region {id}: geometry is not a polygon");
                continue;
            };
            regions.push(ReceptorRegion { id, boundary });
        }

        Self::new(regions)
    }

    /// Region whose boundary or interior touches `point`.
    #[must_use]
    pub fn region_intersecting(&self, point: GeoPoint) -> Option<&str> {
        let p = to_geo(point);
        let query_env = AABB::from_point([point.longitude, point.latitude]);
        self.regions
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.intersects(&p))
            .map(|entry| entry.id.as_str())
            .min()
    }

    /// Region whose interior strictly contains `point`.
    #[must_use]
    pub fn region_containing(&self, point: GeoPoint) -> Option<&str> {
        let p = to_geo(point);
        let query_env = AABB::from_point([point.longitude, point.latitude]);
        self.regions
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.contains(&p))
            .map(|entry| entry.id.as_str())
            .min()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.size()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.size() == 0
    }
}

/// Converts a [`GeoPoint`] to a `geo` point (x = longitude).
#[must_use]
pub fn to_geo(point: GeoPoint) -> geo::Point<f64> {
    geo::Point::new(point.longitude, point.latitude)
}

fn property_to_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn to_multipolygon(geometry: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}
