//! Bounded concurrent trip processing.
//!
//! Every trip is an independent task: factor lookup, endpoint lookup,
//! routing, segmentation, spatial attribution and emission attribution.
//! At most [`PipelineConfig::workers`] tasks are in flight at once, and a
//! task keeps its slot while its router sleeps between retries, so the
//! number of concurrent routing calls never exceeds the pool size.
//!
//! Tasks never return errors across the pool boundary. Each one yields a
//! [`TripResult`]; a panicking task becomes a
//! [`ErrorKind::TaskAborted`] failure. Results arrive in completion order.

use std::sync::Arc;

use commute_emissions_factors::FactorTable;
use commute_emissions_models::{ErrorKind, Trip, TripEmissions, TripRecord, TripResult};
use commute_emissions_router::Router;
use commute_emissions_spatial::ReceptorIndex;
use futures::stream::{self, StreamExt as _};
use serde::{Deserialize, Serialize};

use crate::progress::ProgressCallback;
use crate::{TripError, attribute, emissions, segments};

pub const DEFAULT_WORKERS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum trips processed concurrently.
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Runs trips through routing and attribution against shared, read-only
/// region and factor data.
#[derive(Clone)]
pub struct RouteProcessor {
    router: Arc<dyn Router>,
    regions: Arc<ReceptorIndex>,
    factors: Arc<FactorTable>,
    workers: usize,
}

impl RouteProcessor {
    #[must_use]
    pub fn new(
        router: Arc<dyn Router>,
        regions: Arc<ReceptorIndex>,
        factors: Arc<FactorTable>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            router,
            regions,
            factors,
            workers: config.workers.max(1),
        }
    }

    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Processes one trip, capturing any failure in the result.
    pub async fn process_trip(&self, trip: &Trip) -> TripResult {
        match self.attribute_trip(trip).await {
            Ok(emissions) => TripResult::success(trip.id.clone(), emissions),
            Err(e) => {
                log::debug!("Trip {} failed ({}): {e}", trip.id, e.kind());
                TripResult::failure(trip.id.clone(), e.kind(), e.to_string())
            }
        }
    }

    async fn attribute_trip(&self, trip: &Trip) -> Result<TripEmissions, TripError> {
        // Both lookups are cheap and fail the trip anyway; do them before
        // spending a routing call.
        let factor = emissions::factor_for(&self.factors, &trip.home_geoid)?;
        let (origin_region, destination_region) =
            attribute::locate_endpoints(&self.regions, trip.home, trip.work)?;

        let route = self.router.fetch_route(trip.home, trip.work).await?;
        let segments = segments::decompose(&route)?;
        let attribution = attribute::attribute_segments(&self.regions, &segments);

        if attribution.by_region.is_empty() {
            return Err(TripError::NoSegmentMatch {
                segments: segments.len(),
            });
        }
        if attribution.unmatched_segments > 0 {
            log::debug!(
                "Trip {}: {} of {} segments outside all regions ({:.3} mi dropped)",
                trip.id,
                attribution.unmatched_segments,
                segments.len(),
                attribution.unattributed_miles,
            );
        }

        Ok(TripEmissions {
            origin_region,
            destination_region,
            by_region: emissions::attribute_emissions(&attribution.by_region, factor),
            route_miles: segments::total_miles(&segments),
            attributed_miles: attribution.attributed_miles,
        })
    }

    /// Processes all trips on the bounded pool.
    ///
    /// Returns one result per trip, in completion order. `progress` is
    /// advanced once per finished trip.
    pub async fn run(
        &self,
        trips: Vec<Trip>,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Vec<TripResult> {
        progress.set_total(trips.len() as u64);
        log::info!(
            "Processing {} trips via '{}' (workers={})",
            trips.len(),
            self.router.name(),
            self.workers
        );

        let results: Vec<TripResult> = stream::iter(trips.into_iter().map(|trip| {
            let processor = self.clone();
            async move {
                let trip_id = trip.id.clone();
                let handle = tokio::spawn(async move { processor.process_trip(&trip).await });
                match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        log::error!("Task for trip {trip_id} aborted: {e}");
                        TripResult::failure(trip_id, ErrorKind::TaskAborted, e.to_string())
                    }
                }
            }
        }))
        .buffer_unordered(self.workers)
        .inspect(|_| progress.inc(1))
        .collect()
        .await;

        let succeeded = results.iter().filter(|r| r.emissions().is_some()).count();
        progress.finish(format!("{succeeded} of {} trips attributed", results.len()));

        results
    }
}

/// Validates raw records.
///
/// Returns the trips to submit and a [`ErrorKind::MissingCoordinate`]
/// failure for every record that was not submitted.
#[must_use]
pub fn prepare_trips(
    records: impl IntoIterator<Item = TripRecord>,
) -> (Vec<Trip>, Vec<TripResult>) {
    let mut trips = Vec::new();
    let mut rejected = Vec::new();

    for record in records {
        let id = record.id.clone();
        match Trip::try_from(record) {
            Ok(trip) => trips.push(trip),
            Err(e) => {
                let e = TripError::from(e);
                log::debug!("Skipping trip {id}: {e}");
                rejected.push(TripResult::failure(id, e.kind(), e.to_string()));
            }
        }
    }

    if !rejected.is_empty() {
        log::warn!(
            "{} trip records have missing or invalid coordinates",
            rejected.len()
        );
    }

    (trips, rejected)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use commute_emissions_models::{EmissionFactorRow, GeoPoint, Pollutant, Pollutants, Route};
    use commute_emissions_router::RouteError;
    use commute_emissions_spatial::ReceptorRegion;
    use geo::{LineString, MultiPolygon, Polygon};

    use super::*;
    use crate::progress::null_progress;

    type Respond = dyn Fn(GeoPoint, GeoPoint) -> Result<Route, RouteError> + Send + Sync;

    /// In-memory router that counts calls and concurrent requests.
    struct StubRouter {
        respond: Box<Respond>,
        delay: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl StubRouter {
        fn new(
            respond: impl Fn(GeoPoint, GeoPoint) -> Result<Route, RouteError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                respond: Box::new(respond),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        /// Straight line through the midpoint.
        fn straight() -> Self {
            Self::new(|o, d| Ok(Route::new(vec![o, o.midpoint(&d), d])))
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Router for StubRouter {
        fn name(&self) -> &str {
            "stub"
        }

        async fn fetch_route(
            &self,
            origin: GeoPoint,
            destination: GeoPoint,
        ) -> Result<Route, RouteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let result = (self.respond)(origin, destination);

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn square(id: &str, min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> ReceptorRegion {
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

    fn regions() -> Arc<ReceptorIndex> {
        Arc::new(
            ReceptorIndex::new([
                square("95110", -122.1, 37.0, -122.0, 37.1),
                square("95112", -122.0, 37.0, -121.9, 37.1),
            ])
            .unwrap(),
        )
    }

    fn factors() -> Arc<FactorTable> {
        Arc::new(
            FactorTable::new(
                vec![EmissionFactorRow {
                    geoid: "060855012001".to_string(),
                    per_mile: Pollutants::new(0.01, 0.02, 0.03, 0.04, 0.05, 0.4),
                }],
                12,
            )
            .unwrap(),
        )
    }

    fn processor(router: Arc<StubRouter>, workers: usize) -> RouteProcessor {
        RouteProcessor::new(router, regions(), factors(), PipelineConfig { workers })
    }

    fn trip(id: &str, home: (f64, f64), work: (f64, f64)) -> Trip {
        Trip {
            id: id.to_string(),
            home_geoid: "060855012001003".to_string(),
            home: GeoPoint::new(home.0, home.1),
            work: GeoPoint::new(work.0, work.1),
        }
    }

    #[tokio::test]
    async fn trip_inside_one_region_attributes_everything_there() {
        let router = Arc::new(StubRouter::straight());
        let result = processor(router.clone(), 2)
            .process_trip(&trip("a", (37.02, -122.05), (37.08, -122.03)))
            .await;

        let emissions = result.emissions().unwrap();
        assert_eq!(emissions.origin_region, "95110");
        assert_eq!(emissions.destination_region, "95110");
        assert_eq!(emissions.by_region.keys().collect::<Vec<_>>(), ["95110"]);
        assert!((emissions.attributed_miles - emissions.route_miles).abs() < 1e-12);
        assert!(
            (emissions.by_region["95110"].get(Pollutant::Co2) - emissions.route_miles * 0.4).abs()
                < 1e-9
        );
        assert_eq!(router.calls(), 1);
    }

    #[tokio::test]
    async fn trip_crossing_regions_splits_miles() {
        let result = processor(Arc::new(StubRouter::straight()), 2)
            .process_trip(&trip("b", (37.05, -122.05), (37.05, -121.95)))
            .await;

        let emissions = result.emissions().unwrap();
        assert_eq!(emissions.origin_region, "95110");
        assert_eq!(emissions.destination_region, "95112");
        assert_eq!(emissions.by_region.len(), 2);
        let a = emissions.by_region["95110"].get(Pollutant::Nox);
        let b = emissions.by_region["95112"].get(Pollutant::Nox);
        assert!((a - b).abs() < 1e-6);
        assert!(emissions.attributed_miles <= emissions.route_miles + 1e-12);
    }

    #[tokio::test]
    async fn missing_factor_fails_before_routing() {
        let router = Arc::new(StubRouter::straight());
        let mut t = trip("c", (37.02, -122.05), (37.08, -122.03));
        t.home_geoid = "060855011001002".to_string();

        let result = processor(router.clone(), 2).process_trip(&t).await;

        assert_eq!(result.error_kind(), Some(ErrorKind::MissingFactor));
        assert_eq!(router.calls(), 0);
    }

    #[tokio::test]
    async fn destination_outside_regions_is_no_zip_match() {
        let router = Arc::new(StubRouter::straight());
        let result = processor(router.clone(), 2)
            .process_trip(&trip("d", (37.02, -122.05), (38.0, -121.0)))
            .await;

        assert_eq!(result.error_kind(), Some(ErrorKind::NoZipMatch));
        assert_eq!(router.calls(), 0);
    }

    #[tokio::test]
    async fn route_entirely_outside_regions_is_no_segment_match() {
        let detour = Route::new(vec![
            GeoPoint::new(38.0, -121.0),
            GeoPoint::new(38.1, -121.0),
            GeoPoint::new(38.2, -121.0),
        ]);
        let router = Arc::new(StubRouter::new(move |_, _| Ok(detour.clone())));

        let result = processor(router, 2)
            .process_trip(&trip("e", (37.02, -122.05), (37.08, -122.03)))
            .await;

        assert_eq!(result.error_kind(), Some(ErrorKind::NoSegmentMatch));
    }

    #[tokio::test]
    async fn routing_errors_keep_their_kind() {
        let router = Arc::new(StubRouter::new(|o, d| {
            if o.latitude > 37.05 {
                Err(RouteError::Fatal {
                    status: 403,
                    message: "denied".to_string(),
                })
            } else if d.latitude > 37.05 {
                Ok(Route::new(vec![o]))
            } else {
                Err(RouteError::Decode {
                    message: "bad polyline".to_string(),
                })
            }
        }));
        let p = processor(router, 2);

        let fatal = p.process_trip(&trip("f", (37.06, -122.05), (37.01, -122.03))).await;
        let empty = p.process_trip(&trip("g", (37.02, -122.05), (37.08, -122.03))).await;
        let decode = p.process_trip(&trip("h", (37.02, -122.05), (37.03, -122.03))).await;

        assert_eq!(fatal.error_kind(), Some(ErrorKind::FatalRouting));
        assert_eq!(empty.error_kind(), Some(ErrorKind::EmptyRoute));
        assert_eq!(decode.error_kind(), Some(ErrorKind::Decode));
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_batch() {
        let router = Arc::new(StubRouter::new(|o, d| {
            if o.latitude > 37.05 {
                Err(RouteError::Transient {
                    message: "HTTP 503".to_string(),
                })
            } else {
                Ok(Route::new(vec![o, d]))
            }
        }));
        let trips = vec![
            trip("1", (37.02, -122.05), (37.03, -122.05)),
            trip("2", (37.06, -122.05), (37.03, -122.05)),
            trip("3", (37.02, -121.95), (37.04, -121.95)),
        ];

        let mut results = processor(router, 2).run(trips, &null_progress()).await;
        results.sort_by(|a, b| a.trip_id.cmp(&b.trip_id));

        assert_eq!(results.len(), 3);
        assert!(results[0].emissions().is_some());
        assert_eq!(results[1].error_kind(), Some(ErrorKind::TransientRouting));
        assert!(results[2].emissions().is_some());
    }

    #[tokio::test]
    async fn panicking_task_becomes_a_failure() {
        let router = Arc::new(StubRouter::new(|o, d| {
            assert!(o.latitude < 37.05, "router blew up");
            Ok(Route::new(vec![o, d]))
        }));
        let trips = vec![
            trip("ok", (37.02, -122.05), (37.03, -122.05)),
            trip("boom", (37.06, -122.05), (37.03, -122.05)),
        ];

        let mut results = processor(router, 2).run(trips, &null_progress()).await;
        results.sort_by(|a, b| a.trip_id.cmp(&b.trip_id));

        assert_eq!(results[0].trip_id, "boom");
        assert_eq!(results[0].error_kind(), Some(ErrorKind::TaskAborted));
        assert!(results[1].emissions().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_requests_never_exceed_workers() {
        let mut stub = StubRouter::straight();
        stub.delay = Duration::from_secs(1);
        let router = Arc::new(stub);
        let trips: Vec<Trip> = (0..6)
            .map(|i| trip(&i.to_string(), (37.02, -122.05), (37.08, -122.03)))
            .collect();

        let results = processor(router.clone(), 2).run(trips, &null_progress()).await;

        assert_eq!(results.len(), 6);
        assert_eq!(router.calls(), 6);
        assert_eq!(router.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn invalid_records_are_not_submitted() {
        let good = TripRecord {
            id: "1".to_string(),
            h_geocode: "060855012001003".to_string(),
            home_lat: Some(37.02),
            home_lon: Some(-122.05),
            work_lat: Some(37.08),
            work_lon: Some(-122.03),
        };
        let bad = TripRecord {
            id: "2".to_string(),
            home_lat: None,
            ..good.clone()
        };

        let (trips, rejected) = prepare_trips([good, bad]);

        assert_eq!(trips.len(), 1);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].trip_id, "2");
        assert_eq!(rejected[0].error_kind(), Some(ErrorKind::MissingCoordinate));
    }

    #[test]
    fn zero_workers_is_clamped_to_one() {
        let p = processor(Arc::new(StubRouter::straight()), 0);
        assert_eq!(p.workers(), 1);
    }
}
