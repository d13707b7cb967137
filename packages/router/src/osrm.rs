//! Local OSRM routing daemon backend.
//!
//! Issues a single `GET /route/v1/{profile}/{lon},{lat};{lon},{lat}` with
//! full-overview polyline geometry. There is no retry: the daemon runs
//! next to the pipeline and a failure is reported as-is.
//!
//! See <https://project-osrm.org/docs/v5.24.0/api/#route-service>

use async_trait::async_trait;
use commute_emissions_models::{GeoPoint, Route};
use reqwest::StatusCode;

use crate::config::OsrmSettings;
use crate::{RouteError, Router, geometry, preview};

/// Router backed by an OSRM instance.
pub struct OsrmRouter {
    client: reqwest::Client,
    settings: OsrmSettings,
}

impl OsrmRouter {
    #[must_use]
    pub const fn new(client: reqwest::Client, settings: OsrmSettings) -> Self {
        Self { client, settings }
    }

    #[must_use]
    pub fn route_url(&self, origin: GeoPoint, destination: GeoPoint) -> String {
        route_url(&self.settings, origin, destination)
    }
}

#[async_trait]
impl Router for OsrmRouter {
    fn name(&self) -> &str {
        "osrm"
    }

    async fn fetch_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<Route, RouteError> {
        let url = self.route_url(origin, destination);
        log::trace!("OSRM request: {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(RouteError::from_send)?;

        let status = response.status();
        let text = response.text().await.map_err(|e| RouteError::Transient {
            message: format!("failed to read OSRM response body: {e}"),
        })?;

        parse_response(status, &text)
    }
}

/// Builds the route service URL. OSRM expects `lon,lat` order.
#[must_use]
pub fn route_url(settings: &OsrmSettings, origin: GeoPoint, destination: GeoPoint) -> String {
    format!(
        "{base}/route/v1/{profile}/{o_lon},{o_lat};{d_lon},{d_lat}?overview=full&geometries=polyline",
        base = settings.base_url.trim_end_matches('/'),
        profile = settings.profile,
        o_lon = origin.longitude,
        o_lat = origin.latitude,
        d_lon = destination.longitude,
        d_lat = destination.latitude,
    )
}

/// Parses an OSRM route response.
///
/// # Errors
///
/// Returns [`RouteError::Transient`] for 5xx or an absent/empty route
/// list, [`RouteError::Fatal`] for other non-success statuses, and
/// [`RouteError::Decode`] if the geometry is missing or malformed.
pub fn parse_response(status: StatusCode, body: &str) -> Result<Route, RouteError> {
    if status.is_server_error() {
        return Err(RouteError::Transient {
            message: format!("OSRM HTTP {status}"),
        });
    }

    let value: Option<serde_json::Value> = serde_json::from_str(body).ok();

    if !status.is_success() {
        // OSRM reports `{"code": "NoRoute", "message": "..."}` with 400.
        let message = value
            .as_ref()
            .and_then(|v| {
                let code = v.get("code")?.as_str()?;
                let message = v.get("message").and_then(serde_json::Value::as_str);
                Some(message.map_or_else(|| code.to_string(), |m| format!("{code}: {m}")))
            })
            .unwrap_or_else(|| preview(body));
        return Err(RouteError::Fatal {
            status: status.as_u16(),
            message,
        });
    }

    let value = value.ok_or_else(|| RouteError::Decode {
        message: format!("OSRM response is not JSON: {}", preview(body)),
    })?;

    let first = value
        .get("routes")
        .and_then(serde_json::Value::as_array)
        .and_then(|routes| routes.first())
        .ok_or_else(|| RouteError::Transient {
            message: "OSRM returned no routes".to_string(),
        })?;

    let encoded = first
        .get("geometry")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| RouteError::Decode {
            message: "OSRM route has no polyline geometry".to_string(),
        })?;

    Ok(Route::new(geometry::decode(encoded)?))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_server;

    fn settings() -> OsrmSettings {
        OsrmSettings {
            base_url: "http://localhost:5000/".to_string(),
            profile: "driving".to_string(),
        }
    }

    #[test]
    fn url_uses_lon_lat_order() {
        let url = route_url(
            &settings(),
            GeoPoint::new(37.3, -121.9),
            GeoPoint::new(37.4, -122.0),
        );
        assert_eq!(
            url,
            "http://localhost:5000/route/v1/driving/-121.9,37.3;-122,37.4?overview=full&geometries=polyline"
        );
    }

    #[test]
    fn parses_route_geometry() {
        let body = json!({
            "code": "Ok",
            "routes": [{ "geometry": "_p~iF~ps|U_ulLnnqC_mqNvxq`@", "distance": 1.0 }]
        });
        let route = parse_response(StatusCode::OK, &body.to_string()).unwrap();
        assert_eq!(route.len(), 3);
    }

    #[test]
    fn empty_route_list_is_a_failure() {
        let body = json!({ "code": "Ok", "routes": [] });
        assert!(matches!(
            parse_response(StatusCode::OK, &body.to_string()),
            Err(RouteError::Transient { .. })
        ));
        assert!(matches!(
            parse_response(StatusCode::OK, "{}"),
            Err(RouteError::Transient { .. })
        ));
    }

    #[test]
    fn no_route_status_is_fatal() {
        let body = json!({ "code": "NoRoute", "message": "Impossible route" });
        match parse_response(StatusCode::BAD_REQUEST, &body.to_string()) {
            Err(RouteError::Fatal { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "NoRoute: Impossible route");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn empty_geometry_is_a_decode_error() {
        let body = json!({ "code": "Ok", "routes": [{ "geometry": "" }] });
        assert!(matches!(
            parse_response(StatusCode::OK, &body.to_string()),
            Err(RouteError::Decode { .. })
        ));
    }

    fn local_router(base_url: String) -> OsrmRouter {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        OsrmRouter::new(
            client,
            OsrmSettings {
                base_url,
                profile: "driving".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn fetch_route_issues_a_single_get() {
        let body = json!({
            "code": "Ok",
            "routes": [{ "geometry": "_p~iF~ps|U_ulLnnqC_mqNvxq`@" }]
        });
        let (base, log) = test_server::serve(vec![(200, body.to_string())]).await;

        let route = local_router(base)
            .fetch_route(GeoPoint::new(37.3, -121.9), GeoPoint::new(37.4, -122.0))
            .await
            .unwrap();
        assert_eq!(route.len(), 3);

        let requests = log.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "GET");
        assert_eq!(
            requests[0].target,
            "/route/v1/driving/-121.9,37.3;-122,37.4?overview=full&geometries=polyline"
        );
        assert!(requests[0].body.is_empty());
    }

    #[tokio::test]
    async fn server_error_is_not_retried() {
        let body = json!({ "code": "Ok", "routes": [{ "geometry": "_p~iF~ps|U" }] });
        let (base, log) =
            test_server::serve(vec![(503, String::new()), (200, body.to_string())]).await;

        let result = local_router(base)
            .fetch_route(GeoPoint::new(37.3, -121.9), GeoPoint::new(37.4, -122.0))
            .await;

        assert!(matches!(result, Err(RouteError::Transient { .. })));
        assert_eq!(log.lock().unwrap().len(), 1);
    }
}
