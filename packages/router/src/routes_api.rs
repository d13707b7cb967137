//! Google Maps Routes API (v2 `computeRoutes`) backend.
//!
//! One `POST` per attempt with the API key in `X-Goog-Api-Key` and a field
//! mask restricting the response to the encoded polyline. Attempts follow
//! the configured [`BackoffSchedule`]:
//!
//! - HTTP 5xx, a response without routes or without a polyline, a
//!   timeout or a dropped connection moves to the next scheduled attempt.
//! - Any other non-success status (invalid key, quota, malformed request)
//!   fails immediately.
//! - A polyline that does not decode fails with a decode error.
//!
//! See <https://developers.google.com/maps/documentation/routes/compute_route_directions>

use std::time::Duration;

use async_trait::async_trait;
use commute_emissions_models::{GeoPoint, Route};
use reqwest::StatusCode;
use serde_json::json;

use crate::config::RoutesApiSettings;
use crate::retry::{self, Attempt, BackoffSchedule};
use crate::{RouteError, Router, geometry, preview};

/// Router backed by the remote Routes API.
pub struct RoutesApiRouter {
    client: reqwest::Client,
    settings: RoutesApiSettings,
    api_key: String,
    schedule: BackoffSchedule,
    timeout: Duration,
}

impl RoutesApiRouter {
    /// # Errors
    ///
    /// Returns [`RouteError::Config`] if the API key is empty or the
    /// backoff schedule is empty.
    pub fn new(
        client: reqwest::Client,
        settings: RoutesApiSettings,
        api_key: String,
    ) -> Result<Self, RouteError> {
        if api_key.trim().is_empty() {
            return Err(RouteError::Config {
                message: "Routes API key is empty".to_string(),
            });
        }

        let schedule = BackoffSchedule::from_secs(&settings.backoff_secs)?;
        let timeout = Duration::from_secs(settings.timeout_secs);

        Ok(Self {
            client,
            settings,
            api_key,
            schedule,
            timeout,
        })
    }

    async fn attempt(&self, body: &serde_json::Value) -> Attempt<Route> {
        let result = self
            .client
            .post(&self.settings.base_url)
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", &self.settings.field_mask)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                return match RouteError::from_send(e) {
                    e @ RouteError::Transient { .. } => Attempt::Retry(e),
                    e => Attempt::Fail(e),
                };
            }
        };

        let status = response.status();
        match response.text().await {
            Ok(text) => classify_response(status, &text),
            Err(e) => Attempt::Retry(RouteError::Transient {
                message: format!("failed to read response body: {e}"),
            }),
        }
    }
}

#[async_trait]
impl Router for RoutesApiRouter {
    fn name(&self) -> &str {
        "routes_api"
    }

    async fn fetch_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<Route, RouteError> {
        let body = request_body(
            origin,
            destination,
            &self.settings.travel_mode,
            &self.settings.routing_preference,
        );

        let body = &body;
        retry::run(&self.schedule, move |_| self.attempt(body)).await
    }
}

/// Builds the `computeRoutes` request body.
#[must_use]
pub fn request_body(
    origin: GeoPoint,
    destination: GeoPoint,
    travel_mode: &str,
    routing_preference: &str,
) -> serde_json::Value {
    json!({
        "origin": {
            "location": {
                "latLng": { "latitude": origin.latitude, "longitude": origin.longitude }
            }
        },
        "destination": {
            "location": {
                "latLng": { "latitude": destination.latitude, "longitude": destination.longitude }
            }
        },
        "travelMode": travel_mode,
        "routingPreference": routing_preference,
    })
}

/// Decides what a single response means for the retry loop.
#[must_use]
pub fn classify_response(status: StatusCode, body: &str) -> Attempt<Route> {
    if status.is_server_error() {
        return Attempt::Retry(RouteError::Transient {
            message: format!("HTTP {status}"),
        });
    }

    if !status.is_success() {
        return Attempt::Fail(RouteError::Fatal {
            status: status.as_u16(),
            message: error_message(body),
        });
    }

    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            return Attempt::Fail(RouteError::Decode {
                message: format!("response is not JSON: {e} ({})", preview(body)),
            });
        }
    };

    let has_route = value
        .get("routes")
        .and_then(serde_json::Value::as_array)
        .is_some_and(|routes| !routes.is_empty());
    if !has_route {
        return Attempt::Retry(RouteError::Transient {
            message: "Routes API returned no routes".to_string(),
        });
    }

    let Some(encoded) = value
        .pointer("/routes/0/polyline/encodedPolyline")
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
    else {
        return Attempt::Retry(RouteError::Decode {
            message: "no encoded polyline in Routes API response".to_string(),
        });
    };

    match geometry::decode(encoded) {
        Ok(points) => Attempt::Done(Route::new(points)),
        Err(e) => Attempt::Fail(e),
    }
}

/// Extracts `error.message` from an error body, falling back to a preview.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(serde_json::Value::as_str)
                .map(String::from)
        })
        .unwrap_or_else(|| preview(body))
}
