#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Driving route backends.
//!
//! Every backend implements [`Router`] and returns the same [`Route`]
//! representation, so the attribution pipeline does not care which one
//! produced the geometry:
//!
//! 1. **Routes API** ([`routes_api`]): remote HTTPS service, API key in a
//!    request header, retried on a fixed backoff schedule.
//! 2. **OSRM** ([`osrm`]): local routing daemon over plain HTTP, single
//!    attempt.
//!
//! Backend settings are defined in TOML files under `services/` and
//! exposed through [`config`].

pub mod config;
pub mod osrm;
pub mod geometry;
pub mod retry;
pub mod routes_api;

#[cfg(test)]
mod test_server;

use std::sync::Arc;

use async_trait::async_trait;
use commute_emissions_models::{ErrorKind, GeoPoint, Route};
use thiserror::Error;

pub use config::{BackendConfig, RouterConfig};

/// Errors from routing backends.
#[derive(Debug, Error)]
pub enum RouteError {
    /// Server error, empty route or dropped connection. Worth retrying.
    #[error("Transient routing error: {message}")]
    Transient {
        /// Description of the failure.
        message: String,
    },

    /// The backend rejected the request (credential, quota, bad input).
    #[error("Routing request rejected with HTTP {status}: {message}")]
    Fatal {
        /// HTTP status code.
        status: u16,
        /// Provider error message, or a body preview.
        message: String,
    },

    /// The route geometry was absent or malformed.
    #[error("Route decode error: {message}")]
    Decode {
        /// Description of the decoding failure.
        message: String,
    },

    /// HTTP request could not be built or sent.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid backend configuration.
    #[error("Router configuration error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },
}

impl RouteError {
    /// Maps this error onto the per-trip failure taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient { .. } => ErrorKind::TransientRouting,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::Fatal { .. } | Self::Http(_) | Self::Config { .. } => ErrorKind::FatalRouting,
        }
    }

    /// Classifies a failed `send()`: dropped connections and timeouts are
    /// transient, anything else is permanent.
    pub(crate) fn from_send(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            Self::Transient {
                message: e.to_string(),
            }
        } else {
            Self::Http(e)
        }
    }
}

/// A source of driving routes between two points.
#[async_trait]
pub trait Router: Send + Sync {
    /// Short backend identifier for logs.
    fn name(&self) -> &str;

    /// Returns the ordered route geometry from `origin` to `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError`] if no route could be obtained.
    async fn fetch_route(&self, origin: GeoPoint, destination: GeoPoint)
    -> Result<Route, RouteError>;
}

/// Constructs the router described by `config`.
///
/// `credential` is required by backends that authenticate (Routes API)
/// and ignored by the others.
///
/// # Errors
///
/// Returns [`RouteError::Config`] if a required credential is missing or
/// the configuration is invalid, or [`RouteError::Http`] if the HTTP
/// client cannot be built.
pub fn build_router(
    config: &RouterConfig,
    credential: Option<String>,
) -> Result<Arc<dyn Router>, RouteError> {
    let client = reqwest::Client::builder().build()?;

    let router: Arc<dyn Router> = match &config.backend {
        BackendConfig::RoutesApi(settings) => {
            let api_key = credential.ok_or_else(|| RouteError::Config {
                message: format!("backend '{}' requires an API key", config.id),
            })?;
            Arc::new(routes_api::RoutesApiRouter::new(
                client,
                settings.clone(),
                api_key,
            )?)
        }
        BackendConfig::Osrm(settings) => Arc::new(osrm::OsrmRouter::new(client, settings.clone())),
    };

    log::info!("Using routing backend '{}' ({})", config.id, config.name);

    Ok(router)
}

/// Truncates a response body for inclusion in an error message.
pub(crate) fn preview(body: &str) -> String {
    const BODY_PREVIEW_LEN: usize = 300;

    if body.len() > BODY_PREVIEW_LEN {
        let mut end = BODY_PREVIEW_LEN;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}
