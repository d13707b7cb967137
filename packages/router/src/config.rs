//! Compile-time registry of routing backend configurations.
//!
//! Each backend is defined in a TOML file under `services/`. The registry
//! embeds these at compile time; a user-supplied file with the same shape
//! can replace them at runtime via [`from_toml_str`].

use serde::Deserialize;

use crate::RouteError;
use crate::retry::DEFAULT_BACKOFF_SECS;

/// A routing backend configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    /// Unique identifier (e.g., `"routes_api"`, `"osrm"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Backend-specific settings.
    pub backend: BackendConfig,
}

/// Backend-specific settings, tagged by `type` in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Remote HTTPS routing service.
    RoutesApi(RoutesApiSettings),
    /// Local OSRM daemon.
    Osrm(OsrmSettings),
}

impl BackendConfig {
    /// The `type` tag this variant is read from.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RoutesApi(_) => "routes_api",
            Self::Osrm(_) => "osrm",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutesApiSettings {
    /// Full `computeRoutes` endpoint URL.
    pub base_url: String,
    #[serde(default = "default_travel_mode")]
    pub travel_mode: String,
    #[serde(default = "default_routing_preference")]
    pub routing_preference: String,
    /// Response field mask; must select the encoded polyline.
    #[serde(default = "default_field_mask")]
    pub field_mask: String,
    /// Per-attempt request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Delay before each attempt, in seconds.
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: Vec<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsrmSettings {
    /// Daemon root (e.g., `"http://localhost:5000"`).
    pub base_url: String,
    #[serde(default = "default_profile")]
    pub profile: String,
}

fn default_travel_mode() -> String {
    "DRIVE".to_string()
}

fn default_routing_preference() -> String {
    "TRAFFIC_AWARE".to_string()
}

fn default_field_mask() -> String {
    "routes.polyline.encodedPolyline".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

fn default_backoff_secs() -> Vec<u64> {
    DEFAULT_BACKOFF_SECS.to_vec()
}

fn default_profile() -> String {
    "driving".to_string()
}

// ── Compile-time embedded TOML files ────────────────────────────────

const BACKEND_TOMLS: &[(&str, &str)] = &[
    ("routes_api", include_str!("../services/routes_api.toml")),
    ("osrm", include_str!("../services/osrm.toml")),
];

/// Parses a backend configuration from TOML text.
///
/// # Errors
///
/// Returns [`RouteError::Config`] if the text is not a valid backend
/// configuration.
pub fn from_toml_str(text: &str) -> Result<RouterConfig, RouteError> {
    toml::de::from_str(text).map_err(|e| RouteError::Config {
        message: format!("invalid router configuration: {e}"),
    })
}

/// Returns all embedded backend configurations.
///
/// # Errors
///
/// Returns [`RouteError::Config`] if an embedded file is malformed.
pub fn all_backends() -> Result<Vec<RouterConfig>, RouteError> {
    BACKEND_TOMLS
        .iter()
        .map(|(name, text)| {
            from_toml_str(text).map_err(|e| RouteError::Config {
                message: format!("embedded backend '{name}': {e}"),
            })
        })
        .collect()
}

/// Returns the embedded configuration with the given id.
///
/// # Errors
///
/// Returns [`RouteError::Config`] if no embedded backend has that id.
pub fn backend(id: &str) -> Result<RouterConfig, RouteError> {
    all_backends()?
        .into_iter()
        .find(|c| c.id == id)
        .ok_or_else(|| RouteError::Config {
            message: format!("unknown routing backend '{id}'"),
        })
}
