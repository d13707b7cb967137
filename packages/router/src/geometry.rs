//! Route geometry decoding.
//!
//! Both backends return the route as an encoded polyline at precision 5,
//! latitude first.

use commute_emissions_models::GeoPoint;

use crate::RouteError;

const PRECISION: u32 = 5;

/// Decodes an encoded polyline into ordered route points.
///
/// # Errors
///
/// Returns [`RouteError::Decode`] if the string is empty or is not a
/// valid polyline.
pub fn decode(encoded: &str) -> Result<Vec<GeoPoint>, RouteError> {
    if encoded.is_empty() {
        return Err(RouteError::Decode {
            message: "empty polyline".to_string(),
        });
    }

    let line = ::polyline::decode_polyline(encoded, PRECISION).map_err(|e| RouteError::Decode {
        message: format!("invalid polyline: {e}"),
    })?;

    Ok(line.0.into_iter().map(|c| GeoPoint::new(c.y, c.x)).collect())
}

#[cfg(test)]
pub(crate) fn encode(points: &[GeoPoint]) -> String {
    let coords = points.iter().map(|p| geo::Coord {
        x: p.longitude,
        y: p.latitude,
    });
    ::polyline::encode_coordinates(coords, PRECISION).unwrap()
}
