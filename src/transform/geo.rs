//! Coordinate extraction from the export's `geo_point_2d` field. Malformed
//! points are not an error, they just leave the coordinates empty.

use serde_json::Value;

/// Splits a `{"lat": .., "lon": ..}` point into independent coordinates.
/// Any other shape, or a non-numeric component, yields `None` for that side.
pub fn extract_coordinates(point: Option<&Value>) -> (Option<f64>, Option<f64>) {
    match point {
        Some(Value::Object(map)) => (
            map.get("lat").and_then(Value::as_f64),
            map.get("lon").and_then(Value::as_f64),
        ),
        _ => (None, None),
    }
}
