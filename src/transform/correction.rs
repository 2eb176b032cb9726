//! Decimal-error correction for speed readings.

use crate::config::QualityThresholds;

/// Some counting stations report average speed divided by 100 (0.45 for
/// 45 km/h). Returns the corrected value and whether a correction happened.
///
/// Applied once per raw value; callers must not feed a corrected speed back in.
pub fn correct_decimal_speed(speed: Option<f64>, t: &QualityThresholds) -> (Option<f64>, bool) {
    match speed {
        Some(k) if k > 0.0 && k < t.decimal_error_ceiling => {
            (Some(k * t.decimal_correction_factor), true)
        }
        other => (other, false),
    }
}
