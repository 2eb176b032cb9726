//! Row admission: drops rows with no signal and physically impossible values.

use crate::config::QualityThresholds;

/// Flows are stored as whole vehicle counts; anything at or above this does
/// not fit in an `i64`.
const MAX_STORABLE_FLOW: f64 = i64::MAX as f64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Neither flow nor speed present.
    NoSignal,
    /// Speed above the cap, or a flow that is negative, not finite or too
    /// large to store as a count.
    Outlier,
}

/// `speed` must already be decimal-corrected.
pub fn admit(flow: Option<f64>, speed: Option<f64>, t: &QualityThresholds) -> Admission {
    if flow.is_none() && speed.is_none() {
        return Admission::NoSignal;
    }
    let too_fast = speed.is_some_and(|k| k > t.max_speed);
    let bad_flow = flow.is_some_and(|q| !(0.0..MAX_STORABLE_FLOW).contains(&q));
    if too_fast || bad_flow {
        Admission::Outlier
    } else {
        Admission::Admitted
    }
}
