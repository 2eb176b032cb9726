//! Tiered quality classification.
//!
//! Tiers are evaluated in order and the first match wins:
//!
//! | Tier | Flag                              | Score |
//! |------|-----------------------------------|-------|
//! | 1    | `CORRECTED_DECIMAL_ERROR`         | 0.7   |
//! | 2a   | `INCONSISTENT_SPEED_STATE`        | 0.5   |
//! | 2b   | `INCONSISTENT_EXTREME_FLOW_SPEED` | 0.3   |
//! | 2c   | `INCONSISTENT_STOPPED_WITH_FLOW`  | 0.4   |
//! | 3    | `INVALID_SENSOR_HAS_DATA`         | 0.6   |
//! | 3    | `INVALID_SENSOR_NO_DATA`          | 0.1   |
//! | 4    | `MISSING_FLOW` / `MISSING_SPEED`  | 0.8   |
//! | 5    | `OK`                              | 1.0   |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::QualityThresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityFlag {
    CorrectedDecimalError,
    InconsistentSpeedState,
    InconsistentExtremeFlowSpeed,
    InconsistentStoppedWithFlow,
    InvalidSensorHasData,
    InvalidSensorNoData,
    MissingFlow,
    MissingSpeed,
    Ok,
}

impl QualityFlag {
    pub const ALL: [QualityFlag; 9] = [
        QualityFlag::CorrectedDecimalError,
        QualityFlag::InconsistentSpeedState,
        QualityFlag::InconsistentExtremeFlowSpeed,
        QualityFlag::InconsistentStoppedWithFlow,
        QualityFlag::InvalidSensorHasData,
        QualityFlag::InvalidSensorNoData,
        QualityFlag::MissingFlow,
        QualityFlag::MissingSpeed,
        QualityFlag::Ok,
    ];

    pub fn score(self) -> f64 {
        match self {
            QualityFlag::CorrectedDecimalError => 0.7,
            QualityFlag::InconsistentSpeedState => 0.5,
            QualityFlag::InconsistentExtremeFlowSpeed => 0.3,
            QualityFlag::InconsistentStoppedWithFlow => 0.4,
            QualityFlag::InvalidSensorHasData => 0.6,
            QualityFlag::InvalidSensorNoData => 0.1,
            QualityFlag::MissingFlow | QualityFlag::MissingSpeed => 0.8,
            QualityFlag::Ok => 1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QualityFlag::CorrectedDecimalError => "CORRECTED_DECIMAL_ERROR",
            QualityFlag::InconsistentSpeedState => "INCONSISTENT_SPEED_STATE",
            QualityFlag::InconsistentExtremeFlowSpeed => "INCONSISTENT_EXTREME_FLOW_SPEED",
            QualityFlag::InconsistentStoppedWithFlow => "INCONSISTENT_STOPPED_WITH_FLOW",
            QualityFlag::InvalidSensorHasData => "INVALID_SENSOR_HAS_DATA",
            QualityFlag::InvalidSensorNoData => "INVALID_SENSOR_NO_DATA",
            QualityFlag::MissingFlow => "MISSING_FLOW",
            QualityFlag::MissingSpeed => "MISSING_SPEED",
            QualityFlag::Ok => "OK",
        }
    }
}

impl fmt::Display for QualityFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QualityFlag {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QualityFlag::ALL
            .into_iter()
            .find(|flag| flag.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("unknown quality flag '{s}'"))
    }
}

/// The signal the classifier looks at, after decimal correction.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub flow: Option<f64>,
    pub speed: Option<f64>,
    pub traffic_state: &'a str,
    pub sensor_status: &'a str,
    pub speed_corrected: bool,
}

pub fn classify(obs: &Observation<'_>, t: &QualityThresholds) -> QualityFlag {
    if obs.speed_corrected {
        return QualityFlag::CorrectedDecimalError;
    }

    if let (Some(flow), Some(speed)) = (obs.flow, obs.speed) {
        if speed > t.inconsistent_state_speed && t.is_congested(obs.traffic_state) {
            return QualityFlag::InconsistentSpeedState;
        }
        if flow > t.extreme_flow && speed < t.extreme_flow_max_speed {
            return QualityFlag::InconsistentExtremeFlowSpeed;
        }
        // Moderate flow at low speed is normal rush hour, only a near stop is suspect.
        if flow > t.stopped_flow && speed < t.stopped_max_speed {
            return QualityFlag::InconsistentStoppedWithFlow;
        }
    }

    if t.is_invalid_sensor(obs.sensor_status) {
        return if obs.flow.is_some() || obs.speed.is_some() {
            QualityFlag::InvalidSensorHasData
        } else {
            QualityFlag::InvalidSensorNoData
        };
    }

    match (obs.flow, obs.speed) {
        (None, Some(_)) => QualityFlag::MissingFlow,
        (Some(_), None) => QualityFlag::MissingSpeed,
        _ => QualityFlag::Ok,
    }
}
