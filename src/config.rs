//! Classifier thresholds.
//!
//! A single table is in force per run. The built-in values are calibrated on
//! Paris urban traffic: rush-hour speeds of 13-19 km/h and arterial capacity
//! of roughly 1,100-1,900 veh/h per lane. A JSON file can override any subset:
//! ```json
//! {
//!   "inconsistent_state_speed": 55.0,
//!   "blocked_states": ["Bloqué"]
//! }
//! ```

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// Positive speeds strictly below this are treated as the decimal bug.
    pub decimal_error_ceiling: f64,
    pub decimal_correction_factor: f64,
    /// Corrected speeds above this are physically impossible outliers.
    pub max_speed: f64,

    /// Speed above which a congested traffic state is contradictory.
    pub inconsistent_state_speed: f64,
    pub extreme_flow: f64,
    pub extreme_flow_max_speed: f64,
    pub stopped_flow: f64,
    pub stopped_max_speed: f64,

    /// Traffic-state labels meaning the road is blocked. Together with
    /// `saturated_states` these make up the congested states.
    pub blocked_states: Vec<String>,
    pub saturated_states: Vec<String>,
    pub invalid_sensor_statuses: Vec<String>,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            decimal_error_ceiling: 1.0,
            decimal_correction_factor: 100.0,
            max_speed: 200.0,
            inconsistent_state_speed: 60.0,
            extreme_flow: 2000.0,
            extreme_flow_max_speed: 5.0,
            stopped_flow: 100.0,
            stopped_max_speed: 5.0,
            blocked_states: vec!["Bloqué".into(), "blocked".into()],
            saturated_states: vec!["Saturé".into(), "saturated".into()],
            invalid_sensor_statuses: vec!["Invalide".into(), "invalid".into()],
        }
    }
}

impl QualityThresholds {
    /// Loads overrides from a JSON file; absent keys keep their defaults.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading thresholds file '{path}'"))?;
        let thresholds: QualityThresholds = serde_json::from_str(&content)
            .with_context(|| format!("parsing thresholds file '{path}'"))?;
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Loads from `path` when given, otherwise returns the built-in table.
    pub fn load_or_default(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("decimal_error_ceiling", self.decimal_error_ceiling),
            ("decimal_correction_factor", self.decimal_correction_factor),
            ("max_speed", self.max_speed),
            ("inconsistent_state_speed", self.inconsistent_state_speed),
            ("extreme_flow", self.extreme_flow),
            ("extreme_flow_max_speed", self.extreme_flow_max_speed),
            ("stopped_flow", self.stopped_flow),
            ("stopped_max_speed", self.stopped_max_speed),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                bail!("threshold `{name}` must be a positive number, got {value}");
            }
        }
        if self.decimal_error_ceiling * self.decimal_correction_factor > self.max_speed {
            bail!(
                "decimal correction can produce speeds above max_speed ({} * {} > {})",
                self.decimal_error_ceiling,
                self.decimal_correction_factor,
                self.max_speed
            );
        }
        Ok(())
    }

    pub fn is_blocked(&self, traffic_state: &str) -> bool {
        matches_label(&self.blocked_states, traffic_state)
    }

    pub fn is_saturated(&self, traffic_state: &str) -> bool {
        matches_label(&self.saturated_states, traffic_state)
    }

    pub fn is_congested(&self, traffic_state: &str) -> bool {
        self.is_blocked(traffic_state) || self.is_saturated(traffic_state)
    }

    pub fn is_invalid_sensor(&self, sensor_status: &str) -> bool {
        matches_label(&self.invalid_sensor_statuses, sensor_status)
    }
}

fn matches_label(labels: &[String], value: &str) -> bool {
    let value = value.trim().to_lowercase();
    labels.iter().any(|l| l.trim().to_lowercase() == value)
}
