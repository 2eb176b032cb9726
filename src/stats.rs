use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transform::quality::QualityFlag;

/// Per-batch counters from one transform pass. Flat so it can be appended
/// to a CSV file one row per batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub timestamp: DateTime<Utc>,
    pub batch_index: usize,
    pub input_records: usize,

    // cleaning
    pub decimal_corrections: usize,
    pub dropped_no_signal: usize,
    pub dropped_outliers: usize,

    // output
    pub segments: usize,
    pub readings: usize,

    // quality flags
    pub corrected_decimal_error: usize,
    pub inconsistent_speed_state: usize,
    pub inconsistent_extreme_flow_speed: usize,
    pub inconsistent_stopped_with_flow: usize,
    pub invalid_sensor_has_data: usize,
    pub invalid_sensor_no_data: usize,
    pub missing_flow: usize,
    pub missing_speed: usize,
    pub ok: usize,
}

impl BatchStats {
    pub fn new(input_records: usize) -> Self {
        BatchStats {
            timestamp: Utc::now(),
            input_records,
            ..Default::default()
        }
    }

    pub fn with_batch_index(mut self, batch_index: usize) -> Self {
        self.batch_index = batch_index;
        self
    }

    fn flag_slot(&mut self, flag: QualityFlag) -> &mut usize {
        match flag {
            QualityFlag::CorrectedDecimalError => &mut self.corrected_decimal_error,
            QualityFlag::InconsistentSpeedState => &mut self.inconsistent_speed_state,
            QualityFlag::InconsistentExtremeFlowSpeed => &mut self.inconsistent_extreme_flow_speed,
            QualityFlag::InconsistentStoppedWithFlow => &mut self.inconsistent_stopped_with_flow,
            QualityFlag::InvalidSensorHasData => &mut self.invalid_sensor_has_data,
            QualityFlag::InvalidSensorNoData => &mut self.invalid_sensor_no_data,
            QualityFlag::MissingFlow => &mut self.missing_flow,
            QualityFlag::MissingSpeed => &mut self.missing_speed,
            QualityFlag::Ok => &mut self.ok,
        }
    }

    pub fn record_flag(&mut self, flag: QualityFlag) {
        *self.flag_slot(flag) += 1;
    }

    pub fn flag_count(&self, flag: QualityFlag) -> usize {
        match flag {
            QualityFlag::CorrectedDecimalError => self.corrected_decimal_error,
            QualityFlag::InconsistentSpeedState => self.inconsistent_speed_state,
            QualityFlag::InconsistentExtremeFlowSpeed => self.inconsistent_extreme_flow_speed,
            QualityFlag::InconsistentStoppedWithFlow => self.inconsistent_stopped_with_flow,
            QualityFlag::InvalidSensorHasData => self.invalid_sensor_has_data,
            QualityFlag::InvalidSensorNoData => self.invalid_sensor_no_data,
            QualityFlag::MissingFlow => self.missing_flow,
            QualityFlag::MissingSpeed => self.missing_speed,
            QualityFlag::Ok => self.ok,
        }
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    /// Non-empty flags with their count and share of readings, most frequent first.
    pub fn distribution(&self) -> Vec<(QualityFlag, usize, f64)> {
        let mut dist: Vec<_> = QualityFlag::ALL
            .into_iter()
            .map(|flag| (flag, self.flag_count(flag)))
            .filter(|(_, count)| *count > 0)
            .map(|(flag, count)| (flag, count, Self::pct(count, self.readings)))
            .collect();
        dist.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        dist
    }

    /// Folds another batch into a running total.
    pub fn accumulate(&mut self, other: &BatchStats) {
        self.input_records += other.input_records;
        self.decimal_corrections += other.decimal_corrections;
        self.dropped_no_signal += other.dropped_no_signal;
        self.dropped_outliers += other.dropped_outliers;
        self.segments += other.segments;
        self.readings += other.readings;
        for flag in QualityFlag::ALL {
            *self.flag_slot(flag) += other.flag_count(flag);
        }
    }
}
