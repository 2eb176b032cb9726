//! Cleaning and quality classification of raw sensor batches.
//!
//! A batch goes through, in this order: schema validation, decimal-speed
//! correction, row admission, coordinate extraction, quality classification,
//! then projection into [`Segment`]s and [`Reading`]s. Correction must run
//! before admission so the outlier cap is tested against corrected speeds.
//!
//! The transform is a pure function of its input and the thresholds; batches
//! can be transformed in parallel.

pub mod admission;
mod assemble;
pub mod correction;
pub mod geo;
pub mod quality;
pub mod types;

use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::config::QualityThresholds;
use crate::error::TransformError;
use crate::parser::parse_timestamp;
use crate::stats::BatchStats;
use admission::{Admission, admit};
use correction::correct_decimal_speed;
use geo::extract_coordinates;
use quality::{Observation, QualityFlag, classify};
use types::{RawReading, Reading, Segment};

/// The two record sets produced from one batch, plus its counters.
#[derive(Debug, Clone, Default)]
pub struct TransformOutput {
    pub segments: Vec<Segment>,
    pub readings: Vec<Reading>,
    pub stats: BatchStats,
}

/// A raw record that survived admission, with its derived values.
#[derive(Debug, Clone)]
pub(crate) struct ClassifiedRow<'a> {
    pub(crate) raw: &'a RawReading,
    pub(crate) segment_id: &'a str,
    pub(crate) timestamp: NaiveDateTime,
    pub(crate) traffic_state: &'a str,
    pub(crate) sensor_status: &'a str,
    pub(crate) flow: Option<f64>,
    pub(crate) speed: Option<f64>,
    pub(crate) speed_corrected: bool,
    pub(crate) latitude: Option<f64>,
    pub(crate) longitude: Option<f64>,
    pub(crate) flag: QualityFlag,
}

/// Required fields of one record, validated.
struct Required<'a> {
    segment_id: &'a str,
    timestamp: NaiveDateTime,
    traffic_state: &'a str,
    sensor_status: &'a str,
}

fn required<'a>(index: usize, raw: &'a RawReading) -> Result<Required<'a>, TransformError> {
    let missing = |field| TransformError::SchemaViolation { index, field };

    let segment_id = raw.segment_id.as_deref().ok_or_else(|| missing("iu_ac"))?;
    let ts = raw.timestamp.as_deref().ok_or_else(|| missing("t_1h"))?;
    let traffic_state = raw
        .traffic_state
        .as_deref()
        .ok_or_else(|| missing("etat_trafic"))?;
    let sensor_status = raw
        .sensor_status
        .as_deref()
        .ok_or_else(|| missing("etat_barre"))?;
    let timestamp = parse_timestamp(ts).ok_or_else(|| TransformError::InvalidTimestamp {
        index,
        value: ts.to_string(),
    })?;

    Ok(Required {
        segment_id,
        timestamp,
        traffic_state,
        sensor_status,
    })
}

/// Transforms one batch with the built-in thresholds.
pub fn transform(records: &[RawReading]) -> Result<TransformOutput, TransformError> {
    transform_batch(records, &QualityThresholds::default())
}

/// Transforms one batch of raw records into segments and classified readings.
///
/// Every record is schema-checked before any is filtered, so a record with a
/// missing required field aborts the batch even if it would have been dropped.
#[tracing::instrument(skip_all, fields(records = records.len()))]
pub fn transform_batch(
    records: &[RawReading],
    thresholds: &QualityThresholds,
) -> Result<TransformOutput, TransformError> {
    let mut stats = BatchStats::new(records.len());

    let validated = records
        .iter()
        .enumerate()
        .map(|(index, raw)| required(index, raw).map(|req| (raw, req)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = Vec::with_capacity(validated.len());

    for (raw, req) in validated {
        let (speed, speed_corrected) = correct_decimal_speed(raw.speed, thresholds);
        if speed_corrected {
            stats.decimal_corrections += 1;
        }

        match admit(raw.flow, speed, thresholds) {
            Admission::Admitted => {}
            Admission::NoSignal => {
                stats.dropped_no_signal += 1;
                continue;
            }
            Admission::Outlier => {
                stats.dropped_outliers += 1;
                continue;
            }
        }

        let (latitude, longitude) = extract_coordinates(raw.geo_point.as_ref());

        let flag = classify(
            &Observation {
                flow: raw.flow,
                speed,
                traffic_state: req.traffic_state,
                sensor_status: req.sensor_status,
                speed_corrected,
            },
            thresholds,
        );
        stats.record_flag(flag);

        rows.push(ClassifiedRow {
            raw,
            segment_id: req.segment_id,
            timestamp: req.timestamp,
            traffic_state: req.traffic_state,
            sensor_status: req.sensor_status,
            flow: raw.flow,
            speed,
            speed_corrected,
            latitude,
            longitude,
            flag,
        });
    }

    let segments = assemble::build_segments(&rows);
    let readings = assemble::build_readings(&rows);
    stats.segments = segments.len();
    stats.readings = readings.len();

    info!(
        decimal_corrections = stats.decimal_corrections,
        dropped_no_signal = stats.dropped_no_signal,
        dropped_outliers = stats.dropped_outliers,
        segments = stats.segments,
        readings = stats.readings,
        "Batch transformed"
    );
    for (flag, count, pct) in stats.distribution() {
        debug!(flag = %flag, count, pct = %format!("{pct:.1}"), "Quality distribution");
    }

    Ok(TransformOutput {
        segments,
        readings,
        stats,
    })
}
