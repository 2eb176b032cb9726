//! Read-only reporting over loaded segments and readings.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Result, bail};
use chrono::Timelike;
use tracing::debug;

use crate::config::QualityThresholds;
use crate::report::types::{
    BusiestSegment, CongestionHotspot, HourlyTraffic, QualityBreakdown, SpeedBand, SpeedStats,
};
use crate::report::utility::{mean, mean_of_present, median, percentile, round2, stddev};
use crate::transform::quality::QualityFlag;
use crate::transform::types::{RawReading, Reading, Segment};

/// Filter for [`list_segments`].
#[derive(Debug, Clone)]
pub struct SegmentQuery {
    /// Case-insensitive substring of the street name.
    pub street_name: Option<String>,
    pub skip: usize,
    pub limit: usize,
}

impl Default for SegmentQuery {
    fn default() -> Self {
        Self {
            street_name: None,
            skip: 0,
            limit: 100,
        }
    }
}

/// Segments in stored order, optionally narrowed by street name, paged by skip/limit.
pub fn list_segments<'a>(segments: &'a [Segment], query: &SegmentQuery) -> Vec<&'a Segment> {
    let needle = query.street_name.as_deref().map(str::to_lowercase);
    let page: Vec<&Segment> = segments
        .iter()
        .filter(|s| match &needle {
            Some(needle) => s
                .street_name
                .as_deref()
                .is_some_and(|name| name.to_lowercase().contains(needle.as_str())),
            None => true,
        })
        .skip(query.skip)
        .take(query.limit)
        .collect();
    debug!(returned = page.len(), "Segments listed");
    page
}

pub fn segment_by_id<'a>(segments: &'a [Segment], segment_id: &str) -> Result<&'a Segment> {
    match segments.iter().find(|s| s.segment_id == segment_id) {
        Some(segment) => Ok(segment),
        None => bail!("segment {segment_id} not found"),
    }
}

/// Filter for [`filter_readings`].
#[derive(Debug, Clone)]
pub struct ReadingQuery {
    pub segment_id: Option<String>,
    pub quality_flag: Option<QualityFlag>,
    pub min_quality_score: Option<f64>,
    pub skip: usize,
    pub limit: usize,
}

impl Default for ReadingQuery {
    fn default() -> Self {
        Self {
            segment_id: None,
            quality_flag: None,
            min_quality_score: None,
            skip: 0,
            limit: 100,
        }
    }
}

/// Readings matching `query`, ordered by timestamp, paged by skip/limit.
pub fn filter_readings<'a>(readings: &'a [Reading], query: &ReadingQuery) -> Vec<&'a Reading> {
    let mut matched: Vec<&Reading> = readings
        .iter()
        .filter(|r| query.segment_id.as_deref().is_none_or(|id| r.segment_id == id))
        .filter(|r| query.quality_flag.is_none_or(|f| r.data_quality_flag == f))
        .filter(|r| query.min_quality_score.is_none_or(|m| r.quality_score >= m))
        .collect();
    matched.sort_by_key(|r| r.timestamp);
    matched.into_iter().skip(query.skip).take(query.limit).collect()
}

fn hourly<'a>(readings: impl Iterator<Item = &'a Reading>) -> Vec<HourlyTraffic> {
    let mut by_hour: BTreeMap<u32, Vec<&Reading>> = BTreeMap::new();
    for r in readings {
        by_hour.entry(r.timestamp.hour()).or_default().push(r);
    }

    by_hour
        .into_iter()
        .map(|(hour, rows)| HourlyTraffic {
            hour,
            avg_flow: mean_of_present(rows.iter().map(|r| r.traffic_flow.map(|q| q as f64)))
                .map(round2),
            avg_speed: mean_of_present(rows.iter().map(|r| r.avg_speed)).map(round2),
            reading_count: rows.len(),
        })
        .collect()
}

/// Average flow and speed per hour of day, for readings at or above
/// `min_quality_score`, optionally restricted to one segment.
#[tracing::instrument(skip(readings))]
pub fn peak_hours(
    readings: &[Reading],
    segment_id: Option<&str>,
    min_quality_score: f64,
) -> Vec<HourlyTraffic> {
    let hours = hourly(
        readings
            .iter()
            .filter(|r| segment_id.is_none_or(|id| r.segment_id == id))
            .filter(|r| r.quality_score >= min_quality_score),
    );
    debug!(hours = hours.len(), "Peak hours computed");
    hours
}

/// Hourly profile of a single known segment, without quality filtering.
pub fn traffic_by_hour(
    readings: &[Reading],
    segments: &[Segment],
    segment_id: &str,
) -> Result<Vec<HourlyTraffic>> {
    segment_by_id(segments, segment_id)?;
    Ok(hourly(readings.iter().filter(|r| r.segment_id == segment_id)))
}

/// Segments ranked by average flow, highest first.
#[tracing::instrument(skip(readings, segments))]
pub fn busiest_segments(
    readings: &[Reading],
    segments: &[Segment],
    limit: usize,
    min_quality_score: f64,
) -> Vec<BusiestSegment> {
    let streets: HashMap<&str, Option<&String>> = segments
        .iter()
        .map(|s| (s.segment_id.as_str(), s.street_name.as_ref()))
        .collect();

    let mut by_segment: HashMap<&str, Vec<&Reading>> = HashMap::new();
    for r in readings {
        if r.traffic_flow.is_some()
            && r.quality_score >= min_quality_score
            && streets.contains_key(r.segment_id.as_str())
        {
            by_segment.entry(r.segment_id.as_str()).or_default().push(r);
        }
    }

    let mut ranked: Vec<BusiestSegment> = by_segment
        .into_iter()
        .map(|(id, rows)| {
            let flows: Vec<f64> = rows.iter().filter_map(|r| r.traffic_flow).map(|q| q as f64).collect();
            BusiestSegment {
                segment_id: id.to_string(),
                street_name: streets.get(id).copied().flatten().cloned(),
                avg_flow: round2(mean(&flows)),
                avg_speed: mean_of_present(rows.iter().map(|r| r.avg_speed)).map(round2),
                reading_count: rows.len(),
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.avg_flow
            .total_cmp(&a.avg_flow)
            .then_with(|| a.segment_id.cmp(&b.segment_id))
    });
    ranked.truncate(limit);
    ranked
}

/// Distribution of present speeds, rounded to two decimals.
#[tracing::instrument(skip(readings))]
pub fn speed_stats(
    readings: &[Reading],
    segment_id: Option<&str>,
    min_quality_score: f64,
) -> SpeedStats {
    let mut speeds: Vec<f64> = readings
        .iter()
        .filter(|r| segment_id.is_none_or(|id| r.segment_id == id))
        .filter(|r| r.quality_score >= min_quality_score)
        .filter_map(|r| r.avg_speed)
        .collect();

    if speeds.is_empty() {
        return SpeedStats {
            segment_id: segment_id.map(str::to_string),
            ..Default::default()
        };
    }

    speeds.sort_by(f64::total_cmp);
    let m = mean(&speeds);
    debug!(sample_size = speeds.len(), "Speed stats computed");

    SpeedStats {
        segment_id: segment_id.map(str::to_string),
        mean_speed: round2(m),
        median_speed: round2(median(&speeds)),
        std_dev: round2(stddev(&speeds, m)),
        percentile_25: round2(percentile(&speeds, 25.0)),
        percentile_75: round2(percentile(&speeds, 75.0)),
        min_speed: round2(speeds[0]),
        max_speed: round2(speeds[speeds.len() - 1]),
        sample_size: speeds.len(),
    }
}

/// Count, share and average score per quality flag, most frequent first.
pub fn quality_report(readings: &[Reading]) -> Vec<QualityBreakdown> {
    let mut scores: HashMap<QualityFlag, Vec<f64>> = HashMap::new();
    for r in readings {
        scores.entry(r.data_quality_flag).or_default().push(r.quality_score);
    }

    let total = readings.len();
    let mut report: Vec<QualityBreakdown> = scores
        .into_iter()
        .map(|(flag, s)| QualityBreakdown {
            data_quality_flag: flag,
            count: s.len(),
            percentage: round2(s.len() as f64 * 100.0 / total as f64),
            avg_quality_score: round2(mean(&s)),
        })
        .collect();

    report.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then(a.data_quality_flag.cmp(&b.data_quality_flag))
    });
    report
}

/// Segments with the most blocked or saturated readings, using the same
/// state labels as the classifier.
pub fn congestion_hotspots(
    readings: &[Reading],
    segments: &[Segment],
    thresholds: &QualityThresholds,
    limit: usize,
) -> Vec<CongestionHotspot> {
    let mut spots: HashMap<&str, CongestionHotspot> = segments
        .iter()
        .map(|s| {
            (
                s.segment_id.as_str(),
                CongestionHotspot {
                    segment_id: s.segment_id.clone(),
                    street_name: s.street_name.clone(),
                    blocked_count: 0,
                    saturated_count: 0,
                    total_incidents: 0,
                },
            )
        })
        .collect();

    for r in readings {
        let Some(spot) = spots.get_mut(r.segment_id.as_str()) else {
            continue;
        };
        if thresholds.is_blocked(&r.traffic_state) {
            spot.blocked_count += 1;
        } else if thresholds.is_saturated(&r.traffic_state) {
            spot.saturated_count += 1;
        } else {
            continue;
        }
        spot.total_incidents += 1;
    }

    let mut ranked: Vec<CongestionHotspot> = spots
        .into_values()
        .filter(|s| s.total_incidents > 0)
        .collect();
    ranked.sort_by(|a, b| {
        b.total_incidents
            .cmp(&a.total_incidents)
            .then_with(|| a.segment_id.cmp(&b.segment_id))
    });
    ranked.truncate(limit);
    ranked
}

const SPEED_BAND_LABELS: [&str; 3] = ["(0, 1)", "[1, 10)", "[10, 100)"];

fn speed_band(k: f64) -> Option<usize> {
    if k > 0.0 && k < 1.0 {
        Some(0)
    } else if (1.0..10.0).contains(&k) {
        Some(1)
    } else if (10.0..100.0).contains(&k) {
        Some(2)
    } else {
        None
    }
}

/// Raw (uncorrected) speed distribution, used to size the decimal bug.
///
/// Fed one batch at a time; only per-band state counters are kept.
#[derive(Debug, Clone, Default)]
pub struct SpeedBandCounter {
    states: [HashMap<String, usize>; 3],
}

impl SpeedBandCounter {
    pub fn add(&mut self, raw: &[RawReading]) {
        for r in raw {
            let Some(band) = r.speed.and_then(speed_band) else {
                continue;
            };
            let state = r.traffic_state.as_deref().unwrap_or("<missing>");
            let states = &mut self.states[band];
            match states.get_mut(state) {
                Some(count) => *count += 1,
                None => {
                    states.insert(state.to_string(), 1);
                }
            }
        }
    }

    pub fn finish(self) -> Vec<SpeedBand> {
        SPEED_BAND_LABELS
            .into_iter()
            .zip(self.states)
            .map(|(band, states)| {
                let mut traffic_states: Vec<(String, usize)> = states.into_iter().collect();
                traffic_states.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                SpeedBand {
                    band,
                    count: traffic_states.iter().map(|(_, n)| n).sum(),
                    traffic_states,
                }
            })
            .collect()
    }
}

pub fn speed_bands(raw: &[RawReading]) -> Vec<SpeedBand> {
    let mut counter = SpeedBandCounter::default();
    counter.add(raw);
    counter.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_peak_hours_groups_and_filters() {
        let readings = vec![
            reading("S1", 8, Some(100), Some(20.0), QualityFlag::Ok),
            reading("S2", 8, Some(300), None, QualityFlag::MissingSpeed),
            reading("S1", 9, Some(50), Some(40.0), QualityFlag::InconsistentSpeedState),
        ];

        let all = peak_hours(&readings, None, 0.0);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].hour, 8);
        assert_eq!(all[0].avg_flow, Some(200.0));
        assert_eq!(all[0].avg_speed, Some(20.0));
        assert_eq!(all[0].reading_count, 2);

        let trusted = peak_hours(&readings, None, 0.8);
        assert_eq!(trusted.len(), 1);

        let one = peak_hours(&readings, Some("S1"), 0.0);
        assert_eq!(one.iter().map(|h| h.reading_count).sum::<usize>(), 2);
    }

    #[test]
    fn test_traffic_by_hour_unknown_segment() {
        let readings = vec![reading("S1", 8, Some(100), Some(20.0), QualityFlag::Ok)];
        let segments = vec![segment("S1", "Rue A")];
        assert_eq!(traffic_by_hour(&readings, &segments, "S1").unwrap().len(), 1);
        assert!(traffic_by_hour(&readings, &segments, "S9").is_err());
    }

    #[test]
    fn test_busiest_segments_ranked() {
        let readings = vec![
            reading("S1", 8, Some(100), Some(20.0), QualityFlag::Ok),
            reading("S2", 8, Some(900), Some(25.0), QualityFlag::Ok),
            reading("S2", 9, Some(700), None, QualityFlag::MissingSpeed),
            reading("S3", 9, None, Some(30.0), QualityFlag::MissingFlow),
        ];
        let segments = vec![segment("S1", "Rue A"), segment("S2", "Bd B"), segment("S3", "Av C")];

        let busiest = busiest_segments(&readings, &segments, 10, 0.0);
        assert_eq!(busiest.len(), 2);
        assert_eq!(busiest[0].segment_id, "S2");
        assert_eq!(busiest[0].avg_flow, 800.0);
        assert_eq!(busiest[0].avg_speed, Some(25.0));
        assert_eq!(busiest[0].street_name.as_deref(), Some("Bd B"));

        assert_eq!(busiest_segments(&readings, &segments, 1, 0.0).len(), 1);
    }

    #[test]
    fn test_speed_stats() {
        let readings: Vec<_> = [10.0, 20.0, 30.0, 40.0]
            .into_iter()
            .map(|k| reading("S1", 8, Some(10), Some(k), QualityFlag::Ok))
            .collect();

        let stats = speed_stats(&readings, None, 0.0);
        assert_eq!(stats.sample_size, 4);
        assert_eq!(stats.mean_speed, 25.0);
        assert_eq!(stats.median_speed, 25.0);
        assert_eq!(stats.percentile_25, 17.5);
        assert_eq!(stats.percentile_75, 32.5);
        assert_eq!(stats.min_speed, 10.0);
        assert_eq!(stats.max_speed, 40.0);
        assert_eq!(stats.std_dev, 11.18);
    }

    #[test]
    fn test_speed_stats_empty_sample() {
        let stats = speed_stats(&[], Some("S1"), 0.5);
        assert_eq!(stats.sample_size, 0);
        assert_eq!(stats.mean_speed, 0.0);
        assert_eq!(stats.segment_id.as_deref(), Some("S1"));
    }

    #[test]
    fn test_quality_report() {
        let readings = vec![
            reading("S1", 8, Some(10), Some(20.0), QualityFlag::Ok),
            reading("S1", 9, Some(10), Some(20.0), QualityFlag::Ok),
            reading("S1", 10, None, Some(20.0), QualityFlag::MissingFlow),
        ];
        let report = quality_report(&readings);
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].data_quality_flag, QualityFlag::Ok);
        assert_eq!(report[0].count, 2);
        assert_eq!(report[0].percentage, 66.67);
        assert_eq!(report[1].avg_quality_score, 0.8);
        assert!(quality_report(&[]).is_empty());
    }

    #[test]
    fn test_congestion_hotspots() {
        let mut blocked = reading("S1", 8, Some(10), Some(5.0), QualityFlag::Ok);
        blocked.traffic_state = "Bloqué".into();
        let mut saturated = reading("S1", 9, Some(10), Some(5.0), QualityFlag::Ok);
        saturated.traffic_state = "saturated".into();
        let mut other = reading("S2", 9, Some(10), Some(5.0), QualityFlag::Ok);
        other.traffic_state = "Saturé".into();
        let calm = reading("S3", 9, Some(10), Some(50.0), QualityFlag::Ok);
        let segments = vec![segment("S1", "Rue A"), segment("S2", "Rue B"), segment("S3", "Rue C")];

        let spots = congestion_hotspots(
            &[blocked, saturated, other, calm],
            &segments,
            &QualityThresholds::default(),
            10,
        );
        assert_eq!(spots.len(), 2);
        assert_eq!(spots[0].segment_id, "S1");
        assert_eq!(spots[0].blocked_count, 1);
        assert_eq!(spots[0].saturated_count, 1);
        assert_eq!(spots[0].total_incidents, 2);
        assert_eq!(spots[1].segment_id, "S2");
    }

    #[test]
    fn test_congestion_hotspots_follow_threshold_labels() {
        let mut stopped = reading("S1", 8, Some(10), Some(2.0), QualityFlag::Ok);
        stopped.traffic_state = "Arrêté".into();
        let mut blocked = reading("S2", 8, Some(10), Some(2.0), QualityFlag::Ok);
        blocked.traffic_state = "Bloqué".into();
        let segments = vec![segment("S1", "Rue A"), segment("S2", "Rue B")];

        let thresholds = QualityThresholds {
            blocked_states: vec!["Arrêté".into()],
            ..Default::default()
        };
        let spots = congestion_hotspots(&[stopped, blocked], &segments, &thresholds, 10);
        assert_eq!(spots.len(), 1);
        assert_eq!(spots[0].segment_id, "S1");
        assert_eq!(spots[0].blocked_count, 1);
    }

    #[test]
    fn test_list_segments_by_street_and_page() {
        let segments = vec![
            segment("S1", "Bd_Raspail"),
            segment("S2", "Rue de Rivoli"),
            segment("S3", "Bd_Saint-Michel"),
            segment("S4", "Bd_Haussmann"),
        ];

        let all = list_segments(&segments, &SegmentQuery::default());
        assert_eq!(all.len(), 4);

        let query = SegmentQuery {
            street_name: Some("bd_".into()),
            ..Default::default()
        };
        let ids: Vec<_> = list_segments(&segments, &query)
            .iter()
            .map(|s| s.segment_id.as_str())
            .collect();
        assert_eq!(ids, vec!["S1", "S3", "S4"]);

        let query = SegmentQuery {
            street_name: Some("Bd_".into()),
            skip: 1,
            limit: 1,
        };
        let page = list_segments(&segments, &query);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].segment_id, "S3");
    }

    #[test]
    fn test_segment_by_id() {
        let segments = vec![segment("S1", "Rue A"), segment("S2", "Rue B")];
        assert_eq!(
            segment_by_id(&segments, "S2").unwrap().street_name.as_deref(),
            Some("Rue B")
        );
        let err = segment_by_id(&segments, "S9").unwrap_err();
        assert_eq!(err.to_string(), "segment S9 not found");
    }

    #[test]
    fn test_filter_readings() {
        let readings = vec![
            reading("S1", 10, Some(10), Some(20.0), QualityFlag::Ok),
            reading("S1", 8, None, Some(20.0), QualityFlag::MissingFlow),
            reading("S2", 9, Some(10), Some(20.0), QualityFlag::Ok),
        ];

        let query = ReadingQuery {
            segment_id: Some("S1".into()),
            ..Default::default()
        };
        let hits = filter_readings(&readings, &query);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].timestamp.hour(), 8);

        let query = ReadingQuery {
            quality_flag: Some(QualityFlag::Ok),
            skip: 1,
            ..Default::default()
        };
        let hits = filter_readings(&readings, &query);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].timestamp.hour(), 10);

        let query = ReadingQuery {
            min_quality_score: Some(0.9),
            limit: 1,
            ..Default::default()
        };
        assert_eq!(filter_readings(&readings, &query).len(), 1);
    }

    #[test]
    fn test_speed_bands() {
        let raw = vec![
            raw_speed(Some(0.4), "Fluide"),
            raw_speed(Some(0.9), "Fluide"),
            raw_speed(Some(0.5), "Bloqué"),
            raw_speed(Some(5.0), "Saturé"),
            raw_speed(Some(45.0), "Fluide"),
            raw_speed(Some(0.0), "Fluide"),
            raw_speed(None, "Fluide"),
        ];
        let bands = speed_bands(&raw);
        assert_eq!(bands[0].count, 3);
        assert_eq!(bands[0].traffic_states[0], ("Fluide".to_string(), 2));
        assert_eq!(bands[1].count, 1);
        assert_eq!(bands[2].count, 1);
    }

    #[test]
    fn test_speed_band_counter_folds_batches() {
        let mut counter = SpeedBandCounter::default();
        counter.add(&[raw_speed(Some(0.4), "Fluide"), raw_speed(Some(45.0), "Fluide")]);
        counter.add(&[raw_speed(Some(0.7), "Bloqué"), raw_speed(Some(0.2), "Fluide")]);
        counter.add(&[]);

        let bands = counter.finish();
        assert_eq!(bands.len(), 3);
        assert_eq!(bands[0].band, "(0, 1)");
        assert_eq!(bands[0].count, 3);
        assert_eq!(
            bands[0].traffic_states,
            vec![("Fluide".to_string(), 2), ("Bloqué".to_string(), 1)]
        );
        assert_eq!(bands[1].count, 0);
        assert!(bands[1].traffic_states.is_empty());
        assert_eq!(bands[2].count, 1);
    }

    fn raw_speed(speed: Option<f64>, state: &str) -> RawReading {
        RawReading {
            speed,
            traffic_state: Some(state.to_string()),
            ..Default::default()
        }
    }

    fn segment(id: &str, street: &str) -> Segment {
        Segment {
            segment_id: id.to_string(),
            street_name: Some(street.to_string()),
            latitude: None,
            longitude: None,
            upstream_node_id: None,
            upstream_node_name: None,
            downstream_node_id: None,
            downstream_node_name: None,
            sensor_install_date: None,
            sensor_end_date: None,
            geometry_json: None,
        }
    }

    fn reading(
        id: &str,
        hour: u32,
        flow: Option<i64>,
        speed: Option<f64>,
        flag: QualityFlag,
    ) -> Reading {
        Reading {
            segment_id: id.to_string(),
            timestamp: NaiveDate::from_ymd_opt(2023, 1, 2)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
            traffic_flow: flow,
            avg_speed: speed,
            traffic_state: "Fluide".into(),
            sensor_status: "Valide".into(),
            is_flow_imputed: false,
            is_speed_corrected: false,
            data_quality_flag: flag,
            quality_score: flag.score(),
        }
    }
}
