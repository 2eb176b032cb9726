//! Result rows returned by the report queries.

use serde::Serialize;

use crate::transform::quality::QualityFlag;

/// Averages for one hour of the day (0-23).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyTraffic {
    pub hour: u32,
    pub avg_flow: Option<f64>,
    pub avg_speed: Option<f64>,
    pub reading_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusiestSegment {
    pub segment_id: String,
    pub street_name: Option<String>,
    pub avg_flow: f64,
    pub avg_speed: Option<f64>,
    pub reading_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpeedStats {
    pub segment_id: Option<String>,
    pub mean_speed: f64,
    pub median_speed: f64,
    pub std_dev: f64,
    pub percentile_25: f64,
    pub percentile_75: f64,
    pub min_speed: f64,
    pub max_speed: f64,
    pub sample_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityBreakdown {
    pub data_quality_flag: QualityFlag,
    pub count: usize,
    pub percentage: f64,
    pub avg_quality_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CongestionHotspot {
    pub segment_id: String,
    pub street_name: Option<String>,
    pub blocked_count: usize,
    pub saturated_count: usize,
    pub total_incidents: usize,
}

/// Raw speeds falling in one band, with the traffic states reported for them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeedBand {
    pub band: &'static str,
    pub count: usize,
    pub traffic_states: Vec<(String, usize)>,
}
