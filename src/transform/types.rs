//! Record shapes flowing into and out of the transform.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::transform::quality::QualityFlag;

/// One hourly observation exactly as the open-data export ships it.
///
/// Every field is optional here so that a record missing a required field
/// surfaces as a [`TransformError::SchemaViolation`](crate::error::TransformError)
/// carrying its position, rather than failing the whole JSON parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    #[serde(rename = "iu_ac", default, deserialize_with = "string_or_number")]
    pub segment_id: Option<String>,
    #[serde(rename = "libelle", default)]
    pub street_name: Option<String>,

    #[serde(rename = "iu_nd_amont", default, deserialize_with = "string_or_number")]
    pub upstream_node_id: Option<String>,
    #[serde(rename = "libelle_nd_amont", default)]
    pub upstream_node_name: Option<String>,
    #[serde(rename = "iu_nd_aval", default, deserialize_with = "string_or_number")]
    pub downstream_node_id: Option<String>,
    #[serde(rename = "libelle_nd_aval", default)]
    pub downstream_node_name: Option<String>,

    #[serde(rename = "date_debut", default)]
    pub install_date: Option<String>,
    #[serde(rename = "date_fin", default)]
    pub end_date: Option<String>,

    #[serde(rename = "geo_shape", default)]
    pub geo_shape: Option<Value>,
    #[serde(rename = "geo_point_2d", default)]
    pub geo_point: Option<Value>,

    #[serde(rename = "t_1h", default)]
    pub timestamp: Option<String>,
    /// Vehicles per hour.
    #[serde(rename = "q", default)]
    pub flow: Option<f64>,
    /// Average speed in km/h, possibly affected by the decimal bug.
    #[serde(rename = "k", default)]
    pub speed: Option<f64>,
    #[serde(rename = "etat_trafic", default)]
    pub traffic_state: Option<String>,
    #[serde(rename = "etat_barre", default)]
    pub sensor_status: Option<String>,
}

/// A road segment between two counting nodes. One per distinct id per batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub segment_id: String,
    pub street_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub upstream_node_id: Option<String>,
    pub upstream_node_name: Option<String>,
    pub downstream_node_id: Option<String>,
    pub downstream_node_name: Option<String>,
    pub sensor_install_date: Option<String>,
    pub sensor_end_date: Option<String>,
    pub geometry_json: Option<String>,
}

/// One classified hourly reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub segment_id: String,
    pub timestamp: NaiveDateTime,
    pub traffic_flow: Option<i64>,
    pub avg_speed: Option<f64>,
    pub traffic_state: String,
    pub sensor_status: String,
    pub is_flow_imputed: bool,
    pub is_speed_corrected: bool,
    pub data_quality_flag: QualityFlag,
    pub quality_score: f64,
}

/// Node and segment ids come through as strings in most exports but as bare
/// numbers in some older dumps.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string or numeric identifier, found {other}"
        ))),
    }
}
