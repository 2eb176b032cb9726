//! Projects classified rows into the two output record sets.

use indexmap::IndexMap;
use indexmap::map::Entry;

use crate::transform::ClassifiedRow;
use crate::transform::types::{Reading, Segment};

/// One segment per distinct id, first occurrence wins, in first-seen order.
pub(crate) fn build_segments(rows: &[ClassifiedRow<'_>]) -> Vec<Segment> {
    let mut by_id: IndexMap<&str, Segment> = IndexMap::new();

    for row in rows {
        if let Entry::Vacant(slot) = by_id.entry(row.segment_id) {
            let raw = row.raw;
            slot.insert(Segment {
                segment_id: row.segment_id.to_string(),
                street_name: raw.street_name.clone(),
                latitude: row.latitude,
                longitude: row.longitude,
                upstream_node_id: raw.upstream_node_id.clone(),
                upstream_node_name: raw.upstream_node_name.clone(),
                downstream_node_id: raw.downstream_node_id.clone(),
                downstream_node_name: raw.downstream_node_name.clone(),
                sensor_install_date: raw.install_date.clone(),
                sensor_end_date: raw.end_date.clone(),
                geometry_json: raw
                    .geo_shape
                    .as_ref()
                    .filter(|shape| !shape.is_null())
                    .map(|shape| shape.to_string()),
            });
        }
    }

    by_id.into_values().collect()
}

pub(crate) fn build_readings(rows: &[ClassifiedRow<'_>]) -> Vec<Reading> {
    rows.iter()
        .map(|row| Reading {
            segment_id: row.segment_id.to_string(),
            timestamp: row.timestamp,
            traffic_flow: row.flow.map(|q| q.round() as i64),
            avg_speed: row.speed,
            traffic_state: row.traffic_state.to_string(),
            sensor_status: row.sensor_status.to_string(),
            is_flow_imputed: false,
            is_speed_corrected: row.speed_corrected,
            data_quality_flag: row.flag,
            quality_score: row.flag.score(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::quality::QualityFlag;
    use crate::transform::types::RawReading;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_first_occurrence_wins() {
        let a = raw("Rue A", None);
        let b = raw("Rue B", None);
        let c = raw("Quai C", None);
        let rows = vec![row(&a, "S1"), row(&c, "S2"), row(&b, "S1")];

        let segments = build_segments(&rows);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].segment_id, "S1");
        assert_eq!(segments[0].street_name.as_deref(), Some("Rue A"));
        assert_eq!(segments[1].segment_id, "S2");
    }

    #[test]
    fn test_geometry_serialised_or_null() {
        let shaped = raw("Rue A", Some(json!({"type": "LineString", "coordinates": [[2.3, 48.8]]})));
        let bare = raw("Rue B", None);
        let rows = vec![row(&shaped, "S1"), row(&bare, "S2")];

        let segments = build_segments(&rows);
        let geometry = segments[0].geometry_json.as_deref().unwrap();
        let reparsed: serde_json::Value = serde_json::from_str(geometry).unwrap();
        assert_eq!(reparsed["type"], "LineString");
        assert_eq!(segments[1].geometry_json, None);
    }

    #[test]
    fn test_readings_keep_order_and_flags() {
        let a = raw("Rue A", None);
        let mut first = row(&a, "S1");
        first.flow = Some(412.4);
        let mut second = row(&a, "S2");
        second.speed_corrected = true;
        second.flag = QualityFlag::CorrectedDecimalError;

        let readings = build_readings(&[first, second]);
        assert_eq!(readings[0].segment_id, "S1");
        assert_eq!(readings[0].traffic_flow, Some(412));
        assert!(!readings[0].is_flow_imputed);
        assert_eq!(readings[1].segment_id, "S2");
        assert!(readings[1].is_speed_corrected);
        assert_eq!(readings[1].quality_score, 0.7);
    }

    fn raw(street: &str, geo_shape: Option<serde_json::Value>) -> RawReading {
        RawReading {
            street_name: Some(street.to_string()),
            geo_shape,
            ..Default::default()
        }
    }

    fn row<'a>(raw: &'a RawReading, segment_id: &'a str) -> ClassifiedRow<'a> {
        ClassifiedRow {
            raw,
            segment_id,
            timestamp: NaiveDate::from_ymd_opt(2023, 1, 1)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            traffic_state: "Fluide",
            sensor_status: "Valide",
            flow: Some(100.0),
            speed: Some(30.0),
            speed_corrected: false,
            latitude: None,
            longitude: None,
            flag: QualityFlag::Ok,
        }
    }
}
