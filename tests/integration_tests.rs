use std::env;
use std::fs;

use traffic_quality::QualityFlag;
use traffic_quality::QualityThresholds;
use traffic_quality::TransformError;
use traffic_quality::extract::{RecordFilter, for_each_batch};
use traffic_quality::load::{CsvLoader, read_readings, read_segments};
use traffic_quality::parser::parse_records;
use traffic_quality::report::analytics;
use traffic_quality::stats::BatchStats;
use traffic_quality::transform;

const SAMPLE: &[u8] = include_bytes!("fixtures/sample_readings.json");

#[test]
fn test_full_pipeline() {
    let records = parse_records(SAMPLE).expect("Failed to parse export");
    let out = transform(&records).expect("Failed to transform batch");

    assert_eq!(out.stats.input_records, 12);
    assert_eq!(out.stats.dropped_no_signal, 1);
    assert_eq!(out.stats.dropped_outliers, 2);
    assert_eq!(out.readings.len(), 9);
    assert_eq!(out.segments.len(), 5);

    let flags: Vec<_> = out.readings.iter().map(|r| r.data_quality_flag).collect();
    assert_eq!(
        flags,
        vec![
            QualityFlag::CorrectedDecimalError,
            QualityFlag::InvalidSensorHasData,
            QualityFlag::InconsistentSpeedState,
            QualityFlag::InconsistentExtremeFlowSpeed,
            QualityFlag::InconsistentStoppedWithFlow,
            QualityFlag::Ok,
            QualityFlag::MissingFlow,
            QualityFlag::MissingSpeed,
            QualityFlag::Ok,
        ]
    );
    for r in &out.readings {
        assert_eq!(r.quality_score, r.data_quality_flag.score());
        assert_eq!(r.is_speed_corrected, r.data_quality_flag == QualityFlag::CorrectedDecimalError);
        assert!(!r.is_flow_imputed);
    }

    // first occurrence of a segment id wins
    let raspail = out.segments.iter().find(|s| s.segment_id == "5464").unwrap();
    assert_eq!(raspail.street_name.as_deref(), Some("Bd_Raspail"));
    assert!(raspail.geometry_json.is_some());
    assert_eq!(raspail.latitude, Some(48.8537));

    let tournelle = out.segments.iter().find(|s| s.segment_id == "4212").unwrap();
    assert_eq!(tournelle.upstream_node_id.as_deref(), Some("1801"));
    assert_eq!(tournelle.latitude, None);
}

#[test]
fn test_batched_load_and_reports() {
    let dir = env::temp_dir().join("traffic_quality_integration");
    let _ = fs::remove_dir_all(&dir); // clean up any prior run

    let mut loader = CsvLoader::open(&dir).unwrap();
    let mut total = BatchStats::default();
    let summary = for_each_batch(SAMPLE, 4, &RecordFilter::default(), |_, batch| {
        let out = transform(&batch)?;
        loader.load(&out.segments, &out.readings)?;
        total.accumulate(&out.stats);
        Ok(())
    })
    .unwrap();

    assert_eq!(summary.batches, 3);
    assert_eq!(total.readings, 9);
    assert_eq!(total.flag_count(QualityFlag::Ok), 2);

    let segments = read_segments(&dir).unwrap();
    let readings = read_readings(&dir).unwrap();
    assert_eq!(segments.len(), 5);
    assert_eq!(readings.len(), 9);

    let report = analytics::quality_report(&readings);
    assert_eq!(report[0].data_quality_flag, QualityFlag::Ok);
    assert_eq!(report[0].count, 2);
    assert_eq!(report.iter().map(|q| q.count).sum::<usize>(), 9);

    let busiest = analytics::busiest_segments(&readings, &segments, 2, 0.0);
    assert_eq!(busiest[0].segment_id, "7001");
    assert_eq!(busiest[0].avg_flow, 1315.0);
    assert_eq!(busiest[1].segment_id, "5464");

    let hotspots = analytics::congestion_hotspots(&readings, &segments, &QualityThresholds::default(), 10);
    assert_eq!(hotspots.len(), 2);
    assert_eq!(hotspots[0].segment_id, "7001");
    assert_eq!(hotspots[0].saturated_count, 2);
    assert_eq!(hotspots[1].blocked_count, 1);

    let eight_am = analytics::peak_hours(&readings, None, 0.0)
        .into_iter()
        .find(|h| h.hour == 8)
        .unwrap();
    assert_eq!(eight_am.reading_count, 4);
    assert_eq!(eight_am.avg_flow, Some(250.5));

    assert!(analytics::traffic_by_hour(&readings, &segments, "0000").is_err());

    let query = analytics::SegmentQuery {
        street_name: Some("bd_".into()),
        ..Default::default()
    };
    let boulevards: Vec<_> = analytics::list_segments(&segments, &query)
        .iter()
        .map(|s| s.segment_id.as_str())
        .collect();
    assert_eq!(boulevards, vec!["5464", "9033"]);
    assert_eq!(
        analytics::segment_by_id(&segments, "4212").unwrap().street_name.as_deref(),
        Some("Quai_de_la_Tournelle")
    );
    assert!(analytics::segment_by_id(&segments, "0000").is_err());

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_month_filter_excludes_other_months() {
    let filter = RecordFilter {
        timestamp_prefix: Some("2023-01".into()),
        limit: None,
    };
    let mut segment_ids = Vec::new();
    let summary = for_each_batch(SAMPLE, 100, &filter, |_, batch| {
        let out = transform(&batch)?;
        segment_ids.extend(out.segments.into_iter().map(|s| s.segment_id));
        Ok(())
    })
    .unwrap();

    assert_eq!(summary.records_matched, 11);
    assert!(!segment_ids.contains(&"9033".to_string()));
}

#[test]
fn test_missing_required_field_aborts_batch() {
    let mut records = parse_records(SAMPLE).unwrap();
    // the no-signal record would be dropped, but is still validated
    records[3].sensor_status = None;

    assert_eq!(
        transform(&records).unwrap_err(),
        TransformError::SchemaViolation {
            index: 3,
            field: "etat_barre"
        }
    );
}
