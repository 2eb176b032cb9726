//! CLI entry point for the traffic sensor ETL.
//!
//! Provides subcommands for running the full extract/transform/load pipeline,
//! previewing the quality classification on a sample, inspecting raw rows and
//! querying the loaded tables.

use std::ffi::OsStr;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use traffic_quality::{
    QualityFlag, QualityThresholds,
    extract::{RecordFilter, for_each_batch, open_source, record_at},
    load::{CsvLoader, read_readings, read_segments},
    output::{append_record, write_json},
    report::analytics::{self, ReadingQuery, SegmentQuery, SpeedBandCounter},
    stats::BatchStats,
    transform_batch,
};

#[derive(Parser)]
#[command(name = "traffic_quality")]
#[command(about = "Clean, classify and load hourly road traffic sensor data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, transform and load a JSON export into the CSV store
    Run {
        /// Path to file or URL to fetch (.gz is decompressed)
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        /// Records per batch
        #[arg(short, long, default_value_t = 5000)]
        chunk_size: usize,

        /// Directory holding segments.csv and readings.csv
        #[arg(short = 'd', long, default_value = "out")]
        output_dir: String,

        /// Only load records whose timestamp starts with this (e.g. 2023-01)
        #[arg(short, long)]
        month: Option<String>,

        /// Stop after this many matching records
        #[arg(short, long)]
        limit: Option<usize>,

        /// JSON file overriding classifier thresholds
        #[arg(short, long)]
        thresholds: Option<String>,

        /// CSV file to append per-batch statistics to
        #[arg(short, long, default_value = "batch_stats.csv")]
        stats: String,
    },
    /// Transform a sample and print its quality distribution
    Transform {
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        /// Number of leading records to classify
        #[arg(short = 'n', long, default_value_t = 1000)]
        sample: usize,

        /// JSON file overriding classifier thresholds
        #[arg(short, long)]
        thresholds: Option<String>,
    },
    /// Print one raw record (1-based row number)
    Inspect {
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        #[arg(short, long)]
        row: usize,
    },
    /// Distribution of raw speeds by band and traffic state
    SpeedBands {
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        /// Stop after this many records
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Query the loaded tables
    Report {
        /// Directory holding segments.csv and readings.csv
        #[arg(short = 'd', long, default_value = "out")]
        output_dir: String,

        /// JSON file overriding the traffic-state labels
        #[arg(short, long)]
        thresholds: Option<String>,

        #[command(subcommand)]
        query: ReportQuery,
    },
}

#[derive(Subcommand)]
enum ReportQuery {
    /// List segments, optionally by partial street name
    Segments {
        #[arg(long)]
        street_name: Option<String>,
        #[arg(long, default_value_t = 0)]
        skip: usize,
        #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..=1000))]
        limit: u64,
    },
    /// One segment by id
    Segment {
        #[arg(long)]
        segment_id: String,
    },
    /// Average flow and speed by hour of day
    PeakHours {
        #[arg(long)]
        segment_id: Option<String>,
        #[arg(long, default_value_t = 0.0, value_parser = unit_interval)]
        min_quality_score: f64,
    },
    /// Segments ranked by average flow
    BusiestSegments {
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..=100))]
        limit: u64,
        #[arg(long, default_value_t = 0.0, value_parser = unit_interval)]
        min_quality_score: f64,
    },
    /// Mean, median, spread and percentiles of speed
    SpeedStats {
        #[arg(long)]
        segment_id: Option<String>,
        #[arg(long, default_value_t = 0.0, value_parser = unit_interval)]
        min_quality_score: f64,
    },
    /// Breakdown of readings by quality flag
    QualityReport,
    /// Segments with the most blocked or saturated readings
    CongestionHotspots {
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..=100))]
        limit: u64,
    },
    /// Hourly profile of one segment
    TrafficByHour {
        #[arg(long)]
        segment_id: String,
    },
    /// List readings with optional filters
    Readings {
        #[arg(long)]
        segment_id: Option<String>,
        #[arg(long)]
        quality_flag: Option<QualityFlag>,
        #[arg(long, value_parser = unit_interval)]
        min_quality_score: Option<f64>,
        #[arg(long, default_value_t = 0)]
        skip: usize,
        #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..=1000))]
        limit: u64,
    },
}

fn unit_interval(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is not in [0, 1]"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/traffic_quality.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("traffic_quality.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            source,
            chunk_size,
            output_dir,
            month,
            limit,
            thresholds,
            stats,
        } => {
            let thresholds = QualityThresholds::load_or_default(thresholds.as_deref())?;
            let filter = RecordFilter {
                timestamp_prefix: month,
                limit,
            };
            if let Err(e) =
                run_pipeline(&source, chunk_size, &output_dir, &filter, &thresholds, &stats).await
            {
                error!(error = %format!("{e:#}"), "Pipeline failed");
                return Err(e);
            }
        }
        Commands::Transform {
            source,
            sample,
            thresholds,
        } => {
            let thresholds = QualityThresholds::load_or_default(thresholds.as_deref())?;
            let filter = RecordFilter {
                timestamp_prefix: None,
                limit: Some(sample),
            };
            let reader = open_source(&source).await?;
            let mut stats = BatchStats::default();
            for_each_batch(reader, sample.max(1), &filter, |_, batch| {
                stats.accumulate(&transform_batch(&batch, &thresholds)?.stats);
                Ok(())
            })?;

            let distribution: Vec<_> = stats
                .distribution()
                .into_iter()
                .map(|(flag, count, pct)| json!({ "flag": flag, "count": count, "pct": pct }))
                .collect();
            write_json(
                std::io::stdout().lock(),
                &json!({
                    "segments": stats.segments,
                    "readings": stats.readings,
                    "quality_distribution": distribution,
                }),
            )?;
        }
        Commands::Inspect { source, row } => {
            let reader = open_source(&source).await?;
            match record_at(reader, row)? {
                Some(record) => write_json(std::io::stdout().lock(), &record)?,
                None => bail!("{source} has fewer than {row} rows"),
            }
        }
        Commands::SpeedBands { source, limit } => {
            let reader = open_source(&source).await?;
            let filter = RecordFilter {
                timestamp_prefix: None,
                limit,
            };
            let mut counter = SpeedBandCounter::default();
            for_each_batch(reader, 10_000, &filter, |_, batch| {
                counter.add(&batch);
                Ok(())
            })?;
            write_json(std::io::stdout().lock(), &counter.finish())?;
        }
        Commands::Report {
            output_dir,
            thresholds,
            query,
        } => {
            let thresholds = QualityThresholds::load_or_default(thresholds.as_deref())?;
            run_report(&output_dir, &thresholds, query)?;
        }
    }

    Ok(())
}

/// Streams `source` through transform and load, one batch at a time.
#[tracing::instrument(skip(filter, thresholds))]
async fn run_pipeline(
    source: &str,
    chunk_size: usize,
    output_dir: &str,
    filter: &RecordFilter,
    thresholds: &QualityThresholds,
    stats_path: &str,
) -> Result<()> {
    let start = Instant::now();
    info!(source, chunk_size, "Starting ETL pipeline");

    let reader = open_source(source).await?;
    let mut loader = CsvLoader::open(output_dir)?;
    let mut total = BatchStats::default();

    for_each_batch(reader, chunk_size, filter, |index, batch| {
        let out = transform_batch(&batch, thresholds)
            .with_context(|| format!("transforming batch {index}"))?;
        loader.load(&out.segments, &out.readings)?;

        let stats = out.stats.with_batch_index(index);
        append_record(stats_path, &stats)?;
        total.accumulate(&stats);

        info!(
            batch = index,
            processed = total.input_records,
            "Progress"
        );
        Ok(())
    })?;

    info!(
        records = total.input_records,
        readings = total.readings,
        dropped_no_signal = total.dropped_no_signal,
        dropped_outliers = total.dropped_outliers,
        decimal_corrections = total.decimal_corrections,
        segments_known = loader.known_segments(),
        elapsed_secs = start.elapsed().as_secs_f64(),
        "Pipeline complete"
    );
    for (flag, count, pct) in total.distribution() {
        info!(flag = %flag, count, pct = %format!("{pct:.1}"), "Quality distribution");
    }
    Ok(())
}

fn run_report(output_dir: &str, thresholds: &QualityThresholds, query: ReportQuery) -> Result<()> {
    let out = std::io::stdout().lock();

    match query {
        ReportQuery::Segments {
            street_name,
            skip,
            limit,
        } => {
            let segments = read_segments(output_dir)?;
            let query = SegmentQuery {
                street_name,
                skip,
                limit: limit as usize,
            };
            write_json(out, &analytics::list_segments(&segments, &query))
        }
        ReportQuery::Segment { segment_id } => {
            let segments = read_segments(output_dir)?;
            write_json(out, analytics::segment_by_id(&segments, &segment_id)?)
        }
        ReportQuery::PeakHours {
            segment_id,
            min_quality_score,
        } => {
            let readings = read_readings(output_dir)?;
            write_json(
                out,
                &analytics::peak_hours(&readings, segment_id.as_deref(), min_quality_score),
            )
        }
        ReportQuery::BusiestSegments {
            limit,
            min_quality_score,
        } => {
            let readings = read_readings(output_dir)?;
            let segments = read_segments(output_dir)?;
            write_json(
                out,
                &analytics::busiest_segments(&readings, &segments, limit as usize, min_quality_score),
            )
        }
        ReportQuery::SpeedStats {
            segment_id,
            min_quality_score,
        } => {
            let readings = read_readings(output_dir)?;
            write_json(
                out,
                &analytics::speed_stats(&readings, segment_id.as_deref(), min_quality_score),
            )
        }
        ReportQuery::QualityReport => {
            let readings = read_readings(output_dir)?;
            write_json(out, &analytics::quality_report(&readings))
        }
        ReportQuery::CongestionHotspots { limit } => {
            let readings = read_readings(output_dir)?;
            let segments = read_segments(output_dir)?;
            write_json(
                out,
                &analytics::congestion_hotspots(&readings, &segments, thresholds, limit as usize),
            )
        }
        ReportQuery::TrafficByHour { segment_id } => {
            let readings = read_readings(output_dir)?;
            let segments = read_segments(output_dir)?;
            write_json(
                out,
                &analytics::traffic_by_hour(&readings, &segments, &segment_id)?,
            )
        }
        ReportQuery::Readings {
            segment_id,
            quality_flag,
            min_quality_score,
            skip,
            limit,
        } => {
            let readings = read_readings(output_dir)?;
            let query = ReadingQuery {
                segment_id,
                quality_flag,
                min_quality_score,
                skip,
                limit: limit as usize,
            };
            write_json(out, &analytics::filter_readings(&readings, &query))
        }
    }
}
