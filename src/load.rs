//! CSV-backed store for transformed batches.
//!
//! `segments.csv` behaves like an insert-ignore table keyed by segment id,
//! `readings.csv` is append-only. Cross-batch deduplication happens here, the
//! transform only deduplicates within a batch.

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::output::append_records;
use crate::transform::types::{Reading, Segment};

pub const SEGMENTS_FILE: &str = "segments.csv";
pub const READINGS_FILE: &str = "readings.csv";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub segments_inserted: usize,
    pub segments_skipped: usize,
    pub readings_inserted: usize,
}

pub struct CsvLoader {
    segments_path: PathBuf,
    readings_path: PathBuf,
    known_segments: HashSet<String>,
}

impl CsvLoader {
    /// Opens (creating if needed) the store in `dir`, remembering segment ids
    /// already persisted by earlier runs.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory '{}'", dir.display()))?;

        let segments_path = dir.join(SEGMENTS_FILE);
        let known_segments: HashSet<String> = read_rows::<Segment>(&segments_path)?
            .into_iter()
            .map(|s| s.segment_id)
            .collect();
        debug!(known = known_segments.len(), "Existing segments loaded");

        Ok(Self {
            segments_path,
            readings_path: dir.join(READINGS_FILE),
            known_segments,
        })
    }

    #[tracing::instrument(skip_all, fields(segments = segments.len(), readings = readings.len()))]
    pub fn load(&mut self, segments: &[Segment], readings: &[Reading]) -> Result<LoadSummary> {
        let fresh: Vec<&Segment> = segments
            .iter()
            .filter(|s| self.known_segments.insert(s.segment_id.clone()))
            .collect();

        let segments_inserted = append_records(&self.segments_path, fresh.iter().copied())?;
        let readings_inserted = append_records(&self.readings_path, readings)?;

        let summary = LoadSummary {
            segments_inserted,
            segments_skipped: segments.len() - segments_inserted,
            readings_inserted,
        };
        info!(
            segments_inserted,
            segments_skipped = summary.segments_skipped,
            readings_inserted,
            "Batch loaded"
        );
        Ok(summary)
    }

    pub fn known_segments(&self) -> usize {
        self.known_segments.len()
    }
}

pub fn read_segments(dir: impl AsRef<Path>) -> Result<Vec<Segment>> {
    read_rows(&dir.as_ref().join(SEGMENTS_FILE))
}

pub fn read_readings(dir: impl AsRef<Path>) -> Result<Vec<Reading>> {
    read_rows(&dir.as_ref().join(READINGS_FILE))
}

/// Reads every row of a CSV table; a missing file is an empty table.
fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path).with_context(|| format!("opening '{}'", path.display()))?;
    let mut rdr = csv::Reader::from_reader(file);
    let mut rows = Vec::new();

    for result in rdr.deserialize() {
        let record: T = result.with_context(|| format!("decoding row of '{}'", path.display()))?;
        rows.push(record);
    }

    Ok(rows)
}
