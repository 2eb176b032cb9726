//! Streaming extraction of raw readings from a JSON array export.
//!
//! Exports run to millions of records, so the array is walked element by
//! element and handed over in fixed-size batches instead of being loaded
//! whole.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};

use anyhow::{Context, Result, bail};
use flate2::read::GzDecoder;
use serde::Deserializer as _;
use serde::de::{IgnoredAny, SeqAccess, Visitor};
use serde_json::Value;
use tracing::{debug, info};

use crate::fetch::{BasicClient, fetch_bytes};
use crate::transform::types::RawReading;

/// Restricts which records are extracted.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Keep only records whose `t_1h` starts with this, e.g. `2023-01`.
    pub timestamp_prefix: Option<String>,
    /// Stop after this many matching records.
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn accepts(&self, record: &RawReading) -> bool {
        match &self.timestamp_prefix {
            Some(prefix) => record
                .timestamp
                .as_deref()
                .is_some_and(|ts| ts.starts_with(prefix.as_str())),
            None => true,
        }
    }

    fn exhausted(&self, matched: usize) -> bool {
        self.limit.is_some_and(|limit| matched >= limit)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub records_read: usize,
    pub records_matched: usize,
    pub batches: usize,
}

/// Opens a local path or `http(s)` URL; `.gz` sources are decompressed.
#[tracing::instrument]
pub async fn open_source(source: &str) -> Result<Box<dyn Read + Send>> {
    let reader: Box<dyn Read + Send> = if source.starts_with("http") {
        let client = BasicClient::new()?;
        Box::new(Cursor::new(fetch_bytes(&client, source).await?))
    } else {
        let file = File::open(source).with_context(|| format!("opening '{source}'"))?;
        Box::new(file)
    };

    if source.ends_with(".gz") {
        debug!("Decompressing gzip source");
        Ok(Box::new(BufReader::new(GzDecoder::new(reader))))
    } else {
        Ok(Box::new(BufReader::new(reader)))
    }
}

/// Streams the JSON array in `reader`, calling `on_batch(batch_index, batch)`
/// for every `chunk_size` matching records (the last batch may be shorter).
/// Input order is preserved. An error from `on_batch` stops extraction and is
/// returned unchanged.
///
/// Once the filter's limit is reached nothing more is read, so the rest of
/// the input is neither parsed nor checked.
pub fn for_each_batch<R, F>(
    reader: R,
    chunk_size: usize,
    filter: &RecordFilter,
    mut on_batch: F,
) -> Result<ExtractSummary>
where
    R: Read,
    F: FnMut(usize, Vec<RawReading>) -> Result<()>,
{
    if chunk_size == 0 {
        bail!("chunk size must be at least 1");
    }

    let mut state = ExtractState::default();
    let mut de = serde_json::Deserializer::from_reader(reader);
    let visitor = BatchVisitor {
        chunk_size,
        filter,
        on_batch: &mut on_batch,
        state: &mut state,
    };
    let result = (&mut de).deserialize_seq(visitor);

    if let Some(err) = state.failure {
        return Err(err);
    }
    // Stopping early leaves the array open, which the parser reports as an
    // error; there is nothing left to validate.
    if !state.limit_reached {
        result.context("reading JSON array of sensor records")?;
        de.end().context("trailing data after JSON array")?;
    }
    let summary = state.summary;

    info!(
        records_read = summary.records_read,
        records_matched = summary.records_matched,
        batches = summary.batches,
        "Extraction complete"
    );
    Ok(summary)
}

#[derive(Default)]
struct ExtractState {
    summary: ExtractSummary,
    failure: Option<anyhow::Error>,
    limit_reached: bool,
}

struct BatchVisitor<'a, F> {
    chunk_size: usize,
    filter: &'a RecordFilter,
    on_batch: &'a mut F,
    state: &'a mut ExtractState,
}

impl<F> BatchVisitor<'_, F>
where
    F: FnMut(usize, Vec<RawReading>) -> Result<()>,
{
    fn flush(&mut self, batch: &mut Vec<RawReading>) -> Result<()> {
        let full = std::mem::replace(batch, Vec::with_capacity(self.chunk_size));
        let index = self.state.summary.batches;
        self.state.summary.batches += 1;
        debug!(
            batch = index,
            records = full.len(),
            matched = self.state.summary.records_matched,
            "Extracted batch"
        );
        (self.on_batch)(index, full)
    }
}

impl<'de, F> Visitor<'de> for BatchVisitor<'_, F>
where
    F: FnMut(usize, Vec<RawReading>) -> Result<()>,
{
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON array of sensor records")
    }

    fn visit_seq<A>(mut self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        use serde::de::Error;

        let mut batch = Vec::with_capacity(self.chunk_size);

        loop {
            if self.filter.exhausted(self.state.summary.records_matched) {
                self.state.limit_reached = true;
                break;
            }
            let Some(record) = seq.next_element::<RawReading>()? else {
                break;
            };
            self.state.summary.records_read += 1;
            if !self.filter.accepts(&record) {
                continue;
            }
            self.state.summary.records_matched += 1;
            batch.push(record);

            if batch.len() == self.chunk_size {
                if let Err(err) = self.flush(&mut batch) {
                    self.state.failure = Some(err);
                    return Err(A::Error::custom("batch handler failed"));
                }
            }
        }

        if !batch.is_empty() {
            if let Err(err) = self.flush(&mut batch) {
                self.state.failure = Some(err);
                return Err(A::Error::custom("batch handler failed"));
            }
        }

        Ok(())
    }
}

/// Returns the `row`-th (1-based) element of the JSON array, if present.
pub fn record_at<R: Read>(reader: R, row: usize) -> Result<Option<Value>> {
    if row == 0 {
        bail!("rows are numbered from 1");
    }
    let mut de = serde_json::Deserializer::from_reader(reader);
    let found = (&mut de)
        .deserialize_seq(NthVisitor { row })
        .context("reading JSON array of sensor records")?;
    de.end().context("trailing data after JSON array")?;
    Ok(found)
}

struct NthVisitor {
    row: usize,
}

impl<'de> Visitor<'de> for NthVisitor {
    type Value = Option<Value>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON array")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        for _ in 1..self.row {
            if seq.next_element::<IgnoredAny>()?.is_none() {
                return Ok(None);
            }
        }
        let found = seq.next_element::<Value>()?;
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(found)
    }
}
