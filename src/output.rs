//! Output formatting and CSV persistence.
//!
//! Supports pretty JSON to any writer and header-once CSV append.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use tracing::debug;

/// Writes `value` as pretty-printed JSON followed by a newline.
pub fn write_json<W: Write, T: Serialize + ?Sized>(mut writer: W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, value)?;
    writeln!(writer)?;
    Ok(())
}

/// Appends one serialisable record as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record<T: Serialize>(path: impl AsRef<Path>, record: &T) -> Result<()> {
    append_records(path, std::iter::once(record)).map(|_| ())
}

/// Appends every record to a CSV file and returns how many were written.
///
/// Headers are written only when the file is created (or empty).
pub fn append_records<'a, T, I>(path: impl AsRef<Path>, records: I) -> Result<usize>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let path = path.as_ref();
    let needs_header = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    debug!(path = %path.display(), needs_header, "Appending CSV records");

    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("opening '{}' for append", path.display()))?;

    let mut writer = WriterBuilder::new()
        .has_headers(needs_header) // only the first write may emit headers
        .from_writer(file);

    let mut written = 0;
    for record in records {
        writer.serialize(record)?;
        written += 1;
    }
    writer.flush()?;

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::BatchStats;
    use std::env;
    use std::fs;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    #[test]
    fn test_write_json() {
        let mut buf = Vec::new();
        write_json(&mut buf, &BatchStats::default()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("\"dropped_outliers\": 0"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_append_record_creates_file() {
        let path = temp_path("traffic_quality_test_create.csv");
        let _ = fs::remove_file(&path); // clean up any prior run

        append_record(&path, &BatchStats::default()).unwrap();

        assert!(path.exists());
        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.is_empty());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_record_writes_header_once() {
        let path = temp_path("traffic_quality_test_header.csv");
        let _ = fs::remove_file(&path);

        let stats = BatchStats::default();
        append_record(&path, &stats).unwrap();
        append_record(&path, &stats).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.contains("timestamp")).count();
        assert_eq!(header_count, 1);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_records_counts_rows() {
        let path = temp_path("traffic_quality_test_rows.csv");
        let _ = fs::remove_file(&path);

        let rows = vec![BatchStats::default(), BatchStats::default()];
        assert_eq!(append_records(&path, &rows).unwrap(), 2);
        assert_eq!(append_records(&path, &rows[..1]).unwrap(), 1);

        let content = fs::read_to_string(&path).unwrap();
        // 1 header + 3 data rows
        assert_eq!(content.lines().count(), 4);

        fs::remove_file(&path).unwrap();
    }
}
