//! Decoding helpers for raw sensor exports.

use anyhow::Result;
use chrono::{DateTime, NaiveDateTime};

use crate::transform::types::RawReading;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Decodes a complete JSON array of raw readings held in memory.
///
/// Large exports should go through [`crate::extract::for_each_batch`] instead.
///
/// # Errors
///
/// Returns an error if the bytes are not a JSON array of objects.
pub fn parse_records(bytes: &[u8]) -> Result<Vec<RawReading>> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Parses an hourly bucket timestamp into wall-clock time.
///
/// RFC 3339 values keep their local time and drop the offset, which is how
/// the relational store's DATETIME columns hold them.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}
