//! Reporting over the loaded tables.
//!
//! Peak-hour profiles, busiest segments, speed distribution statistics,
//! quality-flag breakdown and congestion hotspots, plus a raw-speed band
//! diagnostic for sizing the decimal bug before a load.

pub mod analytics;
pub mod types;
pub mod utility;
