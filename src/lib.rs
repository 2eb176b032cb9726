pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod load;
pub mod output;
pub mod parser;
pub mod report;
pub mod stats;
pub mod transform;

pub use config::QualityThresholds;
pub use error::TransformError;
pub use transform::quality::QualityFlag;
pub use transform::types::{RawReading, Reading, Segment};
pub use transform::{TransformOutput, transform, transform_batch};
