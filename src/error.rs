//! Errors surfaced by the transform stage.

use thiserror::Error;

/// A batch-level failure. Any of these aborts the whole batch; `index` is the
/// zero-based position of the offending record inside the batch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("record {index}: required field `{field}` is missing")]
    SchemaViolation { index: usize, field: &'static str },

    #[error("record {index}: timestamp `{value}` is not a recognised datetime")]
    InvalidTimestamp { index: usize, value: String },
}

impl TransformError {
    pub fn index(&self) -> usize {
        match self {
            TransformError::SchemaViolation { index, .. }
            | TransformError::InvalidTimestamp { index, .. } => *index,
        }
    }
}
