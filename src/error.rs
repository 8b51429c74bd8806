//! Error kinds of the meter model.
//!
//! All conditions here are local, deterministic and non-retryable:
//! they are raised synchronously from the call that detected them,
//! and the caller decides how to react (e.g. falling back to a
//! default time signature).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeterError {
    #[error("can not parse meter ratio: `{0}`")]
    Parse(String),
    #[error("denominator {0} is not a power of two in 1..=2048")]
    InvalidDenominator(u32),
    #[error("no partition option with {requested} parts for {ratio}")]
    UnsupportedPartitionCount { ratio: String, requested: usize },
    #[error("partition `{supplied}` does not sum to {expected}")]
    PartitionMismatch { supplied: String, expected: String },
    #[error("can not copy structure between {left} and {right}")]
    RatioMismatch { left: String, right: String },
    #[error("offset {offset} is out of range of {total}")]
    OutOfRange { offset: String, total: String },
    #[error("query needs uniform parts: {0}")]
    NonUniformQuery(String),
    #[error("can not infer a time signature: {0}")]
    Inference(String),
}

pub type MeterResult<T> = Result<T, MeterError>;
