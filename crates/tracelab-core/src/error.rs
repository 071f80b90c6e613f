//! Error types.
//!
//! Per-line anomalies in an mtrace log are not errors (see
//! [`crate::convert::SkipCounts`]); only I/O and malformed normalized traces
//! surface here.

use thiserror::Error;

/// Failure while reading an mtrace log.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure while reading a normalized replay trace.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceFormatError {
    #[error("line {line}: missing header field `{field}`")]
    MissingHeader { line: usize, field: &'static str },
    #[error("line {line}: header field `{field}` is not a decimal integer: {text:?}")]
    BadHeader {
        line: usize,
        field: &'static str,
        text: String,
    },
    #[error("line {line}: unrecognized record {text:?}")]
    BadRecord { line: usize, text: String },
}
