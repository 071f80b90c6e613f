//! # tracelab-core
//!
//! Converts glibc `mtrace` logs into malloc-lab replay traces.
//!
//! Raw traces name allocations by address, and addresses get reused as soon
//! as a block is freed. The converter assigns every allocation a small
//! sequential id, follows it through `realloc` moves until it is freed, and
//! accumulates the header statistics a replay harness needs up front
//! (id count, operation count, peak allocated bytes).
//!
//! - [`mtrace`]: line tokenizer and classifier.
//! - [`registry`]: live address → allocation id table with per-id sizes.
//! - [`stats`]: running counters and peak tracking.
//! - [`trace`]: the normalized output model and its text format.
//! - [`convert`]: the single-pass converter tying the above together.
//! - [`check`]: consistency checks over an already-normalized trace.

#![deny(unsafe_code)]

pub mod check;
pub mod config;
pub mod convert;
pub mod error;
pub mod mtrace;
pub mod registry;
pub mod stats;
pub mod trace;

pub use check::{TraceCheckReport, TraceViolation, check_trace};
pub use config::ConversionMode;
pub use convert::{Conversion, Converter, Diagnostic, DiagnosticKind, SkipCounts};
pub use error::{ConvertError, TraceFormatError};
pub use mtrace::{Event, LineClass, SkipReason};
pub use registry::{AllocationId, AllocationRegistry};
pub use stats::{StatsAccumulator, StatsSnapshot};
pub use trace::{NormalizedTrace, OutputRecord, TraceHeader};
