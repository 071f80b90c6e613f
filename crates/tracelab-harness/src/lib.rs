//! Tooling around the tracelab converter.
//!
//! This crate provides:
//! - Conversion runs: file and directory conversion with write-nothing-on-failure
//! - Structured JSONL logs and SHA-256 artifact indexes for every run
//! - Report generation: markdown + JSON conversion and check reports

#![forbid(unsafe_code)]

pub mod report;
pub mod runner;
pub mod structured_log;

pub use report::ConversionReport;
pub use runner::{BatchOutcome, ConversionRunner, RunError};
