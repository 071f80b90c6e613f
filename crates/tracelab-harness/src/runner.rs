//! Conversion execution engine.
//!
//! Reads an mtrace file, renders the replay trace in memory and only then
//! creates the output file, so a failed read never leaves a half-written
//! trace behind.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;

use thiserror::Error;
use tracelab_core::{
    Conversion, ConversionMode, ConvertError, Diagnostic, NormalizedTrace, convert,
};

use crate::report::ConversionReport;
use crate::structured_log::{ArtifactIndex, LogEmitter, LogEntry, LogLevel, Outcome, sha256_hex};

/// File name of the index written by [`ConversionRunner::convert_dir`].
pub const ARTIFACT_INDEX_FILE: &str = "artifact_index.json";

/// Fatal failures. Per-line problems never end up here.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("cannot open input {}: {source}", .path.display())]
    OpenInput {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed reading input {}: {source}", .path.display())]
    ReadInput {
        path: PathBuf,
        source: ConvertError,
    },
    #[error("failed writing {}: {source}", .path.display())]
    WriteOutput {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot list {}: {source}", .path.display())]
    ListDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("log write failed: {0}")]
    Log(#[source] std::io::Error),
}

/// Result of [`ConversionRunner::convert_dir`].
#[derive(Debug)]
pub struct BatchOutcome {
    pub reports: Vec<ConversionReport>,
    pub index: ArtifactIndex,
    pub index_path: PathBuf,
}

impl BatchOutcome {
    #[must_use]
    pub fn diagnostic_count(&self) -> usize {
        self.reports.iter().map(|r| r.diagnostics.len()).sum()
    }
}

/// Converts trace files and logs what happened.
#[derive(Debug, Clone, Copy)]
pub struct ConversionRunner {
    pub mode: ConversionMode,
}

impl ConversionRunner {
    #[must_use]
    pub fn new(mode: ConversionMode) -> Self {
        Self { mode }
    }

    /// Convert one file.
    pub fn convert_file(
        &self,
        input: &Path,
        output: &Path,
        log: &mut LogEmitter,
    ) -> Result<ConversionReport, RunError> {
        self.run_one(input, output, log).map(|(report, _)| report)
    }

    fn run_one(
        &self,
        input: &Path,
        output: &Path,
        log: &mut LogEmitter,
    ) -> Result<(ConversionReport, String), RunError> {
        let started = Instant::now();
        self.log(
            log,
            LogLevel::Info,
            "convert_start",
            |e| e.with_paths(input, Some(output)),
        )?;

        let conversion = match read_conversion(input, self.mode) {
            Ok(c) => c,
            Err(err) => {
                self.log(log, LogLevel::Error, "convert_failed", |e| {
                    e.with_paths(input, None)
                        .with_outcome(Outcome::Error)
                        .with_details(serde_json::json!({ "error": err.to_string() }))
                })?;
                return Err(err);
            }
        };

        let text = conversion.trace.to_text();
        write_trace(output, &conversion.trace)?;

        for diag in &conversion.diagnostics {
            self.log_diagnostic(log, input, diag)?;
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        let report = build_report(input, output, &conversion, &text, duration_ms);
        let outcome = if report.clean() {
            Outcome::Pass
        } else {
            Outcome::Fail
        };
        self.log(log, LogLevel::Info, "convert_done", |e| {
            e.with_paths(input, Some(output))
                .with_outcome(outcome)
                .with_duration_ms(duration_ms)
                .with_artifacts(vec![output.display().to_string()])
                .with_details(serde_json::json!({
                    "stats": report.stats,
                    "live_at_end": report.live_at_end,
                    "skipped": report.skipped,
                    "diagnostics": report.diagnostics.len(),
                    "output_sha256": report.output_sha256,
                }))
        })?;
        log.flush().map_err(RunError::Log)?;
        Ok((report, text))
    }

    /// Convert every `*.<extension>` file in `input_dir`, in name order, to
    /// `<stem>.rep` under `output_dir`, then write the artifact index.
    pub fn convert_dir(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        extension: &str,
        log: &mut LogEmitter,
    ) -> Result<BatchOutcome, RunError> {
        let inputs = list_inputs(input_dir, extension)?;
        let mut index = ArtifactIndex::new(log.run_id());
        let mut reports = Vec::with_capacity(inputs.len());

        for input in &inputs {
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let output = output_dir.join(format!("{stem}.rep"));
            let (report, text) = self.run_one(input, &output, log)?;
            index.add(
                output.display().to_string(),
                "replay_trace",
                text.as_bytes(),
                Some(input.display().to_string()),
            );
            reports.push(report);
        }

        let index_path = output_dir.join(ARTIFACT_INDEX_FILE);
        let json = index.to_json().map_err(|e| RunError::WriteOutput {
            path: index_path.clone(),
            source: std::io::Error::other(e),
        })?;
        write_output(&index_path, json.as_bytes())?;

        Ok(BatchOutcome {
            reports,
            index,
            index_path,
        })
    }

    fn log_diagnostic(
        &self,
        log: &mut LogEmitter,
        input: &Path,
        diag: &Diagnostic,
    ) -> Result<(), RunError> {
        self.log(log, LogLevel::Warn, diag.kind.as_str(), |mut e| {
            e = e
                .with_paths(input, None)
                .with_line(diag.line as u64)
                .with_outcome(Outcome::Skip)
                .with_details(serde_json::json!({
                    "detail": diag.detail,
                    "op": diag.op,
                    "caller": diag.caller,
                }));
            if let Some(addr) = &diag.address {
                e = e.with_address(addr.clone());
            }
            if let Some(id) = diag.allocation_id {
                e = e.with_allocation_id(id.0);
            }
            e
        })
    }

    fn log(
        &self,
        log: &mut LogEmitter,
        level: LogLevel,
        event: &str,
        fill: impl FnOnce(LogEntry) -> LogEntry,
    ) -> Result<(), RunError> {
        let entry = fill(LogEntry::new(String::new(), level, event).with_mode(self.mode.as_str()));
        log.emit_entry(entry).map_err(RunError::Log)
    }
}

fn read_conversion(input: &Path, mode: ConversionMode) -> Result<Conversion, RunError> {
    let file = File::open(input).map_err(|source| RunError::OpenInput {
        path: input.to_path_buf(),
        source,
    })?;
    convert::convert_reader(BufReader::new(file), mode).map_err(|source| RunError::ReadInput {
        path: input.to_path_buf(),
        source,
    })
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<(), RunError> {
    let wrap = |source| RunError::WriteOutput {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(wrap)?;
    }
    std::fs::write(path, bytes).map_err(wrap)
}

fn write_trace(path: &Path, trace: &NormalizedTrace) -> Result<(), RunError> {
    let wrap = |source| RunError::WriteOutput {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(wrap)?;
    }
    let file = File::create(path).map_err(wrap)?;
    trace.write_to(BufWriter::new(file)).map_err(wrap)
}

fn list_inputs(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, RunError> {
    let entries = std::fs::read_dir(dir).map_err(|source| RunError::ListDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file())
        .filter(|path| path.extension().and_then(|s| s.to_str()) == Some(extension))
        .collect();
    paths.sort();
    Ok(paths)
}

fn build_report(
    input: &Path,
    output: &Path,
    conversion: &Conversion,
    text: &str,
    duration_ms: u64,
) -> ConversionReport {
    ConversionReport {
        input: input.display().to_string(),
        output: output.display().to_string(),
        mode: conversion.mode,
        stats: conversion.stats,
        lines_read: conversion.lines_read,
        live_at_end: conversion.live_at_end,
        live_address_reused: conversion.live_address_reused,
        skipped: conversion.skipped,
        diagnostics: conversion.diagnostics.clone(),
        output_sha256: sha256_hex(text.as_bytes()),
        output_bytes: text.len() as u64,
        duration_ms,
    }
}
