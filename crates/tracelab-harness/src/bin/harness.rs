//! CLI entrypoint for the tracelab harness.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracelab_core::{ConversionMode, NormalizedTrace, check_trace};
use tracelab_harness::ConversionRunner;
use tracelab_harness::report::render_check_markdown;
use tracelab_harness::structured_log::{LogEmitter, now_utc};

const TOOL: &str = "tracelab";

/// Converts glibc mtrace logs into malloc-lab replay traces.
#[derive(Debug, Parser)]
#[command(name = "tracelab-harness")]
#[command(about = "mtrace to malloc-lab trace converter")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert one mtrace log.
    Convert {
        /// mtrace log to read.
        #[arg(long)]
        input: PathBuf,
        /// Replay trace to write.
        #[arg(long)]
        output: PathBuf,
        /// lenient or strict (overrides TRACELAB_MODE).
        #[arg(long)]
        mode: Option<String>,
        /// Write a JSON conversion report here (markdown alongside as .md).
        #[arg(long)]
        report: Option<PathBuf>,
        /// Structured JSONL log path (`-` for stderr).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Run identifier used in log trace ids.
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Convert every matching log in a directory and write an artifact index.
    ConvertDir {
        #[arg(long)]
        input_dir: PathBuf,
        #[arg(long)]
        output_dir: PathBuf,
        /// Input file extension to select.
        #[arg(long, default_value = "mtrace")]
        extension: String,
        /// lenient or strict (overrides TRACELAB_MODE).
        #[arg(long)]
        mode: Option<String>,
        /// Structured JSONL log path (`-` for stderr).
        #[arg(long)]
        log: Option<PathBuf>,
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Validate a replay trace's header against its records.
    Check {
        /// Replay trace to read.
        #[arg(long)]
        trace: PathBuf,
        /// Write the JSON check report here (if omitted, prints markdown to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn open_log(path: Option<&Path>, run_id: &str) -> Result<LogEmitter, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(p) if p == Path::new("-") => LogEmitter::to_stderr(TOOL, run_id),
        Some(p) => LogEmitter::to_file(p, TOOL, run_id)
            .map_err(|err| format!("cannot create log {}: {err}", p.display()))?,
        None => LogEmitter::disabled(TOOL, run_id),
    })
}

fn default_run_id() -> String {
    format!("run-{}", now_utc().replace([':', '.'], "-"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Convert {
            input,
            output,
            mode,
            report,
            log,
            run_id,
        } => {
            let mode = ConversionMode::resolve(mode.as_deref());
            let run_id = run_id.unwrap_or_else(default_run_id);
            let mut emitter = open_log(log.as_deref(), &run_id)?;

            eprintln!(
                "Converting {} -> {} ({} mode)",
                input.display(),
                output.display(),
                mode.as_str()
            );
            let result = ConversionRunner::new(mode)
                .convert_file(&input, &output, &mut emitter)
                .map_err(|err| err.to_string())?;
            eprintln!(
                "Conversion complete: ids={}, ops={}, peak={}, dropped={}",
                result.stats.unique_allocation_count,
                result.stats.total_operation_count,
                result.stats.peak_allocated_bytes,
                result.skipped.dropped_events()
            );

            if let Some(report_path) = report {
                if let Some(parent) = report_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&report_path, result.to_json()?)?;
                std::fs::write(report_path.with_extension("md"), result.to_markdown())?;
                eprintln!("Wrote report to {}", report_path.display());
            }

            if !result.clean() {
                for d in &result.diagnostics {
                    eprintln!("  line {}: {}: {}", d.line, d.kind.as_str(), d.detail);
                }
                return Err(format!(
                    "strict conversion raised {} diagnostic(s)",
                    result.diagnostics.len()
                )
                .into());
            }
        }
        Command::ConvertDir {
            input_dir,
            output_dir,
            extension,
            mode,
            log,
            run_id,
        } => {
            let mode = ConversionMode::resolve(mode.as_deref());
            let run_id = run_id.unwrap_or_else(default_run_id);
            let mut emitter = open_log(log.as_deref(), &run_id)?;

            eprintln!(
                "Converting *.{extension} in {} ({} mode)",
                input_dir.display(),
                mode.as_str()
            );
            let batch = ConversionRunner::new(mode)
                .convert_dir(&input_dir, &output_dir, &extension, &mut emitter)
                .map_err(|err| err.to_string())?;
            if batch.reports.is_empty() {
                return Err(format!(
                    "No *.{extension} files found in {}",
                    input_dir.display()
                )
                .into());
            }
            for r in &batch.reports {
                eprintln!(
                    "  {} -> {} (ops={}, peak={})",
                    r.input, r.output, r.stats.total_operation_count, r.stats.peak_allocated_bytes
                );
            }
            eprintln!(
                "Converted {} file(s); artifact index at {}",
                batch.reports.len(),
                batch.index_path.display()
            );

            let diagnostics = batch.diagnostic_count();
            if diagnostics > 0 {
                return Err(format!("strict conversion raised {diagnostics} diagnostic(s)").into());
            }
        }
        Command::Check { trace, output } => {
            let text = std::fs::read_to_string(&trace)
                .map_err(|err| format!("cannot read {}: {err}", trace.display()))?;
            let parsed = NormalizedTrace::parse(&text)
                .map_err(|err| format!("{}: {err}", trace.display()))?;
            let report = check_trace(&parsed);

            if let Some(path) = output {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
                eprintln!("Wrote check report to {}", path.display());
            } else {
                print!("{}", render_check_markdown(&trace.display().to_string(), &report));
            }

            if !report.ok {
                return Err(format!(
                    "{} failed {} check(s)",
                    trace.display(),
                    report.violations.len()
                )
                .into());
            }
            eprintln!("{}: {} records, all checks passed", trace.display(), report.records);
        }
    }

    Ok(())
}
