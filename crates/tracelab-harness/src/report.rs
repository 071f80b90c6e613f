//! Conversion report generation.

use std::fmt::Write as _;

use serde::Serialize;
use tracelab_core::{ConversionMode, Diagnostic, SkipCounts, StatsSnapshot, TraceCheckReport};

/// Machine- and human-readable summary of one converted file.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub input: String,
    pub output: String,
    pub mode: ConversionMode,
    pub stats: StatsSnapshot,
    pub lines_read: u64,
    pub live_at_end: u64,
    pub live_address_reused: u64,
    pub skipped: SkipCounts,
    /// Empty unless the mode collects diagnostics.
    pub diagnostics: Vec<Diagnostic>,
    pub output_sha256: String,
    pub output_bytes: u64,
    pub duration_ms: u64,
}

impl ConversionReport {
    /// True when a strict run raised nothing.
    #[must_use]
    pub fn clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Render as JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Render as markdown.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        writeln!(out, "# Trace Conversion Report").ok();
        writeln!(out).ok();
        writeln!(out, "- Input: `{}`", self.input).ok();
        writeln!(out, "- Output: `{}`", self.output).ok();
        writeln!(out, "- Mode: {}", self.mode.as_str()).ok();
        writeln!(out, "- Output SHA-256: `{}`", self.output_sha256).ok();
        writeln!(out).ok();

        writeln!(out, "## Header").ok();
        writeln!(out).ok();
        writeln!(out, "| Field | Value |").ok();
        writeln!(out, "|-------|------:|").ok();
        writeln!(out, "| ids | {} |", self.stats.unique_allocation_count).ok();
        writeln!(out, "| ops | {} |", self.stats.total_operation_count).ok();
        writeln!(out, "| peak bytes | {} |", self.stats.peak_allocated_bytes).ok();
        writeln!(out, "| live at end | {} |", self.live_at_end).ok();
        writeln!(out).ok();

        writeln!(out, "## Dropped Lines").ok();
        writeln!(out).ok();
        writeln!(out, "| Reason | Count |").ok();
        writeln!(out, "|--------|------:|").ok();
        let s = &self.skipped;
        for (reason, count) in [
            ("no marker", s.no_marker),
            ("too few tokens", s.too_few_tokens),
            ("unknown operation", s.unknown_operation),
            ("invalid size", s.invalid_size),
            ("dangling free", s.dangling_free),
            ("dangling realloc", s.dangling_realloc),
        ] {
            writeln!(out, "| {reason} | {count} |").ok();
        }

        if !self.diagnostics.is_empty() {
            writeln!(out).ok();
            writeln!(out, "## Diagnostics").ok();
            writeln!(out).ok();
            for d in &self.diagnostics {
                write!(out, "- line {}: **{}**", d.line, d.kind.as_str()).ok();
                if let (Some(op), Some(caller)) = (d.op, &d.caller) {
                    write!(out, " ({op} from `{caller}`)").ok();
                }
                writeln!(out, " {}", d.detail).ok();
            }
        }
        out
    }
}

/// Render a trace check as markdown.
#[must_use]
pub fn render_check_markdown(path: &str, report: &TraceCheckReport) -> String {
    let mut out = String::new();
    writeln!(out, "# Trace Check: `{path}`").ok();
    writeln!(out).ok();
    writeln!(
        out,
        "- Result: {}",
        if report.ok { "PASS" } else { "FAIL" }
    )
    .ok();
    writeln!(out, "- Records: {}", report.records).ok();
    writeln!(
        out,
        "- Recomputed: ids={} ops={} peak={}",
        report.recomputed.unique_allocation_count,
        report.recomputed.total_operation_count,
        report.recomputed.peak_allocated_bytes
    )
    .ok();
    for v in &report.violations {
        match v.record {
            Some(idx) => writeln!(out, "- [{}] record {idx}: {}", v.code, v.message).ok(),
            None => writeln!(out, "- [{}] {}", v.code, v.message).ok(),
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracelab_core::convert::convert_str;
    use tracelab_core::{NormalizedTrace, check_trace};

    fn report_for(input: &str, mode: ConversionMode) -> ConversionReport {
        let conv = convert_str(input, mode);
        ConversionReport {
            input: "in.mtrace".into(),
            output: "out.rep".into(),
            mode,
            stats: conv.stats,
            lines_read: conv.lines_read,
            live_at_end: conv.live_at_end,
            live_address_reused: conv.live_address_reused,
            skipped: conv.skipped,
            diagnostics: conv.diagnostics,
            output_sha256: "00".into(),
            output_bytes: 0,
            duration_ms: 0,
        }
    }

    #[test]
    fn json_carries_stats_and_skips() {
        let report = report_for("= Start\n@0 + A 10\n@0 - Q\n", ConversionMode::Lenient);
        let v: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(v["mode"], "lenient");
        assert_eq!(v["stats"]["unique_allocation_count"], 1);
        assert_eq!(v["stats"]["peak_allocated_bytes"], 16);
        assert_eq!(v["skipped"]["no_marker"], 1);
        assert_eq!(v["skipped"]["dangling_free"], 1);
        assert_eq!(v["live_at_end"], 1);
        assert!(v["diagnostics"].as_array().unwrap().is_empty());
        assert!(report.clean());
    }

    #[test]
    fn markdown_lists_strict_diagnostics() {
        let report = report_for("@0 + A 10\n@0 - A\n@0 - A\n", ConversionMode::Strict);
        assert!(!report.clean());
        let md = report.to_markdown();
        assert!(md.contains("# Trace Conversion Report"));
        assert!(md.contains("| peak bytes | 16 |"));
        assert!(md.contains("| dangling free | 1 |"));
        assert!(md.contains("- line 3: **double_free** (free from `0`)"));
    }

    #[test]
    fn check_markdown_reports_violations() {
        let trace = NormalizedTrace::parse("0\n2\n1\n16\na 0 16\n").unwrap();
        let md = render_check_markdown("bad.rep", &check_trace(&trace));
        assert!(md.contains("- Result: FAIL"));
        assert!(md.contains("[header.num_ids_mismatch]"));
    }
}
