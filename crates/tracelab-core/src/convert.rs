//! Single-pass mtrace → replay trace conversion.
//!
//! [`Converter`] owns the registry, the statistics and the pending output
//! records. Each input line causes at most one state transition; the three
//! event handlers are total and never fail.

use std::io::BufRead;

use serde::Serialize;

use crate::config::ConversionMode;
use crate::error::ConvertError;
use crate::mtrace::{self, Event, LineClass, SkipReason};
use crate::registry::{AllocationId, AllocationRegistry};
use crate::stats::{StatsAccumulator, StatsSnapshot};
use crate::trace::{NormalizedTrace, OutputRecord, TraceHeader};

/// Per-reason tally of lines and events that produced no output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipCounts {
    pub no_marker: u64,
    pub too_few_tokens: u64,
    pub unknown_operation: u64,
    pub invalid_size: u64,
    pub dangling_free: u64,
    pub dangling_realloc: u64,
}

impl SkipCounts {
    fn bump(&mut self, reason: SkipReason) {
        let slot = match reason {
            SkipReason::NoMarker => &mut self.no_marker,
            SkipReason::TooFewTokens => &mut self.too_few_tokens,
            SkipReason::UnknownOperation => &mut self.unknown_operation,
            SkipReason::InvalidSize => &mut self.invalid_size,
        };
        *slot += 1;
    }

    /// Everything dropped except plain metadata lines.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.too_few_tokens
            + self.unknown_operation
            + self.invalid_size
            + self.dangling_free
            + self.dangling_realloc
    }
}

/// Kind of anomaly surfaced in strict mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Event line with missing operands or an unknown operation.
    MalformedEvent,
    /// Size operand is not hexadecimal.
    InvalidSize,
    /// Free of an address that was never live.
    DanglingFree,
    /// Free of an address whose last event was already a free.
    DoubleFree,
    /// Realloc whose old address is not live.
    DanglingRealloc,
    /// Allocation landed on an address that was still live; the previous id
    /// can no longer be freed.
    LiveAddressReused,
}

impl DiagnosticKind {
    pub const ALL: [Self; 6] = [
        Self::MalformedEvent,
        Self::InvalidSize,
        Self::DanglingFree,
        Self::DoubleFree,
        Self::DanglingRealloc,
        Self::LiveAddressReused,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MalformedEvent => "malformed_event",
            Self::InvalidSize => "invalid_size",
            Self::DanglingFree => "dangling_free",
            Self::DoubleFree => "double_free",
            Self::DanglingRealloc => "dangling_realloc",
            Self::LiveAddressReused => "live_address_reused",
        }
    }
}

/// One strict-mode finding, tied to its input line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// 1-based input line; 0 when a handler was driven directly.
    pub line: usize,
    pub kind: DiagnosticKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocation_id: Option<AllocationId>,
    /// Operation of the offending event; absent for unparseable lines.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<&'static str>,
    /// Caller token from the offending event line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,
    pub detail: String,
}

/// Everything a finished pass produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversion {
    pub mode: ConversionMode,
    pub trace: NormalizedTrace,
    pub stats: StatsSnapshot,
    pub lines_read: u64,
    /// Allocations never freed by the end of the trace.
    pub live_at_end: u64,
    /// Accepted allocations or reallocs that overwrote a live address.
    pub live_address_reused: u64,
    pub skipped: SkipCounts,
    pub diagnostics: Vec<Diagnostic>,
}

impl Conversion {
    /// Strict mode found something worth reporting.
    #[must_use]
    pub fn has_diagnostics(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// Conversion state for one pass.
#[derive(Debug, Default)]
pub struct Converter {
    mode: ConversionMode,
    registry: AllocationRegistry,
    stats: StatsAccumulator,
    records: Vec<OutputRecord>,
    skipped: SkipCounts,
    live_address_reused: u64,
    diagnostics: Vec<Diagnostic>,
    line_number: usize,
}

impl Converter {
    #[must_use]
    pub fn new(mode: ConversionMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Classify and apply one raw line. Returns the record it produced, if any.
    pub fn feed_line(&mut self, line: &str) -> Option<OutputRecord> {
        self.line_number += 1;
        let before = self.records.len();

        match mtrace::classify_line(line) {
            LineClass::Event(event) => self.apply(event),
            LineClass::Skip(reason) => {
                self.skipped.bump(reason);
                if reason.is_event_like() {
                    let kind = match reason {
                        SkipReason::InvalidSize => DiagnosticKind::InvalidSize,
                        _ => DiagnosticKind::MalformedEvent,
                    };
                    self.diagnose(kind, None, None, || {
                        format!("{}: {:?}", reason.as_str(), line.trim())
                    });
                }
            }
        }

        (self.records.len() > before)
            .then(|| self.records.last().copied())
            .flatten()
    }

    /// Dispatch a parsed event and tag any diagnostics it raised with the
    /// operation and caller from the source line.
    fn apply(&mut self, event: Event<'_>) {
        let first_new = self.diagnostics.len();
        match event {
            Event::Allocate { address, size, .. } => {
                self.handle_allocate(address, size);
            }
            Event::Free { address, .. } => {
                self.handle_free(address);
            }
            Event::Reallocate {
                new_address,
                old_address,
                size,
                ..
            } => {
                self.handle_reallocate(old_address, new_address, size);
            }
        }
        for diag in &mut self.diagnostics[first_new..] {
            diag.op = Some(event.op_name());
            diag.caller = Some(event.caller().to_owned());
        }
    }

    /// Register a new allocation and emit `a <id> <size>`.
    pub fn handle_allocate(&mut self, address: &str, size: u64) -> AllocationId {
        let (id, displaced) = self.registry.register(address, size);
        if let Some(stale) = displaced {
            self.live_address_reused += 1;
            self.diagnose(
                DiagnosticKind::LiveAddressReused,
                Some(address),
                Some(stale),
                || format!("allocation {id} replaced live allocation {stale} without a free"),
            );
        }
        self.records.push(OutputRecord::Alloc { id, size });
        self.stats.record_allocate(size);
        id
    }

    /// Emit `f <id>` for a live address; dangling frees are dropped.
    pub fn handle_free(&mut self, address: &str) -> Option<AllocationId> {
        let Some((id, _size)) = self.registry.release(address) else {
            self.skipped.dangling_free += 1;
            let kind = if self.registry.was_freed(address) {
                DiagnosticKind::DoubleFree
            } else {
                DiagnosticKind::DanglingFree
            };
            self.diagnose(kind, Some(address), None, || {
                String::from("address has no live allocation")
            });
            return None;
        };
        self.records.push(OutputRecord::Free { id });
        self.stats.record_free();
        Some(id)
    }

    /// Emit `r <id> <size>` and move the entry to `new_address`; a dangling
    /// `old_address` drops the event.
    pub fn handle_reallocate(
        &mut self,
        old_address: &str,
        new_address: &str,
        size: u64,
    ) -> Option<AllocationId> {
        let Some(moved) = self.registry.relocate(old_address, new_address, size) else {
            self.skipped.dangling_realloc += 1;
            self.diagnose(DiagnosticKind::DanglingRealloc, Some(old_address), None, || {
                format!("old address has no live allocation (new address {new_address})")
            });
            return None;
        };
        if let Some(stale) = moved.displaced {
            self.live_address_reused += 1;
            self.diagnose(
                DiagnosticKind::LiveAddressReused,
                Some(new_address),
                Some(stale),
                || {
                    format!(
                        "realloc of {} moved onto live allocation {stale}",
                        moved.id
                    )
                },
            );
        }
        self.records.push(OutputRecord::Realloc { id: moved.id, size });
        self.stats.record_reallocate(moved.prior_size, size);
        Some(moved.id)
    }

    fn diagnose(
        &mut self,
        kind: DiagnosticKind,
        address: Option<&str>,
        allocation_id: Option<AllocationId>,
        detail: impl FnOnce() -> String,
    ) {
        if !self.mode.collects_diagnostics() {
            return;
        }
        self.diagnostics.push(Diagnostic {
            line: self.line_number,
            kind,
            address: address.map(str::to_owned),
            allocation_id,
            op: None,
            caller: None,
            detail: detail(),
        });
    }

    /// Current statistics without ending the pass.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Records accepted so far, in order.
    #[must_use]
    pub fn records(&self) -> &[OutputRecord] {
        &self.records
    }

    /// End the pass and build the output trace.
    #[must_use]
    pub fn finish(self) -> Conversion {
        let stats = self.stats.snapshot();
        Conversion {
            mode: self.mode,
            trace: NormalizedTrace {
                header: TraceHeader::from_stats(stats),
                records: self.records,
            },
            stats,
            lines_read: self.line_number as u64,
            live_at_end: self.registry.live_count() as u64,
            live_address_reused: self.live_address_reused,
            skipped: self.skipped,
            diagnostics: self.diagnostics,
        }
    }
}

/// Convert an in-memory mtrace log.
#[must_use]
pub fn convert_str(input: &str, mode: ConversionMode) -> Conversion {
    let mut converter = Converter::new(mode);
    for line in input.lines() {
        converter.feed_line(line);
    }
    converter.finish()
}

/// Convert an mtrace log read lazily line by line.
///
/// Invalid UTF-8 (caller paths in exotic locales) is replaced rather than
/// rejected; addresses and sizes are always ASCII.
pub fn convert_reader<R: BufRead>(
    mut reader: R,
    mode: ConversionMode,
) -> Result<Conversion, ConvertError> {
    let mut converter = Converter::new(mode);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        converter.feed_line(&String::from_utf8_lossy(&buf));
    }
    Ok(converter.finish())
}
