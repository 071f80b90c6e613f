//! Consistency checks for normalized traces.
//!
//! The replay harness sizes its tables from the header and asserts that the
//! highest id is `num_ids - 1` and that exactly `num_ops` records follow.
//! [`check_trace`] verifies those assumptions up front, plus the per-id
//! lifecycle and the header's peak figure recomputed with the converter's
//! own accounting.

use std::collections::HashMap;

use serde::Serialize;

use crate::registry::AllocationId;
use crate::stats::{StatsAccumulator, StatsSnapshot};
use crate::trace::{NormalizedTrace, OutputRecord};

/// One failed check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceViolation {
    /// Stable machine-readable code (`header.*` or `record.*`).
    pub code: &'static str,
    /// Zero-based record index, absent for header-level findings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<usize>,
    pub message: String,
}

/// Outcome of [`check_trace`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceCheckReport {
    pub ok: bool,
    pub records: usize,
    /// Header values recomputed from the records.
    pub recomputed: StatsSnapshot,
    pub violations: Vec<TraceViolation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdState {
    Live { size: u64 },
    Freed,
}

/// Validate header/record consistency and per-id lifecycle.
#[must_use]
pub fn check_trace(trace: &NormalizedTrace) -> TraceCheckReport {
    let header = trace.header;
    let mut violations = Vec::new();
    let mut states: HashMap<AllocationId, IdState> = HashMap::new();
    let mut stats = StatsAccumulator::new();
    let mut next_expected = 0u64;
    let mut max_id: Option<u64> = None;

    for (idx, record) in trace.records.iter().enumerate() {
        let id = record.id();
        // `num_ids` is `max id + 1` and must itself fit in a u64.
        if id.0 == u64::MAX {
            violations.push(TraceViolation {
                code: "record.id_out_of_range",
                record: Some(idx),
                message: format!("id {id} leaves no room for an id count"),
            });
            continue;
        }
        max_id = max_id.max(Some(id.0));

        match *record {
            OutputRecord::Alloc { size, .. } => {
                if states.contains_key(&id) {
                    violations.push(TraceViolation {
                        code: "record.duplicate_alloc",
                        record: Some(idx),
                        message: format!("id {id} allocated more than once"),
                    });
                    continue;
                }
                if id.0 != next_expected {
                    violations.push(TraceViolation {
                        code: "record.alloc_out_of_order",
                        record: Some(idx),
                        message: format!("expected id {next_expected}, found {id}"),
                    });
                }
                next_expected = next_expected.max(id.0 + 1);
                states.insert(id, IdState::Live { size });
                stats.record_allocate(size);
            }
            OutputRecord::Free { .. } => match states.get(&id).copied() {
                Some(IdState::Live { .. }) => {
                    states.insert(id, IdState::Freed);
                    stats.record_free();
                }
                other => violations.push(lifecycle_violation(idx, id, "free", other)),
            },
            OutputRecord::Realloc { size, .. } => match states.get(&id).copied() {
                Some(IdState::Live { size: prior }) => {
                    states.insert(id, IdState::Live { size });
                    stats.record_reallocate(prior, size);
                }
                other => violations.push(lifecycle_violation(idx, id, "realloc", other)),
            },
        }
    }

    if header.weight != 0 {
        violations.push(TraceViolation {
            code: "header.weight_nonzero",
            record: None,
            message: format!("weight is reserved and must be 0, found {}", header.weight),
        });
    }

    let implied_ids = max_id.map_or(0, |m| m + 1);
    if implied_ids != header.num_ids {
        violations.push(TraceViolation {
            code: "header.num_ids_mismatch",
            record: None,
            message: format!(
                "header declares {} ids, records use {implied_ids}",
                header.num_ids
            ),
        });
    }

    if trace.records.len() as u64 != header.num_ops {
        violations.push(TraceViolation {
            code: "header.num_ops_mismatch",
            record: None,
            message: format!(
                "header declares {} ops, found {} records",
                header.num_ops,
                trace.records.len()
            ),
        });
    }

    let recomputed = stats.snapshot();
    if recomputed.peak_allocated_bytes != header.peak_bytes {
        violations.push(TraceViolation {
            code: "header.peak_mismatch",
            record: None,
            message: format!(
                "header declares peak {} bytes, records imply {}",
                header.peak_bytes, recomputed.peak_allocated_bytes
            ),
        });
    }

    TraceCheckReport {
        ok: violations.is_empty(),
        records: trace.records.len(),
        recomputed,
        violations,
    }
}

fn lifecycle_violation(
    idx: usize,
    id: AllocationId,
    op: &str,
    state: Option<IdState>,
) -> TraceViolation {
    match state {
        Some(IdState::Freed) => TraceViolation {
            code: "record.use_after_free",
            record: Some(idx),
            message: format!("{op} of id {id} after it was freed"),
        },
        _ => TraceViolation {
            code: "record.use_before_alloc",
            record: Some(idx),
            message: format!("{op} of id {id} before any allocation"),
        },
    }
}
