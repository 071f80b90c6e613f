//! Normalized malloc-lab replay trace.
//!
//! ```text
//! 0            weight (reserved, always 0)
//! 2            number of allocation ids
//! 5            number of operations
//! 48           peak allocated bytes
//! a 0 16
//! a 1 32
//! r 0 16
//! f 0
//! f 1
//! ```

use std::fmt;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::error::TraceFormatError;
use crate::registry::AllocationId;
use crate::stats::StatsSnapshot;

/// The fixed four-line preamble.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceHeader {
    pub weight: u64,
    pub num_ids: u64,
    pub num_ops: u64,
    pub peak_bytes: u64,
}

impl TraceHeader {
    const FIELDS: [&'static str; 4] = ["weight", "num_ids", "num_ops", "peak_bytes"];

    #[must_use]
    pub fn from_stats(stats: StatsSnapshot) -> Self {
        Self {
            weight: 0,
            num_ids: stats.unique_allocation_count,
            num_ops: stats.total_operation_count,
            peak_bytes: stats.peak_allocated_bytes,
        }
    }
}

impl fmt::Display for TraceHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.weight)?;
        writeln!(f, "{}", self.num_ids)?;
        writeln!(f, "{}", self.num_ops)?;
        writeln!(f, "{}", self.peak_bytes)
    }
}

/// One replayable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum OutputRecord {
    Alloc { id: AllocationId, size: u64 },
    Free { id: AllocationId },
    Realloc { id: AllocationId, size: u64 },
}

impl OutputRecord {
    #[must_use]
    pub const fn id(&self) -> AllocationId {
        match *self {
            Self::Alloc { id, .. } | Self::Free { id } | Self::Realloc { id, .. } => id,
        }
    }

    fn parse(text: &str, line: usize) -> Result<Self, TraceFormatError> {
        let bad = || TraceFormatError::BadRecord {
            line,
            text: text.to_owned(),
        };
        let number = |tok: Option<&str>| -> Result<u64, TraceFormatError> {
            tok.and_then(|t| t.parse::<u64>().ok()).ok_or_else(bad)
        };

        let mut tokens = text.split_whitespace();
        let record = match tokens.next() {
            Some("a") => Self::Alloc {
                id: AllocationId(number(tokens.next())?),
                size: number(tokens.next())?,
            },
            Some("f") => Self::Free {
                id: AllocationId(number(tokens.next())?),
            },
            Some("r") => Self::Realloc {
                id: AllocationId(number(tokens.next())?),
                size: number(tokens.next())?,
            },
            _ => return Err(bad()),
        };
        if tokens.next().is_some() {
            return Err(bad());
        }
        Ok(record)
    }
}

impl fmt::Display for OutputRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alloc { id, size } => write!(f, "a {id} {size}"),
            Self::Free { id } => write!(f, "f {id}"),
            Self::Realloc { id, size } => write!(f, "r {id} {size}"),
        }
    }
}

/// Header plus ordered records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedTrace {
    pub header: TraceHeader,
    pub records: Vec<OutputRecord>,
}

impl NormalizedTrace {
    /// Serialize to any writer.
    pub fn write_to<W: Write>(&self, mut out: W) -> io::Result<()> {
        write!(out, "{}", self.header)?;
        for record in &self.records {
            writeln!(out, "{record}")?;
        }
        out.flush()
    }

    /// Serialize to an in-memory string.
    #[must_use]
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    /// Read a trace back from its text form. Blank lines are ignored.
    pub fn parse(input: &str) -> Result<Self, TraceFormatError> {
        let mut lines = input
            .lines()
            .enumerate()
            .map(|(idx, line)| (idx + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty());

        let mut fields = [0u64; 4];
        let mut last_line = 0;
        for (slot, field) in fields.iter_mut().zip(TraceHeader::FIELDS) {
            let (line, text) = lines.next().ok_or(TraceFormatError::MissingHeader {
                line: last_line + 1,
                field,
            })?;
            *slot = text.parse().map_err(|_| TraceFormatError::BadHeader {
                line,
                field,
                text: text.to_owned(),
            })?;
            last_line = line;
        }
        let [weight, num_ids, num_ops, peak_bytes] = fields;

        let records = lines
            .map(|(line, text)| OutputRecord::parse(text, line))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            header: TraceHeader {
                weight,
                num_ids,
                num_ops,
                peak_bytes,
            },
            records,
        })
    }
}

impl fmt::Display for NormalizedTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header)?;
        for record in &self.records {
            writeln!(f, "{record}")?;
        }
        Ok(())
    }
}
