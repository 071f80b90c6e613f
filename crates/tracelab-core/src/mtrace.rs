//! `mtrace` line classification.
//!
//! glibc's `mtrace` writes one record per heap call:
//!
//! ```text
//! @ ./prog:[0x4005d4] + 0x1b3f460 0x10
//! @ ./prog:[0x4005e2] > 0x1b3f4a0 0x1b3f460 0x20
//! @ ./prog:[0x4005f0] - 0x1b3f4a0
//! ```
//!
//! The caller token may also be glued to the marker (`@0 + A 10`). Anything
//! that does not start with `@` (the `= Start` / `= End` banners, blank
//! lines) is skipped without complaint.

use serde::Serialize;

/// Marker that opens every event line.
pub const EVENT_MARKER: char = '@';

/// A recognized heap event, borrowing its tokens from the source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    /// `+ <address> <size>`
    Allocate {
        caller: &'a str,
        address: &'a str,
        size: u64,
    },
    /// `- <address>`
    Free { caller: &'a str, address: &'a str },
    /// `> <new address> <old address> <size>`
    Reallocate {
        caller: &'a str,
        new_address: &'a str,
        old_address: &'a str,
        size: u64,
    },
}

impl Event<'_> {
    /// Short operation name used in logs and diagnostics.
    #[must_use]
    pub const fn op_name(&self) -> &'static str {
        match self {
            Self::Allocate { .. } => "allocate",
            Self::Free { .. } => "free",
            Self::Reallocate { .. } => "reallocate",
        }
    }

    /// Caller/thread token that preceded the operation.
    #[must_use]
    pub fn caller(&self) -> &str {
        match self {
            Self::Allocate { caller, .. }
            | Self::Free { caller, .. }
            | Self::Reallocate { caller, .. } => *caller,
        }
    }
}

/// Why a line produced no event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Line does not start with the event marker.
    NoMarker,
    /// Marker present but operation, address or a required operand is missing.
    TooFewTokens,
    /// Operation token is not one of `+`, `-`, `>`.
    UnknownOperation,
    /// Size operand is not hexadecimal or overflows `u64`.
    InvalidSize,
}

impl SkipReason {
    /// Metadata lines are expected in every trace; the other reasons mean a
    /// line looked like an event but could not be used.
    #[must_use]
    pub const fn is_event_like(self) -> bool {
        !matches!(self, Self::NoMarker)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoMarker => "no_marker",
            Self::TooFewTokens => "too_few_tokens",
            Self::UnknownOperation => "unknown_operation",
            Self::InvalidSize => "invalid_size",
        }
    }
}

/// Classification of one input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass<'a> {
    Event(Event<'a>),
    Skip(SkipReason),
}

/// Classify a raw trace line.
#[must_use]
pub fn classify_line(line: &str) -> LineClass<'_> {
    match parse_event(line) {
        Ok(event) => LineClass::Event(event),
        Err(reason) => LineClass::Skip(reason),
    }
}

fn parse_event(line: &str) -> Result<Event<'_>, SkipReason> {
    let mut tokens = line.split_whitespace();

    let marker = tokens.next().ok_or(SkipReason::NoMarker)?;
    let glued = marker
        .strip_prefix(EVENT_MARKER)
        .ok_or(SkipReason::NoMarker)?;
    let caller = if glued.is_empty() {
        tokens.next().ok_or(SkipReason::TooFewTokens)?
    } else {
        glued
    };

    let op = tokens.next().ok_or(SkipReason::TooFewTokens)?;
    let address = tokens.next().ok_or(SkipReason::TooFewTokens)?;

    match op {
        "+" => {
            let size = parse_hex_size(tokens.next().ok_or(SkipReason::TooFewTokens)?)?;
            Ok(Event::Allocate {
                caller,
                address,
                size,
            })
        }
        "-" => Ok(Event::Free { caller, address }),
        ">" => {
            let old_address = tokens.next().ok_or(SkipReason::TooFewTokens)?;
            let size = parse_hex_size(tokens.next().ok_or(SkipReason::TooFewTokens)?)?;
            Ok(Event::Reallocate {
                caller,
                new_address: address,
                old_address,
                size,
            })
        }
        _ => Err(SkipReason::UnknownOperation),
    }
}

/// Parse a hexadecimal byte count, with or without a `0x` prefix.
pub fn parse_hex_size(raw: &str) -> Result<u64, SkipReason> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    // from_str_radix tolerates a leading '+', mtrace never writes one.
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(SkipReason::InvalidSize);
    }
    u64::from_str_radix(digits, 16).map_err(|_| SkipReason::InvalidSize)
}
