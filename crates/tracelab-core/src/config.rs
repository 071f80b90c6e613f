//! Conversion mode configuration.
//!
//! The mode is read from the `TRACELAB_MODE` environment variable unless the
//! caller passes one explicitly:
//! - `lenient` (default): unusable lines and dangling frees/reallocs are
//!   dropped silently, exactly like the original converter.
//! - `strict`: the converted output is identical, but every dropped event is
//!   also recorded as a [`crate::convert::Diagnostic`] so trace corruption
//!   (double frees, frees of unknown pointers) can be audited.

use serde::{Deserialize, Serialize};

/// Environment variable consulted by [`ConversionMode::from_env`].
pub const MODE_ENV_VAR: &str = "TRACELAB_MODE";

/// How anomalies in the input are reported.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionMode {
    #[default]
    Lenient,
    Strict,
}

impl ConversionMode {
    /// Parse from string (case-insensitive). Unknown values fall back to lenient.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" | "audit" | "pedantic" => Self::Strict,
            _ => Self::Lenient,
        }
    }

    /// Mode from `TRACELAB_MODE`, defaulting to lenient when unset.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var(MODE_ENV_VAR)
            .map(|v| Self::from_str_loose(&v))
            .unwrap_or_default()
    }

    /// Explicit choice wins over the environment.
    #[must_use]
    pub fn resolve(explicit: Option<&str>) -> Self {
        explicit.map_or_else(Self::from_env, Self::from_str_loose)
    }

    #[must_use]
    pub const fn collects_diagnostics(self) -> bool {
        matches!(self, Self::Strict)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lenient => "lenient",
            Self::Strict => "strict",
        }
    }
}
