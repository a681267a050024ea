use colored::Colorize;
use strum::Display;

use crate::frontend::Span;

/// Severity of a middle-end diagnostic. Lowering never aborts, so anything
/// it records is informational; `Error` is reserved for downstream
/// collaborators that reuse this record type.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

/// A record describing a construct the middle-end skipped or fell back on.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn debug(message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Debug,
            message: message.into(),
            span,
        }
    }

    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            span,
        }
    }
}

impl core::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Debug => self.severity.to_string().dimmed(),
            Severity::Info => self.severity.to_string().blue(),
            Severity::Warning => self.severity.to_string().yellow(),
            Severity::Error => self.severity.to_string().red(),
        };

        write!(f, "{severity}: {} ({})", self.message, self.span)
    }
}
