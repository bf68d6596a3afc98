//! Validation diagnostics
//!
//! Layout and plugin-configuration reads never stop at the first problem.
//! Every finding is recorded here (and logged) so a single pass reports the
//! whole picture; the read itself then returns `None` when any error was
//! recorded.

use std::fmt;

use tracing::{error, warn};

/// A single finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: &'static str,
    pub message: String,
    /// Where in the document (or registry) the finding applies
    pub location: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.location.is_empty() {
            write!(f, "[{}] {}", self.code, self.message)
        } else {
            write!(f, "[{}] {} (at {})", self.code, self.message, self.location)
        }
    }
}

/// Accumulated errors and warnings
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, code: &'static str, location: impl Into<String>, message: impl Into<String>) {
        let diagnostic = Diagnostic {
            code,
            message: message.into(),
            location: location.into(),
        };
        error!("{}", diagnostic);
        self.errors.push(diagnostic);
    }

    pub fn warning(&mut self, code: &'static str, location: impl Into<String>, message: impl Into<String>) {
        let diagnostic = Diagnostic {
            code,
            message: message.into(),
            location: location.into(),
        };
        warn!("{}", diagnostic);
        self.warnings.push(diagnostic);
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Whether any error carries the given code
    pub fn has_error(&self, code: &str) -> bool {
        self.errors.iter().any(|d| d.code == code)
    }

    pub fn has_warning(&self, code: &str) -> bool {
        self.warnings.iter().any(|d| d.code == code)
    }
}
