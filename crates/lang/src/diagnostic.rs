//! User-facing script diagnostics
//!
//! Parse and load problems are collected as [`Diagnostic`] values and
//! reported together; they never abort parsing of the remaining lines.

use serde::{Deserialize, Serialize};
use skript_core::{ScriptName, Severity, SourcePos};
use std::fmt;

/// Diagnostic category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCode {
    /// No registered syntax matched a line
    NoMatchingSyntax,
    /// A syntax matched the text but its factory rejected it
    Rejected,
    /// The recursion guard tripped while resolving placeholders
    TooDeeplyNested,
    /// A line was parsed as the wrong kind of element
    WrongKind,
    /// Inconsistent indentation in a script file
    Indentation,
    /// Section/simple line where the other was expected
    InvalidStructure,
    /// Missing, unexpected or malformed section entry
    Entry,
    /// Reference to an option that was never declared
    UndefinedOption,
    /// A structure failed one of its lifecycle phases
    StructureFailed,
    /// The script file could not be read
    Io,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoMatchingSyntax => "no_matching_syntax",
            Self::Rejected => "rejected",
            Self::TooDeeplyNested => "too_deeply_nested",
            Self::WrongKind => "wrong_kind",
            Self::Indentation => "indentation",
            Self::InvalidStructure => "invalid_structure",
            Self::Entry => "entry",
            Self::UndefinedOption => "undefined_option",
            Self::StructureFailed => "structure_failed",
            Self::Io => "io",
        }
    }
}

/// A single problem reported against a script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<ScriptName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos: Option<SourcePos>,
}

impl Diagnostic {
    /// Create a new error diagnostic
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: Severity::Error,
            message: message.into(),
            script: None,
            pos: None,
        }
    }

    /// Create a new warning diagnostic
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, message)
        }
    }

    pub fn at(mut self, pos: SourcePos) -> Self {
        self.pos = Some(pos);
        self
    }

    /// Attach a script name unless one is already set
    pub fn in_script(mut self, script: &ScriptName) -> Self {
        if self.script.is_none() {
            self.script = Some(script.clone());
        }
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Log through tracing at a level matching the severity
    pub fn log(&self) {
        match self.severity {
            Severity::Error | Severity::Warning => tracing::warn!("{}", self),
            Severity::Note => tracing::info!("{}", self),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.script, &self.pos) {
            (Some(script), Some(pos)) => write!(f, "{}:{}: ", script, pos)?,
            (Some(script), None) => write!(f, "{}: ", script)?,
            (None, Some(pos)) => write!(f, "{}: ", pos)?,
            (None, None) => {}
        }
        write!(f, "{}: {}", self.severity.as_str(), self.message)
    }
}
