//! Core identifier types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a registered syntax descriptor.
///
/// Unregistration and hot-reload replacement work by this id, never by
/// pattern text, so two descriptors with identical patterns stay distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SyntaxId(pub u64);

impl SyntaxId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for SyntaxId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SyntaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "syntax#{}", self.0)
    }
}

/// Identity of a registered converter edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

impl From<u64> for EdgeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Script name (file stem or path relative to the scripts directory)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScriptName(pub String);

impl ScriptName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn get(&self) -> &str {
        &self.0
    }
}

impl From<String> for ScriptName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&str> for ScriptName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl fmt::Display for ScriptName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}
