//! Source positions for diagnostics

use serde::{Deserialize, Serialize};
use std::fmt;

/// 1-based line/column position inside a script source
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourcePos {
    pub line: usize,
    pub column: usize,
}

impl SourcePos {
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Position of the first non-blank character of a raw line
    pub fn of_line(line: usize, raw: &str) -> Self {
        let indent = raw.chars().take_while(|c| c.is_whitespace()).count();
        Self { line, column: indent + 1 }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_of_line_skips_indentation() {
        let pos = SourcePos::of_line(4, "\t  send \"hi\"");
        assert_eq!(pos, SourcePos::new(4, 4));
    }

    #[test]
    fn test_display() {
        assert_eq!(SourcePos::new(12, 3).to_string(), "12:3");
    }
}
