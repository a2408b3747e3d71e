//! Syntax Registry
//!
//! Syntax descriptors bind pattern sets to factories. Each kind keeps its
//! descriptors ordered by ascending priority; registration order breaks
//! ties.

mod info;
mod registry;

pub use info::{
    ConditionFactory, EffectFactory, EventFactory, ExpressionFactory, MatchResult, StructureFactory, SyntaxFactory,
    SyntaxInfo, SyntaxSpec,
};
pub use registry::SyntaxRegistry;

use serde::Serialize;
use std::fmt;

/// Category of a syntax element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyntaxKind {
    Expression,
    Condition,
    Effect,
    Event,
    Structure,
}

impl SyntaxKind {
    pub const ALL: [SyntaxKind; 5] = [
        SyntaxKind::Expression,
        SyntaxKind::Condition,
        SyntaxKind::Effect,
        SyntaxKind::Event,
        SyntaxKind::Structure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyntaxKind::Expression => "expression",
            SyntaxKind::Condition => "condition",
            SyntaxKind::Effect => "effect",
            SyntaxKind::Event => "event",
            SyntaxKind::Structure => "structure",
        }
    }

    pub(crate) fn slot(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for SyntaxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Matching priority; lower values are tried first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SyntaxPriority(pub u32);

impl SyntaxPriority {
    /// Patterns without placeholders
    pub const SIMPLE: SyntaxPriority = SyntaxPriority(1000);
    /// Patterns mixing text and placeholders
    pub const COMBINED: SyntaxPriority = SyntaxPriority(2000);
    /// Patterns starting and ending with a placeholder
    pub const PATTERN_MATCHES_EVERYTHING: SyntaxPriority = SyntaxPriority(3000);

    /// A priority just before `self`
    pub fn before(self) -> SyntaxPriority {
        SyntaxPriority(self.0.saturating_sub(1))
    }

    /// A priority just after `self`
    pub fn after(self) -> SyntaxPriority {
        SyntaxPriority(self.0.saturating_add(1))
    }
}
