//! Skript Lang - Types, relation graphs, syntax matching and parsing
//!
//! An [`Engine`] owns the type registry, the converter, comparator and
//! arithmetic graphs and the syntax registry. Addons fill them; the
//! [`Parser`] turns script lines into [`ParsedNode`] trees that evaluate
//! against an [`Event`].

pub mod arithmetic;
pub mod builtins;
pub mod change;
pub mod compare;
pub mod context;
pub mod convert;
pub mod defaults;
pub mod diagnostic;
pub mod engine;
pub mod entry;
pub mod error;
pub mod model;
pub mod node;
pub mod parser;
pub mod pattern;
pub mod structure;
pub mod syntax;
pub mod types;
pub mod value;

pub use arithmetic::{ArithmeticRegistry, Operator};
pub use change::{ChangeMode, Changer};
pub use compare::{ComparatorOptions, ComparatorRegistry, Relation};
pub use context::{Event, Variables};
pub use convert::{ConverterFlags, ConverterRegistry};
pub use diagnostic::{Diagnostic, DiagnosticCode};
pub use engine::{Addon, Engine, Registrar};
pub use entry::{EntryContainer, EntryData, EntryValidator};
pub use error::{ChangeError, ParseError, PatternError, RegistryError, Result};
pub use model::{Args, ConditionImpl, EffectImpl, EventImpl, ExpressionImpl, ParsedNode};
pub use node::{parse_source, Node, NodeKind};
pub use parser::{ParsedEvent, ParsedStructure, Parser, ParserStats, ParserStatsSnapshot};
pub use structure::{NodeType, Priority, ScriptData, Structure, StructureContext, StructureState};
pub use syntax::{MatchResult, SyntaxInfo, SyntaxKind, SyntaxPriority, SyntaxRegistry, SyntaxSpec};
pub use types::{ParseContext, SemanticType, TypeRegistry};
pub use value::Value;
