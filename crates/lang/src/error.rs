//! Error types for the language crate

use skript_core::SkriptError;

/// Registration-time errors.
///
/// These are programmer errors in an addon: they abort that addon's load
/// and roll back everything it registered.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("A type with the code name '{0}' is already registered")]
    DuplicateType(String),

    #[error("The value class {0} is already bound to the type '{1}'")]
    DuplicateValueClass(&'static str, String),

    #[error("Invalid code name '{0}': expected lowercase letters and digits, optionally prefixed by 'any-'")]
    InvalidCodeName(String),

    #[error("Invalid user pattern for type '{code_name}': {message}")]
    InvalidUserPattern { code_name: String, message: String },

    #[error("Unknown type '{0}'")]
    UnknownType(String),

    #[error("A converter from {from} to {to} with the same safety is already registered")]
    DuplicateConverter { from: &'static str, to: &'static str },

    #[error("A comparator for ({left}, {right}) is already registered")]
    DuplicateComparator { left: &'static str, right: &'static str },

    #[error("The operation {left} {operator} {right} is already registered")]
    DuplicateOperation {
        operator: char,
        left: &'static str,
        right: &'static str,
    },

    #[error("Syntax element has no patterns")]
    NoPatterns,

    #[error("Unknown syntax element {0}")]
    UnknownSyntax(skript_core::SyntaxId),

    #[error("Pattern error: {0}")]
    Pattern(#[from] PatternError),

    #[error("Addon '{addon}' failed: {message}")]
    Addon { addon: String, message: String },
}

/// Errors compiling a syntax pattern string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid pattern '{pattern}' at offset {offset}: {message}")]
    Malformed {
        pattern: String,
        offset: usize,
        message: String,
    },

    #[error("Pattern '{pattern}' references the unknown type '{code_name}'")]
    UnknownType { pattern: String, code_name: String },

    #[error("Pattern '{pattern}' contains an invalid regex: {message}")]
    InvalidRegex { pattern: String, message: String },
}

/// Errors parsing a literal through a type's parser
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("'{input}' is not a valid {type_name}")]
    InvalidValue { input: String, type_name: String },

    #[error("The type '{0}' cannot be parsed from text")]
    NotParseable(String),

    #[error("Unknown type '{0}'")]
    UnknownType(String),
}

/// Errors raised by a change handler while applying a change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChangeError {
    #[error("{target} can't be changed with mode {mode}")]
    UnsupportedChange { target: String, mode: &'static str },

    #[error("Invalid change value: {0}")]
    InvalidDelta(String),
}

impl From<RegistryError> for SkriptError {
    fn from(err: RegistryError) -> Self {
        SkriptError::Registration(err.to_string())
    }
}

impl From<PatternError> for SkriptError {
    fn from(err: PatternError) -> Self {
        SkriptError::Registration(err.to_string())
    }
}

impl From<ParseError> for SkriptError {
    fn from(err: ParseError) -> Self {
        SkriptError::Parse(err.to_string())
    }
}

impl From<ChangeError> for SkriptError {
    fn from(err: ChangeError) -> Self {
        SkriptError::InvalidData(err.to_string())
    }
}

/// Result type for registration operations
pub type Result<T> = std::result::Result<T, RegistryError>;
