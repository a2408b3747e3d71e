//! Syntax patterns
//!
//! A pattern is a small grammar: literal words, `[optional]` groups,
//! `(a|b)` choices, `N¦` marks, `%type%` placeholders and `<regex>`
//! elements. Patterns are compiled once at registration and matched by
//! backtracking against normalised input lines.

mod compile;
mod matcher;

pub use compile::{Alternative, Element, Group, Pattern, Placeholder, PlaceholderFlags};
pub(crate) use matcher::{normalize_input, Matcher, Resolver};
pub use matcher::MatchState;
