//! The `options:` structure and `{@name}` substitution
//!
//! ```text
//! options:
//!     greeting: "Hello"
//!     limits:
//!         max: 10
//! ```
//!
//! declares `{@greeting}` and `{@limits.max}` for the rest of the script.

use skript_core::SourcePos;
use skript_lang::{Diagnostic, DiagnosticCode, Node, Priority, Structure, StructureContext};
use std::borrow::Cow;
use std::collections::HashMap;

/// Options loads before everything that may reference it
pub const OPTIONS_PRIORITY: Priority = Priority::new(100);

/// Options declared by one script, keyed by lowercase dotted name
#[derive(Debug, Clone, Default)]
pub struct Options {
    values: HashMap<String, String>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Declare an option, returning the value it replaced
    pub fn insert(&mut self, name: &str, value: impl Into<String>) -> Option<String> {
        self.values.insert(name.to_lowercase(), value.into())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replace every `{@name}` reference in a line.
    ///
    /// Returns the names of the undefined options if any reference can't
    /// be resolved. An unterminated `{@` is left as it is.
    pub fn apply<'a>(&self, line: &'a str) -> Result<Cow<'a, str>, Vec<String>> {
        if !line.contains("{@") {
            return Ok(Cow::Borrowed(line));
        }

        let mut out = String::with_capacity(line.len());
        let mut undefined = Vec::new();
        let mut rest = line;
        while let Some(start) = rest.find("{@") {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            let name = &rest[start + 2..start + len];
            out.push_str(&rest[..start]);
            match self.get(name) {
                Some(value) => out.push_str(value),
                None => undefined.push(name.to_string()),
            }
            rest = &rest[start + len + 1..];
        }
        out.push_str(rest);

        if undefined.is_empty() {
            Ok(Cow::Owned(out))
        } else {
            Err(undefined)
        }
    }
}

/// Substitute the current script's options into a line, reporting every
/// undefined reference
pub fn substitute(ctx: &mut StructureContext<'_>, line: &str, pos: SourcePos) -> Option<String> {
    let empty = Options::default();
    let options = ctx.data.get::<Options>().unwrap_or(&empty);
    match options.apply(line) {
        Ok(line) => Some(line.into_owned()),
        Err(undefined) => {
            for name in undefined {
                ctx.report(
                    Diagnostic::error(DiagnosticCode::UndefinedOption, format!("Undefined option {{@{}}}", name))
                        .at(pos),
                );
            }
            None
        }
    }
}

/// The `options:` section
#[derive(Debug, Default)]
pub struct OptionsStructure;

impl OptionsStructure {
    fn collect(prefix: &str, nodes: &[Node], options: &mut Options, invalid: &mut Vec<SourcePos>) {
        for node in nodes {
            if node.is_section() {
                let nested = format!("{}{}.", prefix, node.key.trim());
                Self::collect(&nested, node.children(), options, invalid);
                continue;
            }
            match node.entry() {
                Some((key, value)) => {
                    options.insert(&format!("{}{}", prefix, key), value);
                }
                None => invalid.push(node.pos),
            }
        }
    }
}

impl Structure for OptionsStructure {
    fn init(&mut self, ctx: &mut StructureContext<'_>) -> bool {
        // several options sections in one script add up
        let mut options = ctx.data.remove::<Options>().unwrap_or_default();
        let mut invalid = Vec::new();
        Self::collect("", ctx.node.children(), &mut options, &mut invalid);
        tracing::debug!("{}: {} options declared", ctx.script, options.len());
        ctx.data.insert(options);

        for pos in invalid {
            ctx.error(
                DiagnosticCode::Entry,
                pos,
                "Invalid option: options must be written as 'name: value'",
            );
        }
        true
    }

    fn load(&mut self, _ctx: &mut StructureContext<'_>) -> bool {
        true
    }

    fn priority(&self) -> Priority {
        OPTIONS_PRIORITY
    }
}
