//! Entry validation for structure sections
//!
//! Structures such as `options:` or a command declare the entries their
//! section may contain. The validator checks a section node against that
//! layout and collects the values.

use crate::diagnostic::{Diagnostic, DiagnosticCode};
use crate::node::Node;
use skript_core::SourcePos;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// `key: value`
    Simple,
    /// `key:` followed by an indented block
    Section,
}

/// Declaration of one entry
#[derive(Debug, Clone)]
pub struct EntryData {
    pub key: String,
    pub kind: EntryKind,
    pub optional: bool,
    pub multiple: bool,
    pub default: Option<String>,
}

impl EntryData {
    pub fn simple(key: &str) -> Self {
        Self {
            key: key.to_lowercase(),
            kind: EntryKind::Simple,
            optional: false,
            multiple: false,
            default: None,
        }
    }

    pub fn section(key: &str) -> Self {
        Self {
            kind: EntryKind::Section,
            ..Self::simple(key)
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    /// Value used when the entry is absent; implies optional
    pub fn with_default(mut self, value: &str) -> Self {
        self.default = Some(value.to_string());
        self.optional = true;
        self
    }
}

#[derive(Debug, Clone)]
pub enum EntryValue {
    Simple { value: String, pos: SourcePos },
    Section(Node),
}

/// Validated entries of a section
#[derive(Debug, Clone, Default)]
pub struct EntryContainer {
    entries: Vec<(String, EntryValue)>,
    defaults: HashMap<String, String>,
}

impl EntryContainer {
    /// First value of a simple entry, falling back to its default
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.to_lowercase();
        self.entries
            .iter()
            .find_map(|(k, v)| match v {
                EntryValue::Simple { value, .. } if *k == key => Some(value.as_str()),
                _ => None,
            })
            .or_else(|| self.defaults.get(&key).map(String::as_str))
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        let key = key.to_lowercase();
        self.entries
            .iter()
            .filter_map(|(k, v)| match v {
                EntryValue::Simple { value, .. } if *k == key => Some(value.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn section(&self, key: &str) -> Option<&Node> {
        let key = key.to_lowercase();
        self.entries.iter().find_map(|(k, v)| match v {
            EntryValue::Section(node) if *k == key => Some(node),
            _ => None,
        })
    }

    pub fn pos_of(&self, key: &str) -> Option<SourcePos> {
        let key = key.to_lowercase();
        self.entries.iter().find_map(|(k, v)| match v {
            EntryValue::Simple { pos, .. } if *k == key => Some(*pos),
            EntryValue::Section(node) if *k == key => Some(node.pos),
            _ => None,
        })
    }

    pub fn has(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.entries.iter().any(|(k, _)| *k == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Entry layout of a structure
#[derive(Debug, Clone, Default)]
pub struct EntryValidator {
    entries: Vec<EntryData>,
    /// Accept simple lines no entry declares, instead of reporting them
    allow_unknown: bool,
}

impl EntryValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, data: EntryData) -> Self {
        self.entries.push(data);
        self
    }

    pub fn allow_unknown(mut self) -> Self {
        self.allow_unknown = true;
        self
    }

    pub fn entries(&self) -> &[EntryData] {
        &self.entries
    }

    /// Validate the children of a section node. Returns `None` if any error
    /// was reported.
    pub fn validate(&self, section: &Node, diagnostics: &mut Vec<Diagnostic>) -> Option<EntryContainer> {
        let mut container = EntryContainer::default();
        let mut ok = true;

        for child in section.children() {
            let (key, value) = match (child.is_section(), child.entry()) {
                (true, _) => (child.key.to_lowercase(), EntryValue::Section(child.clone())),
                (false, Some((key, value))) => (
                    key.to_lowercase(),
                    EntryValue::Simple {
                        value: value.to_string(),
                        pos: child.pos,
                    },
                ),
                (false, None) => (
                    child.key.to_lowercase(),
                    EntryValue::Simple {
                        value: String::new(),
                        pos: child.pos,
                    },
                ),
            };

            let declared = self.entries.iter().find(|data| {
                data.key == key
                    && match (&value, data.kind) {
                        (EntryValue::Section(_), EntryKind::Section) => true,
                        (EntryValue::Simple { .. }, EntryKind::Simple) => true,
                        _ => false,
                    }
            });

            match declared {
                None if self.allow_unknown && !child.is_section() && child.entry().is_some() => {}
                None => {
                    diagnostics.push(
                        Diagnostic::error(
                            DiagnosticCode::Entry,
                            format!(
                                "Unexpected entry '{}'. Check whether it's spelled correctly or remove it",
                                key
                            ),
                        )
                        .at(child.pos),
                    );
                    ok = false;
                    continue;
                }
                Some(data) if !data.multiple && container.has(&key) => {
                    diagnostics.push(
                        Diagnostic::error(
                            DiagnosticCode::Entry,
                            format!("The entry '{}' may only be given once", data.key),
                        )
                        .at(child.pos),
                    );
                    ok = false;
                    continue;
                }
                Some(_) => {}
            }
            container.entries.push((key, value));
        }

        for data in &self.entries {
            if container.has(&data.key) {
                continue;
            }
            if let Some(default) = &data.default {
                container.defaults.insert(data.key.clone(), default.clone());
            } else if !data.optional {
                diagnostics.push(
                    Diagnostic::error(
                        DiagnosticCode::Entry,
                        format!("Required entry '{}' is missing from '{}'", data.key, section.key),
                    )
                    .at(section.pos),
                );
                ok = false;
            }
        }

        ok.then_some(container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::parse_source;

    fn command_validator() -> EntryValidator {
        EntryValidator::new()
            .entry(EntryData::simple("description").with_default("no description"))
            .entry(EntryData::simple("alias").optional().multiple())
            .entry(EntryData::section("trigger"))
    }

    fn section(source: &str) -> Node {
        let (mut nodes, diagnostics) = parse_source(source);
        assert!(diagnostics.is_empty());
        nodes.remove(0)
    }

    #[test]
    fn test_valid_section() {
        let node = section("command /hi:\n\talias: hello\n\talias: hey\n\ttrigger:\n\t\tstop\n");
        let mut diagnostics = Vec::new();
        let entries = command_validator().validate(&node, &mut diagnostics).unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(entries.get("description"), Some("no description"));
        assert_eq!(entries.get_all("alias"), vec!["hello", "hey"]);
        assert_eq!(entries.section("trigger").unwrap().children().len(), 1);
    }

    #[test]
    fn test_unknown_and_missing_entries() {
        let node = section("command /hi:\n\tdescriptoin: typo\n");
        let mut diagnostics = Vec::new();
        assert!(command_validator().validate(&node, &mut diagnostics).is_none());
        let messages: Vec<_> = diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Unexpected entry 'descriptoin'. Check whether it's spelled correctly or remove it",
                "Required entry 'trigger' is missing from 'command /hi'",
            ]
        );
    }

    #[test]
    fn test_duplicate_single_entry() {
        let node = section("command /hi:\n\tdescription: a\n\tdescription: b\n\ttrigger:\n\t\tstop\n");
        let mut diagnostics = Vec::new();
        assert!(command_validator().validate(&node, &mut diagnostics).is_none());
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_allow_unknown() {
        let node = section("options:\n\tprefix: [x]\n\tcolor: red\n");
        let mut diagnostics = Vec::new();
        let entries = EntryValidator::new()
            .allow_unknown()
            .validate(&node, &mut diagnostics)
            .unwrap();
        assert_eq!(entries.get("color"), Some("red"));
        assert_eq!(entries.len(), 2);
    }
}
