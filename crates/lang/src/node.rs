//! Indentation-based node tree of a script source

use crate::diagnostic::{Diagnostic, DiagnosticCode};
use skript_core::SourcePos;

const TAB_WIDTH: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Simple,
    /// A line ending in `:` and the lines indented below it
    Section(Vec<Node>),
}

/// One logical line of a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Line text with comments stripped and, for sections, the trailing `:` removed
    pub key: String,
    pub pos: SourcePos,
    pub kind: NodeKind,
}

impl Node {
    pub fn simple(key: impl Into<String>, pos: SourcePos) -> Self {
        Self {
            key: key.into(),
            pos,
            kind: NodeKind::Simple,
        }
    }

    pub fn section(key: impl Into<String>, pos: SourcePos, children: Vec<Node>) -> Self {
        Self {
            key: key.into(),
            pos,
            kind: NodeKind::Section(children),
        }
    }

    pub fn is_section(&self) -> bool {
        matches!(self.kind, NodeKind::Section(_))
    }

    pub fn children(&self) -> &[Node] {
        match &self.kind {
            NodeKind::Section(children) => children,
            NodeKind::Simple => &[],
        }
    }

    /// Split a simple `key: value` line
    pub fn entry(&self) -> Option<(&str, &str)> {
        if self.is_section() {
            return None;
        }
        let (key, value) = self.key.split_once(": ")?;
        Some((key.trim(), value.trim()))
    }
}

struct Line {
    indent: usize,
    text: String,
    pos: SourcePos,
}

/// Parse a script source into top-level nodes.
///
/// Indentation errors are reported and the offending block is skipped;
/// the rest of the file is still parsed.
pub fn parse_source(source: &str) -> (Vec<Node>, Vec<Diagnostic>) {
    let lines: Vec<Line> = source
        .lines()
        .enumerate()
        .filter_map(|(index, raw)| {
            let text = strip_comment(raw);
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            Some(Line {
                indent: indent_width(raw),
                text: text.to_string(),
                pos: SourcePos::of_line(index + 1, raw),
            })
        })
        .collect();

    let mut diagnostics = Vec::new();
    let mut cursor = 0;
    let mut nodes = Vec::new();
    while cursor < lines.len() {
        if lines[cursor].indent > 0 {
            diagnostics.push(
                Diagnostic::error(DiagnosticCode::Indentation, "Unexpected indentation at the top level")
                    .at(lines[cursor].pos),
            );
            cursor = skip_block(&lines, cursor, 0);
            continue;
        }
        let (node, next) = parse_node(&lines, cursor, &mut diagnostics);
        nodes.push(node);
        cursor = next;
    }
    (nodes, diagnostics)
}

fn parse_node(lines: &[Line], at: usize, diagnostics: &mut Vec<Diagnostic>) -> (Node, usize) {
    let line = &lines[at];
    let Some(key) = line.text.strip_suffix(':') else {
        let mut next = at + 1;
        if next < lines.len() && lines[next].indent > line.indent {
            diagnostics.push(
                Diagnostic::error(
                    DiagnosticCode::Indentation,
                    "Unexpected indentation: the previous line doesn't start a section",
                )
                .at(lines[next].pos),
            );
            next = skip_block(lines, next, line.indent);
        }
        return (Node::simple(line.text.clone(), line.pos), next);
    };

    let mut children = Vec::new();
    let mut next = at + 1;
    let child_indent = lines.get(next).map(|l| l.indent).filter(|&i| i > line.indent);
    if let Some(child_indent) = child_indent {
        while next < lines.len() && lines[next].indent > line.indent {
            if lines[next].indent != child_indent {
                diagnostics.push(
                    Diagnostic::error(
                        DiagnosticCode::Indentation,
                        format!(
                            "Indentation mismatch: expected {} spaces, found {}",
                            child_indent, lines[next].indent
                        ),
                    )
                    .at(lines[next].pos),
                );
                next = skip_block(lines, next, child_indent.min(lines[next].indent));
                continue;
            }
            let (child, after) = parse_node(lines, next, diagnostics);
            children.push(child);
            next = after;
        }
    }
    (Node::section(key.trim_end(), line.pos, children), next)
}

/// Index of the first line after `at` indented at most `indent`
fn skip_block(lines: &[Line], at: usize, indent: usize) -> usize {
    let mut next = at + 1;
    while next < lines.len() && lines[next].indent > indent {
        next += 1;
    }
    next
}

fn indent_width(raw: &str) -> usize {
    raw.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
        .sum()
}

/// Remove a `#` comment. `##` is a literal `#`; quoted text is kept as is.
fn strip_comment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_quotes = false;
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                out.push(c);
            }
            '#' if !in_quotes => {
                if chars.peek() == Some(&'#') {
                    chars.next();
                    out.push('#');
                } else {
                    break;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_and_simple_lines() {
        let source = "on load:\n\tset {x} to 1\n\tif {x} is 1:\n\t\tbroadcast \"one\"\n\nbroadcast \"top\"\n";
        let (nodes, diagnostics) = parse_source(source);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert_eq!(nodes.len(), 2);

        let trigger = &nodes[0];
        assert_eq!(trigger.key, "on load");
        assert_eq!(trigger.children().len(), 2);
        assert_eq!(trigger.children()[1].key, "if {x} is 1");
        assert_eq!(trigger.children()[1].children()[0].key, "broadcast \"one\"");
        assert_eq!(trigger.children()[1].children()[0].pos, SourcePos::new(4, 3));
        assert!(!nodes[1].is_section());
    }

    #[test]
    fn test_comments() {
        assert_eq!(strip_comment("set {x} to 1 # note"), "set {x} to 1 ");
        assert_eq!(strip_comment("broadcast \"#1\""), "broadcast \"#1\"");
        assert_eq!(strip_comment("send \"a\" ## b"), "send \"a\" # b");
        let (nodes, _) = parse_source("# only a comment\n   # indented comment\nstop");
        assert_eq!(nodes, vec![Node::simple("stop", SourcePos::new(3, 1))]);
    }

    #[test]
    fn test_unexpected_indentation_skips_block() {
        let source = "stop\n    broadcast \"a\"\n        broadcast \"b\"\nstart";
        let (nodes, diagnostics) = parse_source(source);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::Indentation);
        assert_eq!(nodes.iter().map(|n| n.key.as_str()).collect::<Vec<_>>(), vec!["stop", "start"]);
    }

    #[test]
    fn test_indentation_mismatch() {
        let source = "on load:\n    a\n      b\n    c\n  d\n";
        let (nodes, diagnostics) = parse_source(source);
        let keys: Vec<_> = nodes[0].children().iter().map(|n| n.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "c"]);
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].pos, Some(SourcePos::new(3, 7)));
    }

    #[test]
    fn test_tabs_and_spaces_are_equivalent() {
        let (nodes, diagnostics) = parse_source("on load:\n\ta\n    b\n");
        assert!(diagnostics.is_empty());
        assert_eq!(nodes[0].children().len(), 2);
    }

    #[test]
    fn test_entry_split() {
        let node = Node::simple("description: does things: well", SourcePos::new(1, 1));
        assert_eq!(node.entry(), Some(("description", "does things: well")));
        assert_eq!(Node::simple("stop", SourcePos::new(1, 1)).entry(), None);
    }
}
