//! Structures: top-level script elements and their load lifecycle
//!
//! Every structure of a script batch goes through `init`, then `load`,
//! then `post_load`, each phase finishing for all structures before the
//! next begins. Within a phase, structures run by ascending [`Priority`].

use crate::diagnostic::{Diagnostic, DiagnosticCode};
use crate::engine::Engine;
use crate::entry::EntryContainer;
use crate::node::Node;
use crate::parser::Parser;
use skript_core::{ScriptName, SourcePos};
use std::any::{Any, TypeId};
use std::collections::HashMap;

/// Load priority of a structure; lower loads first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub u32);

impl Priority {
    pub const DEFAULT: Priority = Priority(1000);

    pub const fn new(priority: u32) -> Self {
        Self(priority)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Which node shapes a structure syntax accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Simple,
    Section,
    Both,
}

impl NodeType {
    pub fn accepts(&self, node: &Node) -> bool {
        match self {
            NodeType::Simple => !node.is_section(),
            NodeType::Section => node.is_section(),
            NodeType::Both => true,
        }
    }
}

/// Lifecycle state of a loaded structure.
///
/// A fresh structure starts at `Parsed` rather than `Unloaded`. Reloading
/// a script builds new structure instances, so an instance never loads
/// twice and `Unloaded` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StructureState {
    /// Header matched, no phase run yet
    Parsed,
    Initialized,
    Loaded,
    PostLoaded,
    Unloaded,
}

impl StructureState {
    /// States only move forward; `Unloaded` is reachable from anywhere but
    /// is final
    pub fn can_advance_to(&self, next: StructureState) -> bool {
        match (self, next) {
            (StructureState::Unloaded, _) => false,
            (_, StructureState::Unloaded) => true,
            (current, next) => next as u8 == *current as u8 + 1,
        }
    }
}

/// Per-script storage shared by the structures of one script, keyed by type
#[derive(Default)]
pub struct ScriptData {
    entries: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ScriptData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.entries.get(&TypeId::of::<T>()).and_then(|v| v.downcast_ref())
    }

    pub fn get_mut<T: Any + Send + Sync>(&mut self) -> Option<&mut T> {
        self.entries.get_mut(&TypeId::of::<T>()).and_then(|v| v.downcast_mut())
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) -> Option<T> {
        self.entries
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast().ok())
            .map(|old| *old)
    }

    pub fn remove<T: Any + Send + Sync>(&mut self) -> Option<T> {
        self.entries
            .remove(&TypeId::of::<T>())
            .and_then(|old| old.downcast().ok())
            .map(|old| *old)
    }
}

impl std::fmt::Debug for ScriptData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptData").field("entries", &self.entries.len()).finish()
    }
}

/// What a structure sees during a load phase
pub struct StructureContext<'a> {
    pub script: &'a ScriptName,
    pub node: &'a Node,
    /// Validated entries, if the syntax declared an entry layout
    pub entries: Option<&'a EntryContainer>,
    pub data: &'a mut ScriptData,
    pub engine: &'a Engine,
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl<'a> StructureContext<'a> {
    pub fn new(
        script: &'a ScriptName,
        node: &'a Node,
        entries: Option<&'a EntryContainer>,
        data: &'a mut ScriptData,
        engine: &'a Engine,
        diagnostics: &'a mut Vec<Diagnostic>,
    ) -> Self {
        Self {
            script,
            node,
            entries,
            data,
            engine,
            diagnostics,
        }
    }

    pub fn parser(&self) -> Parser<'a> {
        Parser::new(self.engine)
    }

    /// Record a diagnostic, attributed to this script and (if it has no
    /// position) to the structure's header line
    pub fn report(&mut self, diagnostic: Diagnostic) {
        let diagnostic = match diagnostic.pos {
            Some(_) => diagnostic,
            None => diagnostic.at(self.node.pos),
        };
        self.diagnostics.push(diagnostic.in_script(self.script));
    }

    pub fn error(&mut self, code: DiagnosticCode, pos: SourcePos, message: impl Into<String>) {
        self.report(Diagnostic::error(code, message).at(pos));
    }

    pub fn warning(&mut self, code: DiagnosticCode, pos: SourcePos, message: impl Into<String>) {
        self.report(Diagnostic::warning(code, message).at(pos));
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.diagnostics
    }
}

/// A top-level script element
///
/// A phase returning `false` marks the structure failed: it takes no part
/// in later phases and is unloaded.
pub trait Structure: Send + Sync {
    fn init(&mut self, _ctx: &mut StructureContext<'_>) -> bool {
        true
    }

    fn load(&mut self, ctx: &mut StructureContext<'_>) -> bool;

    fn post_load(&mut self, _ctx: &mut StructureContext<'_>) -> bool {
        true
    }

    fn unload(&mut self) {}

    fn priority(&self) -> Priority {
        Priority::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        use StructureState::*;
        assert!(Parsed.can_advance_to(Initialized));
        assert!(Initialized.can_advance_to(Loaded));
        assert!(Loaded.can_advance_to(PostLoaded));
        assert!(!Parsed.can_advance_to(Loaded));
        assert!(!PostLoaded.can_advance_to(Loaded));
        assert!(Initialized.can_advance_to(Unloaded));
        assert!(!Unloaded.can_advance_to(Parsed));
        assert!(!Unloaded.can_advance_to(Unloaded));
    }

    #[test]
    fn test_script_data() {
        #[derive(Debug, Default, PartialEq)]
        struct Counter(u32);

        let mut data = ScriptData::new();
        assert!(data.get::<Counter>().is_none());
        assert_eq!(data.insert(Counter(2)), None);
        data.get_mut::<Counter>().unwrap().0 += 1;
        assert_eq!(data.get::<Counter>(), Some(&Counter(3)));
        assert_eq!(data.insert(Counter(7)), Some(Counter(3)));
        assert_eq!(data.remove::<Counter>(), Some(Counter(7)));
        assert!(data.get_mut::<Counter>().is_none());
    }

    #[test]
    fn test_node_type() {
        let simple = Node::simple("stop", SourcePos::new(1, 1));
        let section = Node::section("on load", SourcePos::new(1, 1), vec![]);
        assert!(NodeType::Simple.accepts(&simple));
        assert!(!NodeType::Simple.accepts(&section));
        assert!(NodeType::Section.accepts(&section));
        assert!(NodeType::Both.accepts(&simple));
    }
}
