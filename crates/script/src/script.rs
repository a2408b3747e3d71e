//! Loaded scripts and their structures

use sha2::{Digest, Sha256};
use skript_core::{ScriptName, SourcePos};
use skript_lang::{Diagnostic, EntryContainer, Node, Priority, ScriptData, Structure, StructureState, SyntaxInfo};
use std::cmp::Reverse;
use std::fmt;
use std::sync::Arc;

/// Script text to be loaded, with the name diagnostics are reported under
#[derive(Debug, Clone)]
pub struct ScriptSource {
    pub name: ScriptName,
    pub text: String,
}

impl ScriptSource {
    pub fn new(name: impl Into<ScriptName>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    /// Hex SHA-256 of the text, used to skip reloading unchanged files
    pub fn hash(&self) -> String {
        content_hash(&self.text)
    }
}

pub(crate) fn content_hash(text: &str) -> String {
    Sha256::digest(text.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// A structure of a script together with its header node
pub struct LoadedStructure {
    pub(crate) node: Node,
    pub(crate) info: Arc<SyntaxInfo>,
    pub(crate) structure: Box<dyn Structure>,
    pub(crate) entries: Option<EntryContainer>,
    pub(crate) state: StructureState,
    pub(crate) priority: Priority,
}

impl LoadedStructure {
    pub(crate) fn new(node: Node, info: Arc<SyntaxInfo>, structure: Box<dyn Structure>, entries: Option<EntryContainer>) -> Self {
        let priority = structure.priority();
        Self {
            node,
            info,
            structure,
            entries,
            state: StructureState::Parsed,
            priority,
        }
    }

    pub fn state(&self) -> StructureState {
        self.state
    }

    pub fn syntax(&self) -> &Arc<SyntaxInfo> {
        &self.info
    }

    pub fn pos(&self) -> SourcePos {
        self.node.pos
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub(crate) fn advance(&mut self, next: StructureState) {
        debug_assert!(self.state.can_advance_to(next), "{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    pub(crate) fn unload(&mut self) {
        if self.state != StructureState::Unloaded {
            self.structure.unload();
            self.advance(StructureState::Unloaded);
        }
    }
}

impl fmt::Debug for LoadedStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedStructure")
            .field("syntax", &self.info.describe())
            .field("pos", &self.node.pos)
            .field("state", &self.state)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Unload structures by descending priority, later ones first on ties
pub(crate) fn unload_all(structures: &mut [LoadedStructure]) {
    let mut order: Vec<usize> = (0..structures.len()).collect();
    order.sort_by_key(|&i| (Reverse(structures[i].priority), Reverse(i)));
    for i in order {
        structures[i].unload();
    }
}

/// A script whose structures went through the load phases
#[derive(Debug)]
pub struct Script {
    pub(crate) name: ScriptName,
    pub(crate) hash: String,
    pub(crate) structures: Vec<LoadedStructure>,
    pub(crate) data: ScriptData,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl Script {
    pub fn name(&self) -> &ScriptName {
        &self.name
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Structures that finished every phase
    pub fn structures(&self) -> impl Iterator<Item = &LoadedStructure> {
        self.structures
            .iter()
            .filter(|s| s.state == StructureState::PostLoaded)
    }

    pub fn data(&self) -> &ScriptData {
        &self.data
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn is_unloaded(&self) -> bool {
        self.structures.iter().all(|s| s.state == StructureState::Unloaded)
    }

    /// Unload every structure, highest priority first
    pub fn unload(&mut self) {
        unload_all(&mut self.structures);
        tracing::debug!("Unloaded script {}", self.name);
    }
}
