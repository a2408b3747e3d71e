//! Structure Loader
//!
//! Loads a batch of scripts in three phases. Every structure of every
//! script in the batch is initialized before any is loaded, and loaded
//! before any is post-loaded; within a phase structures run by ascending
//! priority, ties keeping script then file order. A structure failing a
//! phase is unloaded and skipped by the later phases without affecting
//! the others.

use crate::script::{unload_all, LoadedStructure, Script, ScriptSource};
use crate::trigger::TriggerRegistry;
use serde::Serialize;
use skript_core::ScriptName;
use skript_lang::{Diagnostic, DiagnosticCode, Engine, ScriptData, StructureContext, StructureState};
use std::sync::Arc;
use std::time::Instant;

/// Outcome of loading a batch of scripts
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadSummary {
    pub scripts: usize,
    /// Scripts in the order this batch (re)loaded them
    pub loaded: Vec<ScriptName>,
    /// Structures that finished every phase
    pub structures: usize,
    /// Structures dropped by a failing phase
    pub failed: usize,
    /// Files skipped because their content didn't change
    pub unchanged: usize,
    pub errors: usize,
    pub warnings: usize,
    pub elapsed_ms: u64,
    pub diagnostics: Vec<Diagnostic>,
}

impl LoadSummary {
    pub fn merge(&mut self, other: LoadSummary) {
        self.scripts += other.scripts;
        self.loaded.extend(other.loaded);
        self.structures += other.structures;
        self.failed += other.failed;
        self.unchanged += other.unchanged;
        self.errors += other.errors;
        self.warnings += other.warnings;
        self.elapsed_ms += other.elapsed_ms;
        self.diagnostics.extend(other.diagnostics);
    }

    pub(crate) fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        if diagnostic.is_error() {
            self.errors += 1;
        } else {
            self.warnings += 1;
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    /// Log every diagnostic and a one-line total
    pub fn log(&self) {
        for diagnostic in &self.diagnostics {
            diagnostic.log();
        }
        tracing::info!(
            "Loaded {} scripts with {} structures in {}ms ({} errors, {} warnings, {} failed, {} unchanged)",
            self.scripts,
            self.structures,
            self.elapsed_ms,
            self.errors,
            self.warnings,
            self.failed,
            self.unchanged
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    Load,
    PostLoad,
}

impl Phase {
    const ALL: [Phase; 3] = [Phase::Init, Phase::Load, Phase::PostLoad];

    fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "initialize",
            Phase::Load => "load",
            Phase::PostLoad => "finish loading",
        }
    }

    fn target(&self) -> StructureState {
        match self {
            Phase::Init => StructureState::Initialized,
            Phase::Load => StructureState::Loaded,
            Phase::PostLoad => StructureState::PostLoaded,
        }
    }
}

struct Pending {
    name: ScriptName,
    hash: String,
    data: ScriptData,
    diagnostics: Vec<Diagnostic>,
    structures: Vec<LoadedStructure>,
}

impl Pending {
    fn error_count(&self) -> usize {
        error_count(&self.diagnostics)
    }
}

fn error_count(diagnostics: &[Diagnostic]) -> usize {
    diagnostics.iter().filter(|d| d.is_error()).count()
}

/// Runs the load phases of script batches against an engine
#[derive(Clone)]
pub struct Loader<'e> {
    engine: &'e Engine,
    triggers: Option<Arc<TriggerRegistry>>,
}

impl<'e> Loader<'e> {
    pub fn new(engine: &'e Engine) -> Self {
        Self { engine, triggers: None }
    }

    /// Publish the batch's triggers into `triggers`
    pub fn with_triggers(mut self, triggers: Arc<TriggerRegistry>) -> Self {
        self.triggers = Some(triggers);
        self
    }

    fn script_data(&self) -> ScriptData {
        let mut data = ScriptData::new();
        if let Some(triggers) = &self.triggers {
            data.insert(Arc::clone(triggers));
        }
        data
    }

    /// Load scripts as one batch
    pub fn load(&self, sources: Vec<ScriptSource>) -> (Vec<Script>, LoadSummary) {
        let started = Instant::now();
        let mut pending: Vec<Pending> = sources.into_iter().map(|source| self.parse(source)).collect();
        let stop_on_error = self.engine.config().stop_on_first_error;

        let mut order: Vec<(usize, usize)> = pending
            .iter()
            .enumerate()
            .flat_map(|(si, script)| (0..script.structures.len()).map(move |ki| (si, ki)))
            .collect();
        order.sort_by_key(|&(si, ki)| (pending[si].structures[ki].priority, si, ki));

        let mut failed = 0;
        let mut aborted = stop_on_error && pending.iter().any(|p| p.error_count() > 0);
        for phase in Phase::ALL {
            if aborted {
                break;
            }
            let phase_failures = self.run_phase(&mut pending, &order, phase);
            failed += phase_failures;
            aborted = stop_on_error && (phase_failures > 0 || pending.iter().any(|p| p.error_count() > 0));
        }
        if aborted {
            tracing::warn!("Stopping the load after the first error");
            for script in &mut pending {
                unload_all(&mut script.structures);
            }
        }

        let mut summary = LoadSummary {
            scripts: pending.len(),
            loaded: pending.iter().map(|p| p.name.clone()).collect(),
            failed,
            ..LoadSummary::default()
        };
        let scripts = pending
            .into_iter()
            .map(|p| {
                summary.structures += p
                    .structures
                    .iter()
                    .filter(|s| s.state == StructureState::PostLoaded)
                    .count();
                for diagnostic in &p.diagnostics {
                    summary.push_diagnostic(diagnostic.clone());
                }
                Script {
                    name: p.name,
                    hash: p.hash,
                    structures: p.structures,
                    data: p.data,
                    diagnostics: p.diagnostics,
                }
            })
            .collect();
        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        (scripts, summary)
    }

    /// Split a source into nodes and match every top-level node against
    /// the structure syntaxes
    fn parse(&self, source: ScriptSource) -> Pending {
        let hash = source.hash();
        let name = source.name;
        let (nodes, node_diagnostics) = skript_lang::parse_source(&source.text);
        let mut diagnostics: Vec<Diagnostic> = node_diagnostics.into_iter().map(|d| d.in_script(&name)).collect();
        let parser = self.engine.parser();

        let mut structures = Vec::new();
        for node in nodes {
            let parsed = match parser.parse_structure(&node.key) {
                Ok(parsed) => parsed,
                Err(diagnostic) => {
                    diagnostics.push(diagnostic.at(node.pos).in_script(&name));
                    continue;
                }
            };

            if let Some(node_type) = parsed.info.node_type() {
                if !node_type.accepts(&node) {
                    let message = if node.is_section() {
                        format!("'{}' can't have a section", node.key)
                    } else {
                        format!("'{}' must be a section", node.key)
                    };
                    diagnostics.push(
                        Diagnostic::error(DiagnosticCode::InvalidStructure, message)
                            .at(node.pos)
                            .in_script(&name),
                    );
                    continue;
                }
            }

            let entries = match parsed.info.entries() {
                Some(validator) => {
                    let mut found = Vec::new();
                    let entries = validator.validate(&node, &mut found);
                    diagnostics.extend(found.into_iter().map(|d| d.in_script(&name)));
                    match entries {
                        Some(entries) => Some(entries),
                        None => continue,
                    }
                }
                None => None,
            };

            structures.push(LoadedStructure::new(node, parsed.info, parsed.structure, entries));
        }

        tracing::debug!("{}: {} structures parsed", name, structures.len());
        Pending {
            name,
            hash,
            data: self.script_data(),
            diagnostics,
            structures,
        }
    }

    /// Run one phase over every structure still taking part; returns the
    /// number of structures that failed it
    fn run_phase(&self, pending: &mut [Pending], order: &[(usize, usize)], phase: Phase) -> usize {
        let mut failures = 0;
        for &(si, ki) in order {
            let script = &mut pending[si];
            let errors_before = error_count(&script.diagnostics);
            let loaded = &mut script.structures[ki];
            if loaded.state == StructureState::Unloaded {
                continue;
            }

            let mut ctx = StructureContext::new(
                &script.name,
                &loaded.node,
                loaded.entries.as_ref(),
                &mut script.data,
                self.engine,
                &mut script.diagnostics,
            );
            let ok = match phase {
                Phase::Init => loaded.structure.init(&mut ctx),
                Phase::Load => loaded.structure.load(&mut ctx),
                Phase::PostLoad => loaded.structure.post_load(&mut ctx),
            };

            if ok {
                loaded.advance(phase.target());
                continue;
            }

            failures += 1;
            tracing::debug!("{}: {} failed to {}", script.name, loaded.info.describe(), phase.as_str());
            loaded.unload();
            if error_count(&script.diagnostics) == errors_before {
                let diagnostic = Diagnostic::error(
                    DiagnosticCode::StructureFailed,
                    format!("'{}' failed to {}", loaded.node.key, phase.as_str()),
                )
                .at(loaded.node.pos)
                .in_script(&script.name);
                script.diagnostics.push(diagnostic);
            }
        }
        failures
    }
}
