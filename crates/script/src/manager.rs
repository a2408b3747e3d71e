//! Script manager
//!
//! Owns the loaded scripts of one scripts directory: loads them as a
//! batch, reloads changed files, unloads removed ones and fires events
//! into the published triggers.

use crate::addon::ScriptAddon;
use crate::error::ScriptError;
use crate::loader::{LoadSummary, Loader};
use crate::script::{content_hash, Script, ScriptSource};
use crate::trigger::TriggerRegistry;
use crate::Result;
use dashmap::DashMap;
use skript_core::{ScriptName, SourcePos};
use skript_lang::{Diagnostic, DiagnosticCode, Engine, Event, Variables};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct ScriptManager {
    engine: Engine,
    scripts_dir: PathBuf,
    scripts: DashMap<ScriptName, Script>,
    triggers: Arc<TriggerRegistry>,
    globals: Variables,
}

impl ScriptManager {
    /// Create a manager for the configured scripts directory.
    ///
    /// Registers the script structures on the engine.
    pub fn new(engine: Engine) -> Result<Self> {
        let scripts_dir = engine.config().scripts_dir.clone();
        Self::with_dir(engine, scripts_dir)
    }

    /// Create a manager for an explicit scripts directory.
    ///
    /// Managers may share an engine; each publishes into its own triggers.
    pub fn with_dir<P: Into<PathBuf>>(engine: Engine, scripts_dir: P) -> Result<Self> {
        engine.ensure_addon(&ScriptAddon)?;
        Ok(Self {
            engine,
            scripts_dir: scripts_dir.into(),
            scripts: DashMap::new(),
            triggers: Arc::new(TriggerRegistry::new()),
            globals: Variables::new(),
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    pub fn triggers(&self) -> &Arc<TriggerRegistry> {
        &self.triggers
    }

    pub fn globals(&self) -> &Variables {
        &self.globals
    }

    /// A new event sharing this manager's global variables
    pub fn event(&self, name: &str) -> Event {
        Event::with_globals(name, self.globals.clone())
    }

    /// Run every trigger listening to the event; returns how many ran
    pub fn fire(&self, event: &Event) -> usize {
        self.triggers.fire(event)
    }

    /// Run the listening triggers of the named scripts only
    pub fn fire_in(&self, event: &Event, scripts: &[ScriptName]) -> usize {
        self.triggers.fire_in(event, scripts)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    pub fn is_loaded(&self, name: &ScriptName) -> bool {
        self.scripts.contains_key(name)
    }

    /// Names of the loaded scripts, sorted
    pub fn script_names(&self) -> Vec<ScriptName> {
        let mut names: Vec<ScriptName> = self.scripts.iter().map(|s| s.key().clone()).collect();
        names.sort();
        names
    }

    /// Inspect a loaded script
    pub fn with_script<R>(&self, name: &ScriptName, f: impl FnOnce(&Script) -> R) -> Option<R> {
        self.scripts.get(name).map(|script| f(&script))
    }

    /// Load every enabled script of the directory as one batch.
    ///
    /// Scripts whose content didn't change are kept as they are; loaded
    /// scripts whose file disappeared are unloaded.
    pub async fn load_all(&self) -> Result<LoadSummary> {
        let dir_ok = tokio::fs::metadata(&self.scripts_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !dir_ok {
            return Err(ScriptError::DirectoryNotFound(self.scripts_dir.clone()));
        }

        let mut summary = LoadSummary::default();
        let mut sources = Vec::new();
        let mut present = HashSet::new();
        for path in self.script_files().await? {
            let name = self.script_name(&path);
            present.insert(name.clone());
            match tokio::fs::read_to_string(&path).await {
                Ok(text) if self.is_unchanged(&name, &text) => summary.unchanged += 1,
                Ok(text) => sources.push(ScriptSource::new(name, text)),
                Err(e) => {
                    error!("Failed to read {}: {}", path.display(), e);
                    summary.push_diagnostic(
                        Diagnostic::error(DiagnosticCode::Io, format!("Can't read the script: {}", e))
                            .in_script(&name),
                    );
                }
            }
        }

        for name in self.script_names() {
            if !present.contains(&name) {
                self.unload(&name);
            }
        }

        summary.merge(self.load_sources(sources));
        Ok(summary)
    }

    /// Load, reload or unload the script at `path` to match the disk
    pub async fn load_file(&self, path: &Path) -> Result<LoadSummary> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ScriptError::NotAScript(path.to_path_buf()))?;
        let config = self.engine.config();
        if !config.is_script_file(file_name) {
            return Err(ScriptError::NotAScript(path.to_path_buf()));
        }

        let name = self.script_name(path);
        let mut summary = LoadSummary::default();
        if config.is_disabled(file_name) {
            debug!("Ignoring disabled script {}", path.display());
            return Ok(summary);
        }

        match tokio::fs::read_to_string(path).await {
            Ok(text) if self.is_unchanged(&name, &text) => {
                summary.unchanged += 1;
                Ok(summary)
            }
            Ok(text) => Ok(self.load_sources(vec![ScriptSource::new(name, text)])),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.unload(&name);
                Ok(summary)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// React to a batch of changed paths from the watcher
    pub async fn apply_changes(&self, paths: &[PathBuf]) -> LoadSummary {
        let mut summary = LoadSummary::default();
        for path in paths {
            match self.load_file(path).await {
                Ok(loaded) => summary.merge(loaded),
                Err(e) => {
                    error!("Failed to reload {}: {}", path.display(), e);
                    summary.push_diagnostic(
                        Diagnostic::error(DiagnosticCode::Io, e.to_string())
                            .at(SourcePos::new(1, 1))
                            .in_script(&self.script_name(path)),
                    );
                }
            }
        }
        summary
    }

    /// Load script texts as one batch. A script replacing a loaded one of
    /// the same name is fully loaded before the old version is unloaded.
    pub fn load_sources(&self, sources: Vec<ScriptSource>) -> LoadSummary {
        if sources.is_empty() {
            return LoadSummary::default();
        }
        let (scripts, summary) = Loader::new(&self.engine)
            .with_triggers(Arc::clone(&self.triggers))
            .load(sources);
        for script in scripts {
            let name = script.name().clone();
            match self.scripts.insert(name.clone(), script) {
                Some(mut old) => {
                    old.unload();
                    info!("Reloaded script {}", name);
                }
                None => info!("Loaded script {}", name),
            }
        }
        summary
    }

    pub fn unload(&self, name: &ScriptName) -> bool {
        match self.scripts.remove(name) {
            Some((_, mut script)) => {
                script.unload();
                info!("Unloaded script {}", name);
                true
            }
            None => false,
        }
    }

    pub fn unload_all(&self) {
        for name in self.script_names() {
            self.unload(&name);
        }
    }

    fn is_unchanged(&self, name: &ScriptName, text: &str) -> bool {
        self.scripts
            .get(name)
            .map_or(false, |script| script.hash() == content_hash(text))
    }

    /// Path relative to the scripts directory with `/` separators
    fn script_name(&self, path: &Path) -> ScriptName {
        let relative = path.strip_prefix(&self.scripts_dir).unwrap_or(path);
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        ScriptName::new(parts.join("/"))
    }

    /// Enabled script files below the scripts directory, sorted. Disabled
    /// directories are skipped entirely.
    async fn script_files(&self) -> Result<Vec<PathBuf>> {
        let config = self.engine.config();
        let mut files = Vec::new();
        let mut dirs = vec![self.scripts_dir.clone()];
        while let Some(dir) = dirs.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if config.is_disabled(&name) {
                    continue;
                }
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    dirs.push(entry.path());
                } else if config.is_script_file(&name) {
                    files.push(entry.path());
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

impl Drop for ScriptManager {
    fn drop(&mut self) {
        self.unload_all();
    }
}

impl std::fmt::Debug for ScriptManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptManager")
            .field("scripts_dir", &self.scripts_dir)
            .field("scripts", &self.scripts.len())
            .field("triggers", &self.triggers.len())
            .finish()
    }
}
