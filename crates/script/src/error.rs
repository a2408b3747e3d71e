//! Error types for the script crate

use skript_core::SkriptError;
use skript_lang::RegistryError;
use std::path::PathBuf;

/// Script management errors.
///
/// Problems inside a script's text are diagnostics, not errors; these
/// cover the file system and engine setup.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scripts directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Not a script file: {0}")]
    NotAScript(PathBuf),

    #[error("Registration error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

impl From<ScriptError> for SkriptError {
    fn from(err: ScriptError) -> Self {
        match err {
            ScriptError::Io(e) => SkriptError::Io(e),
            ScriptError::DirectoryNotFound(path) => SkriptError::NotFound(path.display().to_string()),
            ScriptError::Registry(e) => e.into(),
            other => SkriptError::Load(other.to_string()),
        }
    }
}

/// Result type for script operations
pub type Result<T> = std::result::Result<T, ScriptError>;
