//! # Skript Scripts
//!
//! Script files on top of the language crate:
//! - the Structure Loader running `init`, `load` and `post_load` over a
//!   batch of scripts
//! - the `options:` and `on <event>:` structures
//! - trigger dispatch for host events
//! - a manager loading, reloading and unloading the files of a directory
//! - a file watcher for hot reload

pub mod addon;
pub mod error;
pub mod loader;
pub mod manager;
pub mod options;
pub mod script;
pub mod trigger;
pub mod watch;

pub use addon::ScriptAddon;
pub use error::{Result, ScriptError};
pub use loader::{LoadSummary, Loader};
pub use manager::ScriptManager;
pub use options::{Options, OptionsStructure};
pub use script::{LoadedStructure, Script, ScriptSource};
pub use trigger::{Trigger, TriggerId, TriggerItem, TriggerRegistry, TriggerStructure};
pub use watch::ScriptWatcher;
