//! File watching for hot reload
//!
//! A `notify` watcher streams changed script paths over a tokio channel;
//! [`ScriptWatcher::next_batch`] groups bursts of changes (editors often
//! write a file several times) into one batch.

use crate::Result;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use skript_config::EngineConfig;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Watches a scripts directory recursively
pub struct ScriptWatcher {
    _watcher: Option<RecommendedWatcher>,
    rx: mpsc::UnboundedReceiver<PathBuf>,
    debounce: Duration,
}

impl ScriptWatcher {
    /// Start watching `dir`; changes to files with the configured script
    /// extension are reported
    pub fn new(dir: &Path, config: &EngineConfig) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let filter = config.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => match event.kind {
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {
                        for path in event.paths.into_iter().filter(|p| is_watched(&filter, p)) {
                            // the receiver is gone once the watcher is dropped
                            let _ = tx.send(path);
                        }
                    }
                    _ => {}
                },
                Err(e) => tracing::warn!("Watch error: {}", e),
            },
            notify::Config::default(),
        )?;
        watcher.watch(dir, RecursiveMode::Recursive)?;
        tracing::info!("Watching {} for script changes", dir.display());

        Ok(Self {
            _watcher: Some(watcher),
            rx,
            debounce: Duration::from_millis(config.watch_debounce_ms),
        })
    }

    #[cfg(test)]
    fn from_channel(rx: mpsc::UnboundedReceiver<PathBuf>, debounce: Duration) -> Self {
        Self {
            _watcher: None,
            rx,
            debounce,
        }
    }

    /// Wait for changes, then keep collecting until no change arrived for
    /// the debounce period. Paths are deduplicated and sorted. Returns
    /// `None` once the watcher stopped.
    pub async fn next_batch(&mut self) -> Option<Vec<PathBuf>> {
        let first = self.rx.recv().await?;
        let mut paths = BTreeSet::from([first]);
        while let Ok(Some(path)) = tokio::time::timeout(self.debounce, self.rx.recv()).await {
            paths.insert(path);
        }
        Some(paths.into_iter().collect())
    }
}

/// Whether a changed path may be a script. Disabled names are kept so
/// renaming a script to its disabled form unloads it.
pub fn is_watched(config: &EngineConfig, path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| config.is_script_file(name))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_watched() {
        let config = EngineConfig::default();
        assert!(is_watched(&config, Path::new("scripts/join.sk")));
        assert!(is_watched(&config, Path::new("scripts/JOIN.SK")));
        assert!(is_watched(&config, Path::new("scripts/-off.sk")));
        assert!(!is_watched(&config, Path::new("scripts/notes.txt")));
        assert!(!is_watched(&config, Path::new("scripts")));
    }

    #[tokio::test]
    async fn test_next_batch_groups_and_dedups() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = ScriptWatcher::from_channel(rx, Duration::from_millis(50));

        tx.send(PathBuf::from("b.sk")).unwrap();
        tx.send(PathBuf::from("a.sk")).unwrap();
        tx.send(PathBuf::from("b.sk")).unwrap();
        let batch = watcher.next_batch().await.unwrap();
        assert_eq!(batch, vec![PathBuf::from("a.sk"), PathBuf::from("b.sk")]);

        drop(tx);
        assert!(watcher.next_batch().await.is_none());
    }
}
