//! Plugin file watcher
//!
//! Watches plugin directories and reports plugin files whose content digest
//! changed. Touching a file without changing its bytes is not reported.
//! The watcher never loads anything itself; whoever owns the plugins decides
//! whether a change means `reload`, `load` or `unload`.

use crate::config::WatcherConfig;
use crate::identity::{self, FileHash};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// What happened to a watched plugin file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    /// Created or content modified
    Changed,
    /// No longer present
    Removed,
}

/// A confirmed change of a plugin file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: FileChangeKind,
    /// Digest after the change, `None` when removed
    pub hash: Option<FileHash>,
}

/// Debounced watcher over plugin directories
pub struct PluginFileWatcher {
    _watcher: RecommendedWatcher,
    shutdown_tx: mpsc::Sender<()>,
}

impl PluginFileWatcher {
    /// Start watching `directories`; changes arrive on the returned receiver
    ///
    /// Must be called from within a tokio runtime.
    pub async fn new(
        directories: impl IntoIterator<Item = impl AsRef<Path>>,
        config: WatcherConfig,
    ) -> Result<(Self, mpsc::Receiver<FileChange>), WatcherError> {
        let directories: Vec<PathBuf> = directories
            .into_iter()
            .map(|p| p.as_ref().to_path_buf())
            .collect();

        // Digests of what is already there, so the first event has a baseline
        let mut known = HashMap::new();
        for dir in &directories {
            if dir.is_dir() {
                Self::scan_directory(dir, &config, &mut known)?;
            }
        }

        let (event_tx, mut event_rx) = mpsc::channel::<Event>(100);
        let (change_tx, change_rx) = mpsc::channel::<FileChange>(100);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = event_tx.blocking_send(event);
            }
        })
        .map_err(WatcherError::WatcherInit)?;

        for dir in &directories {
            if dir.exists() {
                watcher
                    .watch(dir, RecursiveMode::NonRecursive)
                    .map_err(WatcherError::WatcherInit)?;
                tracing::info!(dir = %dir.display(), "Watching directory for plugins");
            } else {
                tracing::warn!(dir = %dir.display(), "Directory does not exist, skipping");
            }
        }

        let debounce = config.debounce();
        tokio::spawn(async move {
            let mut pending: Vec<PathBuf> = Vec::new();
            let mut debounce_timer: Option<tokio::time::Instant> = None;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Plugin file watcher shutting down");
                        break;
                    }

                    Some(event) = event_rx.recv() => {
                        for path in event.paths {
                            if config.is_plugin_file(&path) {
                                if !pending.contains(&path) {
                                    pending.push(path);
                                }
                                debounce_timer = Some(tokio::time::Instant::now() + debounce);
                            }
                        }
                    }

                    _ = async {
                        if let Some(deadline) = debounce_timer {
                            tokio::time::sleep_until(deadline).await;
                        } else {
                            std::future::pending::<()>().await;
                        }
                    } => {
                        for path in pending.drain(..) {
                            if let Some(change) = Self::detect_change(&path, &mut known) {
                                if change_tx.send(change).await.is_err() {
                                    return;
                                }
                            }
                        }
                        debounce_timer = None;
                    }
                }
            }
        });

        Ok((
            Self {
                _watcher: watcher,
                shutdown_tx,
            },
            change_rx,
        ))
    }

    fn scan_directory(
        dir: &Path,
        config: &WatcherConfig,
        known: &mut HashMap<PathBuf, FileHash>,
    ) -> Result<(), WatcherError> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            WatcherError::Io(format!("Failed to read directory {}: {}", dir.display(), e))
        })?;

        for entry in entries.flatten() {
            let path = entry.path();
            if !config.is_plugin_file(&path) {
                continue;
            }
            match identity::compute_hash(&path) {
                Ok(Some(hash)) => {
                    known.insert(path, hash);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to hash plugin file");
                }
            }
        }

        Ok(())
    }

    fn detect_change(path: &Path, known: &mut HashMap<PathBuf, FileHash>) -> Option<FileChange> {
        let current = match identity::compute_hash(path) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to hash plugin file");
                return None;
            }
        };

        if current.as_ref() == known.get(path) {
            tracing::trace!(path = %path.display(), "Plugin file touched without content change");
            return None;
        }

        let change = match current {
            Some(hash) => {
                known.insert(path.to_path_buf(), hash.clone());
                FileChange {
                    path: path.to_path_buf(),
                    kind: FileChangeKind::Changed,
                    hash: Some(hash),
                }
            }
            None => {
                known.remove(path);
                FileChange {
                    path: path.to_path_buf(),
                    kind: FileChangeKind::Removed,
                    hash: None,
                }
            }
        };
        tracing::debug!(path = %change.path.display(), kind = ?change.kind, "Plugin file changed");
        Some(change)
    }

    /// Shutdown the watcher
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Errors that can occur during watching
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("Failed to initialize watcher: {0}")]
    WatcherInit(#[source] notify::Error),

    #[error("IO error: {0}")]
    Io(String),
}
