//! Filesystem watcher (§4.8): notify-based recursive watch with debouncing.
//!
//! Raw notify events land on an internal channel; a dedicated debounce
//! thread holds each touched path in a pending map keyed by path and only
//! emits a [`WatchEvent`] once the path has been quiet for
//! `WatcherConfig::debounce_ms`, polling the map every `WatcherConfig::tick_ms`.
//! Hidden directories and configured exclude directories are pruned before
//! they ever reach the pending map.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::time::{Duration, Instant};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio_util::sync::CancellationToken;

use crate::config::WatcherConfig;
use crate::error::{IndexError, IndexResult};

/// A debounced, stabilized filesystem change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The path was created or modified and has been quiet for the debounce window.
    Changed(PathBuf),
    /// The path no longer exists.
    Deleted(PathBuf),
}

/// Watches a directory tree and yields debounced, stabilized change events.
pub struct FileWatcher {
    root: PathBuf,
    config: WatcherConfig,
    exclude_dirs: Vec<String>,
}

impl FileWatcher {
    pub fn new(root: &Path, config: &WatcherConfig, exclude_dirs: &[String]) -> Self {
        Self {
            root: root.to_path_buf(),
            config: config.clone(),
            exclude_dirs: exclude_dirs.to_vec(),
        }
    }

    /// Start watching. The watcher and its debounce thread run until the
    /// returned receiver is dropped or `cancellation` is set.
    pub fn watch(&self, cancellation: CancellationToken) -> IndexResult<std_mpsc::Receiver<WatchEvent>> {
        let (raw_tx, raw_rx) = std_mpsc::channel::<notify::Event>();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                if let Ok(event) = res {
                    let _ = raw_tx.send(event);
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| IndexError::Internal(format!("failed to create file watcher: {e}")))?;
        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| IndexError::Internal(format!("failed to watch {}: {e}", self.root.display())))?;

        let (debounced_tx, debounced_rx) = std_mpsc::channel::<WatchEvent>();
        let tick = Duration::from_millis(self.config.tick_ms);
        let debounce = Duration::from_millis(self.config.debounce_ms);
        let exclude_dirs = self.exclude_dirs.clone();

        std::thread::spawn(move || {
            let _watcher = watcher; // keep alive for the life of this thread
            let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
            loop {
                if cancellation.is_cancelled() {
                    return;
                }
                while let Ok(event) = raw_rx.try_recv() {
                    for path in event.paths {
                        if is_excluded(&path, &exclude_dirs) {
                            continue;
                        }
                        pending.insert(path, Instant::now());
                    }
                }

                let now = Instant::now();
                let ready: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, seen)| now.duration_since(**seen) >= debounce)
                    .map(|(path, _)| path.clone())
                    .collect();
                for path in ready {
                    pending.remove(&path);
                    let event = if path.exists() {
                        WatchEvent::Changed(path)
                    } else {
                        WatchEvent::Deleted(path)
                    };
                    if debounced_tx.send(event).is_err() {
                        return;
                    }
                }
                std::thread::sleep(tick);
            }
        });

        Ok(debounced_rx)
    }
}

/// Prune hidden directories (dotfiles/dotdirs) and any configured exclude
/// directory before a path is even added to the pending map.
fn is_excluded(path: &Path, exclude_dirs: &[String]) -> bool {
    for component in path.components() {
        if let Component::Normal(name) = component {
            let name = name.to_string_lossy();
            if name.starts_with('.') {
                return true;
            }
            if exclude_dirs.iter().any(|d| d == name.as_ref()) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_directories_are_excluded() {
        assert!(is_excluded(Path::new("/repo/.git/HEAD"), &[]));
        assert!(!is_excluded(Path::new("/repo/src/main.rs"), &[]));
    }

    #[test]
    fn configured_directories_are_excluded() {
        assert!(is_excluded(Path::new("/repo/node_modules/pkg/index.js"), &["node_modules".to_string()]));
        assert!(!is_excluded(Path::new("/repo/src/node_modules_helper.rs"), &["node_modules".to_string()]));
    }

    #[test]
    fn watch_emits_changed_event_after_debounce_window() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = WatcherConfig {
            debounce_ms: 30,
            tick_ms: 10,
        };
        let watcher = FileWatcher::new(dir.path(), &config, &[]);
        let token = CancellationToken::new();
        let rx = watcher.watch(token.clone()).expect("watch");

        let file_path = dir.path().join("new_file.go");
        std::fs::write(&file_path, "package main\n").expect("write");

        let event = rx.recv_timeout(Duration::from_secs(5)).expect("event");
        assert_eq!(event, WatchEvent::Changed(file_path));
        token.cancel();
    }

    #[test]
    fn watch_emits_deleted_event_for_removed_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = WatcherConfig {
            debounce_ms: 30,
            tick_ms: 10,
        };
        let file_path = dir.path().join("gone.go");
        std::fs::write(&file_path, "package main\n").expect("write");

        let watcher = FileWatcher::new(dir.path(), &config, &[]);
        let token = CancellationToken::new();
        let rx = watcher.watch(token.clone()).expect("watch");

        // Drain the initial create event before deleting, so the debounce
        // window for the delete starts fresh.
        let _ = rx.recv_timeout(Duration::from_secs(5));
        std::fs::remove_file(&file_path).expect("remove");

        let event = rx.recv_timeout(Duration::from_secs(5)).expect("event");
        assert_eq!(event, WatchEvent::Deleted(file_path));
        token.cancel();
    }
}
