//! File watches backed by `notify` with debouncing.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use notify::{Event, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::graph::{Subscribe, Subscription};

/// Debounce window for file-change notifications
pub const DEBOUNCE: Duration = Duration::from_millis(100);

/// Watched file -> number of live subscriptions for it
type Targets = Arc<Mutex<HashMap<PathBuf, usize>>>;

/// One debouncer per directory holding at least one watched file.
///
/// Watching the directory instead of the file keeps the watch alive across
/// editors that save by writing a temp file and renaming it over the target;
/// a watch on the file itself dies with the replaced inode.
struct DirWatch {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    targets: Targets,
}

type DirWatches = Arc<Mutex<HashMap<PathBuf, DirWatch>>>;

/// Watches single files and forwards changed paths to the reload queue.
pub struct NotifySubscriber {
    changes: mpsc::UnboundedSender<PathBuf>,
    debounce: Duration,
    dirs: DirWatches,
}

impl NotifySubscriber {
    pub fn new(changes: mpsc::UnboundedSender<PathBuf>) -> Self {
        Self {
            changes,
            debounce: DEBOUNCE,
            dirs: Arc::default(),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Directories currently under watch.
    pub fn watched_dirs(&self) -> usize {
        self.dirs.lock().len()
    }

    fn watch_dir(&self, dir: &Path) -> anyhow::Result<DirWatch> {
        let tx = self.changes.clone();
        let targets: Targets = Arc::default();
        let filter = targets.clone();
        let mut debouncer = new_debouncer(
            self.debounce,
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    let changed = changed_paths(events.iter().map(|e| &e.event));
                    let paths = tracked_only(changed, &filter.lock());
                    for path in paths {
                        if tx.send(path).is_err() {
                            debug!("reload queue closed");
                            return;
                        }
                    }
                }
                Err(errors) => {
                    for error in errors {
                        warn!(error = %error, "watch error");
                    }
                }
            },
        )
        .context("failed to create file watcher")?;

        debouncer
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", dir.display()))?;
        info!(dir = %dir.display(), "watching directory");
        Ok(DirWatch {
            _debouncer: debouncer,
            targets,
        })
    }
}

impl Subscribe for NotifySubscriber {
    fn subscribe(&self, path: &Path) -> anyhow::Result<Subscription> {
        anyhow::ensure!(path.is_file(), "failed to watch {}: not a file", path.display());
        let (dir, name) = match (path.parent(), path.file_name()) {
            (Some(dir), Some(name)) => (dir, name),
            _ => anyhow::bail!("failed to watch {}: no parent directory", path.display()),
        };
        // Events carry paths under the watched directory as the backend sees
        // it, so both sides use the canonical form.
        let dir = dir
            .canonicalize()
            .with_context(|| format!("failed to watch {}", path.display()))?;
        let target = dir.join(name);

        let mut dirs = self.dirs.lock();
        let watch = match dirs.entry(dir.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(self.watch_dir(&dir)?),
        };
        *watch.targets.lock().entry(target.clone()).or_default() += 1;

        Ok(Subscription::new(Lease {
            dirs: self.dirs.clone(),
            dir,
            target,
        }))
    }
}

/// One subscription's share of a [`DirWatch`].
struct Lease {
    dirs: DirWatches,
    dir: PathBuf,
    target: PathBuf,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let released = {
            let mut dirs = self.dirs.lock();
            let Some(watch) = dirs.get(&self.dir) else {
                return;
            };
            let empty = {
                let mut targets = watch.targets.lock();
                if let Some(count) = targets.get_mut(&self.target) {
                    *count -= 1;
                    if *count == 0 {
                        targets.remove(&self.target);
                    }
                }
                targets.is_empty()
            };
            if empty { dirs.remove(&self.dir) } else { None }
        };
        // The debouncer stops here, outside the lock.
        if released.is_some() {
            debug!(dir = %self.dir.display(), "directory watch released");
        }
    }
}

fn tracked_only(paths: Vec<PathBuf>, targets: &HashMap<PathBuf, usize>) -> Vec<PathBuf> {
    paths
        .into_iter()
        .filter(|path| targets.contains_key(path))
        .collect()
}

/// Paths touched by content-changing events, without duplicates.
fn changed_paths<'a>(events: impl IntoIterator<Item = &'a Event>) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for event in events {
        if event.kind.is_access() || event.kind.is_other() {
            continue;
        }
        for path in &event.paths {
            if !paths.contains(path) {
                paths.push(path.clone());
            }
        }
    }
    paths
}
