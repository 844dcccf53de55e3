//! Dependency → dependents map with one watch subscription per dependency.

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

/// Keeps a file watch alive; dropping it stops the watch.
pub struct Subscription {
    _guard: Box<dyn Any + Send>,
}

impl Subscription {
    pub fn new<G: Send + 'static>(guard: G) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }
}

/// Starts watching one file.
pub trait Subscribe: Send + Sync {
    fn subscribe(&self, path: &Path) -> anyhow::Result<Subscription>;
}

/// Which command files depend on which files.
///
/// Every dependency with at least one dependent owns exactly one
/// [`Subscription`]; when its last dependent goes away the subscription is
/// dropped with it.
pub struct DependencyGraph {
    dependents: HashMap<PathBuf, BTreeSet<PathBuf>>,
    dependencies: HashMap<PathBuf, BTreeSet<PathBuf>>,
    watchers: HashMap<PathBuf, Subscription>,
    subscriber: Arc<dyn Subscribe>,
}

impl DependencyGraph {
    pub fn new(subscriber: Arc<dyn Subscribe>) -> Self {
        Self {
            dependents: HashMap::new(),
            dependencies: HashMap::new(),
            watchers: HashMap::new(),
            subscriber,
        }
    }

    /// Make `deps` the full dependency set of `dependent`.
    ///
    /// Edges no longer present are dropped first, so a re-scan after a reload
    /// never leaves stale watchers behind.
    pub fn track(&mut self, dependent: &Path, deps: BTreeSet<PathBuf>) {
        let previous = self.dependencies.remove(dependent).unwrap_or_default();
        for stale in previous.difference(&deps) {
            self.detach(dependent, stale);
        }

        let mut kept = BTreeSet::new();
        for dep in deps {
            if dep == dependent {
                continue;
            }
            if previous.contains(&dep) || self.attach(dependent, &dep) {
                kept.insert(dep);
            }
        }
        if !kept.is_empty() {
            self.dependencies.insert(dependent.to_path_buf(), kept);
        }
    }

    /// Drop every edge of `dependent`.
    pub fn forget(&mut self, dependent: &Path) {
        if let Some(deps) = self.dependencies.remove(dependent) {
            for dep in &deps {
                self.detach(dependent, dep);
            }
        }
    }

    pub fn dependents_of(&self, dependency: &Path) -> Vec<PathBuf> {
        self.dependents
            .get(dependency)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn dependencies_of(&self, dependent: &Path) -> Vec<PathBuf> {
        self.dependencies
            .get(dependent)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_watching(&self, dependency: &Path) -> bool {
        self.watchers.contains_key(dependency)
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    fn attach(&mut self, dependent: &Path, dep: &Path) -> bool {
        if !self.watchers.contains_key(dep) {
            match self.subscriber.subscribe(dep) {
                Ok(subscription) => {
                    info!(path = %dep.display(), "watching dependency");
                    self.watchers.insert(dep.to_path_buf(), subscription);
                }
                Err(err) => {
                    warn!(path = %dep.display(), error = %err, "cannot watch dependency");
                    return false;
                }
            }
        }
        self.dependents
            .entry(dep.to_path_buf())
            .or_default()
            .insert(dependent.to_path_buf());
        true
    }

    fn detach(&mut self, dependent: &Path, dep: &Path) {
        let Some(set) = self.dependents.get_mut(dep) else {
            return;
        };
        set.remove(dependent);
        if set.is_empty() {
            self.dependents.remove(dep);
            if self.watchers.remove(dep).is_some() {
                info!(path = %dep.display(), "watcher torn down");
            }
        }
    }
}
