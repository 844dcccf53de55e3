//! Hot reload of command manifests.
//!
//! Changes arrive from file watches on an mpsc channel and are applied by one
//! task, one at a time; see `Client::enable_hot_reload`. This module only keeps
//! track of what is watched and which command files a change affects.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

pub mod graph;
pub mod scan;
pub mod watch;

pub use graph::{DependencyGraph, Subscribe, Subscription};
pub use scan::{dependency_closure, normalize};
pub use watch::NotifySubscriber;

struct Source {
    label: String,
    _watch: Option<Subscription>,
}

/// Command files under watch and the dependency graph between them.
pub struct HotReloader {
    graph: DependencyGraph,
    sources: HashMap<PathBuf, Source>,
    subscriber: Arc<dyn Subscribe>,
}

impl HotReloader {
    pub fn new(subscriber: Arc<dyn Subscribe>) -> Self {
        Self {
            graph: DependencyGraph::new(subscriber.clone()),
            sources: HashMap::new(),
            subscriber,
        }
    }

    /// Watch the command file `source`, registered as `label`, and everything
    /// it imports. Re-tracking refreshes the label and the dependency set.
    pub async fn track(&mut self, source: &Path, label: &str) {
        let source = normalize(source);
        let watch = match self.sources.remove(&source) {
            Some(existing) => existing._watch,
            None => match self.subscriber.subscribe(&source) {
                Ok(subscription) => Some(subscription),
                Err(err) => {
                    warn!(path = %source.display(), error = %err, "cannot watch command file");
                    None
                }
            },
        };
        self.sources.insert(
            source.clone(),
            Source {
                label: label.to_string(),
                _watch: watch,
            },
        );

        match dependency_closure(&source).await {
            Ok(deps) => {
                debug!(path = %source.display(), count = deps.len(), "dependencies scanned");
                self.graph.track(&source, deps);
            }
            Err(err) => {
                warn!(path = %source.display(), error = %err, "dependency scan failed, tracking skipped");
            }
        }
    }

    /// Stop watching `source` and release its dependencies.
    pub fn forget(&mut self, source: &Path) {
        let source = normalize(source);
        self.sources.remove(&source);
        self.graph.forget(&source);
    }

    pub fn label_of(&self, source: &Path) -> Option<&str> {
        self.sources
            .get(&normalize(source))
            .map(|s| s.label.as_str())
    }

    pub fn is_tracked(&self, source: &Path) -> bool {
        self.sources.contains_key(&normalize(source))
    }

    /// Command files to reload after `changed` changed: the file itself if it
    /// is a command, then every command depending on it.
    pub fn affected(&self, changed: &Path) -> Vec<PathBuf> {
        let changed = normalize(changed);
        let mut targets = Vec::new();
        if self.sources.contains_key(&changed) {
            targets.push(changed.clone());
        }
        for dependent in self.graph.dependents_of(&changed) {
            if self.sources.contains_key(&dependent) && !targets.contains(&dependent) {
                targets.push(dependent);
            }
        }
        targets
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }
}
