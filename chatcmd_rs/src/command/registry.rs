//! Flat index of root commands.

use std::sync::Arc;

use tracing::debug;

use super::tree::{CommandTree, names_collide};
use super::eq_ignore_case;
use crate::error::ConfigError;

/// Root commands in insertion order.
///
/// Resolution is a linear scan, so when two roots could both handle a token
/// the one registered first wins.
#[derive(Default)]
pub struct CommandRegistry {
    roots: Vec<Arc<CommandTree>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root. Fails if its label or any alias is already taken.
    pub fn register(&mut self, tree: CommandTree) -> Result<Arc<CommandTree>, ConfigError> {
        self.check_collisions(&tree, None)?;
        let tree = Arc::new(tree);
        debug!(label = tree.label(), "registered command");
        self.roots.push(tree.clone());
        Ok(tree)
    }

    /// Swap the roots labelled `old_label` for `tree` in one step.
    ///
    /// Collisions are checked against every other root first; on error the
    /// registry is left untouched.
    pub fn replace(
        &mut self,
        old_label: &str,
        tree: CommandTree,
    ) -> Result<Arc<CommandTree>, ConfigError> {
        self.check_collisions(&tree, Some(old_label))?;
        self.roots.retain(|root| !eq_ignore_case(root.label(), old_label));
        let tree = Arc::new(tree);
        self.roots.push(tree.clone());
        Ok(tree)
    }

    /// Remove every root whose label matches. Returns how many were removed.
    pub fn unregister(&mut self, label: &str) -> usize {
        let before = self.roots.len();
        self.roots.retain(|root| !eq_ignore_case(root.label(), label));
        before - self.roots.len()
    }

    pub fn unregister_all(&mut self) {
        self.roots.clear();
    }

    pub fn resolve(&self, token: &str) -> Option<Arc<CommandTree>> {
        self.roots.iter().find(|root| root.handles(token)).cloned()
    }

    pub fn commands(&self) -> &[Arc<CommandTree>] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    fn check_collisions(&self, tree: &CommandTree, skip: Option<&str>) -> Result<(), ConfigError> {
        let incoming = &tree.root().spec;
        let others = self
            .roots
            .iter()
            .filter(|root| skip.is_none_or(|label| !eq_ignore_case(root.label(), label)));

        for existing in others {
            if existing.handles(&incoming.label) {
                return Err(ConfigError::DuplicateLabel(incoming.label.clone()));
            }
            if names_collide(incoming, &existing.root().spec).is_some() {
                return Err(ConfigError::DuplicateAlias {
                    label: incoming.label.clone(),
                    existing: existing.label().to_string(),
                });
            }
        }
        Ok(())
    }
}
