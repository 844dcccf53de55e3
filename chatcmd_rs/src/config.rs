//! Client configuration.
//!
//! Loaded from an optional TOML file, usually `chatcmd.toml` next to the bot.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Placeholder in a prefix that expands to the bot's own mention.
pub const MENTION_PLACEHOLDER: &str = "@mention";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// User id allowed to run owner-only commands
    pub owner: String,
    /// The bot's own user id, used to expand `@mention` prefixes
    pub bot_id: String,
    /// Prefixes a message must start with to be treated as a command
    pub prefixes: Vec<String>,
    /// Reload command manifests when they or their imports change
    pub development: bool,
    /// Register the built-in `help` and `sudo` commands
    pub default_commands: bool,
    /// Categories listed by the built-in help command
    pub categories: Vec<Category>,
    /// Directory of command manifests to register at startup
    pub commands_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            bot_id: String::new(),
            prefixes: vec!["!".to_string()],
            development: false,
            default_commands: false,
            categories: Vec::new(),
            commands_dir: None,
        }
    }
}

/// A help-command category
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Category {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl ClientConfig {
    /// Load config from a specific path.
    ///
    /// A missing file is `Ok(None)`; an unreadable or malformed one is an error.
    pub fn load_from_path(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: ClientConfig = toml::from_str(&data)
            .with_context(|| format!("failed to parse toml config {}", path.display()))?;
        Ok(Some(config))
    }

    /// Prefixes with `@mention` expanded to the bot mention.
    pub fn expanded_prefixes(&self) -> Vec<String> {
        expand_mentions(&self.prefixes, &self.bot_id)
    }
}

pub(crate) fn expand_mentions(prefixes: &[String], bot_id: &str) -> Vec<String> {
    let mention = format!("<@{bot_id}>");
    prefixes
        .iter()
        .map(|p| p.replace(MENTION_PLACEHOLDER, &mention))
        .collect()
}
