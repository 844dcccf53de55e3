//! # chatcmd
//!
//! **Command framework for chat bots** - prefix commands with nested
//! subcommands, declarative arguments, guards, event collectors and live
//! reload of command files.
//!
//! ## Features
//!
//! - **Command trees** - Labels, aliases and subcommands of any depth
//! - **Argument engine** - Typed, optional and multi-value arguments with pluggable parsers
//! - **Guards** - Owner-only, guild-only, custom requirements and permissions
//! - **Collectors** - Await or stream the next matching messages and reactions
//! - **Hot reload** - TOML command manifests reload when they or their imports change
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use chatcmd::{ArgumentSpec, Client, ClientConfig, Command, EventHub, RecordingChannel, Reply};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let hub = Arc::new(EventHub::new());
//! let client = Client::builder(ClientConfig::default(), Arc::new(RecordingChannel::new()), hub)
//!     .build()?;
//!
//! client
//!     .register_command(
//!         Command::new("echo")
//!             .argument(ArgumentSpec::new("string", "word"))
//!             .handler(|inv| async move {
//!                 Ok(inv.parsed.text("word").map(Reply::from))
//!             }),
//!     )
//!     .await?;
//! client.attach();
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Core Modules
// ============================================================================

/// Declarative arguments, the resolution engine and the default parsers.
pub mod args;

/// Built-in `help` and `sudo` commands.
pub mod builtin;

/// The root context: registry, hooks, collectors and hot reload.
pub mod client;

/// Await or stream events matching a filter.
///
/// # Key Types
///
/// - [`CollectorManager`](collector::CollectorManager) - Shares one listener per event kind
/// - [`CollectorOptions`](collector::CollectorOptions) - Filter, timeout and limit
/// - [`CollectorStream`](collector::CollectorStream) - Matches as they arrive
pub mod collector;

/// Command builders, immutable command trees and the root registry.
pub mod command;

/// Client configuration file.
pub mod config;

/// Message to handler: prefix matching, guards, routing and arguments.
pub mod dispatch;

pub mod error;

/// In-process event source.
pub mod events;

/// TOML command manifests.
pub mod manifest;

/// File watching and the import graph behind hot reload.
pub mod reload;

pub mod tokenizer;

/// Chat-platform types and the gateway seams.
pub mod types;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use args::{ArgParser, ArgValue, ArgumentSpec, Parsed, ParsedArguments, ParserRegistry};
pub use client::{Client, ClientBuilder, ReloadOutcome};
pub use collector::{Collected, CollectorManager, CollectorOptions, CollectorStream};
pub use command::{Command, CommandTree, Handler, Invocation, Replier};
pub use config::{Category, ClientConfig};
pub use dispatch::{FailureContext, FailureKind, Outcome};
pub use error::{ArgumentError, ConfigError};
pub use events::{EventHandlers, EventHub, EventSource};
pub use manifest::ManifestLoader;
pub use types::{
    Channel, Directory, Embed, Event, EventKind, Member, MemoryDirectory, Message, Reaction,
    RecordingChannel, Reply, ReplyChannel, Role, User,
};
