//! # chatcmd
//!
//! Line-oriented harness for command manifests. Every stdin line is
//! dispatched as a chat message and replies are printed to stdout, so a
//! command directory can be tried out without a gateway.
//!
//! ```bash
//! chatcmd --commands demos/commands --builtins
//! echo '!greet ana' | chatcmd --commands demos/commands
//! chatcmd --commands demos/commands --dev    # reload manifests on save
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use futures::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use chatcmd::{
    Client, ClientConfig, Event, EventHub, Member, Message, Reply, ReplyChannel, User,
};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "chatcmd")]
#[command(about = "Dispatch stdin lines as chat messages against a command directory")]
#[command(version)]
struct Args {
    /// Client config file (missing file means defaults)
    #[arg(short, long, default_value = "chatcmd.toml")]
    config: PathBuf,

    /// Command manifest directory, overrides `commands_dir` from the config
    #[arg(long)]
    commands: Option<PathBuf>,

    /// Reload manifests when they or their imports change
    #[arg(long)]
    dev: bool,

    /// Register the built-in help and sudo commands
    #[arg(long)]
    builtins: bool,

    /// Author id for every message
    #[arg(short, long, default_value = "0")]
    user: String,

    /// Guild id; omit to send direct messages
    #[arg(short, long)]
    guild: Option<String>,

    /// Permission granted to the author inside the guild (repeatable)
    #[arg(short, long = "permission")]
    permissions: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

// ============================================================================
// Stdout gateway
// ============================================================================

struct StdoutChannel;

impl ReplyChannel for StdoutChannel {
    fn send(&self, _channel_id: &str, reply: Reply) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            println!("{}", render(&reply));
            Ok(())
        })
    }
}

fn render(reply: &Reply) -> String {
    match reply {
        Reply::Text(text) => text.clone(),
        Reply::Embed(embed) => {
            let mut out = format!("== {} ==", embed.title);
            if let Some(description) = &embed.description {
                out.push('\n');
                out.push_str(description);
            }
            for field in &embed.fields {
                out.push_str(&format!("\n[{}]\n{}", field.name, field.value));
            }
            out
        }
    }
}

struct Session {
    author: User,
    guild: Option<String>,
    permissions: BTreeSet<String>,
    next_id: AtomicU64,
}

impl Session {
    fn message(&self, content: String) -> Message {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Message {
            id: id.to_string(),
            channel_id: "stdin".into(),
            guild_id: self.guild.clone(),
            member: self.guild.as_ref().map(|_| Member {
                user: self.author.clone(),
                nickname: None,
                permissions: self.permissions.clone(),
            }),
            author: self.author.clone(),
            content,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries replies only
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.parse().unwrap_or_default()),
        )
        .init();

    let mut config = ClientConfig::load_from_path(&args.config)?.unwrap_or_default();
    // `commands_dir` in the file is relative to the file.
    if let Some(dir) = config.commands_dir.take() {
        let base = args.config.parent().unwrap_or_else(|| Path::new(""));
        config.commands_dir = Some(base.join(dir));
    }
    if args.commands.is_some() {
        config.commands_dir = args.commands.clone();
    }
    config.development |= args.dev;
    config.default_commands |= args.builtins;

    let hub = Arc::new(EventHub::new());
    let commands_dir = config.commands_dir.clone();
    let client = Client::builder(config, Arc::new(StdoutChannel), hub.clone()).build()?;

    if let Some(dir) = &commands_dir {
        let count = client
            .register_directory(dir)
            .await
            .with_context(|| format!("failed to load commands from {}", dir.display()))?;
        info!(count, "commands loaded");
    }

    let session = Session {
        author: User {
            id: args.user.clone(),
            username: "stdin".into(),
        },
        guild: args.guild.clone(),
        permissions: args.permissions.iter().cloned().collect(),
        next_id: AtomicU64::new(1),
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let message = session.message(line);
        // Collectors see the message before the dispatcher does.
        hub.emit(&Event::MessageCreate(message.clone()));
        let outcome = client.handle_message(message).await?;
        debug!(?outcome, "message handled");
    }
    Ok(())
}
