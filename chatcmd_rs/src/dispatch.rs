//! Message to command execution.
//!
//! A node runs its guards in a fixed order (owner, guild, requirement,
//! permissions), then either routes into a matching subcommand or resolves
//! its arguments and calls its handler.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error};

use crate::args::{ParseContext, resolve_arguments};
use crate::client::Client;
use crate::command::{CommandTree, Guards, Invocation, NodeId};
use crate::error::ArgumentError;
use crate::tokenizer::{strip_prefix, tokenize};
use crate::types::{Message, Reply};

/// Maps a rejected invocation to the reply sent back, if any.
pub type FailureHandler = Arc<dyn Fn(&FailureContext) -> Option<Reply> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    OwnerOnly,
    GuildOnly,
    RequirementsNotMet,
    MissingPerms,
}

impl FailureKind {
    pub fn tag(self) -> &'static str {
        match self {
            FailureKind::OwnerOnly => "ownerOnly",
            FailureKind::GuildOnly => "guildOnly",
            FailureKind::RequirementsNotMet => "requirementsNotMet",
            FailureKind::MissingPerms => "missingPerms",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// What the failure handler gets to look at.
#[derive(Debug, Clone)]
pub struct FailureContext {
    pub kind: FailureKind,
    pub message: Message,
    /// Prefixed labels from the root down to the rejecting node
    pub command: String,
    /// Permissions the node requires
    pub permissions: Vec<String>,
}

/// How one incoming message was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No prefix matched or nothing followed it
    Ignored,
    UnknownCommand(String),
    Rejected(FailureKind),
    InvalidArguments(ArgumentError),
    Completed { replied: bool },
    /// The handler returned an error; it was logged
    HandlerFailed,
}

pub fn default_failure_reply(ctx: &FailureContext) -> Option<Reply> {
    let text = match ctx.kind {
        FailureKind::OwnerOnly => "Only the bot owner can use this command.".to_string(),
        FailureKind::GuildOnly => "This command only works in guilds!".to_string(),
        FailureKind::RequirementsNotMet => {
            "You do not meet the requirements to run this command.".to_string()
        }
        FailureKind::MissingPerms => format!(
            "You do not have the required permissions to run this command! ({})",
            ctx.permissions.join(", ")
        ),
    };
    Some(Reply::Text(text))
}

/// Entry point for a new message.
pub async fn handle_message(client: &Arc<Client>, message: Message) -> anyhow::Result<Outcome> {
    let prefixes = client.prefixes_for(&message);
    let Some((prefix, rest)) = strip_prefix(&message.content, &prefixes) else {
        return Ok(Outcome::Ignored);
    };
    let prefix = prefix.to_string();

    let mut tokens = tokenize(&rest);
    if tokens.is_empty() {
        return Ok(Outcome::Ignored);
    }
    let keyword = tokens.remove(0);
    let Some(tree) = client.resolve(&keyword).await else {
        debug!(keyword = %keyword, "no command handles keyword");
        return Ok(Outcome::UnknownCommand(keyword));
    };

    execute(client, tree, message, tokens, prefix, false).await
}

/// Run `tree` against `tokens` (the words after the command keyword).
///
/// `forced` skips permission checks, nothing else. It stays in effect for
/// subcommands.
pub async fn execute(
    client: &Arc<Client>,
    tree: Arc<CommandTree>,
    message: Message,
    mut tokens: Vec<String>,
    prefix: String,
    forced: bool,
) -> anyhow::Result<Outcome> {
    let mut node = CommandTree::ROOT;
    loop {
        let guards = &tree.node(node).spec.guards;
        if let Some(kind) = check_guards(client, guards, &message, forced) {
            return reject(client, &tree, node, &message, &prefix, kind).await;
        }
        match tokens.first().and_then(|token| tree.find_child(node, token)) {
            Some(child) => {
                tokens.remove(0);
                node = child;
            }
            None => break,
        }
    }

    let command = tree.base_command(node, &prefix);
    let ctx = ParseContext::new(message.clone(), client.directory());
    let arguments = &tree.node(node).spec.arguments;
    let resolved = match resolve_arguments(arguments, tokens, client.parsers(), &ctx).await {
        Ok(resolved) => resolved,
        Err(err) if err.is_user_error() => {
            debug!(command = %command, error = %err, "invalid arguments");
            client
                .channel()
                .send(&message.channel_id, Reply::Text(err.to_string()))
                .await?;
            return Ok(Outcome::InvalidArguments(err));
        }
        Err(err) => return Err(err.into()),
    };

    let reply = client.replier(&message.channel_id);
    let invocation = Invocation {
        client: client.clone(),
        message,
        prefix,
        args: resolved.leftover,
        parsed: resolved.parsed,
        reply: reply.clone(),
        forced,
    };

    debug!(command = %command, forced, "running command");
    match tree.node(node).handler.invoke(invocation).await {
        Ok(Some(response)) => {
            reply.send(response).await?;
            Ok(Outcome::Completed { replied: true })
        }
        Ok(None) => Ok(Outcome::Completed { replied: false }),
        Err(err) => {
            error!(command = %command, error = %format!("{err:#}"), "command handler failed");
            Ok(Outcome::HandlerFailed)
        }
    }
}

fn check_guards(
    client: &Client,
    guards: &Guards,
    message: &Message,
    forced: bool,
) -> Option<FailureKind> {
    if guards.owner_only && message.author.id != client.config().owner {
        return Some(FailureKind::OwnerOnly);
    }
    if (guards.guild_only || !guards.permissions.is_empty()) && message.guild_id.is_none() {
        return Some(FailureKind::GuildOnly);
    }
    if let Some(requirement) = &guards.requirement
        && !requirement(message)
    {
        return Some(FailureKind::RequirementsNotMet);
    }
    if !forced && !guards.permissions.is_empty() {
        let granted = message.member.as_ref().is_some_and(|member| {
            guards
                .permissions
                .iter()
                .all(|p| member.has_permission(p))
        });
        if !granted {
            return Some(FailureKind::MissingPerms);
        }
    }
    None
}

async fn reject(
    client: &Client,
    tree: &CommandTree,
    node: NodeId,
    message: &Message,
    prefix: &str,
    kind: FailureKind,
) -> anyhow::Result<Outcome> {
    let ctx = FailureContext {
        kind,
        message: message.clone(),
        command: tree.base_command(node, prefix),
        permissions: tree.node(node).spec.guards.permissions.clone(),
    };
    debug!(command = %ctx.command, reason = kind.tag(), "command rejected");
    if let Some(reply) = client.failure_reply(&ctx) {
        client.channel().send(&message.channel_id, reply).await?;
    }
    Ok(Outcome::Rejected(kind))
}
