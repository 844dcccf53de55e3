//! `help` and `sudo`, registered when `default_commands` is on.

use std::sync::Arc;

use crate::args::ArgumentSpec;
use crate::client::Client;
use crate::command::{Command, CommandTree, Invocation};
use crate::dispatch;
use crate::types::{Embed, Reply};

/// Discord caps an embed at 25 fields.
const MAX_FIELDS: usize = 25;

pub fn help() -> Command {
    Command::new("help")
        .description("Lists commands, or shows how to use one.")
        .argument(ArgumentSpec::new("string", "command").optional())
        .handler(run_help)
}

pub fn sudo() -> Command {
    Command::new("sudo")
        .description("Runs a command without permission checks.")
        .owner_only()
        .handler(run_sudo)
}

async fn run_help(inv: Invocation) -> anyhow::Result<Option<Reply>> {
    let client = &inv.client;
    let prefix = display_prefix(client, &inv);
    let guild_id = inv.message.guild_id.as_deref();

    if let Some(name) = inv.parsed.text("command") {
        let Some(tree) = client.resolve(name).await else {
            return Ok(Some(Reply::from("No command found.")));
        };
        inv.reply
            .send(command_embed(client, &tree, &prefix, guild_id))
            .await?;
        return Ok(None);
    }

    let commands = client.commands().await;
    let visible = |category: Option<&str>| -> String {
        commands
            .iter()
            .filter(|c| !c.root().spec.guards.owner_only)
            .filter(|c| category.is_none() || c.root().spec.category.as_deref() == category)
            .map(|c| format!("{prefix}{}", c.label()))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let categories = &client.config().categories;
    let fields: Vec<(String, String)> = if categories.is_empty() {
        vec![("Commands".to_string(), visible(None))]
    } else {
        categories
            .iter()
            .map(|category| {
                let value = format!("*{}*\n{}", category.description, visible(Some(&category.id)));
                (category.title.clone(), value)
            })
            .collect()
    };

    for (i, chunk) in fields.chunks(MAX_FIELDS).enumerate() {
        let title = if i == 0 { "Help" } else { "Help, cont." };
        let embed = chunk
            .iter()
            .fold(Embed::new(title), |embed, (name, value)| embed.field(name, value));
        inv.reply.send(embed).await?;
    }
    Ok(None)
}

async fn run_sudo(inv: Invocation) -> anyhow::Result<Option<Reply>> {
    let mut args = inv.args.clone();
    if args.is_empty() {
        return Ok(Some(Reply::from("Command not found")));
    }
    let keyword = args.remove(0);
    let Some(tree) = inv.client.resolve(&keyword).await else {
        return Ok(Some(Reply::from("Command not found")));
    };

    dispatch::execute(&inv.client, tree, inv.message.clone(), args, inv.prefix.clone(), true)
        .await?;
    Ok(None)
}

/// First prefix for this message, with backticks escaped for markdown.
fn display_prefix(client: &Client, inv: &Invocation) -> String {
    client
        .prefixes_for(&inv.message)
        .into_iter()
        .next()
        .unwrap_or_else(|| inv.prefix.clone())
        .replace('`', "\\`")
}

/// Help embed for one root command.
pub fn command_embed(
    client: &Arc<Client>,
    tree: &CommandTree,
    prefix: &str,
    guild_id: Option<&str>,
) -> Embed {
    let spec = &tree.root().spec;
    let description = match spec.description.as_deref() {
        Some(text) if !text.is_empty() => client.format_description(text, guild_id),
        _ => "*No description.*".to_string(),
    };

    let usage = tree.usage_lines(CommandTree::ROOT, prefix, client.parsers());
    let mut embed = Embed::new(format!("{prefix}{}", spec.label)).field("Usage", usage.join("\n"));
    embed.description = Some(description);

    if !spec.aliases.is_empty() {
        let aliases: Vec<String> = spec.aliases.iter().map(|a| format!("{prefix}{a}")).collect();
        embed = embed.field("Aliases", aliases.join(", "));
    }

    let subcommands: Vec<String> = tree
        .subcommands(CommandTree::ROOT)
        .into_iter()
        .filter(|id| !tree.node(*id).spec.guards.owner_only)
        .flat_map(|id| tree.usage_lines(id, prefix, client.parsers()))
        .collect();
    if !subcommands.is_empty() {
        embed = embed.field("Subcommands", subcommands.join("\n"));
    }
    embed
}
