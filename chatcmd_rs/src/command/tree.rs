//! Arena-backed command trees.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{CommandSpec, Handler, Invocation, eq_ignore_case};
use crate::args::{ArgumentSpec, ParserRegistry};
use crate::error::ConfigError;
use crate::types::{Message, Reply};

/// Stable handle of a node inside its [`CommandTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

pub struct CommandNode {
    pub spec: CommandSpec,
    pub handler: Handler,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl CommandNode {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// A root command and all of its subcommands.
///
/// Nodes are owned by the arena; parent links are indices set once while
/// building and never change.
pub struct CommandTree {
    nodes: Vec<CommandNode>,
    source: Option<PathBuf>,
}

impl std::fmt::Debug for CommandTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandTree")
            .field("label", &self.label())
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl CommandTree {
    pub const ROOT: NodeId = NodeId(0);

    pub fn root(&self) -> &CommandNode {
        &self.nodes[0]
    }

    pub fn node(&self, id: NodeId) -> &CommandNode {
        &self.nodes[id.0]
    }

    pub fn label(&self) -> &str {
        &self.root().spec.label
    }

    pub fn handles(&self, token: &str) -> bool {
        self.root().spec.handles(token)
    }

    /// File this command was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Child of `id` named by `token`, in declaration order.
    pub fn find_child(&self, id: NodeId, token: &str) -> Option<NodeId> {
        self.node(id)
            .children
            .iter()
            .copied()
            .find(|child| self.node(*child).spec.handles(token))
    }

    /// Children of `id`, followed by each child's own subcommands.
    pub fn subcommands(&self, id: NodeId) -> Vec<NodeId> {
        let children = &self.node(id).children;
        let mut all = children.clone();
        for child in children {
            all.extend(self.subcommands(*child));
        }
        all
    }

    /// Labels from the root down to `id`, after `prefix`.
    pub fn base_command(&self, id: NodeId, prefix: &str) -> String {
        let mut labels = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.node(node_id);
            labels.push(node.spec.label.as_str());
            current = node.parent;
        }
        labels.reverse();
        format!("{prefix}{}", labels.join(" "))
    }

    /// Declared usage lines, or one line derived from the argument specs.
    pub fn usage_lines(&self, id: NodeId, prefix: &str, parsers: &ParserRegistry) -> Vec<String> {
        let spec = &self.node(id).spec;
        if !spec.usages.is_empty() {
            return spec.usages.iter().map(|u| format!("{prefix}{u}")).collect();
        }

        let mut line = self.base_command(id, prefix);
        for arg in &spec.arguments {
            let kind = parsers.type_name(arg, false);
            if arg.optional {
                line.push_str(&format!(" [{} ({kind})]", arg.display_name()));
            } else {
                line.push_str(&format!(" <{} ({kind})>", arg.display_name()));
            }
        }
        vec![line]
    }

    /// Every argument type tag used anywhere in the tree must have a parser.
    pub fn validate(&self, parsers: &ParserRegistry) -> Result<(), ConfigError> {
        for node in &self.nodes {
            if let Some(arg) = node.spec.arguments.iter().find(|a| !parsers.contains(&a.kind)) {
                return Err(ConfigError::UnknownParser(arg.kind.clone()));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Builder for a command and its subcommands.
#[derive(Clone)]
pub struct Command {
    spec: CommandSpec,
    handler: Option<Handler>,
    subcommands: Vec<Command>,
}

impl Command {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            spec: CommandSpec {
                label: label.into(),
                ..Default::default()
            },
            handler: None,
            subcommands: Vec::new(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.spec.aliases.push(alias.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.spec.description = Some(description.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.spec.category = Some(category.into());
        self
    }

    pub fn owner_only(mut self) -> Self {
        self.spec.guards.owner_only = true;
        self
    }

    pub fn guild_only(mut self) -> Self {
        self.spec.guards.guild_only = true;
        self
    }

    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.spec.guards.permissions.push(permission.into());
        self
    }

    pub fn requirement<F>(mut self, requirement: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.spec.guards.requirement = Some(Arc::new(requirement));
        self
    }

    pub fn argument(mut self, argument: ArgumentSpec) -> Self {
        self.spec.arguments.push(argument);
        self
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.spec.usages.push(usage.into());
        self
    }

    pub fn subcommand(mut self, command: Command) -> Self {
        self.subcommands.push(command);
        self
    }

    pub fn handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Reply>>> + Send + 'static,
    {
        self.handler = Some(Handler::run(handler));
        self
    }

    /// Reply with a template instead of running code.
    pub fn reply(mut self, template: impl Into<String>) -> Self {
        self.handler = Some(Handler::Template {
            template: template.into(),
            vars: BTreeMap::new(),
        });
        self
    }

    pub(crate) fn spec_mut(&mut self) -> &mut CommandSpec {
        &mut self.spec
    }

    pub(crate) fn set_handler(&mut self, handler: Handler) {
        self.handler = Some(handler);
    }

    pub fn build(self) -> Result<CommandTree, ConfigError> {
        let mut nodes = Vec::new();
        push_node(&mut nodes, self, None)?;
        Ok(CommandTree {
            nodes,
            source: None,
        })
    }
}

fn push_node(
    nodes: &mut Vec<CommandNode>,
    command: Command,
    parent: Option<NodeId>,
) -> Result<NodeId, ConfigError> {
    let Command {
        spec,
        handler,
        subcommands,
    } = command;

    let handler = handler.ok_or_else(|| ConfigError::MissingHandler(spec.label.clone()))?;
    if let Some(arg) = spec.arguments.iter().find(|a| a.accept_multiple && a.limit == 0) {
        return Err(ConfigError::ZeroLimit {
            label: spec.label.clone(),
            name: arg.name.clone(),
        });
    }
    for (i, sub) in subcommands.iter().enumerate() {
        let clash = subcommands[..i]
            .iter()
            .any(|earlier| sub.spec.names().any(|name| earlier.spec.handles(name)));
        if clash {
            return Err(ConfigError::DuplicateSubcommand {
                parent: spec.label.clone(),
                label: sub.spec.label.clone(),
            });
        }
    }

    let id = NodeId(nodes.len());
    nodes.push(CommandNode {
        spec,
        handler,
        parent,
        children: Vec::new(),
    });

    for sub in subcommands {
        let child = push_node(nodes, sub, Some(id))?;
        nodes[id.0].children.push(child);
    }
    Ok(id)
}

/// Case-insensitive comparison of a token against any name of `spec`.
pub(crate) fn names_collide(a: &CommandSpec, b: &CommandSpec) -> Option<String> {
    a.names()
        .find(|name| b.names().any(|other| eq_ignore_case(name, other)))
        .map(str::to_string)
}
