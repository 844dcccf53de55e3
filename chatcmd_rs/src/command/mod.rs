//! Command definitions.
//!
//! A command is built with [`Command`] into an immutable [`CommandTree`]: an
//! arena of nodes where each subcommand knows its parent by index. Roots live
//! in the [`CommandRegistry`].

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use futures::future::BoxFuture;
use regex::Regex;

use crate::args::{ArgumentSpec, ParsedArguments};
use crate::client::Client;
use crate::types::{Message, Reply, ReplyChannel};

pub mod registry;
pub mod tree;

pub use registry::CommandRegistry;
pub use tree::{Command, CommandNode, CommandTree, NodeId};

/// Custom guard predicate over the invoking message.
pub type Requirement = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

pub type HandlerFn =
    Arc<dyn Fn(Invocation) -> BoxFuture<'static, anyhow::Result<Option<Reply>>> + Send + Sync>;

/// Maps a handler's raw reply to what is actually sent.
pub type ResponseFormatter = Arc<dyn Fn(Reply) -> Reply + Send + Sync>;

/// What runs when a node is invoked.
#[derive(Clone)]
pub enum Handler {
    Run(HandlerFn),
    /// Reply template from a manifest, see [`render_template`]
    Template {
        template: String,
        vars: BTreeMap<String, String>,
    },
}

impl Handler {
    pub fn run<F, Fut>(handler: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Reply>>> + Send + 'static,
    {
        Handler::Run(Arc::new(
            move |inv: Invocation| -> BoxFuture<'static, anyhow::Result<Option<Reply>>> {
                Box::pin(handler(inv))
            },
        ))
    }

    pub(crate) async fn invoke(&self, inv: Invocation) -> anyhow::Result<Option<Reply>> {
        match self {
            Handler::Run(handler) => handler(inv).await,
            Handler::Template { template, vars } => Ok(Some(Reply::Text(render_template(
                template,
                &inv.parsed,
                vars,
                &inv.args,
            )))),
        }
    }
}

/// Declarative guards checked before a node runs.
#[derive(Clone, Default)]
pub struct Guards {
    pub owner_only: bool,
    pub guild_only: bool,
    pub permissions: Vec<String>,
    pub requirement: Option<Requirement>,
}

/// Everything about a command except its children and handler.
#[derive(Clone, Default)]
pub struct CommandSpec {
    pub label: String,
    pub aliases: Vec<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub guards: Guards,
    pub arguments: Vec<ArgumentSpec>,
    /// Explicit usage lines; auto-derived from `arguments` when empty
    pub usages: Vec<String>,
}

impl CommandSpec {
    /// Whether `token` names this command by label or alias.
    pub fn handles(&self, token: &str) -> bool {
        eq_ignore_case(token, &self.label) || self.aliases.iter().any(|a| eq_ignore_case(token, a))
    }

    /// Label followed by aliases.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.label.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.to_uppercase() == b.to_uppercase()
}

/// Reply callback handed to handlers.
#[derive(Clone)]
pub struct Replier {
    channel: Arc<dyn ReplyChannel>,
    channel_id: String,
    formatter: ResponseFormatter,
}

impl Replier {
    pub(crate) fn new(
        channel: Arc<dyn ReplyChannel>,
        channel_id: String,
        formatter: ResponseFormatter,
    ) -> Self {
        Self {
            channel,
            channel_id,
            formatter,
        }
    }

    /// Format and send a reply to the invoking channel.
    pub async fn send(&self, reply: impl Into<Reply>) -> anyhow::Result<()> {
        let reply = (self.formatter)(reply.into());
        self.channel.send(&self.channel_id, reply).await
    }
}

/// One handler call.
pub struct Invocation {
    pub client: Arc<Client>,
    pub message: Message,
    /// Prefix the message was invoked with
    pub prefix: String,
    /// Tokens no declared argument consumed
    pub args: Vec<String>,
    pub parsed: ParsedArguments,
    pub reply: Replier,
    /// Permission checks were skipped by a privileged relay
    pub forced: bool,
}

fn regex_placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_.\-]+)\}").expect("valid regex literal"))
}

/// Fill `{name}` placeholders.
///
/// `{args}` is the leftover tokens joined by spaces; other names resolve to a
/// parsed argument first, then to a var. Unknown placeholders stay as typed.
pub fn render_template(
    template: &str,
    parsed: &ParsedArguments,
    vars: &BTreeMap<String, String>,
    leftover: &[String],
) -> String {
    regex_placeholder()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            if name == "args" {
                return leftover.join(" ");
            }
            if let Some(value) = parsed.get(name) {
                return value.to_string();
            }
            vars.get(name)
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
