//! Chat-platform shapes shared by the dispatcher, parsers and collectors.
//!
//! These mirror what a gateway delivers. The gateway itself lives outside this
//! crate; it only has to fill these structs and implement [`ReplyChannel`] and
//! [`Directory`].

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Platform identifiers are opaque numeric strings.
pub type Snowflake = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Snowflake,
    pub username: String,
}

/// A user as seen from inside a guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user: User,
    #[serde(default)]
    pub nickname: Option<String>,
    /// Permission names the gateway observed for this member in the channel.
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl Member {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: Snowflake,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Snowflake,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    /// `None` for direct messages.
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    pub author: User,
    #[serde(default)]
    pub member: Option<Member>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub message: Message,
    pub emoji: String,
    pub reactor: User,
}

/// Named event firings delivered by the event source.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    MessageCreate(Message),
    ReactionAdd(Reaction),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::MessageCreate(_) => EventKind::MessageCreate,
            Event::ReactionAdd(_) => EventKind::ReactionAdd,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "messageCreate")]
    MessageCreate,
    #[serde(rename = "messageReactionAdd")]
    ReactionAdd,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            EventKind::MessageCreate => "messageCreate",
            EventKind::ReactionAdd => "messageReactionAdd",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<EmbedField>,
}

impl Embed {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
        });
        self
    }
}

/// Outgoing message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum Reply {
    Text(String),
    Embed(Embed),
}

impl Reply {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Reply::Text(text) => Some(text),
            Reply::Embed(_) => None,
        }
    }
}

impl From<String> for Reply {
    fn from(value: String) -> Self {
        Reply::Text(value)
    }
}

impl From<&str> for Reply {
    fn from(value: &str) -> Self {
        Reply::Text(value.to_string())
    }
}

impl From<Embed> for Reply {
    fn from(value: Embed) -> Self {
        Reply::Embed(value)
    }
}

/// Outgoing side of the gateway.
pub trait ReplyChannel: Send + Sync {
    fn send(&self, channel_id: &str, reply: Reply) -> BoxFuture<'_, anyhow::Result<()>>;
}

/// Cache and REST lookups the default argument parsers rely on.
pub trait Directory: Send + Sync {
    /// Guild members, or the global user cache when `guild_id` is `None`.
    fn members(&self, guild_id: Option<&str>) -> Vec<Member>;
    fn channels(&self, guild_id: &str) -> Vec<Channel>;
    fn roles(&self, guild_id: &str) -> Vec<Role>;
    fn fetch_user(&self, id: &str) -> BoxFuture<'_, Option<User>>;
    fn fetch_message(&self, channel_id: &str, id: &str) -> BoxFuture<'_, Option<Message>>;
}

#[derive(Default)]
struct GuildCache {
    members: Vec<Member>,
    channels: Vec<Channel>,
    roles: Vec<Role>,
}

/// In-memory [`Directory`] for hosts without a gateway cache, and for tests.
#[derive(Default)]
pub struct MemoryDirectory {
    users: RwLock<Vec<User>>,
    guilds: RwLock<HashMap<Snowflake, GuildCache>>,
    messages: RwLock<Vec<Message>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user: User) {
        self.users.write().push(user);
    }

    pub fn add_member(&self, guild_id: &str, member: Member) {
        self.guilds
            .write()
            .entry(guild_id.to_string())
            .or_default()
            .members
            .push(member);
    }

    pub fn add_channel(&self, guild_id: &str, channel: Channel) {
        self.guilds
            .write()
            .entry(guild_id.to_string())
            .or_default()
            .channels
            .push(channel);
    }

    pub fn add_role(&self, guild_id: &str, role: Role) {
        self.guilds
            .write()
            .entry(guild_id.to_string())
            .or_default()
            .roles
            .push(role);
    }

    pub fn add_message(&self, message: Message) {
        self.messages.write().push(message);
    }
}

impl Directory for MemoryDirectory {
    fn members(&self, guild_id: Option<&str>) -> Vec<Member> {
        match guild_id {
            Some(guild) => self
                .guilds
                .read()
                .get(guild)
                .map(|g| g.members.clone())
                .unwrap_or_default(),
            None => self
                .users
                .read()
                .iter()
                .map(|user| Member {
                    user: user.clone(),
                    nickname: None,
                    permissions: BTreeSet::new(),
                })
                .collect(),
        }
    }

    fn channels(&self, guild_id: &str) -> Vec<Channel> {
        self.guilds
            .read()
            .get(guild_id)
            .map(|g| g.channels.clone())
            .unwrap_or_default()
    }

    fn roles(&self, guild_id: &str) -> Vec<Role> {
        self.guilds
            .read()
            .get(guild_id)
            .map(|g| g.roles.clone())
            .unwrap_or_default()
    }

    fn fetch_user(&self, id: &str) -> BoxFuture<'_, Option<User>> {
        let found = self.users.read().iter().find(|u| u.id == id).cloned();
        Box::pin(async move { found })
    }

    fn fetch_message(&self, channel_id: &str, id: &str) -> BoxFuture<'_, Option<Message>> {
        let found = self
            .messages
            .read()
            .iter()
            .find(|m| m.channel_id == channel_id && m.id == id)
            .cloned();
        Box::pin(async move { found })
    }
}

/// [`ReplyChannel`] that keeps every reply in memory.
#[derive(Default, Clone)]
pub struct RecordingChannel {
    sent: Arc<RwLock<Vec<(Snowflake, Reply)>>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(Snowflake, Reply)> {
        self.sent.read().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent
            .read()
            .iter()
            .filter_map(|(_, reply)| reply.as_text().map(str::to_string))
            .collect()
    }
}

impl ReplyChannel for RecordingChannel {
    fn send(&self, channel_id: &str, reply: Reply) -> BoxFuture<'_, anyhow::Result<()>> {
        self.sent.write().push((channel_id.to_string(), reply));
        Box::pin(async { Ok(()) })
    }
}
