//! Declarative argument grammar.
//!
//! A command declares an ordered list of [`ArgumentSpec`]s. The
//! [`engine`] walks them against the message tokens using the parsers in a
//! [`ParserRegistry`], producing [`ParsedArguments`] plus the leftover tokens.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::types::{Channel, Directory, Message, Role, User};

pub mod defaults;
pub mod engine;
pub mod registry;

pub use engine::{Resolved, resolve_arguments};
pub use registry::{ArgParser, NameFn, ParseFn, ParserRegistry};

pub const DEFAULT_LIMIT: usize = 5;
pub const DEFAULT_DELIMITER: &str = ";";

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn default_delimiter() -> String {
    DEFAULT_DELIMITER.to_string()
}

/// One declared argument.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArgumentSpec {
    /// Parser type tag, looked up in the [`ParserRegistry`]
    #[serde(rename = "type")]
    pub kind: String,
    /// Key in [`ParsedArguments`] and label in usage text
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub optional: bool,
    /// Split one token by `delimiter` and parse every piece
    #[serde(default)]
    pub accept_multiple: bool,
    /// Maximum pieces kept when `accept_multiple` is set
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

impl ArgumentSpec {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            optional: false,
            accept_multiple: false,
            limit: DEFAULT_LIMIT,
            delimiter: default_delimiter(),
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn multiple(mut self, limit: usize) -> Self {
        self.accept_multiple = true;
        self.limit = limit;
        self
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Name for usage text; unnamed arguments show as `?`.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { "?" } else { &self.name }
    }
}

/// A successfully parsed value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Text(String),
    Number(f64),
    Duration(Duration),
    User(User),
    Channel(Channel),
    Role(Role),
    Message(Box<Message>),
    /// Values produced by host-defined parsers
    Custom(serde_json::Value),
}

impl ArgValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ArgValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ArgValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            ArgValue::Duration(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_user(&self) -> Option<&User> {
        match self {
            ArgValue::User(user) => Some(user),
            _ => None,
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Text(text) => f.write_str(text),
            ArgValue::Number(n) => write!(f, "{n}"),
            ArgValue::Duration(d) => write!(f, "{}ms", d.as_millis()),
            ArgValue::User(user) => write!(f, "<@{}>", user.id),
            ArgValue::Channel(channel) => write!(f, "<#{}>", channel.id),
            ArgValue::Role(role) => write!(f, "<@&{}>", role.id),
            ArgValue::Message(message) => f.write_str(&message.content),
            ArgValue::Custom(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    One(ArgValue),
    Many(Vec<ArgValue>),
}

impl fmt::Display for Parsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parsed::One(value) => write!(f, "{value}"),
            Parsed::Many(values) => {
                let joined: Vec<String> = values.iter().map(ToString::to_string).collect();
                f.write_str(&joined.join(", "))
            }
        }
    }
}

/// Argument name to parsed value. Absent optional arguments have no entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArguments {
    values: HashMap<String, Parsed>,
}

impl ParsedArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, name: &str, value: Parsed) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Parsed> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn one(&self, name: &str) -> Option<&ArgValue> {
        match self.values.get(name)? {
            Parsed::One(value) => Some(value),
            Parsed::Many(_) => None,
        }
    }

    pub fn many(&self, name: &str) -> Option<&[ArgValue]> {
        match self.values.get(name)? {
            Parsed::Many(values) => Some(values),
            Parsed::One(_) => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.one(name).and_then(ArgValue::as_text)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.one(name).and_then(ArgValue::as_number)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Parsed)> {
        self.values.iter()
    }
}

/// What a parser sees besides the raw token.
#[derive(Clone)]
pub struct ParseContext {
    pub message: Message,
    pub directory: Arc<dyn Directory>,
}

impl ParseContext {
    pub fn new(message: Message, directory: Arc<dyn Directory>) -> Self {
        Self { message, directory }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_defaults_from_toml() {
        let spec: ArgumentSpec = toml::from_str("type = \"number\"\nname = \"n\"").unwrap();
        assert_eq!(spec.limit, DEFAULT_LIMIT);
        assert_eq!(spec.delimiter, ";");
        assert!(!spec.optional);
        assert!(!spec.accept_multiple);
    }

    #[test]
    fn builder_sets_multiple() {
        let spec = ArgumentSpec::new("string", "tags").multiple(2).delimiter(",");
        assert!(spec.accept_multiple);
        assert_eq!(spec.limit, 2);
        assert_eq!(spec.delimiter, ",");
        assert_eq!(ArgumentSpec::new("string", "").display_name(), "?");
    }

    #[test]
    fn parsed_accessors_distinguish_shapes() {
        let mut parsed = ParsedArguments::new();
        parsed.insert("n", Parsed::One(ArgValue::Number(0.0)));
        parsed.insert(
            "tags",
            Parsed::Many(vec![ArgValue::Text("a".into()), ArgValue::Text("b".into())]),
        );

        assert_eq!(parsed.number("n"), Some(0.0));
        assert!(parsed.many("n").is_none());
        assert_eq!(parsed.many("tags").map(<[ArgValue]>::len), Some(2));
        assert_eq!(parsed.get("tags").unwrap().to_string(), "a, b");
        assert!(!parsed.contains("missing"));
    }
}
