//! Type tag to parser mapping.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use super::{ArgValue, ArgumentSpec, ParseContext, defaults};

/// Parses one raw token. `None` means the token is not a valid value.
pub type ParseFn = Arc<
    dyn Fn(ParseContext, String, ArgumentSpec) -> BoxFuture<'static, Option<ArgValue>>
        + Send
        + Sync,
>;

/// Human name for an argument type: `(spec, use_display_name)`.
pub type NameFn = Arc<dyn Fn(&ArgumentSpec, bool) -> String + Send + Sync>;

fn erase<F, Fut>(parse: F) -> ParseFn
where
    F: Fn(ParseContext, String, ArgumentSpec) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<ArgValue>> + Send + 'static,
{
    Arc::new(
        move |ctx: ParseContext,
              token: String,
              spec: ArgumentSpec|
              -> BoxFuture<'static, Option<ArgValue>> { Box::pin(parse(ctx, token, spec)) },
    )
}

/// A registered parser: a bare function, or a function with naming metadata.
#[derive(Clone)]
pub enum ArgParser {
    Bare(ParseFn),
    Described { parse: ParseFn, name: NameFn },
}

impl ArgParser {
    pub fn bare<F, Fut>(parse: F) -> Self
    where
        F: Fn(ParseContext, String, ArgumentSpec) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<ArgValue>> + Send + 'static,
    {
        ArgParser::Bare(erase(parse))
    }

    pub fn described<F, Fut, N>(parse: F, name: N) -> Self
    where
        F: Fn(ParseContext, String, ArgumentSpec) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<ArgValue>> + Send + 'static,
        N: Fn(&ArgumentSpec, bool) -> String + Send + Sync + 'static,
    {
        ArgParser::Described {
            parse: erase(parse),
            name: Arc::new(name),
        }
    }

    pub fn parse(
        &self,
        ctx: ParseContext,
        token: String,
        spec: ArgumentSpec,
    ) -> BoxFuture<'static, Option<ArgValue>> {
        match self {
            ArgParser::Bare(parse) | ArgParser::Described { parse, .. } => parse(ctx, token, spec),
        }
    }

    pub fn name(&self, spec: &ArgumentSpec, use_display_name: bool) -> Option<String> {
        match self {
            ArgParser::Bare(_) => None,
            ArgParser::Described { name, .. } => Some(name(spec, use_display_name)),
        }
    }
}

/// All parsers known to a client, keyed by type tag.
#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: HashMap<String, ArgParser>,
}

impl ParserRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `string`, `number`, `time`, `user`,
    /// `channel`, `role` and `message` parsers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        defaults::install(&mut registry);
        registry
    }

    /// Add a parser, replacing any previous one under the same tag.
    pub fn insert(&mut self, tag: impl Into<String>, parser: ArgParser) {
        self.parsers.insert(tag.into(), parser);
    }

    pub fn get(&self, tag: &str) -> Option<&ArgParser> {
        self.parsers.get(tag)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.parsers.contains_key(tag)
    }

    /// The parser's name for `spec`, falling back to the type tag.
    pub fn type_name(&self, spec: &ArgumentSpec, use_display_name: bool) -> String {
        self.get(&spec.kind)
            .and_then(|p| p.name(spec, use_display_name))
            .unwrap_or_else(|| spec.kind.clone())
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.parsers.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ParseContext {
        ParseContext::new(
            crate::types::Message {
                id: "1".into(),
                channel_id: "c".into(),
                guild_id: None,
                author: crate::types::User {
                    id: "u".into(),
                    username: "u".into(),
                },
                member: None,
                content: String::new(),
            },
            Arc::new(crate::types::MemoryDirectory::new()),
        )
    }

    #[tokio::test]
    async fn bare_and_described_parsers_share_call_shape() {
        let bare = ArgParser::bare(|_, token, _| async move { Some(ArgValue::Text(token)) });
        let described = ArgParser::described(
            |_, token: String, _| async move { token.parse().ok().map(ArgValue::Number) },
            |_, display| if display { "a whole number".into() } else { "int".into() },
        );
        let spec = ArgumentSpec::new("int", "n");

        assert_eq!(
            bare.parse(ctx(), "x".into(), spec.clone()).await,
            Some(ArgValue::Text("x".into()))
        );
        assert_eq!(
            described.parse(ctx(), "3".into(), spec.clone()).await,
            Some(ArgValue::Number(3.0))
        );
        assert!(bare.name(&spec, true).is_none());
        assert_eq!(described.name(&spec, true).as_deref(), Some("a whole number"));
    }

    #[test]
    fn type_name_falls_back_to_tag() {
        let mut registry = ParserRegistry::empty();
        registry.insert(
            "int",
            ArgParser::described(|_, _, _| async { None }, |_, _| "integer".into()),
        );
        registry.insert("raw", ArgParser::bare(|_, _, _| async { None }));

        assert_eq!(registry.type_name(&ArgumentSpec::new("int", "n"), true), "integer");
        assert_eq!(registry.type_name(&ArgumentSpec::new("raw", "n"), true), "raw");
        assert_eq!(registry.type_name(&ArgumentSpec::new("gone", "n"), true), "gone");
    }

    #[test]
    fn defaults_cover_builtin_tags() {
        let registry = ParserRegistry::with_defaults();
        for tag in ["string", "number", "time", "user", "channel", "role", "message"] {
            assert!(registry.contains(tag), "missing {tag}");
        }
    }
}
