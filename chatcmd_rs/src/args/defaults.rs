//! Built-in argument parsers.
//!
//! Lookups go through the [`Directory`](crate::types::Directory) carried by the
//! parse context, so the same parsers work against a live gateway cache or the
//! in-memory directory.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use super::{ArgParser, ArgValue, ArgumentSpec, ParseContext, ParserRegistry};
use crate::command::eq_ignore_case;

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid regex literal")
}

fn regex_user_mention() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"^<@!?(\d+)>$"))
}

fn regex_channel_mention() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"^<#(\d+)>$"))
}

fn regex_role_mention() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"^<@&(\d+)>$"))
}

fn regex_duration_part() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex(
            r"(?i)(\d+(?:\.\d+)?)\s*(milliseconds?|msecs?|ms|seconds?|secs?|s|minutes?|mins?|m|hours?|hrs?|h|days?|d|weeks?|wks?|w)",
        )
    })
}

pub(crate) fn install(registry: &mut ParserRegistry) {
    registry.insert("string", ArgParser::bare(parse_string));
    registry.insert("number", ArgParser::bare(parse_number));
    registry.insert("time", ArgParser::bare(parse_time));
    registry.insert("user", ArgParser::bare(parse_user));
    registry.insert("channel", ArgParser::bare(parse_channel));
    registry.insert("role", ArgParser::bare(parse_role));
    registry.insert("message", ArgParser::bare(parse_message));
}

async fn parse_string(_: ParseContext, token: String, _: ArgumentSpec) -> Option<ArgValue> {
    Some(ArgValue::Text(token))
}

async fn parse_number(_: ParseContext, token: String, _: ArgumentSpec) -> Option<ArgValue> {
    parse_finite(&token).map(ArgValue::Number)
}

async fn parse_time(_: ParseContext, token: String, _: ArgumentSpec) -> Option<ArgValue> {
    parse_duration(&token).map(ArgValue::Duration)
}

async fn parse_user(ctx: ParseContext, token: String, _: ArgumentSpec) -> Option<ArgValue> {
    let members = ctx.directory.members(ctx.message.guild_id.as_deref());

    if let Some(id) = snowflake(&token, regex_user_mention()) {
        if let Some(member) = members.iter().find(|m| m.user.id == id) {
            return Some(ArgValue::User(member.user.clone()));
        }
        return ctx.directory.fetch_user(&id).await.map(ArgValue::User);
    }

    let mut matches = members.iter().filter(|m| {
        eq_ignore_case(&m.user.username, &token)
            || m.nickname.as_deref().is_some_and(|n| eq_ignore_case(n, &token))
    });
    unique(&mut matches).map(|m| ArgValue::User(m.user.clone()))
}

async fn parse_channel(ctx: ParseContext, token: String, _: ArgumentSpec) -> Option<ArgValue> {
    let guild_id = ctx.message.guild_id.as_deref()?;
    let channels = ctx.directory.channels(guild_id);

    if let Some(id) = snowflake(&token, regex_channel_mention()) {
        return channels
            .into_iter()
            .find(|c| c.id == id)
            .map(ArgValue::Channel);
    }

    let mut matches = channels.iter().filter(|c| eq_ignore_case(&c.name, &token));
    unique(&mut matches).cloned().map(ArgValue::Channel)
}

async fn parse_role(ctx: ParseContext, token: String, _: ArgumentSpec) -> Option<ArgValue> {
    let guild_id = ctx.message.guild_id.as_deref()?;
    let roles = ctx.directory.roles(guild_id);

    if let Some(id) = snowflake(&token, regex_role_mention()) {
        return roles.into_iter().find(|r| r.id == id).map(ArgValue::Role);
    }

    let wanted: String = token.chars().filter(|c| *c != '"' && *c != '\'').collect();
    let mut matches = roles.iter().filter(|r| eq_ignore_case(&r.name, &wanted));
    unique(&mut matches).cloned().map(ArgValue::Role)
}

async fn parse_message(ctx: ParseContext, token: String, _: ArgumentSpec) -> Option<ArgValue> {
    if !is_numeric_id(&token) {
        return None;
    }
    ctx.directory
        .fetch_message(&ctx.message.channel_id, &token)
        .await
        .map(|m| ArgValue::Message(Box::new(m)))
}

fn parse_finite(token: &str) -> Option<f64> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Parse `1h30m`, `90s`, `2 days`, `1.5 hours`. A bare number is milliseconds.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let trimmed = input.trim();
    if let Some(ms) = parse_finite(trimmed) {
        return (ms >= 0.0)
            .then(|| Duration::try_from_secs_f64(ms / 1000.0).ok())
            .flatten();
    }

    let mut total_ms = 0.0;
    let mut cursor = 0;
    let mut matched = false;
    for caps in regex_duration_part().captures_iter(trimmed) {
        let whole = caps.get(0)?;
        if !is_separator(&trimmed[cursor..whole.start()]) {
            return None;
        }
        let amount: f64 = caps[1].parse().ok()?;
        total_ms += amount * unit_millis(&caps[2])?;
        cursor = whole.end();
        matched = true;
    }

    if !matched || !is_separator(&trimmed[cursor..]) {
        return None;
    }
    // Amounts past `Duration::MAX` are rejected, not clamped.
    Duration::try_from_secs_f64(total_ms / 1000.0).ok()
}

fn is_separator(gap: &str) -> bool {
    gap.chars().all(|c| c.is_whitespace() || c == ',')
}

fn unit_millis(unit: &str) -> Option<f64> {
    let unit = unit.to_ascii_lowercase();
    let ms = match unit.as_str() {
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => 1_000.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60_000.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600_000.0,
        "d" | "day" | "days" => 86_400_000.0,
        "w" | "wk" | "wks" | "week" | "weeks" => 604_800_000.0,
        _ => return None,
    };
    Some(ms)
}

fn is_numeric_id(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_digit())
}

/// Raw id, or the id inside a mention matching `mention`.
fn snowflake(token: &str, mention: &Regex) -> Option<String> {
    if is_numeric_id(token) {
        return Some(token.to_string());
    }
    mention.captures(token).map(|caps| caps[1].to_string())
}

fn unique<T>(matches: &mut impl Iterator<Item = T>) -> Option<T> {
    let first = matches.next()?;
    matches.next().is_none().then_some(first)
}
