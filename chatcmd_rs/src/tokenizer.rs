//! Message text to tokens.

use std::sync::OnceLock;

use regex::Regex;

fn regex_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([^"]*)"|'([^']*)'|(\S+)"#).expect("valid regex literal"))
}

/// Split raw text into tokens.
///
/// Double- or single-quoted spans become one token with the quotes stripped;
/// everything else splits on whitespace. An unterminated quote is an
/// ordinary character.
pub fn tokenize(input: &str) -> Vec<String> {
    regex_token()
        .captures_iter(input)
        .filter_map(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string())
        })
        .collect()
}

/// Find the first prefix `content` starts with, case-insensitively.
///
/// `<@!id>` nickname mentions are treated as `<@id>`. Returns the text after
/// the prefix.
pub fn strip_prefix<'a>(content: &str, prefixes: &'a [String]) -> Option<(&'a str, String)> {
    let normalized = content.replace("<@!", "<@");
    prefixes
        .iter()
        .filter(|p| !p.is_empty())
        .find_map(|p| {
            let len = caseless_prefix_len(&normalized, p)?;
            Some((p.as_str(), normalized[len..].to_string()))
        })
}

/// Byte length of the part of `text` matching `prefix`, comparing one char
/// at a time so the offset is always a boundary of `text` itself.
fn caseless_prefix_len(text: &str, prefix: &str) -> Option<usize> {
    let mut chars = text.char_indices();
    for expected in prefix.chars() {
        let (_, actual) = chars.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    Some(chars.next().map_or(text.len(), |(idx, _)| idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_spans_are_single_tokens() {
        assert_eq!(tokenize(r#"foo "bar baz" 'qux'"#), vec!["foo", "bar baz", "qux"]);
    }

    #[test]
    fn whitespace_runs_collapse() {
        assert_eq!(tokenize("  a \t b\n c  "), vec!["a", "b", "c"]);
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn unterminated_quote_is_literal() {
        assert_eq!(tokenize(r#"say "hello there"#), vec!["say", "\"hello", "there"]);
    }

    #[test]
    fn empty_quotes_yield_empty_token() {
        assert_eq!(tokenize(r#"set "" x"#), vec!["set", "", "x"]);
    }

    #[test]
    fn prefix_match_is_case_insensitive() {
        let prefixes = vec!["bot ".to_string(), "!".to_string()];
        let (used, rest) = strip_prefix("BOT ping now", &prefixes).expect("prefix");
        assert_eq!(used, "bot ");
        assert_eq!(rest, "ping now");
        assert!(strip_prefix("ping", &prefixes).is_none());
    }

    #[test]
    fn prefix_offsets_survive_case_mappings_that_change_length() {
        // 'ß' uppercases to "SS"; it must not stand in for two characters.
        let prefixes = vec!["ss".to_string()];
        assert!(strip_prefix("ßping", &prefixes).is_none());

        let prefixes = vec!["straße ".to_string()];
        assert!(strip_prefix("STRASSE ping", &prefixes).is_none());
        let (_, rest) = strip_prefix("STRAẞE ping", &prefixes).expect("prefix");
        assert_eq!(rest, "ping");

        let prefixes = vec!["é!".to_string()];
        let (_, rest) = strip_prefix("É!x", &prefixes).expect("prefix");
        assert_eq!(rest, "x");
    }

    #[test]
    fn nickname_mentions_are_normalized() {
        let prefixes = vec!["<@7> ".to_string()];
        let (_, rest) = strip_prefix("<@!7> help", &prefixes).expect("prefix");
        assert_eq!(rest, "help");
    }

    #[test]
    fn empty_prefix_never_matches() {
        let prefixes = vec![String::new()];
        assert!(strip_prefix("anything", &prefixes).is_none());
    }
}
