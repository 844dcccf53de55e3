//! Sequential argument resolution.

use std::collections::VecDeque;

use tracing::debug;

use super::{ArgumentSpec, Parsed, ParsedArguments, ParseContext, ParserRegistry};
use crate::error::ArgumentError;

/// Parsed values plus the tokens no spec consumed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolved {
    pub parsed: ParsedArguments,
    pub leftover: Vec<String>,
}

/// Walk `specs` in order against `tokens`.
///
/// Parsing is strictly sequential: each parser is awaited before the next
/// spec looks at the token list, because an optional spec that rejects its
/// token leaves it for the specs after it.
pub async fn resolve_arguments(
    specs: &[ArgumentSpec],
    tokens: Vec<String>,
    registry: &ParserRegistry,
    ctx: &ParseContext,
) -> Result<Resolved, ArgumentError> {
    let mut tokens: VecDeque<String> = tokens.into();
    let mut parsed = ParsedArguments::new();

    for (index, spec) in specs.iter().enumerate() {
        let Some(token) = tokens.front().cloned() else {
            if spec.optional {
                continue;
            }
            let required = specs[index..].iter().filter(|s| !s.optional).count();
            return Err(ArgumentError::Insufficient { required });
        };

        let parser = registry
            .get(&spec.kind)
            .ok_or_else(|| ArgumentError::UnknownParser(spec.kind.clone()))?;

        if spec.accept_multiple {
            tokens.pop_front();
            let mut values = Vec::new();
            for piece in token.split(spec.delimiter.as_str()).take(spec.limit) {
                match parser.parse(ctx.clone(), piece.to_string(), spec.clone()).await {
                    Some(value) => values.push(value),
                    None => {
                        return Err(ArgumentError::InvalidPiece {
                            index,
                            piece: piece.to_string(),
                        });
                    }
                }
            }
            parsed.insert(&spec.name, Parsed::Many(values));
            continue;
        }

        match parser.parse(ctx.clone(), token, spec.clone()).await {
            Some(value) => {
                tokens.pop_front();
                parsed.insert(&spec.name, Parsed::One(value));
            }
            None if spec.optional => {
                debug!(argument = %spec.name, "optional argument rejected token, leaving it");
            }
            None => {
                return Err(ArgumentError::InvalidValue {
                    index,
                    expected: registry.type_name(spec, true),
                });
            }
        }
    }

    Ok(Resolved {
        parsed,
        leftover: tokens.into(),
    })
}
