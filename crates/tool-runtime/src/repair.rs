//! Lenient parsing of tool arguments.
//!
//! Models tend to write `Action Input` as the body of an object literal:
//! unquoted keys, no surrounding brackets, several objects separated by
//! commas (`{x:1,y:2},{x:3,y:4}` or just `x:1,y:2`). This module wraps the
//! text into a sequence, quotes bare keys, and parses the result as JSON.

use serde_json::Value;

use crate::shape::ShapeParams;

/// Observation returned to the model when its arguments cannot be parsed.
pub const INVALID_ARG: &str = "invalid arg";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgError {
    #[error("empty argument text")]
    Empty,
    #[error("malformed arguments: {message} (repaired text: {repaired})")]
    Malformed { repaired: String, message: String },
}

/// Wrap raw argument text so comma-separated objects read as one sequence.
///
/// A bare object body (`x:1,y:2`, no leading brace or bracket) is first
/// wrapped into a single object.
pub fn wrap_as_sequence(raw: &str) -> String {
    let raw = raw.trim();
    if !raw.starts_with('{') && !raw.starts_with('[') && raw.contains(':') {
        format!("[{{{}}}]", raw)
    } else {
        format!("[{}]", raw)
    }
}

/// Quote every bare identifier that is immediately followed by a colon
/// (whitespace allowed in between).
///
/// Double-quoted string literals are copied through untouched, including
/// escaped quotes, so a colon inside a quoted value is never taken for a key
/// separator and already-quoted keys are not quoted twice.
pub fn quote_bare_keys(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '"' {
            out.push(c);
            i += 1;
            while i < chars.len() {
                let s = chars[i];
                out.push(s);
                i += 1;
                if s == '\\' {
                    if let Some(&escaped) = chars.get(i) {
                        out.push(escaped);
                        i += 1;
                    }
                } else if s == '"' {
                    break;
                }
            }
            continue;
        }

        if is_word_char(c) {
            let start = i;
            while i < chars.len() && is_word_char(chars[i]) {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();

            let mut lookahead = i;
            while lookahead < chars.len() && chars[lookahead].is_whitespace() {
                lookahead += 1;
            }
            if chars.get(lookahead) == Some(&':') {
                out.push('"');
                out.push_str(&word);
                out.push('"');
            } else {
                out.push_str(&word);
            }
            continue;
        }

        out.push(c);
        i += 1;
    }

    out
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Parse raw argument text into the elements of a JSON sequence.
pub fn parse_sequence(raw: &str) -> Result<Vec<Value>, ArgError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ArgError::Empty);
    }

    let repaired = quote_bare_keys(&wrap_as_sequence(trimmed));
    match serde_json::from_str::<Value>(&repaired) {
        // `[{...},{...}]` written by the model arrives double-wrapped.
        Ok(Value::Array(mut items)) if items.len() == 1 && items[0].is_array() => {
            match items.pop() {
                Some(Value::Array(inner)) => Ok(inner),
                _ => Ok(items),
            }
        }
        Ok(Value::Array(items)) => Ok(items),
        Ok(other) => Ok(vec![other]),
        Err(e) => Err(ArgError::Malformed {
            message: e.to_string(),
            repaired,
        }),
    }
}

/// Parse raw argument text into shape records, one per element.
pub fn parse_shape_args(raw: &str) -> Result<Vec<ShapeParams>, ArgError> {
    Ok(parse_sequence(raw)?
        .into_iter()
        .map(ShapeParams::from_value)
        .collect())
}
