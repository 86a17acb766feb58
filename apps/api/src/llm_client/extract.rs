//! Pulls the JSON object a model embedded in free-form output.
//!
//! Models wrap their payload in prose, markdown fences or apologies. Only
//! top-level spans are candidates: each `{` outside a previous span starts
//! one, its matching `}` is found by tracking brace depth (ignoring braces
//! inside string literals), and the first span that parses as an object wins.
//! A span that fails to parse is skipped whole, so an inner object is never
//! returned in place of a malformed outer one.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no JSON object found in {source_name} output")]
    NoObject { source_name: String },

    #[error("invalid JSON in {source_name} output: {error}")]
    Parse {
        source_name: String,
        #[source]
        error: serde_json::Error,
    },
}

/// Extracts the first well-formed top-level JSON object from `text`.
///
/// `source_name` labels the producer (e.g. "brand alignment") in error messages.
pub fn extract_json_object(text: &str, source_name: &str) -> Result<Map<String, Value>, ExtractError> {
    let mut first_error: Option<serde_json::Error> = None;
    let mut resume_at = 0;

    for (start, _) in text.match_indices('{') {
        if start < resume_at {
            continue;
        }
        // Unbalanced: every later brace sits inside this span.
        let Some(end) = matching_brace(text, start) else {
            break;
        };
        resume_at = end + 1;
        match serde_json::from_str::<Value>(&text[start..=end]) {
            Ok(Value::Object(map)) => return Ok(map),
            Ok(_) => {}
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    if let Some(error) = first_error {
        return Err(ExtractError::Parse {
            source_name: source_name.to_string(),
            error,
        });
    }

    // No top-level span closed: fall back to the outermost first-'{' / last-'}' slice
    // so truncated or malformed output still reports a parse error.
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => {
            match serde_json::from_str::<Value>(&text[start..=end]) {
                Ok(Value::Object(map)) => Ok(map),
                Ok(_) => Err(no_object(source_name)),
                Err(error) => Err(ExtractError::Parse {
                    source_name: source_name.to_string(),
                    error,
                }),
            }
        }
        _ => Err(no_object(source_name)),
    }
}

fn no_object(source_name: &str) -> ExtractError {
    ExtractError::NoObject {
        source_name: source_name.to_string(),
    }
}

/// Byte index of the `}` closing the `{` at `start`, if the span is balanced.
fn matching_brace(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}
