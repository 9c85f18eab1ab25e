//! Extraction of tool calls from free-form model output.
//!
//! The model is told to answer with
//!
//! ```json
//! {"tool_calls": [{"name": "tool_name", "arguments": {"arg1": "value1"}}]}
//! ```
//!
//! when it wants to use a capability. Models wrap that object in prose, fence it, or
//! emit it bare, so extraction is best-effort and lives behind the [`CallExtractor`]
//! trait: a stricter strategy (e.g. native structured output) can replace
//! [`JsonBlockExtractor`] without touching the orchestrator.
//!
//! Malformed JSON is never an error. A reply that merely looks structured is shown to
//! the user as a plain answer.

use crate::mcpchat::tool_protocol::Arguments;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Number, Value as JsonValue};

/// Key holding the invocation list inside the model's JSON object.
pub const TOOL_CALLS_KEY: &str = "tool_calls";

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("valid fenced block regex"));

/// One invocation request extracted from model output.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolCall {
    pub name: String,
    /// Raw arguments as emitted by the model; see [`normalize_arguments`].
    #[serde(default)]
    pub arguments: Arguments,
}

/// Strategy for finding tool calls in a model reply.
pub trait CallExtractor: Send + Sync {
    /// Returns the batch of calls the reply asks for, or `None` when it asks for none.
    /// Never returns an empty list.
    fn extract(&self, model_text: &str) -> Option<Vec<ToolCall>>;
}

/// Default strategy.
///
/// 1. The first ```` ```json ```` fenced block, if any, is the only candidate.
/// 2. Otherwise the whole trimmed reply, when it is delimited by `{` and `}`.
///
/// An object quoted inside prose is not a request.
/// Only one batch is taken per reply; later blocks are ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonBlockExtractor;

impl CallExtractor for JsonBlockExtractor {
    fn extract(&self, model_text: &str) -> Option<Vec<ToolCall>> {
        if let Some(captures) = FENCED_JSON.captures(model_text) {
            let block = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            return parse_tool_calls(block);
        }

        let trimmed = model_text.trim();
        if trimmed.starts_with('{') && trimmed.ends_with('}') {
            return parse_tool_calls(trimmed);
        }
        None
    }
}

/// Parse a JSON object and pull out its `tool_calls` list.
///
/// Entries that are not objects with a string `name` are skipped; an absent
/// `arguments` means no arguments.
fn parse_tool_calls(json_text: &str) -> Option<Vec<ToolCall>> {
    let parsed: JsonValue = match serde_json::from_str(json_text) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::debug!("No valid tool calls found in response: {}", e);
            return None;
        }
    };
    let entries = parsed.get(TOOL_CALLS_KEY)?.as_array()?;

    let calls: Vec<ToolCall> = entries
        .iter()
        .filter_map(|entry| match serde_json::from_value(entry.clone()) {
            Ok(call) => Some(call),
            Err(e) => {
                log::debug!("Skipping malformed tool call {}: {}", entry, e);
                None
            }
        })
        .collect();

    if calls.is_empty() {
        None
    } else {
        Some(calls)
    }
}

/// Largest magnitude at which every integral `f64` is exact (2^53).
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

/// Coerce numeric-looking string arguments to numbers.
///
/// Only lossless conversions happen: integer strings become integers when they fit
/// `i64`/`u64`, decimal strings become floats when finite and within the exactly
/// representable range. Strings with leading zeros (`"02139"`) are identifiers, not
/// numbers, and stay strings. Nested objects are walked recursively; every other
/// value (including arrays) is passed through unchanged.
pub fn normalize_arguments(arguments: Arguments) -> Arguments {
    arguments
        .into_iter()
        .map(|(key, value)| (key, normalize_value(value)))
        .collect()
}

fn normalize_value(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::String(text) => match parse_number(&text) {
            Some(number) => JsonValue::Number(number),
            None => JsonValue::String(text),
        },
        JsonValue::Object(map) => JsonValue::Object(normalize_arguments(map)),
        other => other,
    }
}

fn parse_number(text: &str) -> Option<Number> {
    let text = text.trim();
    let unsigned = text.strip_prefix(|c| c == '-' || c == '+').unwrap_or(text);
    if unsigned.is_empty() || has_leading_zero(unsigned) {
        return None;
    }

    if unsigned.bytes().all(|b| b.is_ascii_digit()) {
        // integer syntax never degrades to a float approximation
        return match text.parse::<i64>() {
            Ok(integer) => Some(Number::from(integer)),
            Err(_) => text.parse::<u64>().ok().map(Number::from),
        };
    }

    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite() && f.abs() <= MAX_EXACT_FLOAT)
        .and_then(Number::from_f64)
}

fn has_leading_zero(digits: &str) -> bool {
    let bytes = digits.as_bytes();
    bytes.len() > 1 && bytes[0] == b'0' && bytes[1].is_ascii_digit()
}
