//! JSON-mode response handling.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::repair::repair_parse;
use crate::{Error, Result};

/// What to do with a JSON-mode response that cannot be parsed even after
/// repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonRepairPolicy {
    /// Fail the attempt with [`Error::JsonParse`], which the pipeline retries.
    #[default]
    Strict,
    /// Wrap the raw text as `{"content": text}`.
    Lenient,
}

/// Parse a JSON-mode response.
///
/// `provider_enforced` responses were produced under a JSON response format and
/// are parsed strictly; anything else goes through [`repair_parse`] first.
/// Only objects and arrays count as structured output: a bare scalar such as
/// `42`, `None` or `"text"` is treated like unparsable text.
pub fn parse_json_response(
    text: &str,
    provider_enforced: bool,
    policy: JsonRepairPolicy,
) -> Result<Value> {
    let parsed = if provider_enforced {
        serde_json::from_str::<Value>(text.trim()).ok()
    } else {
        repair_parse(text)
    };

    match (parsed.filter(is_structured), policy) {
        (Some(value), _) => Ok(value),
        (None, JsonRepairPolicy::Lenient) => Ok(serde_json::json!({ "content": text })),
        (None, JsonRepairPolicy::Strict) => Err(Error::json_parse(
            if provider_enforced {
                "response is not a JSON object or array"
            } else {
                "response could not be repaired into a JSON object or array"
            },
            text,
        )),
    }
}

fn is_structured(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

/// Coerce a value to structured data: strings are re-parsed with the repair
/// parser, and anything that does not yield an object or array is returned
/// unchanged.
pub fn coerce_structured(value: Value) -> Value {
    match value {
        Value::String(s) => match repair_parse(&s).filter(is_structured) {
            Some(parsed) => parsed,
            None => Value::String(s),
        },
        other => other,
    }
}
