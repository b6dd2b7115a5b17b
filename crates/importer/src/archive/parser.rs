//! Archive export decoding.
//!
//! The `tweets.js` file in an export is a JavaScript assignment rather than
//! plain JSON:
//!
//! ```text
//! window.YTD.tweets.part0 = [ { "tweet": { ... } }, ... ]
//! ```
//!
//! Plain JSON files (as produced by third-party exporters) are accepted as-is.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::error::ParseError;

/// `<ident>(.<ident>)* =` at the very start of the file.
static ASSIGNMENT_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*\s*=\s*").unwrap()
});

/// Decode raw archive text into the list of entries it contains.
pub fn parse(raw: &str) -> Result<Vec<Value>, ParseError> {
    let value = match serde_json::from_str::<Value>(raw) {
        Ok(v) => v,
        Err(direct) => match strip_assignment(raw) {
            Some(body) => serde_json::from_str(body).map_err(ParseError::InvalidJson)?,
            None => return Err(ParseError::InvalidJson(direct)),
        },
    };

    match value {
        Value::Array(entries) => {
            tracing::debug!(entries = entries.len(), "Decoded archive");
            Ok(entries)
        }
        other => Err(ParseError::NotAnArray(kind_of(&other))),
    }
}

/// Strip a leading assignment and a trailing statement terminator.
fn strip_assignment(raw: &str) -> Option<&str> {
    let prefix = ASSIGNMENT_PREFIX.find(raw)?;
    let body = raw[prefix.end()..].trim_end();
    Some(body.strip_suffix(';').unwrap_or(body))
}

/// JSON type name, for error messages.
pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
