//! `{{name}}` placeholder substitution

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Reserved variable that always holds the current recipient's address
pub const RECIPIENT_VARIABLE: &str = "email";

/// Template variables, kept sorted so substitution is reproducible
pub type Variables = BTreeMap<String, String>;

/// Replaces every `{{key}}` in `text` with the value of `key`.
///
/// Placeholders naming unknown keys are left untouched, and substituted values are never
/// expanded again, so a value containing `{{other}}` comes out verbatim.
pub fn substitute(text: &str, variables: &Variables) -> String {
    if text.is_empty() || variables.is_empty() {
        return text.to_string();
    }

    let mut output = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(OPEN) {
        output.push_str(&rest[..start]);

        let candidate = &rest[start + OPEN.len()..];

        match placeholder_at(candidate, variables) {
            Some((key, value)) => {
                output.push_str(value);
                rest = &candidate[key.len() + CLOSE.len()..];
            }
            None => {
                // Step over a single brace so `{{{key}}}` still resolves the inner placeholder
                output.push('{');
                rest = &rest[start + 1..];
            }
        }
    }

    output.push_str(rest);
    output
}

/// The longest key that `candidate` starts with and that is followed by `}}`.
///
/// Keys may themselves contain `}`, so the first `}}` after `{{` is not necessarily the end.
fn placeholder_at<'a>(candidate: &str, variables: &'a Variables) -> Option<(&'a str, &'a str)> {
    variables
        .iter()
        .filter(|(key, _)| {
            candidate
                .strip_prefix(key.as_str())
                .is_some_and(|tail| tail.starts_with(CLOSE))
        })
        .max_by_key(|(key, _)| key.len())
        .map(|(key, value)| (key.as_str(), value.as_str()))
}

/// Copies `globals` and sets [`RECIPIENT_VARIABLE`] to `recipient`, overriding any
/// caller-supplied value.
pub fn recipient_variables(globals: &Variables, recipient: &str) -> Variables {
    let mut variables = globals.clone();
    variables.insert(RECIPIENT_VARIABLE.to_string(), recipient.to_string());
    variables
}

/// Parses a flat JSON object into [`Variables`].
///
/// Malformed JSON, or JSON that is not an object, yields an empty map. String values are taken
/// as-is, anything else uses its JSON text (`42`, `true`, `null`).
pub fn parse_variables(json: &str) -> Variables {
    if json.trim().is_empty() {
        return Variables::new();
    }

    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(map)) => map
            .into_iter()
            .map(|(key, value)| match value {
                Value::String(s) => (key, s),
                other => (key, other.to_string()),
            })
            .collect(),
        Ok(other) => {
            warn!(kind = json_kind(&other), "variables are not a JSON object, ignoring");
            Variables::new()
        }
        Err(err) => {
            warn!(error = %err, "malformed variables JSON, ignoring");
            Variables::new()
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
