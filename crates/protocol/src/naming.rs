//! snake_case / camelCase conversion for JSON keys.
//!
//! The wire protocol is snake_case; `--camel` output and camelCase request
//! bodies go through these helpers.

use serde_json::{Map, Value};

#[must_use]
pub fn snake_to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for ch in key.chars() {
        if ch == '_' && !out.is_empty() {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

#[must_use]
pub fn camel_to_snake(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            if !out.is_empty() {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Rewrite every object key (recursively) to camelCase.
#[must_use]
pub fn camelize_keys(value: Value) -> Value {
    rename_keys(value, &snake_to_camel)
}

/// Rewrite every object key (recursively) to snake_case.
#[must_use]
pub fn snakify_keys(value: Value) -> Value {
    rename_keys(value, &camel_to_snake)
}

fn rename_keys(value: Value, rename: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (rename(&key), rename_keys(value, rename)))
                .collect::<Map<_, _>>(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| rename_keys(v, rename)).collect())
        }
        other => other,
    }
}
