//! Redaction of sensitive fields before an event ever reaches the broadcaster.
//!
//! Spec §4.1: fields marked sensitive (API keys in tool arguments, bearer
//! tokens, env values matching a configured pattern set) are replaced with
//! `"<redacted>"` before emission — not after, and not by the transport.

use regex::RegexSet;
use serde_json::Value;

const REDACTED: &str = "<redacted>";

const DEFAULT_KEY_PATTERNS: &[&str] = &[
    r"(?i)api[_-]?key",
    r"(?i)authorization",
    r"(?i)bearer",
    r"(?i)secret",
    r"(?i)token",
    r"(?i)password",
    r"(?i)access[_-]?key",
];

/// Compiled set of key-name patterns considered sensitive.
pub struct Redactor {
    key_patterns: RegexSet,
}

impl Redactor {
    pub fn new(extra_patterns: &[&str]) -> Self {
        let patterns: Vec<&str> = DEFAULT_KEY_PATTERNS
            .iter()
            .copied()
            .chain(extra_patterns.iter().copied())
            .collect();
        Self {
            key_patterns: RegexSet::new(patterns).expect("redaction patterns must compile"),
        }
    }

    fn key_is_sensitive(&self, key: &str) -> bool {
        self.key_patterns.is_match(key)
    }

    /// Recursively walk a JSON value, replacing the value of any object key
    /// that matches a sensitive pattern with `"<redacted>"`. Arrays and
    /// nested objects are walked through; non-object/array leaves pass
    /// through untouched (there is nothing to key-match against a bare
    /// string or number at the top level).
    ///
    /// Also covers the env-var shape spec §4.1 calls out separately ("env
    /// values matching a configured pattern set"): `{"name": "API_KEY",
    /// "value": "..."}`, where the sensitive name lives in a sibling field
    /// rather than as the object key itself. When a `name`/`key` field's
    /// *string value* matches the pattern set, the sibling `value` field is
    /// redacted too.
    pub fn redact_value(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let name_field_is_sensitive = ["name", "key"].iter().any(|field| {
                    map.get(*field)
                        .and_then(Value::as_str)
                        .is_some_and(|s| self.key_is_sensitive(s))
                });
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    if self.key_is_sensitive(k) || (k == "value" && name_field_is_sensitive) {
                        out.insert(k.clone(), Value::String(REDACTED.to_string()));
                    } else {
                        out.insert(k.clone(), self.redact_value(v));
                    }
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact_value(v)).collect()),
            other => other.clone(),
        }
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(&[])
    }
}
