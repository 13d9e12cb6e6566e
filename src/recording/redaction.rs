//! Redaction Strategy
//!
//! Sanitizes captured values before serialization. Two layers apply at every
//! depth of the value graph: content patterns on string values (token-like
//! base64 runs, JWTs, known API key prefixes) and sensitive field names.
//! Content patterns win over field names so that a JWT stored under `token`
//! is reported as a JWT rather than a generic redaction.
//!
//! Redaction never fails: anything it cannot inspect is replaced by the
//! generic marker.

use regex::Regex;
use serde_json::Value;

use crate::sources::{FieldTag, TypeDescriptor};

pub const REDACTED: &str = "[REDACTED]";
pub const POTENTIAL_TOKEN_REDACTED: &str = "[POTENTIAL_TOKEN_REDACTED]";
pub const JWT_REDACTED: &str = "[JWT_REDACTED]";
pub const API_KEY_REDACTED: &str = "[API_KEY_REDACTED]";

const SENSITIVE_NAME_PARTS: &[&str] = &[
    "password",
    "token",
    "secret",
    "key",
    "auth",
    "credential",
    "api_key",
    "apikey",
    "access_token",
    "refresh_token",
    "bearer",
    "private",
    "session",
];

const API_KEY_PREFIXES: &[&str] = &["sk_", "pk_", "bearer ", "basic "];

/// Result of sanitizing one captured value.
#[derive(Debug, Clone)]
pub struct RedactionOutcome {
    pub value: Value,
    pub redacted_count: u64,
}

pub trait RedactionStrategy: Send + Sync {
    /// Sanitize a captured value. `descriptor` supplies per-field `Redact`
    /// and `Ignore` tags for the top-level fields.
    fn redact(&self, value: Value, descriptor: &TypeDescriptor) -> RedactionOutcome;
}

/// Default field-name and content-pattern based strategy.
pub struct DefaultRedaction {
    base64_run: Regex,
    jwt: Regex,
}

impl DefaultRedaction {
    pub fn new() -> Self {
        Self {
            base64_run: Regex::new(r"^[A-Za-z0-9+/=]{20,}$").expect("valid base64 pattern"),
            jwt: Regex::new(r"^eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+$")
                .expect("valid jwt pattern"),
        }
    }

    fn redact_string(&self, s: &str) -> Option<&'static str> {
        if s.len() <= 16 {
            return None;
        }
        if self.base64_run.is_match(s) {
            return Some(POTENTIAL_TOKEN_REDACTED);
        }
        if self.jwt.is_match(s) {
            return Some(JWT_REDACTED);
        }
        let lowered = s.to_lowercase();
        if API_KEY_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
            return Some(API_KEY_REDACTED);
        }
        None
    }

    fn walk(&self, value: Value, count: &mut u64) -> Value {
        match value {
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (name, inner) in map {
                    out.insert(name.clone(), self.field(&name, inner, count));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.walk(item, count))
                    .collect(),
            ),
            Value::String(s) => match self.redact_string(&s) {
                Some(marker) => {
                    *count += 1;
                    Value::String(marker.to_string())
                }
                None => Value::String(s),
            },
            other => other,
        }
    }

    fn field(&self, name: &str, value: Value, count: &mut u64) -> Value {
        // Content patterns first: a JWT under `token` reports as a JWT.
        if let Value::String(s) = &value {
            if let Some(marker) = self.redact_string(s) {
                *count += 1;
                return Value::String(marker.to_string());
            }
        }
        if name_is_sensitive(name) {
            *count += 1;
            return Value::String(REDACTED.to_string());
        }
        self.walk(value, count)
    }
}

impl Default for DefaultRedaction {
    fn default() -> Self {
        Self::new()
    }
}

impl RedactionStrategy for DefaultRedaction {
    fn redact(&self, value: Value, descriptor: &TypeDescriptor) -> RedactionOutcome {
        let mut count = 0u64;

        let value = match value {
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (name, inner) in map {
                    if descriptor
                        .fields
                        .iter()
                        .any(|f| f.name == name && f.has_tag(FieldTag::Ignore))
                    {
                        continue;
                    }
                    if descriptor
                        .fields
                        .iter()
                        .any(|f| f.name == name && f.has_tag(FieldTag::Redact))
                    {
                        count += 1;
                        out.insert(name, Value::String(REDACTED.to_string()));
                        continue;
                    }
                    out.insert(name.clone(), self.field(&name, inner, &mut count));
                }
                Value::Object(out)
            }
            other => self.walk(other, &mut count),
        };

        RedactionOutcome {
            value,
            redacted_count: count,
        }
    }
}

fn name_is_sensitive(name: &str) -> bool {
    let lowered = name.to_lowercase();
    SENSITIVE_NAME_PARTS.iter().any(|p| lowered.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{FieldDescriptor, TypeShape};
    use serde_json::json;

    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::new("app::Credentials", TypeShape::PureData)
    }

    fn redact(value: Value) -> Value {
        DefaultRedaction::new().redact(value, &descriptor()).value
    }

    #[test]
    fn test_sensitive_names_redacted() {
        let out = redact(json!({
            "username": "alice",
            "password": "hunter2",
            "Api_Key": "short",
        }));
        assert_eq!(out["username"], "alice");
        assert_eq!(out["password"], REDACTED);
        assert_eq!(out["Api_Key"], REDACTED);
    }

    #[test]
    fn test_jwt_wins_over_field_name() {
        let out = redact(json!({
            "username": "alice",
            "password": "hunter2",
            "token": "eyJhbGciOi.J1c2VyIjo.xyz",
        }));
        assert_eq!(out["username"], "alice");
        assert_eq!(out["password"], REDACTED);
        assert_eq!(out["token"], JWT_REDACTED);
    }

    #[test]
    fn test_base64_run_detected() {
        let out = redact(json!({"blob": "QUJDREVGR0hJSktMTU5PUA=="}));
        assert_eq!(out["blob"], POTENTIAL_TOKEN_REDACTED);
    }

    #[test]
    fn test_api_key_prefixes_detected() {
        let out = redact(json!({
            "a": "sk_live_4eC39HqLyjWDarjtT1",
            "b": "Bearer abcdefghijklmnop",
        }));
        assert_eq!(out["a"], API_KEY_REDACTED);
        assert_eq!(out["b"], API_KEY_REDACTED);
    }

    #[test]
    fn test_short_strings_untouched() {
        let out = redact(json!({"note": "sk_short"}));
        assert_eq!(out["note"], "sk_short");
    }

    #[test]
    fn test_redaction_recurses_into_nested_values() {
        let out = redact(json!({
            "profile": {
                "secret": "deep",
                "items": [{"password": "x"}, "eyJhbGciOi.J1c2VyIjo.xyz"],
            }
        }));
        assert_eq!(out["profile"]["secret"], REDACTED);
        assert_eq!(out["profile"]["items"][0]["password"], REDACTED);
        assert_eq!(out["profile"]["items"][1], JWT_REDACTED);
    }

    #[test]
    fn test_field_tags_override_names() {
        let descriptor = TypeDescriptor::new("app::Profile", TypeShape::PureData)
            .with_field(FieldDescriptor::new("nickname", "String").with_tag(FieldTag::Redact))
            .with_field(FieldDescriptor::new("scratch", "String").with_tag(FieldTag::Ignore));

        let outcome = DefaultRedaction::new().redact(
            json!({"nickname": "al", "scratch": "tmp", "kept": 1}),
            &descriptor,
        );
        assert_eq!(outcome.value["nickname"], REDACTED);
        assert!(outcome.value.get("scratch").is_none());
        assert_eq!(outcome.value["kept"], 1);
        assert_eq!(outcome.redacted_count, 1);
    }

    #[test]
    fn test_redacted_count() {
        let outcome = DefaultRedaction::new().redact(
            json!({"password": "hunter2", "token": "eyJhbGciOi.J1c2VyIjo.xyz", "ok": true}),
            &descriptor(),
        );
        assert_eq!(outcome.redacted_count, 2);
    }
}
