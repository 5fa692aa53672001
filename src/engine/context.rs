//! Request Context & Placeholder Substitution
//!
//! Policy documents are owner-authored and stored; at resolution time
//! their `$ctx.<name>` leaves are replaced with request-scoped values.
//! Substitution is string-prefix matching plus an allow-listed lookup,
//! never expression evaluation.

use serde_json::{Map, Value};

/// Prefix marking a context placeholder in a stored policy document.
const CTX_PREFIX: &str = "$ctx.";

/// Request-scoped identity values available to policy templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermContext {
    pub user_id: String,
    pub org_id: Option<String>,
    pub base_id: String,
}

impl PermContext {
    pub fn new(user_id: impl Into<String>, org_id: Option<String>, base_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            org_id,
            base_id: base_id.into(),
        }
    }

    /// Resolve an allow-listed context name. Unrecognized names resolve
    /// to null so a typo in a policy can never widen access.
    fn lookup(&self, name: &str) -> Value {
        match name {
            "userId" => Value::String(self.user_id.clone()),
            "orgId" => self
                .org_id
                .as_ref()
                .map(|o| Value::String(o.clone()))
                .unwrap_or(Value::Null),
            "baseId" => Value::String(self.base_id.clone()),
            _ => Value::Null,
        }
    }

    /// Recursively rebuild a JSON-like document, replacing `$ctx.<name>`
    /// leaf strings with their runtime values.
    pub fn substitute(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => {
                if let Some(name) = s.strip_prefix(CTX_PREFIX) {
                    self.lookup(name)
                } else {
                    value.clone()
                }
            }
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.substitute(v)).collect())
            }
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.substitute(v));
                }
                Value::Object(out)
            }
            _ => value.clone(),
        }
    }
}
