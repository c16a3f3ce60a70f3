//! Global parameters, server identities and audit entries.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collection::Indexed;
use crate::error::{Error, Result};
use crate::selector::{ServerTag, server_tagged};

/// A named global configuration parameter with a scalar value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampedValue {
    name: String,
    value: Value,
    pub server_tags: BTreeSet<ServerTag>,
    pub modification_time: DateTime<Utc>,
}

impl StampedValue {
    /// # Errors
    ///
    /// Returns [`Error::BadValue`] for an empty name or a value that is not
    /// a string, integer, real or boolean.
    pub fn new(name: &str, value: impl Into<Value>) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::BadValue("global parameter name must not be empty".into()));
        }
        let value = value.into();
        match value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {}
            _ => {
                return Err(Error::BadValue(format!(
                    "global parameter '{name}' must be a scalar value, got {value}"
                )));
            }
        }
        Ok(Self {
            name: name.to_string(),
            value,
            server_tags: BTreeSet::new(),
            modification_time: Utc::now(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn as_integer(&self) -> Option<i64> {
        self.value.as_i64()
    }

    pub fn as_real(&self) -> Option<f64> {
        self.value.as_f64()
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.value.as_bool()
    }

    /// The value in text form; strings are returned without quotes.
    pub fn to_text(&self) -> String {
        match &self.value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

impl Indexed for StampedValue {
    type Key = String;
    type AltKey = ();

    fn key(&self) -> String {
        self.name.clone()
    }

    fn modification_time(&self) -> DateTime<Utc> {
        self.modification_time
    }
}

server_tagged!(StampedValue);

/// A server sharing the configuration store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub tag: ServerTag,
    pub description: String,
    pub modification_time: DateTime<Utc>,
}

impl Server {
    pub fn new(tag: ServerTag, description: &str) -> Self {
        Self {
            tag,
            description: description.to_string(),
            modification_time: Utc::now(),
        }
    }
}

impl Indexed for Server {
    type Key = ServerTag;
    type AltKey = ();

    fn key(&self) -> ServerTag {
        self.tag.clone()
    }

    fn modification_time(&self) -> DateTime<Utc> {
        self.modification_time
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditModification {
    Create,
    Update,
    Delete,
}

impl fmt::Display for AuditModification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One change recorded in a backend's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Kind of object changed, e.g. `"dhcp4_subnet"`.
    pub object_type: String,
    pub object_id: u64,
    pub modification_type: AuditModification,
    pub modification_time: DateTime<Utc>,
    pub revision_id: u64,
    pub log_message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamped_value_accepts_scalars_only() {
        let value = StampedValue::new("renew-timer", 900).unwrap();
        assert_eq!(value.as_integer(), Some(900));
        assert_eq!(value.to_text(), "900");

        let name = StampedValue::new("server-hostname", "srv1.example.org").unwrap();
        assert_eq!(name.to_text(), "srv1.example.org");

        assert_eq!(StampedValue::new("ratio", 0.5).unwrap().as_real(), Some(0.5));
        assert_eq!(StampedValue::new("echo", true).unwrap().as_bool(), Some(true));

        assert!(matches!(
            StampedValue::new("list", serde_json::json!([1, 2])),
            Err(Error::BadValue(_))
        ));
        assert!(StampedValue::new("map", serde_json::json!({"a": 1})).is_err());
        assert!(StampedValue::new("null", Value::Null).is_err());
        assert!(StampedValue::new("", 1).is_err());
    }

    #[test]
    fn test_audit_modification_display() {
        assert_eq!(AuditModification::Update.to_string(), "update");
        assert_eq!(
            serde_json::to_string(&AuditModification::Delete).unwrap(),
            "\"delete\""
        );
    }
}
