//! Row keys and group names

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;

use crate::error::InvalidValueError;

/// Prefix used for generated group names
pub const DEFAULT_GROUP_PREFIX: &str = "SharedData";

/// Stable identifier of one row of a dataset
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Set of keys carried by a selection or filter channel
pub type KeySet = BTreeSet<Key>;

/// Build a key set from anything convertible into keys
pub fn key_set<I, T>(keys: I) -> KeySet
where
    I: IntoIterator<Item = T>,
    T: Into<Key>,
{
    keys.into_iter().map(Into::into).collect()
}

/// Parse a host-supplied value into a channel value.
///
/// `null` clears the channel; an array of strings or numbers becomes a key
/// set. Anything else is rejected.
pub fn key_set_from_json(value: &Value) -> Result<Option<KeySet>, InvalidValueError> {
    match value {
        Value::Null => Ok(None),
        Value::Array(items) => {
            let mut keys = KeySet::new();
            for (idx, item) in items.iter().enumerate() {
                let key = match item {
                    Value::String(s) => Key::new(s.as_str()),
                    Value::Number(n) => Key::new(n.to_string()),
                    other => {
                        return Err(InvalidValueError::new(format!(
                            "element {} is {}, expected a string or number",
                            idx,
                            json_kind(other)
                        )))
                    }
                };
                keys.insert(key);
            }
            Ok(Some(keys))
        }
        other => Err(InvalidValueError::new(format!(
            "expected null or an array of keys, got {}",
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Name of a group of linked datasets
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupName(String);

impl GroupName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Generate a process-unique name, isolating whoever uses it
    pub fn generate() -> Self {
        Self::generate_with_prefix(DEFAULT_GROUP_PREFIX)
    }

    pub fn generate_with_prefix(prefix: &str) -> Self {
        Self(format!("{}{}", prefix, uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for GroupName {
    fn from(value: String) -> Self {
        Self(value)
    }
}
