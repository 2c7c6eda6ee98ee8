//! Key/value property bag fed to templates and runbooks

use crate::error::PropertyError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

type Result<T> = std::result::Result<T, PropertyError>;

/// Ordered map from string keys to JSON values
///
/// Keys may contain dots (`nginx.log_dir`); they are plain keys, not paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, Value>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a JSON object from disk
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| PropertyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_str(&text).map_err(|source| PropertyError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        match value {
            Value::Object(map) => Ok(map.into_iter().collect()),
            _ => Err(PropertyError::NotAnObject {
                path: path.to_path_buf(),
            }),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> + '_ {
        self.0.iter()
    }

    /// Copy every entry of `other` over this bag; later values win
    pub fn merge(&mut self, other: &Self) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    fn require(&self, key: &str) -> Result<&Value> {
        self.0.get(key).ok_or_else(|| PropertyError::Missing {
            key: key.to_string(),
        })
    }

    fn wrong_type(key: &str, expected: &'static str, found: &Value) -> PropertyError {
        PropertyError::WrongType {
            key: key.to_string(),
            expected,
            found: kind(found),
        }
    }

    pub fn str(&self, key: &str) -> Result<&str> {
        let value = self.require(key)?;
        value
            .as_str()
            .ok_or_else(|| Self::wrong_type(key, "a string", value))
    }

    pub fn int(&self, key: &str) -> Result<i64> {
        let value = self.require(key)?;
        value
            .as_i64()
            .ok_or_else(|| Self::wrong_type(key, "an integer", value))
    }

    /// Integers are accepted and widened
    pub fn float(&self, key: &str) -> Result<f64> {
        let value = self.require(key)?;
        value
            .as_f64()
            .ok_or_else(|| Self::wrong_type(key, "a number", value))
    }

    pub fn bool(&self, key: &str) -> Result<bool> {
        let value = self.require(key)?;
        value
            .as_bool()
            .ok_or_else(|| Self::wrong_type(key, "a boolean", value))
    }

    /// Object whose values are all strings
    pub fn map(&self, key: &str) -> Result<BTreeMap<String, String>> {
        let value = self.require(key)?;
        let object = value
            .as_object()
            .ok_or_else(|| Self::wrong_type(key, "a map of strings", value))?;
        object
            .iter()
            .map(|(k, v)| {
                v.as_str()
                    .map(|s| (k.clone(), s.to_string()))
                    .ok_or_else(|| Self::wrong_type(key, "a map of strings", v))
            })
            .collect()
    }

    /// Array whose items are all strings
    pub fn slice(&self, key: &str) -> Result<Vec<String>> {
        let value = self.require(key)?;
        let items = value
            .as_array()
            .ok_or_else(|| Self::wrong_type(key, "a list of strings", value))?;
        items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| Self::wrong_type(key, "a list of strings", v))
            })
            .collect()
    }

    /// Copy with the values of `keys` replaced by `********`
    pub fn redacted<S: AsRef<str>>(&self, keys: &[S]) -> Self {
        let mut copy = self.clone();
        for key in keys {
            if let Some(value) = copy.0.get_mut(key.as_ref()) {
                *value = Value::String("********".to_string());
            }
        }
        copy
    }

    /// The bag as a JSON object, for template rendering
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect::<Map<_, _>>())
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(n) if n.is_f64() => "a float",
        Value::Number(_) => "an integer",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}

impl FromIterator<(String, Value)> for Properties {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[(&str, Value); N]> for Properties {
    fn from(entries: [(&str, Value); N]) -> Self {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }
}

/// One `key = value` per line, in key order
impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.0 {
            match value {
                Value::String(s) => writeln!(f, "{key} = {s}")?,
                other => writeln!(f, "{key} = {other}")?,
            }
        }
        Ok(())
    }
}
