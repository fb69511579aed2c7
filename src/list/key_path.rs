use crate::core::{DbError, Result, Value};
use std::fmt;

/// Dotted property path such as `"array.stringCol"`; `"self"` is the empty path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    pub fn parse(path: &str) -> Result<Self> {
        let path = path.trim();
        if path == "self" {
            return Ok(Self::default());
        }
        let segments: Vec<String> = path.split('.').map(|s| s.trim().to_string()).collect();
        if segments.iter().any(|s| s.is_empty() || s == "self") {
            return Err(DbError::InvalidKeyPath(format!("'{}'", path)));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_self(&self) -> bool {
        self.segments.is_empty()
    }

    /// First segment and the path after it
    pub fn split_first(&self) -> Option<(&str, KeyPath)> {
        let (first, rest) = self.segments.split_first()?;
        Some((
            first.as_str(),
            KeyPath {
                segments: rest.to_vec(),
            },
        ))
    }

    /// Path without its last segment, and the last segment
    pub fn split_last(&self) -> Option<(KeyPath, &str)> {
        let (last, init) = self.segments.split_last()?;
        Some((
            KeyPath {
                segments: init.to_vec(),
            },
            last.as_str(),
        ))
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_self() {
            write!(f, "self")
        } else {
            write!(f, "{}", self.segments.join("."))
        }
    }
}

/// Anything a key path can be evaluated against.
///
/// Every step through a list contributes all of its elements, in order, so
/// the result of a path is a flat sequence.
pub trait PropertySource {
    fn values_at(&self, path: &KeyPath) -> Result<Vec<Value>>;
}

impl PropertySource for Value {
    fn values_at(&self, path: &KeyPath) -> Result<Vec<Value>> {
        match self {
            Value::Object(object) => object.values_at(path),
            _ if path.is_self() => Ok(vec![self.clone()]),
            Value::Null => Ok(vec![Value::Null]),
            other => Err(DbError::TypeMismatch(format!(
                "Key path '{}' applied to a {} value",
                path,
                other.type_name()
            ))),
        }
    }
}
