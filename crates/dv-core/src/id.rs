//! Record identifiers

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Identifier of a record within a table: an integer or a string
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Int(i64),
    Str(String),
}

impl Id {
    /// Generate a random unique string id
    pub fn generate() -> Self {
        Id::Str(uuid::Uuid::new_v4().to_string())
    }

    /// Read an id out of a field value. Only strings and integral numbers
    /// qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Id::Str(s.clone())),
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() && n.abs() < 9.0e15 => {
                Some(Id::Int(*n as i64))
            }
            _ => None,
        }
    }

    /// The value written into a record's id field
    pub fn to_value(&self) -> Value {
        match self {
            Id::Int(n) => Value::Number(*n as f64),
            Id::Str(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Int(n) => write!(f, "{}", n),
            Id::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Int(n)
    }
}

impl From<i32> for Id {
    fn from(n: i32) -> Self {
        Id::Int(n as i64)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::Str(s.to_string())
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::Str(s)
    }
}

impl From<&Id> for Id {
    fn from(id: &Id) -> Self {
        id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_value() {
        assert_eq!(Id::from_value(&Value::from(3)), Some(Id::Int(3)));
        assert_eq!(Id::from_value(&Value::from("a")), Some(Id::from("a")));
        assert_eq!(Id::from_value(&Value::from(1.5)), None);
        assert_eq!(Id::from_value(&Value::Null), None);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(Id::generate(), Id::generate());
    }
}
