//! Open-ended item metadata
//!
//! Engines attach arbitrary keywords to the files they list. The core never
//! interprets them beyond handing them to the template renderer, so values
//! are kept as loosely typed as the persisted format allows.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata map attached to a remote entry or an indexed item.
pub type Metadata = BTreeMap<String, MetaValue>;

/// A single metadata value.
///
/// Strings and numbers are first-class; anything else an engine (or a newer
/// version of bdl) stored is preserved untouched in [`MetaValue::Other`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Other(serde_json::Value),
}

impl MetaValue {
    /// Integer view, if the value is integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Floating point view of numeric values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// String view of text values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
            Self::Other(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for MetaValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for MetaValue {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<u64> for MetaValue {
    fn from(n: u64) -> Self {
        i64::try_from(n).map_or(Self::Float(n as f64), Self::Integer)
    }
}

impl From<f64> for MetaValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn untagged_json_keeps_kinds() {
        let meta: Metadata =
            serde_json::from_str(r#"{"a": 3, "b": 2.5, "c": "x", "d": true}"#).unwrap();
        assert_eq!(meta["a"], MetaValue::Integer(3));
        assert_eq!(meta["b"], MetaValue::Float(2.5));
        assert_eq!(meta["c"], MetaValue::Text("x".into()));
        assert_eq!(meta["d"], MetaValue::Other(serde_json::Value::Bool(true)));

        let back = serde_json::to_string(&meta).unwrap();
        assert_eq!(back, r#"{"a":3,"b":2.5,"c":"x","d":true}"#);
    }

    #[test]
    fn display_is_plain() {
        assert_eq!(MetaValue::from("cat").to_string(), "cat");
        assert_eq!(MetaValue::from(42).to_string(), "42");
        assert_eq!(MetaValue::from(1.5).to_string(), "1.5");
    }

    #[test]
    fn numeric_views() {
        assert_eq!(MetaValue::from(7).as_f64(), Some(7.0));
        assert_eq!(MetaValue::Float(4.0).as_i64(), Some(4));
        assert_eq!(MetaValue::Float(4.5).as_i64(), None);
        assert_eq!(MetaValue::from("7").as_i64(), None);
    }
}
