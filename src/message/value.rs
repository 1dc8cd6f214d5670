//! Parameter values

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Named message parameters, kept in key order
pub type Params = BTreeMap<String, Value>;

/// A parameter value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Text(String),
    Integer(i64),
    Flag(bool),
    /// Structured value (nested parameters)
    Fields(Params),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integers, or text that parses as one
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Value::Flag(b) => Some(*b),
            Value::Text(s) => match s.as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_fields(&self) -> Option<&Params> {
        match self {
            Value::Fields(p) => Some(p),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Integer(n as i64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Flag(b)
    }
}

impl From<Params> for Value {
    fn from(p: Params) -> Self {
        Value::Fields(p)
    }
}

/// Build a [`Params`] map from `key => value` pairs.
///
/// ```
/// use switchboard::params;
/// let p = params! { "party-b" => "sip:alice@example.com", "time-to-live" => 300i64 };
/// assert_eq!(p.len(), 2);
/// ```
#[macro_export]
macro_rules! params {
    () => { $crate::message::Params::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::message::Params::new();
        $( map.insert(::std::string::String::from($key), $crate::message::Value::from($value)); )+
        map
    }};
}
