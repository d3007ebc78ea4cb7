//! Typed config values.

use std::fmt;

/// A config value, typed by how it was written.
///
/// `yes`, `on` and `true` read as `Bool(true)`; `no`, `off` and `false` as
/// `Bool(false)`; a decimal without a leading zero as `Int`. Anything else
/// stays a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    String(String),
}

impl Value {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "yes" | "on" | "true" => Value::Bool(true),
            "no" | "off" | "false" => Value::Bool(false),
            _ => match parse_int(raw) {
                Some(n) => Value::Int(n),
                None => Value::String(raw.to_owned()),
            },
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(n) => Some(*n != 0),
            Value::String(_) => None,
        }
    }

    /// The value as an integer. Strings such as `0` that stayed strings
    /// only because of their leading zero are read as decimals too.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

/// `-?[1-9][0-9]*`, within `i64`.
fn parse_int(raw: &str) -> Option<i64> {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    let mut bytes = digits.bytes();
    match bytes.next() {
        Some(b'1'..=b'9') => {}
        _ => return None,
    }
    if !bytes.all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booleans() {
        for raw in ["yes", "on", "true"] {
            assert_eq!(Value::parse(raw), Value::Bool(true));
        }
        for raw in ["no", "off", "false"] {
            assert_eq!(Value::parse(raw), Value::Bool(false));
        }
        assert_eq!(Value::parse("True"), Value::String("True".into()));
    }

    #[test]
    fn integers() {
        assert_eq!(Value::parse("100"), Value::Int(100));
        assert_eq!(Value::parse("-3"), Value::Int(-3));
        assert_eq!(Value::parse("0").as_int(), Some(0));
        assert_eq!(Value::parse("0"), Value::String("0".into()));
        assert_eq!(Value::parse("012"), Value::String("012".into()));
        assert_eq!(Value::parse("1k"), Value::String("1k".into()));
        assert_eq!(
            Value::parse("99999999999999999999"),
            Value::String("99999999999999999999".into())
        );
    }

    #[test]
    fn display_round_trips() {
        for raw in ["true", "42", "origin"] {
            assert_eq!(Value::parse(raw).to_string(), raw);
        }
    }
}
