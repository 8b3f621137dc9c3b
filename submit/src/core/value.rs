//! Typed argument values.
//!
//! Config defaults arrive typed (TOML numbers, strings, booleans) while
//! command-line overrides arrive as raw strings. Both are resolved into
//! [`ArgValue`] when the grid is built, so a value that cannot take the shape
//! of its default is reported against the argument name before rendering.
//!
//! Numbers keep the text they were written as: `007`, `1.10` and integers
//! wider than 64 bits reach the job exactly as typed.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Number;

use crate::error::{SubmitError, SubmitResult};

/// A single argument value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Number(NumberLiteral),
    String(String),
}

/// A numeric value together with its source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberLiteral {
    value: Number,
    text: String,
}

impl NumberLiteral {
    /// Parse `raw` as a number, keeping `raw` as the display text.
    pub fn parse(raw: &str) -> Option<Self> {
        parse_number(raw).map(|value| Self {
            value,
            text: raw.trim().to_string(),
        })
    }
}

impl From<Number> for NumberLiteral {
    fn from(value: Number) -> Self {
        let text = value.to_string();
        Self { value, text }
    }
}

impl fmt::Display for NumberLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

// Templates see a number when the text is canonical, otherwise the text.
impl Serialize for NumberLiteral {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.value.to_string() == self.text {
            self.value.serialize(serializer)
        } else {
            serializer.serialize_str(&self.text)
        }
    }
}

impl<'de> Deserialize<'de> for NumberLiteral {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Number::deserialize(deserializer).map(NumberLiteral::from)
    }
}

/// Kind of an [`ArgValue`], used for coercion checks and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValueKind {
    Number,
    String,
    Bool,
}

impl ValueKind {
    pub fn describe(self) -> &'static str {
        match self {
            ValueKind::Number => "a number",
            ValueKind::String => "a string",
            ValueKind::Bool => "a boolean",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Bool => "bool",
        }
    }
}

impl ArgValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ArgValue::Bool(_) => ValueKind::Bool,
            ArgValue::Number(_) => ValueKind::Number,
            ArgValue::String(_) => ValueKind::String,
        }
    }

    /// Parse a command-line literal without any type hint.
    ///
    /// Numeric-looking literals become numbers, everything else stays a string.
    pub fn parse_literal(raw: &str) -> ArgValue {
        match NumberLiteral::parse(raw) {
            Some(number) => ArgValue::Number(number),
            None => ArgValue::String(raw.to_string()),
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Bool(b) => write!(f, "{b}"),
            ArgValue::Number(n) => write!(f, "{n}"),
            ArgValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::String(value.to_string())
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        ArgValue::Number(NumberLiteral::from(Number::from(value)))
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Bool(value)
    }
}

/// Coerce a raw override literal for argument `name`.
///
/// Without defaults the literal is parsed with [`ArgValue::parse_literal`].
/// With defaults, the value must take one of the kinds present in the default
/// sequence: numbers need a numeric literal, booleans need `true`/`false`, and
/// string defaults accept the literal verbatim.
pub fn coerce(name: &str, raw: &str, defaults: Option<&[ArgValue]>) -> SubmitResult<ArgValue> {
    let Some(defaults) = defaults else {
        return Ok(ArgValue::parse_literal(raw));
    };

    let mut kinds: Vec<ValueKind> = defaults.iter().map(ArgValue::kind).collect();
    kinds.sort();
    kinds.dedup();

    if kinds.contains(&ValueKind::Number)
        && let Some(number) = NumberLiteral::parse(raw)
    {
        return Ok(ArgValue::Number(number));
    }
    if kinds.contains(&ValueKind::Bool)
        && let Some(b) = parse_bool(raw)
    {
        return Ok(ArgValue::Bool(b));
    }
    if kinds.contains(&ValueKind::String) || kinds.is_empty() {
        return Ok(ArgValue::String(raw.to_string()));
    }

    let expected = kinds
        .iter()
        .map(|kind| kind.describe())
        .collect::<Vec<_>>()
        .join(" or ");
    Err(SubmitError::InvalidArgumentValue {
        name: name.to_string(),
        value: raw.to_string(),
        expected,
    })
}

fn parse_number(raw: &str) -> Option<Number> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || !trimmed.bytes().any(|b| b.is_ascii_digit())
        || !trimmed
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
    {
        return None;
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Some(Number::from(int));
    }
    if let Ok(uint) = trimmed.parse::<u64>() {
        return Some(Number::from(uint));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}
