//! Typed stat values.

use serde::{Deserialize, Serialize};

/// The type tag of a stat value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatType {
    /// 64-bit floating point.
    Number,
    /// 64-bit signed integer.
    Integer,
    /// UTF-8 text.
    Text,
}

/// The payload of a stat value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatData {
    /// Floating point payload.
    Number(f64),
    /// Integer payload.
    Integer(i64),
    /// Text payload.
    Text(String),
}

impl StatData {
    /// Returns the type tag for this payload.
    pub fn stat_type(&self) -> StatType {
        match self {
            StatData::Number(_) => StatType::Number,
            StatData::Integer(_) => StatType::Integer,
            StatData::Text(_) => StatType::Text,
        }
    }
}

/// A named, typed scalar value tracked per user.
///
/// Identity is `name` within one document. The value is mutated only through
/// the typed setters, which also update the type tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatValue {
    name: String,
    data: StatData,
}

impl StatValue {
    /// Creates a number-valued stat.
    pub fn number(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            data: StatData::Number(value),
        }
    }

    /// Creates an integer-valued stat.
    pub fn integer(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            data: StatData::Integer(value),
        }
    }

    /// Creates a text-valued stat.
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: StatData::Text(value.into()),
        }
    }

    pub(crate) fn from_parts(name: String, data: StatData) -> Self {
        Self { name, data }
    }

    /// Returns the stat name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the payload.
    pub fn data(&self) -> &StatData {
        &self.data
    }

    /// Returns the type tag.
    pub fn stat_type(&self) -> StatType {
        self.data.stat_type()
    }

    /// Returns the value as a number.
    ///
    /// An integer payload widens; text yields `None`.
    pub fn as_number(&self) -> Option<f64> {
        match &self.data {
            StatData::Number(v) => Some(*v),
            StatData::Integer(v) => Some(*v as f64),
            StatData::Text(_) => None,
        }
    }

    /// Returns the value as an integer.
    ///
    /// A number payload truncates; text yields `None`.
    pub fn as_integer(&self) -> Option<i64> {
        match &self.data {
            StatData::Number(v) => Some(*v as i64),
            StatData::Integer(v) => Some(*v),
            StatData::Text(_) => None,
        }
    }

    /// Returns the value as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match &self.data {
            StatData::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Replaces the payload with a number.
    pub fn set_number(&mut self, value: f64) {
        self.data = StatData::Number(value);
    }

    /// Replaces the payload with an integer.
    pub fn set_integer(&mut self, value: i64) {
        self.data = StatData::Integer(value);
    }

    /// Replaces the payload with text.
    pub fn set_text(&mut self, value: impl Into<String>) {
        self.data = StatData::Text(value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_constructors() {
        let v = StatValue::number("headshots", 12.5);
        assert_eq!(v.name(), "headshots");
        assert_eq!(v.stat_type(), StatType::Number);
        assert_eq!(v.as_number(), Some(12.5));

        let v = StatValue::integer("kills", 42);
        assert_eq!(v.stat_type(), StatType::Integer);
        assert_eq!(v.as_integer(), Some(42));

        let v = StatValue::text("rank", "platinum");
        assert_eq!(v.stat_type(), StatType::Text);
        assert_eq!(v.as_text(), Some("platinum"));
    }

    #[test]
    fn numeric_conversions() {
        let v = StatValue::number("score", 99.9);
        assert_eq!(v.as_integer(), Some(99));

        let v = StatValue::integer("score", 7);
        assert_eq!(v.as_number(), Some(7.0));

        let v = StatValue::text("score", "n/a");
        assert_eq!(v.as_number(), None);
        assert_eq!(v.as_integer(), None);
    }

    #[test]
    fn setters_update_type() {
        let mut v = StatValue::number("score", 1.0);
        v.set_text("one");
        assert_eq!(v.stat_type(), StatType::Text);
        assert_eq!(v.as_text(), Some("one"));

        v.set_integer(1);
        assert_eq!(v.stat_type(), StatType::Integer);
    }

    #[test]
    fn serde_roundtrip() {
        let v = StatValue::integer("wins", 3);
        let json = serde_json::to_string(&v).unwrap();
        let back: StatValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
