//! # Data Values
//!
//! Sampled point values exchanged between adapters and callers. A
//! [`DataValue`] pairs a typed [`Value`] with its capture time and a
//! [`Quality`] flag.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Typed payload of a sampled point.
///
/// # Example
///
/// ```rust
/// use southbound::Value;
///
/// let v = Value::from(25.5f32);
/// assert_eq!(v.type_name(), "float32");
/// assert!((v.as_f64().unwrap() - 25.5).abs() < 0.001);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Bool(bool),
    I32(i32),
    U32(u32),
    F32(f32),
    F64(f64),
    Text(String),
}

impl Value {
    /// Numeric view of the value; `None` for text.
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::I32(v) => Some(f64::from(*v)),
            Value::U32(v) => Some(f64::from(*v)),
            Value::F32(v) => Some(f64::from(*v)),
            Value::F64(v) => Some(*v),
            Value::Text(_) => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Type name as used in tag `data_type` attributes.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::I32(_) => "int32",
            Value::U32(_) => "uint32",
            Value::F32(_) => "float32",
            Value::F64(_) => "float64",
            Value::Text(_) => "string",
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::I32(0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
        }
    }
}

// ============================================================================
// From implementations for convenient construction
// ============================================================================

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::U32(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

// ============================================================================
// Quality and sampled values
// ============================================================================

/// Coarse validity of a sampled value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Bad,
    Good,
}

/// A point value with capture time (ms since Unix epoch) and quality.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataValue {
    pub value: Value,
    pub timestamp_ms: u64,
    pub quality: Quality,
}

impl DataValue {
    /// A good-quality sample stamped with the current time.
    pub fn sampled(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            timestamp_ms: now_millis(),
            quality: Quality::Good,
        }
    }

    /// An unstamped value, as supplied by callers of `write`.
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            timestamp_ms: 0,
            quality: Quality::Bad,
        }
    }

    #[inline]
    pub fn is_good(&self) -> bool {
        self.quality == Quality::Good
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?} @ {})", self.value, self.quality, self.timestamp_ms)
    }
}

/// Milliseconds since the Unix epoch; clamps pre-epoch clocks to 0.
pub fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_f64() {
        assert_eq!(Value::Bool(true).as_f64(), Some(1.0));
        assert_eq!(Value::I32(-5).as_f64(), Some(-5.0));
        assert_eq!(Value::U32(u32::MAX).as_f64(), Some(u32::MAX as f64));
        assert_eq!(Value::Text("x".into()).as_f64(), None);
    }

    #[test]
    fn test_type_name() {
        assert_eq!(Value::from(true).type_name(), "bool");
        assert_eq!(Value::from(1u32).type_name(), "uint32");
        assert_eq!(Value::from("abc").type_name(), "string");
    }

    #[test]
    fn test_sampled_is_good_and_stamped() {
        let before = now_millis();
        let v = DataValue::sampled(42u32);
        let after = now_millis();

        assert!(v.is_good());
        assert!(v.timestamp_ms >= before && v.timestamp_ms <= after);
        assert_eq!(v.value, Value::U32(42));
    }

    #[test]
    fn test_default_is_bad() {
        let v = DataValue::default();
        assert_eq!(v.quality, Quality::Bad);
        assert_eq!(v.timestamp_ms, 0);
    }
}
