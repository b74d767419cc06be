//! AMF value types
//!
//! A single dynamically-typed value as carried by AMF0 command and data
//! messages. Only the types the AMF0 wire format can express are modeled.

use std::collections::HashMap;

/// Dynamically-typed AMF0 value
#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue {
    /// IEEE 754 double-precision floating point (marker 0x00)
    Number(f64),

    /// Boolean (marker 0x01)
    Boolean(bool),

    /// UTF-8 string with 16-bit length prefix (marker 0x02);
    /// strings longer than 65535 bytes encode as Long String (0x0C)
    String(String),

    /// Key-value object terminated by 0x000009 (marker 0x03)
    Object(HashMap<String, AmfValue>),

    /// Null (marker 0x05)
    Null,

    /// Undefined (marker 0x06)
    Undefined,

    /// Associative array with a 32-bit count hint (marker 0x08)
    EcmaArray(HashMap<String, AmfValue>),

    /// Dense array (marker 0x0A)
    StrictArray(Vec<AmfValue>),

    /// Milliseconds since the Unix epoch plus a reserved timezone (marker 0x0B)
    Date(f64),
}

impl AmfValue {
    /// Try to get this value as a string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AmfValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AmfValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Try to get this value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AmfValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get this value as a key-value map.
    ///
    /// ECMA arrays answer here too; encoders disagree on which of the two
    /// they use for command objects and metadata.
    pub fn as_object(&self) -> Option<&HashMap<String, AmfValue>> {
        match self {
            AmfValue::Object(m) => Some(m),
            AmfValue::EcmaArray(m) => Some(m),
            _ => None,
        }
    }

    /// Check if this value is null or undefined
    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, AmfValue::Null | AmfValue::Undefined)
    }

    /// Get a property from an object value
    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        self.as_object()?.get(key)
    }

    /// Get a string property from an object value
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    /// Get a number property from an object value
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_number()
    }
}

impl Default for AmfValue {
    fn default() -> Self {
        AmfValue::Null
    }
}

impl From<bool> for AmfValue {
    fn from(v: bool) -> Self {
        AmfValue::Boolean(v)
    }
}

impl From<f64> for AmfValue {
    fn from(v: f64) -> Self {
        AmfValue::Number(v)
    }
}

impl From<u32> for AmfValue {
    fn from(v: u32) -> Self {
        AmfValue::Number(v as f64)
    }
}

impl From<String> for AmfValue {
    fn from(v: String) -> Self {
        AmfValue::String(v)
    }
}

impl From<&str> for AmfValue {
    fn from(v: &str) -> Self {
        AmfValue::String(v.to_string())
    }
}

impl From<HashMap<String, AmfValue>> for AmfValue {
    fn from(v: HashMap<String, AmfValue>) -> Self {
        AmfValue::Object(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        let s = AmfValue::String("test".into());
        assert_eq!(s.as_str(), Some("test"));
        assert_eq!(s.as_number(), None);

        let n = AmfValue::Number(42.0);
        assert_eq!(n.as_number(), Some(42.0));
        assert_eq!(n.as_str(), None);

        let mut obj = HashMap::new();
        obj.insert("key".to_string(), AmfValue::String("value".into()));
        let o = AmfValue::Object(obj);
        assert_eq!(o.get_string("key"), Some("value"));
    }

    #[test]
    fn test_ecma_array_acts_as_object() {
        let mut props = HashMap::new();
        props.insert("width".to_string(), AmfValue::Number(1920.0));

        let ecma = AmfValue::EcmaArray(props);
        assert!(ecma.as_object().is_some());
        assert_eq!(ecma.get_number("width"), Some(1920.0));
    }

    #[test]
    fn test_is_null_or_undefined() {
        assert!(AmfValue::Null.is_null_or_undefined());
        assert!(AmfValue::Undefined.is_null_or_undefined());
        assert!(!AmfValue::Boolean(false).is_null_or_undefined());
        assert!(!AmfValue::Number(0.0).is_null_or_undefined());
    }

    #[test]
    fn test_get_on_non_object() {
        assert!(AmfValue::Null.get("key").is_none());
        assert!(AmfValue::Number(42.0).get("key").is_none());
        assert!(AmfValue::StrictArray(vec![]).get("0").is_none());
    }

    #[test]
    fn test_from_conversions() {
        let v: AmfValue = "test".into();
        assert!(matches!(v, AmfValue::String(_)));

        let v: AmfValue = 42.0.into();
        assert!(matches!(v, AmfValue::Number(_)));

        let v: AmfValue = true.into();
        assert!(matches!(v, AmfValue::Boolean(true)));
    }
}
