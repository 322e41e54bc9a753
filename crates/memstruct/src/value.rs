//! Decoded values.

use crate::error::{MemStructError, MemStructResult};
use crate::view::View;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// An owned value read from, or to be written to, foreign memory.
///
/// Scalar variants are what scalar descriptors decode to. `Record` and `List`
/// are used for bulk writes and for [`View::snapshot`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f32),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Record(Vec<(String, Value)>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Record(_) => "record",
        }
    }

    /// Integer bit pattern for encoding.
    pub fn as_bits(&self) -> MemStructResult<u64> {
        match *self {
            Value::Int(v) => Ok(v as u64),
            Value::UInt(v) => Ok(v),
            Value::Bool(b) => Ok(b as u64),
            Value::Float(f) => Ok(f as i64 as u64),
            _ => Err(self.mismatch("integer")),
        }
    }

    pub fn as_f32(&self) -> MemStructResult<f32> {
        match *self {
            Value::Float(f) => Ok(f),
            Value::Int(v) => Ok(v as f32),
            Value::UInt(v) => Ok(v as f32),
            _ => Err(self.mismatch("float")),
        }
    }

    /// Truthiness used by one-bit fields and boolean vectors: null, false
    /// and numeric zero are false, everything else is true.
    pub fn truthy(&self) -> bool {
        match *self {
            Value::Null => false,
            Value::Bool(b) => b,
            Value::Int(v) => v != 0,
            Value::UInt(v) => v != 0,
            Value::Float(f) => f != 0.0,
            _ => true,
        }
    }

    pub fn as_bytes(&self) -> MemStructResult<&[u8]> {
        match self {
            Value::Bytes(b) => Ok(b),
            _ => Err(self.mismatch("bytes")),
        }
    }

    pub fn as_list(&self) -> MemStructResult<&[Value]> {
        match self {
            Value::List(items) => Ok(items),
            _ => Err(self.mismatch("list")),
        }
    }

    pub fn as_record(&self) -> MemStructResult<&[(String, Value)]> {
        match self {
            Value::Record(fields) => Ok(fields),
            _ => Err(self.mismatch("record")),
        }
    }

    fn mismatch(&self, expected: &'static str) -> MemStructError {
        MemStructError::ValueMismatch {
            expected,
            found: self.type_name(),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(v as u64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Bytes(v.as_bytes().to_vec())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::UInt(v) => serializer.serialize_u64(*v),
            Value::Float(f) => serializer.serialize_f32(*f),
            // Text buffers are far more common than binary ones.
            Value::Bytes(b) => match std::str::from_utf8(b) {
                Ok(text) => serializer.serialize_str(text),
                Err(_) => b.serialize(serializer),
            },
            Value::List(items) => items.serialize(serializer),
            Value::Record(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, value) in fields {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
        }
    }
}

/// JSON input for writes: strings become byte buffers, objects become records.
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Value::Int(v)
                } else if let Some(v) = n.as_u64() {
                    Value::UInt(v)
                } else {
                    Value::Float(n.as_f64().unwrap_or_default() as f32)
                }
            }
            serde_json::Value::String(s) => Value::Bytes(s.into_bytes()),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(fields) => Value::Record(
                fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
        }
    }
}

/// What reading a view produces: a decoded scalar, or the view itself for
/// composite, container and pointer descriptors.
#[derive(Debug, Clone)]
pub enum Item<'a> {
    Value(Value),
    View(View<'a>),
}

impl<'a> Item<'a> {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Item::Value(v) => Some(v),
            Item::View(_) => None,
        }
    }

    pub fn into_view(self) -> Option<View<'a>> {
        match self {
            Item::View(v) => Some(v),
            Item::Value(_) => None,
        }
    }
}
