use crate::expression::Type;
use bson::{oid::ObjectId, DateTime, Decimal128};
use itertools::Itertools;
use linked_hash_map::LinkedHashMap;
use std::fmt;

/// In-memory values: the payload of constants and the result of client-side
/// evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Char(char),
    Int32(i32),
    Int64(i64),
    Double(f64),
    Decimal(Decimal128),
    String(String),
    DateTime(DateTime),
    ObjectId(ObjectId),
    Enum { type_name: String, ordinal: i64 },
    Array(Vec<Value>),
    Object(LinkedHashMap<String, Value>),
    Dictionary(Vec<(Value, Value)>),
    Type(Type),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integral view of numeric values, used for sizes, indexes and ordinals.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(i) => Some(*i as i64),
            Value::Int64(i) => Some(*i),
            Value::Char(c) => Some(*c as i64),
            Value::Enum { ordinal, .. } => Some(*ordinal),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(i) => Some(*i as f64),
            Value::Int64(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            Value::Decimal(d) => d.to_string().parse().ok(),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int32(i)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int64(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Char(c)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Char(c) => write!(f, "'{c}'"),
            Value::Int32(i) => write!(f, "{i}"),
            Value::Int64(i) => write!(f, "{i}L"),
            Value::Double(d) => write!(f, "{d:?}"),
            Value::Decimal(d) => write!(f, "{d}M"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::DateTime(d) => write!(f, "{d}"),
            Value::ObjectId(o) => write!(f, "ObjectId(\"{o}\")"),
            Value::Enum { type_name, ordinal } => write!(f, "{type_name}({ordinal})"),
            Value::Array(items) => write!(f, "[{}]", items.iter().format(", ")),
            Value::Object(fields) => write!(
                f,
                "{{ {} }}",
                fields
                    .iter()
                    .format_with(", ", |(k, v), g| g(&format_args!("{k} = {v}")))
            ),
            Value::Dictionary(entries) => write!(
                f,
                "{{ {} }}",
                entries
                    .iter()
                    .format_with(", ", |(k, v), g| g(&format_args!("[{k}] = {v}")))
            ),
            Value::Type(ty) => write!(f, "typeof({ty})"),
        }
    }
}
