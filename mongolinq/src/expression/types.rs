use serde::{Deserialize, Serialize};
use std::fmt;

/// Static types of query expressions. Nominal types (classes and enums) are
/// identified by name and resolved through the serializer registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Object,
    Boolean,
    Char,
    Int32,
    Int64,
    Double,
    Decimal,
    String,
    DateTime,
    ObjectId,
    Nullable(Box<Type>),
    Enum(String),
    Array(Box<Type>),
    List(Box<Type>),
    Enumerable(Box<Type>),
    Queryable(Box<Type>),
    Dictionary(Box<Type>, Box<Type>),
    KeyValuePair(Box<Type>, Box<Type>),
    Grouping(Box<Type>, Box<Type>),
    Class(String),
    Anonymous(Vec<(String, Type)>),
    TypeOf,
}

impl Type {
    pub fn class(name: impl Into<String>) -> Self {
        Type::Class(name.into())
    }

    pub fn enumeration(name: impl Into<String>) -> Self {
        Type::Enum(name.into())
    }

    pub fn nullable(ty: Type) -> Self {
        match ty {
            Type::Nullable(_) => ty,
            _ => Type::Nullable(Box::new(ty)),
        }
    }

    pub fn array(item: Type) -> Self {
        Type::Array(Box::new(item))
    }

    pub fn list(item: Type) -> Self {
        Type::List(Box::new(item))
    }

    pub fn enumerable(item: Type) -> Self {
        Type::Enumerable(Box::new(item))
    }

    pub fn queryable(item: Type) -> Self {
        Type::Queryable(Box::new(item))
    }

    pub fn dictionary(key: Type, value: Type) -> Self {
        Type::Dictionary(Box::new(key), Box::new(value))
    }

    pub fn key_value_pair(key: Type, value: Type) -> Self {
        Type::KeyValuePair(Box::new(key), Box::new(value))
    }

    pub fn grouping(key: Type, element: Type) -> Self {
        Type::Grouping(Box::new(key), Box::new(element))
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, Type::Nullable(_))
    }

    /// Strips one level of `Nullable`.
    pub fn non_nullable(&self) -> &Type {
        match self {
            Type::Nullable(inner) => inner,
            other => other,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.non_nullable(),
            Type::Int32 | Type::Int64 | Type::Double | Type::Decimal
        )
    }

    pub fn is_integral(&self) -> bool {
        matches!(self.non_nullable(), Type::Int32 | Type::Int64)
    }

    pub fn is_enum(&self) -> bool {
        matches!(self.non_nullable(), Type::Enum(_))
    }

    /// Reference types may hold null without being wrapped in `Nullable`.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Type::Object
                | Type::String
                | Type::Array(_)
                | Type::List(_)
                | Type::Enumerable(_)
                | Type::Queryable(_)
                | Type::Dictionary(..)
                | Type::Grouping(..)
                | Type::Class(_)
                | Type::Anonymous(_)
                | Type::TypeOf
        )
    }

    pub fn can_be_null(&self) -> bool {
        self.is_nullable() || self.is_reference()
    }

    /// The element type when this type is enumerable.
    pub fn element_type(&self) -> Option<Type> {
        match self {
            Type::Array(item)
            | Type::List(item)
            | Type::Enumerable(item)
            | Type::Queryable(item) => Some((**item).clone()),
            Type::Grouping(_, element) => Some((**element).clone()),
            Type::Dictionary(k, v) => Some(Type::KeyValuePair(k.clone(), v.clone())),
            _ => None,
        }
    }

    pub fn is_sequence(&self) -> bool {
        self.element_type().is_some()
    }

    pub fn is_dictionary(&self) -> bool {
        matches!(self, Type::Dictionary(..))
    }

    pub fn nominal_name(&self) -> Option<&str> {
        match self {
            Type::Class(name) | Type::Enum(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Object => write!(f, "object"),
            Type::Boolean => write!(f, "bool"),
            Type::Char => write!(f, "char"),
            Type::Int32 => write!(f, "int"),
            Type::Int64 => write!(f, "long"),
            Type::Double => write!(f, "double"),
            Type::Decimal => write!(f, "decimal"),
            Type::String => write!(f, "string"),
            Type::DateTime => write!(f, "DateTime"),
            Type::ObjectId => write!(f, "ObjectId"),
            Type::Nullable(inner) => write!(f, "{inner}?"),
            Type::Enum(name) | Type::Class(name) => write!(f, "{name}"),
            Type::Array(item) => write!(f, "{item}[]"),
            Type::List(item) => write!(f, "List<{item}>"),
            Type::Enumerable(item) => write!(f, "IEnumerable<{item}>"),
            Type::Queryable(item) => write!(f, "IQueryable<{item}>"),
            Type::Dictionary(k, v) => write!(f, "Dictionary<{k}, {v}>"),
            Type::KeyValuePair(k, v) => write!(f, "KeyValuePair<{k}, {v}>"),
            Type::Grouping(k, e) => write!(f, "IGrouping<{k}, {e}>"),
            Type::Anonymous(members) => {
                write!(f, "{{ ")?;
                for (i, (name, ty)) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name} : {ty}")?;
                }
                write!(f, " }}")
            }
            Type::TypeOf => write!(f, "Type"),
        }
    }
}
