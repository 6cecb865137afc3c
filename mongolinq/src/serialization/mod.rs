//! The contract between the translator and the serialization layer: how each
//! in-memory type is stored, which element names its members map to, and how
//! constants are encoded so they compare correctly against stored values.
mod class_map;
pub use class_map::*;
mod discriminator;
pub use discriminator::*;
mod registry;
pub use registry::*;
mod serializers;
pub use serializers::*;

use crate::expression::{Type, Value};
use bson::Bson;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use thiserror::Error;

#[cfg(test)]
mod test;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum Error {
    #[error("no serializer is registered for type {0}")]
    SerializerNotFound(Type),
    #[error("{ty} does not have a member named {member}")]
    UnknownMember { ty: Type, member: String },
    #[error("{value} cannot be serialized as {representation:?} by the {ty} serializer")]
    CannotSerialize {
        value: String,
        ty: Type,
        representation: Representation,
    },
    #[error("{bson} cannot be deserialized as {ty}")]
    CannotDeserialize { bson: String, ty: Type },
    #[error("Document representation requires keys to serialize as strings.")]
    DictionaryKeysMustBeStrings,
    #[error("{ordinal} is not a member of enum {type_name}")]
    UnknownEnumOrdinal { type_name: String, ordinal: i64 },
    #[error("'{name}' is not a member of enum {type_name}")]
    UnknownEnumName { type_name: String, name: String },
}

/// How a value is encoded in a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Representation {
    Boolean,
    Int32,
    Int64,
    Double,
    Decimal128,
    String,
    DateTime,
    ObjectId,
    Document,
    Array,
    ArrayOfArrays,
    ArrayOfDocuments,
    Custom,
}

impl Representation {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Representation::Int32
                | Representation::Int64
                | Representation::Double
                | Representation::Decimal128
        )
    }
}

pub type SerializerRef = Arc<dyn Serializer>;

/// Where a member of a serialized type is stored.
#[derive(Debug, Clone)]
pub struct MemberInfo {
    pub element_name: String,
    pub serializer: SerializerRef,
    /// Grouped members live inside the composite `_id` sub-document.
    pub is_grouped_member: bool,
}

impl MemberInfo {
    /// The stored path relative to the containing document.
    pub fn storage_path(&self) -> String {
        if self.is_grouped_member {
            format!("_id.{}", self.element_name)
        } else {
            self.element_name.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct DictionaryInfo {
    pub representation: Representation,
    pub key: SerializerRef,
    pub value: SerializerRef,
}

pub trait Serializer: fmt::Debug + Send + Sync {
    fn value_type(&self) -> Type;

    fn representation(&self) -> Representation;

    fn try_get_member_info(&self, _member: &str) -> Option<MemberInfo> {
        None
    }

    /// The serializer of each element when the value is stored as an array.
    fn item_serializer(&self) -> Option<SerializerRef> {
        None
    }

    fn dictionary_info(&self) -> Option<DictionaryInfo> {
        None
    }

    fn enum_info(&self) -> Option<EnumDefinition> {
        None
    }

    /// The serializer of the wrapped value for nullable types.
    fn underlying(&self) -> Option<SerializerRef> {
        None
    }

    /// Values that are not documents are wrapped in a single field when a
    /// stage has to produce a document.
    fn wrapped_field(&self) -> Option<&str> {
        None
    }

    fn is_client_side_projection(&self) -> bool {
        false
    }

    fn serialize(&self, value: &Value) -> Result<Bson>;

    fn deserialize(&self, bson: &Bson) -> Result<Value>;
}

/// Two serializers are interchangeable when they describe the same type
/// stored the same way.
pub fn same_encoding(a: &dyn Serializer, b: &dyn Serializer) -> bool {
    a.value_type() == b.value_type() && a.representation() == b.representation()
}
