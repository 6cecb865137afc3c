use crate::{
    expression::{Type, Value},
    serialization::{
        DictionaryInfo, Error, MemberInfo, Representation, Result, Serializer, SerializerRef,
    },
};
use bson::{oid::ObjectId, Bson, DateTime, Decimal128, Document};
use std::{str::FromStr, sync::Arc};

fn cannot_serialize(value: &Value, ty: &Type, representation: Representation) -> Error {
    Error::CannotSerialize {
        value: value.to_string(),
        ty: ty.clone(),
        representation,
    }
}

fn cannot_deserialize(bson: &Bson, ty: &Type) -> Error {
    Error::CannotDeserialize {
        bson: bson.to_string(),
        ty: ty.clone(),
    }
}

fn decimal_from_f64(d: f64) -> Option<Decimal128> {
    Decimal128::from_str(&d.to_string()).ok()
}

fn bson_as_i64(bson: &Bson) -> Option<i64> {
    match bson {
        Bson::Int32(i) => Some(*i as i64),
        Bson::Int64(i) => Some(*i),
        Bson::Double(d) if d.fract() == 0.0 => Some(*d as i64),
        Bson::Decimal128(d) => d.to_string().parse().ok(),
        Bson::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn bson_as_f64(bson: &Bson) -> Option<f64> {
    match bson {
        Bson::Int32(i) => Some(*i as f64),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(d) => Some(*d),
        Bson::Decimal128(d) => d.to_string().parse().ok(),
        Bson::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Serializer for the built-in scalar types in any compatible representation.
#[derive(Debug, Clone)]
pub struct ScalarSerializer {
    ty: Type,
    representation: Representation,
}

impl ScalarSerializer {
    pub fn new(ty: Type, representation: Representation) -> Self {
        Self { ty, representation }
    }

    /// The representation used when nothing else is configured.
    pub fn default_for(ty: &Type) -> Option<Self> {
        let representation = match ty {
            Type::Boolean => Representation::Boolean,
            Type::Char | Type::Int32 => Representation::Int32,
            Type::Int64 => Representation::Int64,
            Type::Double => Representation::Double,
            Type::Decimal => Representation::Decimal128,
            Type::String => Representation::String,
            Type::DateTime => Representation::DateTime,
            Type::ObjectId => Representation::ObjectId,
            _ => return None,
        };
        Some(Self::new(ty.clone(), representation))
    }

    fn serialize_string(&self, value: &Value) -> Option<String> {
        Some(match value {
            Value::String(s) => s.clone(),
            Value::Char(c) => c.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Int32(i) => i.to_string(),
            Value::Int64(i) => i.to_string(),
            Value::Double(d) => d.to_string(),
            Value::Decimal(d) => d.to_string(),
            Value::ObjectId(o) => o.to_hex(),
            Value::DateTime(d) => d.try_to_rfc3339_string().ok()?,
            _ => return None,
        })
    }
}

impl Serializer for ScalarSerializer {
    fn value_type(&self) -> Type {
        self.ty.clone()
    }

    fn representation(&self) -> Representation {
        self.representation
    }

    fn serialize(&self, value: &Value) -> Result<Bson> {
        let fail = || cannot_serialize(value, &self.ty, self.representation);
        if value.is_null() {
            return Ok(Bson::Null);
        }
        Ok(match self.representation {
            Representation::Boolean => Bson::Boolean(value.as_bool().ok_or_else(fail)?),
            Representation::Int32 => {
                let i = value.as_i64().ok_or_else(fail)?;
                Bson::Int32(i32::try_from(i).map_err(|_| fail())?)
            }
            Representation::Int64 => Bson::Int64(value.as_i64().ok_or_else(fail)?),
            Representation::Double => Bson::Double(value.as_f64().ok_or_else(fail)?),
            Representation::Decimal128 => match value {
                Value::Decimal(d) => Bson::Decimal128(*d),
                Value::Int32(_) | Value::Int64(_) => Bson::Decimal128(
                    Decimal128::from_str(&value.as_i64().ok_or_else(fail)?.to_string())
                        .map_err(|_| fail())?,
                ),
                Value::Double(d) => Bson::Decimal128(decimal_from_f64(*d).ok_or_else(fail)?),
                _ => return Err(fail()),
            },
            Representation::String => Bson::String(self.serialize_string(value).ok_or_else(fail)?),
            Representation::DateTime => match value {
                Value::DateTime(d) => Bson::DateTime(*d),
                _ => return Err(fail()),
            },
            Representation::ObjectId => match value {
                Value::ObjectId(o) => Bson::ObjectId(*o),
                Value::String(s) => Bson::ObjectId(ObjectId::parse_str(s).map_err(|_| fail())?),
                _ => return Err(fail()),
            },
            _ => return Err(fail()),
        })
    }

    fn deserialize(&self, bson: &Bson) -> Result<Value> {
        let fail = || cannot_deserialize(bson, &self.ty);
        if let Bson::Null = bson {
            return if self.ty.can_be_null() {
                Ok(Value::Null)
            } else {
                Err(fail())
            };
        }
        Ok(match &self.ty {
            Type::Boolean => match bson {
                Bson::Boolean(b) => Value::Boolean(*b),
                Bson::String(s) => Value::Boolean(s.parse().map_err(|_| fail())?),
                _ => return Err(fail()),
            },
            Type::Char => match bson {
                Bson::String(s) if s.chars().count() == 1 => {
                    Value::Char(s.chars().next().ok_or_else(fail)?)
                }
                other => {
                    let code = bson_as_i64(other).ok_or_else(fail)?;
                    Value::Char(
                        u32::try_from(code)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or_else(fail)?,
                    )
                }
            },
            Type::Int32 => Value::Int32(
                i32::try_from(bson_as_i64(bson).ok_or_else(fail)?).map_err(|_| fail())?,
            ),
            Type::Int64 => Value::Int64(bson_as_i64(bson).ok_or_else(fail)?),
            Type::Double => Value::Double(bson_as_f64(bson).ok_or_else(fail)?),
            Type::Decimal => match bson {
                Bson::Decimal128(d) => Value::Decimal(*d),
                Bson::String(s) => Value::Decimal(Decimal128::from_str(s).map_err(|_| fail())?),
                Bson::Int32(i) => Value::Decimal(
                    Decimal128::from_str(&i.to_string()).map_err(|_| fail())?,
                ),
                Bson::Int64(i) => Value::Decimal(
                    Decimal128::from_str(&i.to_string()).map_err(|_| fail())?,
                ),
                Bson::Double(d) => Value::Decimal(decimal_from_f64(*d).ok_or_else(fail)?),
                _ => return Err(fail()),
            },
            Type::String => match bson {
                Bson::String(s) => Value::String(s.clone()),
                Bson::ObjectId(o) => Value::String(o.to_hex()),
                _ => return Err(fail()),
            },
            Type::DateTime => match bson {
                Bson::DateTime(d) => Value::DateTime(*d),
                Bson::String(s) => {
                    Value::DateTime(DateTime::parse_rfc3339_str(s).map_err(|_| fail())?)
                }
                other => Value::DateTime(DateTime::from_millis(
                    bson_as_i64(other).ok_or_else(fail)?,
                )),
            },
            Type::ObjectId => match bson {
                Bson::ObjectId(o) => Value::ObjectId(*o),
                Bson::String(s) => Value::ObjectId(ObjectId::parse_str(s).map_err(|_| fail())?),
                _ => return Err(fail()),
            },
            _ => return Err(fail()),
        })
    }
}

/// Named members of an enum and the representation they are stored in.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDefinition {
    pub type_name: String,
    pub representation: Representation,
    pub members: Vec<(String, i64)>,
}

impl EnumDefinition {
    pub fn new(type_name: &str, members: &[(&str, i64)]) -> Self {
        Self {
            type_name: type_name.to_string(),
            representation: Representation::Int32,
            members: members
                .iter()
                .map(|(name, ordinal)| (name.to_string(), *ordinal))
                .collect(),
        }
    }

    pub fn with_representation(mut self, representation: Representation) -> Self {
        self.representation = representation;
        self
    }
}

#[derive(Debug, Clone)]
pub struct EnumSerializer {
    definition: EnumDefinition,
}

impl EnumSerializer {
    pub fn new(definition: EnumDefinition) -> Self {
        Self { definition }
    }

    pub fn definition(&self) -> &EnumDefinition {
        &self.definition
    }
}

impl Serializer for EnumSerializer {
    fn value_type(&self) -> Type {
        Type::Enum(self.definition.type_name.clone())
    }

    fn representation(&self) -> Representation {
        self.definition.representation
    }

    fn enum_info(&self) -> Option<EnumDefinition> {
        Some(self.definition.clone())
    }

    fn serialize(&self, value: &Value) -> Result<Bson> {
        if value.is_null() {
            return Ok(Bson::Null);
        }
        let ordinal = value.as_i64().ok_or_else(|| {
            cannot_serialize(value, &self.value_type(), self.definition.representation)
        })?;
        match self.definition.representation {
            Representation::Int32 => i32::try_from(ordinal).map(Bson::Int32).map_err(|_| {
                cannot_serialize(value, &self.value_type(), Representation::Int32)
            }),
            Representation::Int64 => Ok(Bson::Int64(ordinal)),
            Representation::String => self
                .definition
                .members
                .iter()
                .find(|(_, o)| *o == ordinal)
                .map(|(name, _)| Bson::String(name.clone()))
                .ok_or_else(|| Error::UnknownEnumOrdinal {
                    type_name: self.definition.type_name.clone(),
                    ordinal,
                }),
            other => Err(cannot_serialize(value, &self.value_type(), other)),
        }
    }

    fn deserialize(&self, bson: &Bson) -> Result<Value> {
        let ordinal = match bson {
            Bson::String(name) => self
                .definition
                .members
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, o)| *o)
                .ok_or_else(|| Error::UnknownEnumName {
                    type_name: self.definition.type_name.clone(),
                    name: name.clone(),
                })?,
            other => bson_as_i64(other).ok_or_else(|| cannot_deserialize(bson, &self.value_type()))?,
        };
        Ok(Value::Enum {
            type_name: self.definition.type_name.clone(),
            ordinal,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NullableSerializer {
    inner: SerializerRef,
}

impl NullableSerializer {
    pub fn new(inner: SerializerRef) -> Self {
        Self { inner }
    }
}

impl Serializer for NullableSerializer {
    fn value_type(&self) -> Type {
        Type::nullable(self.inner.value_type())
    }

    fn representation(&self) -> Representation {
        self.inner.representation()
    }

    fn underlying(&self) -> Option<SerializerRef> {
        Some(self.inner.clone())
    }

    fn serialize(&self, value: &Value) -> Result<Bson> {
        match value {
            Value::Null => Ok(Bson::Null),
            other => self.inner.serialize(other),
        }
    }

    fn deserialize(&self, bson: &Bson) -> Result<Value> {
        match bson {
            Bson::Null => Ok(Value::Null),
            other => self.inner.deserialize(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArraySerializer {
    ty: Type,
    item: SerializerRef,
}

impl ArraySerializer {
    pub fn new(ty: Type, item: SerializerRef) -> Self {
        Self { ty, item }
    }
}

impl Serializer for ArraySerializer {
    fn value_type(&self) -> Type {
        self.ty.clone()
    }

    fn representation(&self) -> Representation {
        Representation::Array
    }

    fn item_serializer(&self) -> Option<SerializerRef> {
        Some(self.item.clone())
    }

    fn serialize(&self, value: &Value) -> Result<Bson> {
        match value {
            Value::Null => Ok(Bson::Null),
            Value::Array(items) => Ok(Bson::Array(
                items
                    .iter()
                    .map(|i| self.item.serialize(i))
                    .collect::<Result<_>>()?,
            )),
            other => Err(cannot_serialize(other, &self.ty, Representation::Array)),
        }
    }

    fn deserialize(&self, bson: &Bson) -> Result<Value> {
        match bson {
            Bson::Null => Ok(Value::Null),
            Bson::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|i| self.item.deserialize(i))
                    .collect::<Result<_>>()?,
            )),
            other => Err(cannot_deserialize(other, &self.ty)),
        }
    }
}

/// Element names of the key and value in the `k`/`v` document form, which is
/// also what `$objectToArray` produces.
pub const KEY_ELEMENT: &str = "k";
pub const VALUE_ELEMENT: &str = "v";

#[derive(Debug, Clone)]
pub struct KeyValuePairSerializer {
    key: SerializerRef,
    value: SerializerRef,
    representation: Representation,
}

impl KeyValuePairSerializer {
    /// `representation` is `Document` for `{ k, v }` and `Array` for `[k, v]`.
    pub fn new(key: SerializerRef, value: SerializerRef, representation: Representation) -> Self {
        Self {
            key,
            value,
            representation,
        }
    }

    pub fn key(&self) -> &SerializerRef {
        &self.key
    }

    pub fn value(&self) -> &SerializerRef {
        &self.value
    }
}

impl Serializer for KeyValuePairSerializer {
    fn value_type(&self) -> Type {
        Type::key_value_pair(self.key.value_type(), self.value.value_type())
    }

    fn representation(&self) -> Representation {
        self.representation
    }

    fn try_get_member_info(&self, member: &str) -> Option<MemberInfo> {
        if self.representation != Representation::Document {
            return None;
        }
        let (element_name, serializer) = match member {
            "Key" => (KEY_ELEMENT, self.key.clone()),
            "Value" => (VALUE_ELEMENT, self.value.clone()),
            _ => return None,
        };
        Some(MemberInfo {
            element_name: element_name.to_string(),
            serializer,
            is_grouped_member: false,
        })
    }

    fn serialize(&self, value: &Value) -> Result<Bson> {
        let (k, v) = match value {
            Value::Array(pair) if pair.len() == 2 => (&pair[0], &pair[1]),
            Value::Dictionary(entries) if entries.len() == 1 => (&entries[0].0, &entries[0].1),
            other => {
                return Err(cannot_serialize(
                    other,
                    &self.value_type(),
                    self.representation,
                ))
            }
        };
        let (k, v) = (self.key.serialize(k)?, self.value.serialize(v)?);
        Ok(match self.representation {
            Representation::Array => Bson::Array(vec![k, v]),
            _ => {
                let mut doc = Document::new();
                doc.insert(KEY_ELEMENT, k);
                doc.insert(VALUE_ELEMENT, v);
                Bson::Document(doc)
            }
        })
    }

    fn deserialize(&self, bson: &Bson) -> Result<Value> {
        let fail = || cannot_deserialize(bson, &self.value_type());
        let (k, v) = match bson {
            Bson::Array(pair) if pair.len() == 2 => (&pair[0], &pair[1]),
            Bson::Document(doc) => (
                doc.get(KEY_ELEMENT).ok_or_else(fail)?,
                doc.get(VALUE_ELEMENT).ok_or_else(fail)?,
            ),
            _ => return Err(fail()),
        };
        Ok(Value::Array(vec![
            self.key.deserialize(k)?,
            self.value.deserialize(v)?,
        ]))
    }
}

#[derive(Debug, Clone)]
pub struct DictionarySerializer {
    key: SerializerRef,
    value: SerializerRef,
    representation: Representation,
}

impl DictionarySerializer {
    pub fn new(key: SerializerRef, value: SerializerRef, representation: Representation) -> Self {
        Self {
            key,
            value,
            representation,
        }
    }

    fn pair_serializer(&self) -> KeyValuePairSerializer {
        let representation = match self.representation {
            Representation::ArrayOfArrays => Representation::Array,
            _ => Representation::Document,
        };
        KeyValuePairSerializer::new(self.key.clone(), self.value.clone(), representation)
    }
}

impl Serializer for DictionarySerializer {
    fn value_type(&self) -> Type {
        Type::dictionary(self.key.value_type(), self.value.value_type())
    }

    fn representation(&self) -> Representation {
        self.representation
    }

    fn item_serializer(&self) -> Option<SerializerRef> {
        Some(Arc::new(self.pair_serializer()))
    }

    fn dictionary_info(&self) -> Option<DictionaryInfo> {
        Some(DictionaryInfo {
            representation: self.representation,
            key: self.key.clone(),
            value: self.value.clone(),
        })
    }

    fn serialize(&self, value: &Value) -> Result<Bson> {
        let entries = match value {
            Value::Null => return Ok(Bson::Null),
            Value::Dictionary(entries) => entries,
            other => {
                return Err(cannot_serialize(
                    other,
                    &self.value_type(),
                    self.representation,
                ))
            }
        };
        match self.representation {
            Representation::Document => {
                let mut doc = Document::new();
                for (k, v) in entries {
                    match self.key.serialize(k)? {
                        Bson::String(name) => {
                            doc.insert(name, self.value.serialize(v)?);
                        }
                        _ => return Err(Error::DictionaryKeysMustBeStrings),
                    }
                }
                Ok(Bson::Document(doc))
            }
            _ => {
                let pairs = self.pair_serializer();
                Ok(Bson::Array(
                    entries
                        .iter()
                        .map(|(k, v)| pairs.serialize(&Value::Array(vec![k.clone(), v.clone()])))
                        .collect::<Result<_>>()?,
                ))
            }
        }
    }

    fn deserialize(&self, bson: &Bson) -> Result<Value> {
        match (self.representation, bson) {
            (_, Bson::Null) => Ok(Value::Null),
            (Representation::Document, Bson::Document(doc)) => Ok(Value::Dictionary(
                doc.iter()
                    .map(|(k, v)| {
                        Ok((
                            self.key.deserialize(&Bson::String(k.clone()))?,
                            self.value.deserialize(v)?,
                        ))
                    })
                    .collect::<Result<_>>()?,
            )),
            (_, Bson::Array(items)) => {
                let pairs = self.pair_serializer();
                let mut entries = Vec::with_capacity(items.len());
                for item in items {
                    match pairs.deserialize(item)? {
                        Value::Array(mut kv) if kv.len() == 2 => {
                            let v = kv.pop().unwrap_or(Value::Null);
                            let k = kv.pop().unwrap_or(Value::Null);
                            entries.push((k, v));
                        }
                        _ => return Err(cannot_deserialize(item, &self.value_type())),
                    }
                }
                Ok(Value::Dictionary(entries))
            }
            (_, other) => Err(cannot_deserialize(other, &self.value_type())),
        }
    }
}

/// Field names of a grouping produced by `$group`.
pub const GROUPING_KEY_ELEMENT: &str = "_id";
pub const GROUPING_ELEMENTS_ELEMENT: &str = "_elements";

#[derive(Debug, Clone)]
pub struct GroupingSerializer {
    key: SerializerRef,
    element: SerializerRef,
}

impl GroupingSerializer {
    pub fn new(key: SerializerRef, element: SerializerRef) -> Self {
        Self { key, element }
    }

    pub fn key(&self) -> &SerializerRef {
        &self.key
    }
}

impl Serializer for GroupingSerializer {
    fn value_type(&self) -> Type {
        Type::grouping(self.key.value_type(), self.element.value_type())
    }

    fn representation(&self) -> Representation {
        Representation::Document
    }

    fn try_get_member_info(&self, member: &str) -> Option<MemberInfo> {
        (member == "Key").then(|| MemberInfo {
            element_name: GROUPING_KEY_ELEMENT.to_string(),
            serializer: self.key.clone(),
            is_grouped_member: false,
        })
    }

    fn item_serializer(&self) -> Option<SerializerRef> {
        Some(self.element.clone())
    }

    fn serialize(&self, value: &Value) -> Result<Bson> {
        match value {
            Value::Object(fields) => {
                let mut doc = Document::new();
                if let Some(key) = fields.get("Key") {
                    doc.insert(GROUPING_KEY_ELEMENT, self.key.serialize(key)?);
                }
                if let Some(Value::Array(elements)) = fields.get("Elements") {
                    doc.insert(
                        GROUPING_ELEMENTS_ELEMENT,
                        elements
                            .iter()
                            .map(|e| self.element.serialize(e))
                            .collect::<Result<Vec<_>>>()?,
                    );
                }
                Ok(Bson::Document(doc))
            }
            other => Err(cannot_serialize(
                other,
                &self.value_type(),
                Representation::Document,
            )),
        }
    }

    fn deserialize(&self, bson: &Bson) -> Result<Value> {
        let fail = || cannot_deserialize(bson, &self.value_type());
        let doc = bson.as_document().ok_or_else(fail)?;
        let mut fields = linked_hash_map::LinkedHashMap::new();
        fields.insert(
            "Key".to_string(),
            self.key
                .deserialize(doc.get(GROUPING_KEY_ELEMENT).unwrap_or(&Bson::Null))?,
        );
        let elements = match doc.get(GROUPING_ELEMENTS_ELEMENT) {
            Some(Bson::Array(items)) => items
                .iter()
                .map(|i| self.element.deserialize(i))
                .collect::<Result<Vec<_>>>()?,
            _ => vec![],
        };
        fields.insert("Elements".to_string(), Value::Array(elements));
        Ok(Value::Object(fields))
    }
}

/// The field that holds non-document results, for example `{ _v: 42 }`.
pub const WRAPPED_VALUE_FIELD: &str = "_v";

#[derive(Debug, Clone)]
pub struct WrappedValueSerializer {
    field: String,
    value: SerializerRef,
}

impl WrappedValueSerializer {
    pub fn new(value: SerializerRef) -> Self {
        Self {
            field: WRAPPED_VALUE_FIELD.to_string(),
            value,
        }
    }

    pub fn value(&self) -> &SerializerRef {
        &self.value
    }
}

impl Serializer for WrappedValueSerializer {
    fn value_type(&self) -> Type {
        self.value.value_type()
    }

    fn representation(&self) -> Representation {
        Representation::Document
    }

    fn wrapped_field(&self) -> Option<&str> {
        Some(&self.field)
    }

    fn item_serializer(&self) -> Option<SerializerRef> {
        self.value.item_serializer()
    }

    fn serialize(&self, value: &Value) -> Result<Bson> {
        let mut doc = Document::new();
        doc.insert(self.field.clone(), self.value.serialize(value)?);
        Ok(Bson::Document(doc))
    }

    fn deserialize(&self, bson: &Bson) -> Result<Value> {
        let doc = bson
            .as_document()
            .ok_or_else(|| cannot_deserialize(bson, &self.value_type()))?;
        self.value
            .deserialize(doc.get(&self.field).unwrap_or(&Bson::Null))
    }
}
