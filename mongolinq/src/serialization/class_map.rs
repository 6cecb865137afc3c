use crate::{
    expression::{Type, Value},
    serialization::{
        registry::RegistryState, Error, MemberInfo, Representation, Result, Serializer,
        SerializerRef, SerializerRegistry,
    },
};
use bson::{Bson, Document};
use linked_hash_map::LinkedHashMap;
use std::sync::{Arc, Weak};

/// Describes how a class is stored: its members, its place in a hierarchy and
/// the discriminator identifying it.
#[derive(Debug, Clone)]
pub struct ClassMap {
    pub type_name: String,
    pub base_type: Option<String>,
    pub discriminator: String,
    pub discriminator_is_required: bool,
    pub is_root_class: bool,
    pub members: Vec<MemberMap>,
}

#[derive(Debug, Clone)]
pub struct MemberMap {
    pub member_name: String,
    pub element_name: String,
    pub member_type: Type,
    pub serializer: Option<SerializerRef>,
    pub is_grouped_member: bool,
}

/// The element a member is stored under when it has no explicit mapping.
/// Members named `Id` hold the document id.
pub fn default_element_name(member_name: &str) -> String {
    match member_name {
        "Id" | "id" => "_id".to_string(),
        other => other.to_string(),
    }
}

impl ClassMap {
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            base_type: None,
            discriminator: type_name.to_string(),
            discriminator_is_required: false,
            is_root_class: false,
            members: vec![],
        }
    }

    pub fn base(mut self, base_type: &str) -> Self {
        self.base_type = Some(base_type.to_string());
        self
    }

    pub fn discriminator(mut self, discriminator: &str) -> Self {
        self.discriminator = discriminator.to_string();
        self
    }

    pub fn discriminator_is_required(mut self) -> Self {
        self.discriminator_is_required = true;
        self
    }

    /// Marks the root of a hierarchy stored with hierarchical discriminators.
    pub fn root_class(mut self) -> Self {
        self.is_root_class = true;
        self
    }

    pub fn member(self, member_name: &str, member_type: Type) -> Self {
        let element_name = default_element_name(member_name);
        self.member_as(member_name, &element_name, member_type)
    }

    pub fn member_as(mut self, member_name: &str, element_name: &str, member_type: Type) -> Self {
        self.members.push(MemberMap {
            member_name: member_name.to_string(),
            element_name: element_name.to_string(),
            member_type,
            serializer: None,
            is_grouped_member: false,
        });
        self
    }

    pub fn member_with_serializer(
        mut self,
        member_name: &str,
        member_type: Type,
        serializer: SerializerRef,
    ) -> Self {
        self.members.push(MemberMap {
            member_name: member_name.to_string(),
            element_name: default_element_name(member_name),
            member_type,
            serializer: Some(serializer),
            is_grouped_member: false,
        });
        self
    }

    /// A member folded into the composite `_id` document.
    pub fn grouped_member(mut self, member_name: &str, element_name: &str, member_type: Type) -> Self {
        self.members.push(MemberMap {
            member_name: member_name.to_string(),
            element_name: element_name.to_string(),
            member_type,
            serializer: None,
            is_grouped_member: true,
        });
        self
    }
}

/// Serializer for classes and anonymous types. Member serializers are resolved
/// on demand so self-referencing types do not recurse at construction.
#[derive(Debug, Clone)]
pub struct ClassSerializer {
    ty: Type,
    members: Vec<MemberMap>,
    discriminator: Option<(String, Bson)>,
    registry: Weak<RegistryState>,
}

impl ClassSerializer {
    pub(crate) fn new(
        ty: Type,
        members: Vec<MemberMap>,
        discriminator: Option<(String, Bson)>,
        registry: Weak<RegistryState>,
    ) -> Self {
        Self {
            ty,
            members,
            discriminator,
            registry,
        }
    }

    pub fn members(&self) -> &[MemberMap] {
        &self.members
    }

    fn member_serializer(&self, member: &MemberMap) -> Result<SerializerRef> {
        if let Some(serializer) = &member.serializer {
            return Ok(serializer.clone());
        }
        let state = self
            .registry
            .upgrade()
            .ok_or_else(|| Error::SerializerNotFound(member.member_type.clone()))?;
        SerializerRegistry::from_state(state).get_serializer(&member.member_type)
    }
}

impl Serializer for ClassSerializer {
    fn value_type(&self) -> Type {
        self.ty.clone()
    }

    fn representation(&self) -> Representation {
        Representation::Document
    }

    fn try_get_member_info(&self, member: &str) -> Option<MemberInfo> {
        let map = self.members.iter().find(|m| m.member_name == member)?;
        Some(MemberInfo {
            element_name: map.element_name.clone(),
            serializer: self.member_serializer(map).ok()?,
            is_grouped_member: map.is_grouped_member,
        })
    }

    fn serialize(&self, value: &Value) -> Result<Bson> {
        let fields = match value {
            Value::Null => return Ok(Bson::Null),
            Value::Object(fields) => fields,
            other => {
                return Err(Error::CannotSerialize {
                    value: other.to_string(),
                    ty: self.ty.clone(),
                    representation: Representation::Document,
                })
            }
        };
        let mut doc = Document::new();
        if let Some((element, discriminator)) = &self.discriminator {
            doc.insert(element.clone(), discriminator.clone());
        }
        let mut id = Document::new();
        for member in &self.members {
            let Some(v) = fields.get(&member.member_name) else {
                continue;
            };
            let bson = self.member_serializer(member)?.serialize(v)?;
            if member.is_grouped_member {
                id.insert(member.element_name.clone(), bson);
            } else {
                doc.insert(member.element_name.clone(), bson);
            }
        }
        if !id.is_empty() {
            doc.insert("_id", id);
        }
        Ok(Bson::Document(doc))
    }

    fn deserialize(&self, bson: &Bson) -> Result<Value> {
        let doc = match bson {
            Bson::Null => return Ok(Value::Null),
            Bson::Document(doc) => doc,
            other => {
                return Err(Error::CannotDeserialize {
                    bson: other.to_string(),
                    ty: self.ty.clone(),
                })
            }
        };
        let mut fields = LinkedHashMap::new();
        for member in &self.members {
            let container = if member.is_grouped_member {
                doc.get_document("_id").ok()
            } else {
                Some(doc)
            };
            if let Some(v) = container.and_then(|c| c.get(&member.element_name)) {
                fields.insert(
                    member.member_name.clone(),
                    self.member_serializer(member)?.deserialize(v)?,
                );
            }
        }
        Ok(Value::Object(fields))
    }
}

/// Wraps a serializer so tests and callers can share one instance.
pub fn shared<S: Serializer + 'static>(serializer: S) -> SerializerRef {
    Arc::new(serializer)
}
