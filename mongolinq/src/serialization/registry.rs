use crate::{
    expression::Type,
    serialization::{
        default_element_name, ArraySerializer, ClassMap, ClassSerializer, DictionarySerializer,
        DiscriminatorConvention,
        EnumDefinition, EnumSerializer, Error, GroupingSerializer, KeyValuePairSerializer,
        MemberMap, NullableSerializer, Representation, Result, ScalarSerializer, SerializerRef,
        DEFAULT_DISCRIMINATOR_ELEMENT,
    },
};
use bson::Bson;
use lazy_static::lazy_static;
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

#[derive(Debug, Default)]
pub(crate) struct RegistryState {
    serializers: RwLock<HashMap<Type, SerializerRef>>,
    class_maps: RwLock<Vec<Arc<ClassMap>>>,
    enums: RwLock<HashMap<String, EnumDefinition>>,
    dictionary_representations: RwLock<HashMap<Type, Representation>>,
}

/// Maps types to serializers. Registration is a setup activity; lookups take
/// read locks and may run from any number of threads.
#[derive(Debug, Clone, Default)]
pub struct SerializerRegistry {
    state: Arc<RegistryState>,
}

lazy_static! {
    static ref GLOBAL_REGISTRY: SerializerRegistry = SerializerRegistry::new();
}

/// The process-wide registry, created on first use.
pub fn global() -> &'static SerializerRegistry {
    &GLOBAL_REGISTRY
}

impl SerializerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_state(state: Arc<RegistryState>) -> Self {
        Self { state }
    }

    /// Registers an explicit serializer, overriding the derived default.
    pub fn register_serializer(&self, ty: Type, serializer: SerializerRef) {
        self.state
            .serializers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ty, serializer);
    }

    pub fn register_class_map(&self, class_map: ClassMap) {
        let mut maps = self
            .state
            .class_maps
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        maps.retain(|m| m.type_name != class_map.type_name);
        maps.push(Arc::new(class_map));
        // Derived class serializers embed discriminators and inherited members.
        self.state
            .serializers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|ty, _| !matches!(ty, Type::Class(_)));
    }

    pub fn register_enum(&self, definition: EnumDefinition) {
        self.state
            .enums
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(definition.type_name.clone(), definition);
    }

    /// Chooses how dictionaries of the given type are stored. The default is
    /// `Document`.
    pub fn register_dictionary_representation(&self, ty: Type, representation: Representation) {
        self.state
            .dictionary_representations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ty, representation);
    }

    pub fn lookup_class_map(&self, type_name: &str) -> Option<Arc<ClassMap>> {
        self.state
            .class_maps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|m| m.type_name == type_name)
            .cloned()
    }

    pub fn lookup_enum(&self, type_name: &str) -> Option<EnumDefinition> {
        self.state
            .enums
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_name)
            .cloned()
    }

    /// Class maps from the root of the hierarchy down to `type_name`.
    pub fn class_chain(&self, type_name: &str) -> Vec<Arc<ClassMap>> {
        let mut chain = vec![];
        let mut next = self.lookup_class_map(type_name);
        while let Some(map) = next {
            next = map
                .base_type
                .as_deref()
                .and_then(|b| self.lookup_class_map(b))
                .filter(|b| !chain.iter().any(|c: &Arc<ClassMap>| c.type_name == b.type_name));
            chain.push(map);
        }
        chain.reverse();
        chain
    }

    /// Registered classes deriving from `type_name`, directly or not, in
    /// registration order.
    pub fn known_subtypes(&self, type_name: &str) -> Vec<String> {
        let maps = self
            .state
            .class_maps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        maps.iter()
            .filter(|m| m.type_name != type_name)
            .filter(|m| {
                self.class_chain(&m.type_name)
                    .iter()
                    .any(|c| c.type_name == type_name)
            })
            .map(|m| m.type_name.clone())
            .collect()
    }

    fn is_polymorphic(&self, type_name: &str) -> bool {
        let chain = self.class_chain(type_name);
        chain.len() > 1
            || chain.iter().any(|c| c.is_root_class || c.discriminator_is_required)
            || !self.known_subtypes(type_name).is_empty()
    }

    pub fn discriminator_convention(&self, ty: &Type) -> Option<DiscriminatorConvention> {
        let name = match ty.non_nullable() {
            Type::Class(name) => name,
            _ => return None,
        };
        if !self.is_polymorphic(name) {
            return None;
        }
        let element_name = DEFAULT_DISCRIMINATOR_ELEMENT.to_string();
        if self.class_chain(name).iter().any(|c| c.is_root_class) {
            Some(DiscriminatorConvention::Hierarchical { element_name })
        } else {
            Some(DiscriminatorConvention::Scalar { element_name })
        }
    }

    /// The discriminator stored for documents whose concrete type is `ty`.
    pub fn get_discriminator(&self, ty: &Type) -> Option<Bson> {
        let convention = self.discriminator_convention(ty)?;
        let name = ty.non_nullable().nominal_name()?;
        let chain = self.class_chain(name);
        let leaf = chain.last()?;
        match convention {
            DiscriminatorConvention::Scalar { .. } => Some(Bson::String(leaf.discriminator.clone())),
            DiscriminatorConvention::Hierarchical { .. } => {
                let from_root: Vec<Bson> = chain
                    .iter()
                    .skip_while(|c| !c.is_root_class)
                    .map(|c| Bson::String(c.discriminator.clone()))
                    .collect();
                match from_root.len() {
                    0 => None,
                    1 => from_root.into_iter().next(),
                    _ => Some(Bson::Array(from_root)),
                }
            }
        }
    }

    /// The scalar discriminator of `ty` followed by those of all its known
    /// subtypes.
    pub fn get_discriminators_for_type_and_subtypes(&self, ty: &Type) -> Vec<Bson> {
        let Some(name) = ty.non_nullable().nominal_name() else {
            return vec![];
        };
        std::iter::once(name.to_string())
            .chain(self.known_subtypes(name))
            .filter_map(|n| self.lookup_class_map(&n))
            .map(|m| Bson::String(m.discriminator.clone()))
            .collect()
    }

    /// Whether documents of exactly `ty` carry a discriminator element. The
    /// root of a scalar hierarchy only does when it is required.
    pub fn writes_discriminator(&self, ty: &Type) -> bool {
        let Some(name) = ty.non_nullable().nominal_name() else {
            return false;
        };
        let chain = self.class_chain(name);
        self.discriminator_convention(ty).is_some()
            && (chain.len() > 1
                || chain
                    .iter()
                    .any(|c| c.is_root_class || c.discriminator_is_required))
    }

    pub fn get_serializer(&self, ty: &Type) -> Result<SerializerRef> {
        if let Some(s) = self
            .state
            .serializers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(ty)
        {
            return Ok(s.clone());
        }
        let serializer = self.derive_serializer(ty)?;
        self.state
            .serializers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(ty.clone())
            .or_insert_with(|| serializer.clone());
        Ok(serializer)
    }

    fn derive_serializer(&self, ty: &Type) -> Result<SerializerRef> {
        if let Some(scalar) = ScalarSerializer::default_for(ty) {
            return Ok(Arc::new(scalar));
        }
        Ok(match ty {
            Type::Nullable(inner) => Arc::new(NullableSerializer::new(self.get_serializer(inner)?)),
            Type::Enum(name) => {
                let definition = self
                    .lookup_enum(name)
                    .unwrap_or_else(|| EnumDefinition::new(name, &[]));
                Arc::new(EnumSerializer::new(definition))
            }
            Type::Array(item) | Type::List(item) | Type::Enumerable(item) | Type::Queryable(item) => {
                Arc::new(ArraySerializer::new(ty.clone(), self.get_serializer(item)?))
            }
            Type::Dictionary(k, v) => {
                let representation = self
                    .state
                    .dictionary_representations
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(ty)
                    .copied()
                    .unwrap_or(Representation::Document);
                Arc::new(DictionarySerializer::new(
                    self.get_serializer(k)?,
                    self.get_serializer(v)?,
                    representation,
                ))
            }
            Type::KeyValuePair(k, v) => Arc::new(KeyValuePairSerializer::new(
                self.get_serializer(k)?,
                self.get_serializer(v)?,
                Representation::Document,
            )),
            Type::Grouping(k, e) => Arc::new(GroupingSerializer::new(
                self.get_serializer(k)?,
                self.get_serializer(e)?,
            )),
            Type::Class(name) => {
                let chain = self.class_chain(name);
                if chain.is_empty() {
                    return Err(Error::SerializerNotFound(ty.clone()));
                }
                let members = chain.iter().flat_map(|c| c.members.iter().cloned()).collect();
                let discriminator = if self.writes_discriminator(ty) {
                    let element = self
                        .discriminator_convention(ty)
                        .map(|c| c.element_name().to_string())
                        .unwrap_or_else(|| DEFAULT_DISCRIMINATOR_ELEMENT.to_string());
                    self.get_discriminator(ty).map(|d| (element, d))
                } else {
                    None
                };
                Arc::new(ClassSerializer::new(
                    ty.clone(),
                    members,
                    discriminator,
                    Arc::downgrade(&self.state),
                ))
            }
            Type::Anonymous(fields) => {
                let members = fields
                    .iter()
                    .map(|(name, member_type)| MemberMap {
                        member_name: name.clone(),
                        element_name: default_element_name(name),
                        member_type: member_type.clone(),
                        serializer: None,
                        is_grouped_member: false,
                    })
                    .collect();
                Arc::new(ClassSerializer::new(
                    ty.clone(),
                    members,
                    None,
                    Arc::downgrade(&self.state),
                ))
            }
            _ => return Err(Error::SerializerNotFound(ty.clone())),
        })
    }
}
