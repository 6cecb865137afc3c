use crate::{
    expression::Type,
    serialization::{ClassMap, SerializerRegistry},
};

/// Animal (hierarchical root) <- Mammal <- Dog, and Vehicle <- Car, Truck
/// with scalar discriminators.
fn registry() -> SerializerRegistry {
    let registry = SerializerRegistry::new();
    registry.register_class_map(
        ClassMap::new("Animal")
            .root_class()
            .member("Id", Type::ObjectId)
            .member("Name", Type::String),
    );
    registry.register_class_map(ClassMap::new("Mammal").base("Animal"));
    registry.register_class_map(
        ClassMap::new("Dog")
            .base("Mammal")
            .member("Breed", Type::String),
    );
    registry.register_class_map(ClassMap::new("Vehicle").member("Wheels", Type::Int32));
    registry.register_class_map(ClassMap::new("Car").base("Vehicle"));
    registry.register_class_map(ClassMap::new("Truck").base("Vehicle").discriminator("truck"));
    registry
}

mod discriminators {
    use super::registry;
    use crate::{
        expression::Type,
        serialization::{ClassMap, DiscriminatorConvention},
    };
    use bson::{bson, Bson};

    #[test]
    fn root_class_uses_hierarchical_convention() {
        assert_eq!(
            Some(DiscriminatorConvention::Hierarchical {
                element_name: "_t".to_string()
            }),
            registry().discriminator_convention(&Type::class("Dog"))
        );
    }

    #[test]
    fn hierarchical_discriminator_lists_the_chain_from_the_root() {
        let registry = registry();
        assert_eq!(
            Some(bson!(["Animal", "Mammal", "Dog"])),
            registry.get_discriminator(&Type::class("Dog"))
        );
        assert_eq!(
            Some(Bson::String("Animal".to_string())),
            registry.get_discriminator(&Type::class("Animal"))
        );
    }

    #[test]
    fn scalar_discriminator_names_the_class() {
        let registry = registry();
        assert!(!registry
            .discriminator_convention(&Type::class("Car"))
            .is_some_and(|c| c.is_hierarchical()));
        assert_eq!(
            Some(Bson::String("truck".to_string())),
            registry.get_discriminator(&Type::class("Truck"))
        );
    }

    #[test]
    fn discriminators_for_type_and_subtypes_follow_registration_order() {
        assert_eq!(
            vec![bson!("Vehicle"), bson!("Car"), bson!("truck")],
            registry().get_discriminators_for_type_and_subtypes(&Type::class("Vehicle"))
        );
    }

    #[test]
    fn scalar_root_does_not_write_a_discriminator() {
        let registry = registry();
        assert!(!registry.writes_discriminator(&Type::class("Vehicle")));
        assert!(registry.writes_discriminator(&Type::class("Car")));
        assert!(registry.writes_discriminator(&Type::class("Animal")));
    }

    #[test]
    fn classes_outside_a_hierarchy_have_no_convention() {
        let registry = registry();
        registry.register_class_map(ClassMap::new("Plain").member("N", Type::Int32));
        assert_eq!(None, registry.discriminator_convention(&Type::class("Plain")));
        assert_eq!(None, registry.discriminator_convention(&Type::Int32));
    }
}

mod classes {
    use super::registry;
    use crate::{
        expression::{Type, Value},
        serialization::{ClassMap, Error, Representation},
    };
    use bson::{doc, oid::ObjectId, Bson};
    use linked_hash_map::LinkedHashMap;

    fn object(fields: Vec<(&str, Value)>) -> Value {
        Value::Object(
            fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<LinkedHashMap<_, _>>(),
        )
    }

    #[test]
    fn derived_class_writes_discriminator_and_inherited_members() {
        let registry = registry();
        let serializer = registry.get_serializer(&Type::class("Dog")).unwrap();
        let dog = object(vec![
            ("Name", Value::String("Rex".to_string())),
            ("Breed", Value::String("Collie".to_string())),
        ]);
        assert_eq!(
            Ok(Bson::Document(doc! {
                "_t": ["Animal", "Mammal", "Dog"],
                "Name": "Rex",
                "Breed": "Collie",
            })),
            serializer.serialize(&dog)
        );
    }

    #[test]
    fn id_member_is_stored_as_underscore_id() {
        let registry = registry();
        let serializer = registry.get_serializer(&Type::class("Animal")).unwrap();
        let info = serializer.try_get_member_info("Id").unwrap();
        assert_eq!("_id", info.element_name);
        assert_eq!(Representation::ObjectId, info.serializer.representation());

        let id = ObjectId::new();
        assert_eq!(
            Ok(object(vec![
                ("Id", Value::ObjectId(id)),
                ("Name", Value::String("Tom".to_string())),
            ])),
            serializer.deserialize(&Bson::Document(doc! {
                "_id": id,
                "_t": "Animal",
                "Name": "Tom",
            }))
        );
    }

    #[test]
    fn unknown_member_has_no_info() {
        let registry = registry();
        let serializer = registry.get_serializer(&Type::class("Dog")).unwrap();
        assert!(serializer.try_get_member_info("Owner").is_none());
    }

    #[test]
    fn grouped_members_live_under_the_id() {
        let registry = registry();
        registry.register_class_map(
            ClassMap::new("Bucket")
                .grouped_member("Key", "k", Type::Int32)
                .member("Total", Type::Int64),
        );
        let serializer = registry.get_serializer(&Type::class("Bucket")).unwrap();
        assert_eq!(
            "_id.k",
            serializer.try_get_member_info("Key").unwrap().storage_path()
        );
        let bucket = object(vec![("Key", Value::Int32(3)), ("Total", Value::Int64(10))]);
        let stored = Bson::Document(doc! { "Total": 10_i64, "_id": { "k": 3 } });
        assert_eq!(Ok(stored.clone()), serializer.serialize(&bucket));
        assert_eq!(Ok(bucket), serializer.deserialize(&stored));
    }

    #[test]
    fn unregistered_class_has_no_serializer() {
        assert_eq!(
            Err(Error::SerializerNotFound(Type::class("Ghost"))),
            registry().get_serializer(&Type::class("Ghost")).map(|_| ())
        );
    }

    #[test]
    fn reregistering_a_class_replaces_its_serializer() {
        let registry = registry();
        let before = registry.get_serializer(&Type::class("Car")).unwrap();
        assert!(before.try_get_member_info("Seats").is_none());
        registry.register_class_map(
            ClassMap::new("Car")
                .base("Vehicle")
                .member("Seats", Type::Int32),
        );
        let after = registry.get_serializer(&Type::class("Car")).unwrap();
        assert!(after.try_get_member_info("Seats").is_some());
    }
}

mod scalars {
    use crate::{
        expression::{Type, Value},
        serialization::{global, Error, Representation, ScalarSerializer, Serializer},
    };
    use bson::{Bson, Decimal128};
    use std::str::FromStr;

    #[test]
    fn whole_doubles_deserialize_as_integers() {
        let serializer = ScalarSerializer::new(Type::Int32, Representation::Int32);
        assert_eq!(Ok(Value::Int32(3)), serializer.deserialize(&Bson::Double(3.0)));
        assert!(matches!(
            serializer.deserialize(&Bson::Double(3.5)),
            Err(Error::CannotDeserialize { .. })
        ));
    }

    #[test]
    fn null_needs_a_type_that_holds_null() {
        let int = ScalarSerializer::new(Type::Int32, Representation::Int32);
        assert!(int.deserialize(&Bson::Null).is_err());
        let nullable = global()
            .get_serializer(&Type::nullable(Type::Int32))
            .unwrap();
        assert_eq!(Ok(Value::Null), nullable.deserialize(&Bson::Null));
    }

    #[test]
    fn integers_stored_as_decimal() {
        let serializer = ScalarSerializer::new(Type::Int32, Representation::Decimal128);
        assert_eq!(
            Ok(Bson::Decimal128(Decimal128::from_str("5").unwrap())),
            serializer.serialize(&Value::Int32(5))
        );
    }

    #[test]
    fn integers_stored_as_strings() {
        let serializer = ScalarSerializer::new(Type::Int32, Representation::String);
        assert_eq!(
            Ok(Bson::String("42".to_string())),
            serializer.serialize(&Value::Int32(42))
        );
        assert_eq!(
            Ok(Value::Int32(42)),
            serializer.deserialize(&Bson::String("42".to_string()))
        );
    }

    #[test]
    fn out_of_range_int32_cannot_serialize() {
        let serializer = ScalarSerializer::new(Type::Int64, Representation::Int32);
        assert_eq!(
            Err(Error::CannotSerialize {
                value: "5000000000L".to_string(),
                ty: Type::Int64,
                representation: Representation::Int32,
            }),
            serializer.serialize(&Value::Int64(5_000_000_000))
        );
    }

    #[test]
    fn global_registry_is_shared() {
        assert!(std::ptr::eq(global(), global()));
    }
}

mod enums {
    use crate::{
        expression::{Type, Value},
        serialization::{EnumDefinition, Error, Representation, SerializerRegistry},
    };
    use bson::Bson;

    fn color(representation: Representation) -> SerializerRegistry {
        let registry = SerializerRegistry::new();
        registry.register_enum(
            EnumDefinition::new("Color", &[("Red", 0), ("Green", 1), ("Blue", 2)])
                .with_representation(representation),
        );
        registry
    }

    fn green() -> Value {
        Value::Enum {
            type_name: "Color".to_string(),
            ordinal: 1,
        }
    }

    #[test]
    fn default_representation_is_the_ordinal() {
        let registry = SerializerRegistry::new();
        registry.register_enum(EnumDefinition::new("Color", &[("Red", 0), ("Green", 1)]));
        let serializer = registry.get_serializer(&Type::enumeration("Color")).unwrap();
        assert_eq!(Ok(Bson::Int32(1)), serializer.serialize(&green()));
    }

    #[test]
    fn string_representation_stores_the_name() {
        let registry = color(Representation::String);
        let serializer = registry.get_serializer(&Type::enumeration("Color")).unwrap();
        assert_eq!(
            Ok(Bson::String("Green".to_string())),
            serializer.serialize(&green())
        );
        assert_eq!(
            Ok(green()),
            serializer.deserialize(&Bson::String("Green".to_string()))
        );
    }

    #[test]
    fn int64_representation() {
        let registry = color(Representation::Int64);
        let serializer = registry.get_serializer(&Type::enumeration("Color")).unwrap();
        assert_eq!(Ok(Bson::Int64(1)), serializer.serialize(&green()));
        assert_eq!(Ok(green()), serializer.deserialize(&Bson::Int64(1)));
    }

    #[test]
    fn unknown_names_and_ordinals_are_errors() {
        let registry = color(Representation::String);
        let serializer = registry.get_serializer(&Type::enumeration("Color")).unwrap();
        assert_eq!(
            Err(Error::UnknownEnumName {
                type_name: "Color".to_string(),
                name: "Purple".to_string(),
            }),
            serializer.deserialize(&Bson::String("Purple".to_string()))
        );
        assert_eq!(
            Err(Error::UnknownEnumOrdinal {
                type_name: "Color".to_string(),
                ordinal: 7,
            }),
            serializer.serialize(&Value::Enum {
                type_name: "Color".to_string(),
                ordinal: 7,
            })
        );
    }
}

mod dictionaries {
    use crate::{
        expression::{Type, Value},
        serialization::{
            DictionarySerializer, Error, Representation, ScalarSerializer, Serializer,
            SerializerRegistry,
        },
    };
    use bson::{doc, Bson};
    use quickcheck::QuickCheck;
    use std::sync::Arc;

    fn string_to_int(representation: Representation) -> DictionarySerializer {
        DictionarySerializer::new(
            Arc::new(ScalarSerializer::new(Type::String, Representation::String)),
            Arc::new(ScalarSerializer::new(Type::Int32, Representation::Int32)),
            representation,
        )
    }

    fn entries(pairs: &[(&str, i32)]) -> Value {
        Value::Dictionary(
            pairs
                .iter()
                .map(|(k, v)| (Value::String(k.to_string()), Value::Int32(*v)))
                .collect(),
        )
    }

    #[test]
    fn document_representation() {
        assert_eq!(
            Ok(Bson::Document(doc! { "a": 1, "b": 2 })),
            string_to_int(Representation::Document).serialize(&entries(&[("a", 1), ("b", 2)]))
        );
    }

    #[test]
    fn array_of_arrays_representation() {
        assert_eq!(
            Ok(bson::bson!([["a", 1], ["b", 2]])),
            string_to_int(Representation::ArrayOfArrays)
                .serialize(&entries(&[("a", 1), ("b", 2)]))
        );
    }

    #[test]
    fn array_of_documents_representation() {
        assert_eq!(
            Ok(bson::bson!([{ "k": "a", "v": 1 }])),
            string_to_int(Representation::ArrayOfDocuments).serialize(&entries(&[("a", 1)]))
        );
    }

    #[test]
    fn document_representation_needs_string_keys() {
        let serializer = DictionarySerializer::new(
            Arc::new(ScalarSerializer::new(Type::Int32, Representation::Int32)),
            Arc::new(ScalarSerializer::new(Type::Int32, Representation::Int32)),
            Representation::Document,
        );
        assert_eq!(
            Err(Error::DictionaryKeysMustBeStrings),
            serializer.serialize(&Value::Dictionary(vec![(Value::Int32(1), Value::Int32(2))]))
        );
    }

    #[test]
    fn registered_representation_is_used() {
        let registry = SerializerRegistry::new();
        let ty = Type::dictionary(Type::String, Type::Int32);
        assert_eq!(
            Representation::Document,
            registry.get_serializer(&ty).unwrap().representation()
        );

        let registry = SerializerRegistry::new();
        registry.register_dictionary_representation(ty.clone(), Representation::ArrayOfArrays);
        assert_eq!(
            Representation::ArrayOfArrays,
            registry.get_serializer(&ty).unwrap().representation()
        );
    }

    #[test]
    fn every_representation_decodes_what_it_encodes() {
        fn decodes(pairs: Vec<(String, i32)>) -> bool {
            let mut unique: Vec<(String, i32)> = vec![];
            for (k, v) in pairs {
                // Field names cannot contain nul bytes.
                if !k.contains('\0') && !unique.iter().any(|(u, _)| *u == k) {
                    unique.push((k, v));
                }
            }
            let value = Value::Dictionary(
                unique
                    .into_iter()
                    .map(|(k, v)| (Value::String(k), Value::Int32(v)))
                    .collect(),
            );
            [
                Representation::Document,
                Representation::ArrayOfArrays,
                Representation::ArrayOfDocuments,
            ]
            .into_iter()
            .all(|representation| {
                let serializer = string_to_int(representation);
                serializer
                    .serialize(&value)
                    .and_then(|bson| serializer.deserialize(&bson))
                    .is_ok_and(|decoded| decoded == value)
            })
        }
        QuickCheck::new().quickcheck(decodes as fn(Vec<(String, i32)>) -> bool);
    }
}
