use crate::{
    expression::{builder::*, Expression, Parameter, Type},
    serialization::{ClassMap, SerializerRegistry},
};

/// Classes shared by the translator tests:
///   C { A: int[], B: bool, S: string, X: List<int>, N: int, D: DateTime }
///   D { CId: int, Name: string }
///   Animal (hierarchical root) <- Dog, Cat
///   Vehicle (scalar discriminators) <- Car <- SportsCar, Truck
pub(crate) fn registry() -> SerializerRegistry {
    let registry = SerializerRegistry::new();
    registry.register_class_map(
        ClassMap::new("C")
            .member("A", Type::array(Type::Int32))
            .member("B", Type::Boolean)
            .member("S", Type::String)
            .member("X", Type::list(Type::Int32))
            .member("N", Type::Int32)
            .member("D", Type::DateTime),
    );
    registry.register_class_map(
        ClassMap::new("D")
            .member("CId", Type::Int32)
            .member("Name", Type::String),
    );
    registry.register_class_map(
        ClassMap::new("Animal")
            .root_class()
            .member("Name", Type::String),
    );
    registry.register_class_map(
        ClassMap::new("Dog")
            .base("Animal")
            .member("Breed", Type::String),
    );
    registry.register_class_map(ClassMap::new("Cat").base("Animal"));
    registry.register_class_map(ClassMap::new("Vehicle").member("Wheels", Type::Int32));
    registry.register_class_map(ClassMap::new("Car").base("Vehicle"));
    registry.register_class_map(ClassMap::new("SportsCar").base("Car"));
    registry.register_class_map(ClassMap::new("Truck").base("Vehicle"));
    registry
}

/// A member of `C` with its declared type.
pub(crate) fn field(p: &Parameter, name: &str) -> Expression {
    let ty = match name {
        "A" => Type::array(Type::Int32),
        "B" => Type::Boolean,
        "S" | "Name" | "Breed" => Type::String,
        "X" => Type::list(Type::Int32),
        "D" => Type::DateTime,
        _ => Type::Int32,
    };
    p.member(name, ty)
}

pub(crate) fn c_source() -> Expression {
    source("c", Type::class("C"))
}

pub(crate) fn x() -> Parameter {
    param("x", Type::class("C"))
}

macro_rules! test_translate_pipeline {
    ($func_name:ident, expected = $expected:expr, input = $input:expr $(, options = $options:expr)? $(,)?) => {
        #[test]
        fn $func_name() {
            #[allow(unused_imports)]
            use crate::{
                codegen::MqlCodeGenerator, options::TranslationOptions, translator::QueryTranslator,
            };
            let expected = $expected;
            let input = $input;
            #[allow(unused_mut)]
            let mut options = TranslationOptions::default();
            $(options = $options;)?

            let registry = crate::translator::test::registry();
            let translator = QueryTranslator::new(registry.clone(), options);
            let actual = translator.translate_query(&input).map(|query| {
                MqlCodeGenerator::new()
                    .codegen_pipeline(query.pipeline)
                    .unwrap()
            });
            assert_eq!(expected, actual);
        }
    };
}

macro_rules! test_translate_unsupported {
    ($func_name:ident, reason = $reason:expr, input = $input:expr $(,)?) => {
        #[test]
        fn $func_name() {
            use crate::{
                options::TranslationOptions,
                translator::{Error, QueryTranslator},
            };
            let input = $input;

            let registry = crate::translator::test::registry();
            let translator = QueryTranslator::new(registry.clone(), TranslationOptions::default());
            match translator.translate_query(&input) {
                Err(Error::ExpressionNotSupported {
                    reason: Some(reason),
                    ..
                }) => assert!(
                    reason.contains($reason),
                    "unexpected reason: {reason}"
                ),
                other => panic!("expected an unsupported expression, got {other:?}"),
            }
        }
    };
}

mod filters {
    use super::{c_source, field, x};
    use crate::expression::{builder::*, Method, Type};
    use bson::{doc, Regex};

    test_translate_pipeline!(
        any_element_equal_to_value_matches_the_array,
        expected = Ok(vec![doc! { "$match": { "A": 2 } }]),
        input = {
            let (x, v) = (x(), param("v", Type::Int32));
            c_source().where_(lambda(
                &x,
                field(&x, "A").any_with(lambda(&v, eq(v.expr(), int(2)))),
            ))
        },
    );

    test_translate_pipeline!(
        any_with_range_predicate_uses_elem_match,
        expected = Ok(vec![
            doc! { "$match": { "A": { "$elemMatch": { "$gt": 2 } } } }
        ]),
        input = {
            let (x, v) = (x(), param("v", Type::Int32));
            c_source().where_(lambda(
                &x,
                field(&x, "A").any_with(lambda(&v, gt(v.expr(), int(2)))),
            ))
        },
    );

    test_translate_pipeline!(
        any_without_predicate_tests_the_first_element,
        expected = Ok(vec![doc! { "$match": { "A.0": { "$exists": true } } }]),
        input = {
            let x = x();
            c_source().where_(lambda(&x, field(&x, "A").any()))
        },
    );

    test_translate_pipeline!(
        all_negates_the_element_predicate,
        expected = Ok(vec![doc! {
            "$match": { "A": { "$not": { "$elemMatch": { "$not": { "$gt": 2 } } } } }
        }]),
        input = {
            let (x, v) = (x(), param("v", Type::Int32));
            c_source().where_(lambda(
                &x,
                field(&x, "A").all(lambda(&v, gt(v.expr(), int(2)))),
            ))
        },
    );

    test_translate_pipeline!(
        contains_on_constant_list_is_in,
        expected = Ok(vec![doc! { "$match": { "N": { "$in": [1, 2, 3] } } }]),
        input = {
            let x = x();
            c_source().where_(lambda(
                &x,
                new_array(Type::Int32, vec![int(1), int(2), int(3)]).contains(field(&x, "N")),
            ))
        },
    );

    test_translate_pipeline!(
        contains_on_stored_array_matches_an_element,
        expected = Ok(vec![doc! { "$match": { "X": 7 } }]),
        input = {
            let x = x();
            c_source().where_(lambda(&x, field(&x, "X").contains(int(7))))
        },
    );

    test_translate_pipeline!(
        is_null_or_empty_is_in_null_or_empty_string,
        expected = Ok(vec![doc! { "$match": { "S": { "$in": [null, ""] } } }]),
        input = {
            let x = x();
            c_source().where_(lambda(&x, is_null_or_empty(field(&x, "S"))))
        },
    );

    test_translate_pipeline!(
        starts_with_is_an_anchored_regex,
        expected = Ok(vec![doc! {
            "$match": {
                "S": Regex { pattern: "^a\\.b".to_string(), options: "s".to_string() }
            }
        }]),
        input = {
            let x = x();
            c_source().where_(lambda(
                &x,
                call_instance(
                    Method::StartsWith,
                    field(&x, "S"),
                    vec![string("a.b")],
                    Type::Boolean,
                ),
            ))
        },
    );

    test_translate_pipeline!(
        boolean_member_is_compared_with_true,
        expected = Ok(vec![doc! { "$match": { "B": true } }]),
        input = {
            let x = x();
            c_source().where_(lambda(&x, field(&x, "B")))
        },
    );

    test_translate_pipeline!(
        negated_boolean_member,
        expected = Ok(vec![doc! { "$match": { "B": { "$ne": true } } }]),
        input = {
            let x = x();
            c_source().where_(lambda(&x, not(field(&x, "B"))))
        },
    );

    test_translate_pipeline!(
        conjunction_of_disjoint_fields_is_one_document,
        expected = Ok(vec![doc! { "$match": { "N": 1, "B": true } }]),
        input = {
            let x = x();
            c_source().where_(lambda(
                &x,
                and_also(eq(field(&x, "N"), int(1)), field(&x, "B")),
            ))
        },
    );

    test_translate_pipeline!(
        disjunction,
        expected = Ok(vec![doc! { "$match": { "$or": [{ "N": 1 }, { "N": 2 }] } }]),
        input = {
            let x = x();
            c_source().where_(lambda(
                &x,
                or_else(eq(field(&x, "N"), int(1)), eq(field(&x, "N"), int(2))),
            ))
        },
    );

    test_translate_pipeline!(
        constant_on_the_left_is_flipped,
        expected = Ok(vec![doc! { "$match": { "N": { "$lt": 5 } } }]),
        input = {
            let x = x();
            c_source().where_(lambda(&x, gt(int(5), field(&x, "N"))))
        },
    );

    test_translate_pipeline!(
        count_greater_than_tests_an_index,
        expected = Ok(vec![doc! { "$match": { "A.2": { "$exists": true } } }]),
        input = {
            let x = x();
            c_source().where_(lambda(&x, gt(field(&x, "A").count(), int(2))))
        },
    );

    test_translate_pipeline!(
        count_equal_is_size,
        expected = Ok(vec![doc! { "$match": { "A": { "$size": 3 } } }]),
        input = {
            let x = x();
            c_source().where_(lambda(&x, eq(field(&x, "A").count(), int(3))))
        },
    );

    test_translate_pipeline!(
        computed_comparison_falls_back_to_expr,
        expected = Ok(vec![doc! {
            "$match": { "$expr": { "$eq": [{ "$add": ["$N", 1] }, 3] } }
        }]),
        input = {
            let x = x();
            c_source().where_(lambda(&x, eq(add(field(&x, "N"), int(1)), int(3))))
        },
    );

    test_translate_pipeline!(
        type_test_on_the_document_matches_the_discriminator,
        expected = Ok(vec![doc! { "$match": { "_t": "Dog" } }]),
        input = {
            let a = param("a", Type::class("Animal"));
            source("animals", Type::class("Animal"))
                .where_(lambda(&a, type_is(a.expr(), Type::class("Dog"))))
        },
    );

    test_translate_pipeline!(
        exact_type_with_scalar_discriminators,
        expected = Ok(vec![doc! { "$match": { "_t": "Car" } }]),
        input = {
            let v = param("v", Type::class("Vehicle"));
            source("vehicles", Type::class("Vehicle")).where_(lambda(
                &v,
                eq(get_type(v.expr()), type_of(Type::class("Car"))),
            ))
        },
    );

    test_translate_pipeline!(
        exact_type_with_hierarchical_discriminators,
        expected = Ok(vec![doc! { "$match": { "_t": ["Animal", "Dog"] } }]),
        input = {
            let a = param("a", Type::class("Animal"));
            source("animals", Type::class("Animal")).where_(lambda(
                &a,
                eq(get_type(a.expr()), type_of(Type::class("Dog"))),
            ))
        },
    );

    test_translate_pipeline!(
        exact_type_of_the_hierarchy_root_excludes_subclasses,
        expected = Ok(vec![doc! {
            "$match": { "_t.0": { "$exists": false }, "_t": "Animal" }
        }]),
        input = {
            let a = param("a", Type::class("Animal"));
            source("animals", Type::class("Animal")).where_(lambda(
                &a,
                eq(get_type(a.expr()), type_of(Type::class("Animal"))),
            ))
        },
    );
}

mod stages {
    use super::{c_source, field, x};
    use crate::expression::{builder::*, Type};
    use bson::doc;

    test_translate_pipeline!(
        quantifiers_in_a_projection_map_each_element,
        expected = Ok(vec![doc! { "$project": {
            "Some": { "$anyElementTrue": { "$map": {
                "input": "$A", "as": "a", "in": { "$gt": ["$$a", 1] },
            } } },
            "Every": { "$allElementsTrue": { "$map": {
                "input": "$A", "as": "a", "in": { "$gt": ["$$a", 1] },
            } } },
            "_id": 0,
        } }]),
        input = {
            let x = x();
            let a = param("a", Type::Int32);
            c_source().select(lambda(
                &x,
                new_anonymous(vec![
                    (
                        "Some",
                        field(&x, "A").any_with(lambda(&a, gt(a.expr(), int(1)))),
                    ),
                    (
                        "Every",
                        field(&x, "A").all(lambda(&a, gt(a.expr(), int(1)))),
                    ),
                ]),
            ))
        },
    );

    test_translate_pipeline!(
        scalar_select_is_wrapped,
        expected = Ok(vec![doc! { "$project": { "_v": "$S", "_id": 0 } }]),
        input = {
            let x = x();
            c_source().select(lambda(&x, field(&x, "S")))
        },
    );

    test_translate_pipeline!(
        identity_select_adds_no_stage,
        expected = Ok(vec![]),
        input = {
            let x = x();
            c_source().select(lambda(&x, x.expr()))
        },
    );

    test_translate_pipeline!(
        anonymous_select_projects_each_member,
        expected = Ok(vec![doc! { "$project": { "X": "$S", "Y": "$N", "_id": 0 } }]),
        input = {
            let x = x();
            c_source().select(lambda(
                &x,
                new_anonymous(vec![("X", field(&x, "S")), ("Y", field(&x, "N"))]),
            ))
        },
    );

    test_translate_pipeline!(
        append_to_stored_array,
        expected = Ok(vec![doc! {
            "$project": { "_v": { "$concatArrays": ["$X", [4]] }, "_id": 0 }
        }]),
        input = {
            let x = x();
            c_source().select(lambda(&x, field(&x, "X").append(int(4)).to_list()))
        },
    );

    test_translate_pipeline!(
        select_after_select_reads_the_wrapped_value,
        expected = Ok(vec![
            doc! { "$project": { "_v": "$N", "_id": 0 } },
            doc! { "$project": { "_v": { "$add": ["$_v", 1] }, "_id": 0 } },
        ]),
        input = {
            let (x, n) = (x(), param("n", Type::Int32));
            c_source()
                .select(lambda(&x, field(&x, "N")))
                .select(lambda(&n, add(n.expr(), int(1))))
        },
    );

    test_translate_pipeline!(
        select_many_unwinds,
        expected = Ok(vec![
            doc! { "$project": { "_v": "$A", "_id": 0 } },
            doc! { "$unwind": "$_v" },
        ]),
        input = {
            let x = x();
            c_source().select_many(lambda(&x, field(&x, "A")))
        },
    );

    test_translate_pipeline!(
        group_by_pushes_each_document,
        expected = Ok(vec![doc! {
            "$group": { "_id": "$N", "_elements": { "$push": "$$ROOT" } }
        }]),
        input = {
            let x = x();
            c_source().group_by(lambda(&x, field(&x, "N")))
        },
    );

    test_translate_pipeline!(
        group_by_result_selector_reads_the_elements,
        expected = Ok(vec![
            doc! { "$group": { "_id": "$N", "_elements": { "$push": "$$ROOT" } } },
            doc! { "$project": {
                "Result": { "$arrayElemAt": ["$_elements", 0] },
                "_id": 0,
            } },
        ]),
        input = {
            let x = x();
            let k = param("k", Type::Int32);
            let g = param("g", Type::grouping(Type::Int32, Type::class("C")));
            c_source().group_by_result(
                lambda(&x, field(&x, "N")),
                lambda_n(&[&k, &g], new_anonymous(vec![("Result", g.expr().first())])),
            )
        },
    );

    test_translate_pipeline!(
        group_by_key_and_count,
        expected = Ok(vec![
            doc! { "$group": { "_id": "$N", "_elements": { "$push": "$$ROOT" } } },
            doc! { "$project": {
                "Key": "$_id",
                "Count": { "$size": "$_elements" },
                "_id": 0,
            } },
        ]),
        input = {
            let x = x();
            let k = param("k", Type::Int32);
            let g = param("g", Type::grouping(Type::Int32, Type::class("C")));
            c_source().group_by_result(
                lambda(&x, field(&x, "N")),
                lambda_n(
                    &[&k, &g],
                    new_anonymous(vec![("Key", k.expr()), ("Count", g.expr().count())]),
                ),
            )
        },
    );

    test_translate_pipeline!(
        join_moves_the_outer_document_aside,
        expected = Ok(vec![
            doc! { "$project": { "_outer": "$$ROOT", "_id": 0 } },
            doc! { "$lookup": {
                "from": "d",
                "localField": "_outer.N",
                "foreignField": "CId",
                "as": "_inner",
            } },
            doc! { "$unwind": "$_inner" },
            doc! { "$project": { "S": "$_outer.S", "Name": "$_inner.Name", "_id": 0 } },
        ]),
        input = {
            let (o, i) = (x(), param("i", Type::class("D")));
            c_source().join(
                source("d", Type::class("D")),
                lambda(&o, field(&o, "N")),
                lambda(&i, field(&i, "CId")),
                lambda_n(
                    &[&o, &i],
                    new_anonymous(vec![("S", field(&o, "S")), ("Name", field(&i, "Name"))]),
                ),
            )
        },
    );

    test_translate_pipeline!(
        group_join_keeps_the_matches_as_an_array,
        expected = Ok(vec![
            doc! { "$project": { "_outer": "$$ROOT", "_id": 0 } },
            doc! { "$lookup": {
                "from": "d",
                "localField": "_outer.N",
                "foreignField": "CId",
                "as": "_inner",
            } },
            doc! { "$project": { "N": "$_outer.N", "Matches": { "$size": "$_inner" }, "_id": 0 } },
        ]),
        input = {
            let (o, i) = (x(), param("i", Type::class("D")));
            let ds = param("ds", Type::enumerable(Type::class("D")));
            c_source().group_join(
                source("d", Type::class("D")),
                lambda(&o, field(&o, "N")),
                lambda(&i, field(&i, "CId")),
                lambda_n(
                    &[&o, &ds],
                    new_anonymous(vec![
                        ("N", field(&o, "N")),
                        ("Matches", ds.expr().count()),
                    ]),
                ),
            )
        },
    );

    test_translate_pipeline!(
        order_by_then_by_descending_is_one_sort,
        expected = Ok(vec![doc! { "$sort": { "N": 1, "S": -1 } }]),
        input = {
            let x = x();
            c_source()
                .order_by(lambda(&x, field(&x, "N")))
                .then_by_descending(lambda(&x, field(&x, "S")))
        },
    );

    test_translate_pipeline!(
        computed_sort_key_is_projected_next_to_the_document,
        expected = Ok(vec![
            doc! { "$project": {
                "_document": "$$ROOT",
                "_key1": { "$add": ["$N", 1] },
                "_id": 0,
            } },
            doc! { "$sort": { "_key1": 1 } },
            doc! { "$replaceRoot": { "newRoot": "$_document" } },
        ]),
        input = {
            let x = x();
            c_source().order_by(lambda(&x, add(field(&x, "N"), int(1))))
        },
    );

    test_translate_pipeline!(
        distinct_groups_on_the_whole_document,
        expected = Ok(vec![
            doc! { "$project": { "_v": "$S", "_id": 0 } },
            doc! { "$group": { "_id": "$$ROOT" } },
            doc! { "$replaceRoot": { "newRoot": "$_id" } },
        ]),
        input = {
            let x = x();
            c_source().select(lambda(&x, field(&x, "S"))).distinct()
        },
    );

    test_translate_pipeline!(
        skip_and_take,
        expected = Ok(vec![doc! { "$skip": 10 }, doc! { "$limit": 5 }]),
        input = c_source().skip(int(10)).take(int(5)),
    );

    test_translate_pipeline!(
        of_type_with_hierarchical_discriminators,
        expected = Ok(vec![doc! { "$match": { "_t": "Dog" } }]),
        input = source("animals", Type::class("Animal")).of_type(Type::class("Dog")),
    );

    test_translate_pipeline!(
        of_type_with_scalar_discriminators,
        expected = Ok(vec![doc! { "$match": { "_t": "Truck" } }]),
        input = source("vehicles", Type::class("Vehicle")).of_type(Type::class("Truck")),
    );

    test_translate_pipeline!(
        of_type_with_scalar_discriminators_includes_subclasses,
        expected = Ok(vec![doc! { "$match": { "_t": { "$in": ["Car", "SportsCar"] } } }]),
        input = source("vehicles", Type::class("Vehicle")).of_type(Type::class("Car")),
    );

    test_translate_pipeline!(
        of_type_of_the_nominal_type_matches_everything,
        expected = Ok(vec![doc! { "$match": {} }]),
        input = source("vehicles", Type::class("Vehicle")).of_type(Type::class("Vehicle")),
    );

    test_translate_pipeline!(
        union_with_another_collection,
        expected = Ok(vec![
            doc! { "$unionWith": { "coll": "other" } },
            doc! { "$group": { "_id": "$$ROOT" } },
            doc! { "$replaceRoot": { "newRoot": "$_id" } },
        ]),
        input = c_source().union(source("other", Type::class("C"))),
    );
}

mod result_operators {
    use super::{c_source, field, x};
    use crate::expression::{builder::*, Type};
    use bson::doc;

    test_translate_pipeline!(
        first_with_predicate,
        expected = Ok(vec![doc! { "$match": { "N": 1 } }, doc! { "$limit": 1 }]),
        input = {
            let x = x();
            c_source().first_with(lambda(&x, eq(field(&x, "N"), int(1))))
        },
    );

    test_translate_pipeline!(
        single_fetches_two_documents,
        expected = Ok(vec![doc! { "$limit": 2 }]),
        input = c_source().single(),
    );

    test_translate_pipeline!(
        element_at_skips,
        expected = Ok(vec![doc! { "$skip": 3 }, doc! { "$limit": 1 }]),
        input = c_source().element_at(int(3)),
    );

    test_translate_pipeline!(
        count_groups_every_document,
        expected = Ok(vec![
            doc! { "$group": { "_id": 1, "__agg0": { "$sum": 1 } } },
            doc! { "$project": { "_id": 0, "_v": "$__agg0" } },
        ]),
        input = c_source().count(),
    );

    test_translate_pipeline!(
        count_with_predicate_matches_first,
        expected = Ok(vec![
            doc! { "$match": { "B": true } },
            doc! { "$group": { "_id": 1, "__agg0": { "$sum": 1 } } },
            doc! { "$project": { "_id": 0, "_v": "$__agg0" } },
        ]),
        input = {
            let x = x();
            c_source().count_with(lambda(&x, field(&x, "B")))
        },
    );

    test_translate_pipeline!(
        any_projects_a_literal,
        expected = Ok(vec![
            doc! { "$limit": 1 },
            doc! { "$project": { "_id": 0, "_v": { "$literal": true } } },
        ]),
        input = c_source().any(),
    );

    test_translate_pipeline!(
        all_looks_for_a_counterexample,
        expected = Ok(vec![
            doc! { "$match": { "N": { "$not": { "$gt": 1 } } } },
            doc! { "$limit": 1 },
            doc! { "$project": { "_id": 0, "_v": { "$literal": false } } },
        ]),
        input = {
            let x = x();
            c_source().all(lambda(&x, gt(field(&x, "N"), int(1))))
        },
    );

    test_translate_pipeline!(
        sum_of_selector,
        expected = Ok(vec![
            doc! { "$group": { "_id": 1, "__agg0": { "$sum": "$N" } } },
            doc! { "$project": { "_id": 0, "_v": "$__agg0" } },
        ]),
        input = {
            let x = x();
            c_source().sum_of(lambda(&x, field(&x, "N")))
        },
    );

    test_translate_pipeline!(
        last_after_sort_inverts_it,
        expected = Ok(vec![doc! { "$sort": { "N": -1 } }, doc! { "$limit": 1 }]),
        input = {
            let x = x();
            c_source().order_by(lambda(&x, field(&x, "N"))).last()
        },
    );

    test_translate_pipeline!(
        last_without_sort_uses_the_last_accumulator,
        expected = Ok(vec![
            doc! { "$group": { "_id": null, "__agg0": { "$last": "$$ROOT" } } },
            doc! { "$replaceRoot": { "newRoot": "$__agg0" } },
        ]),
        input = c_source().last(),
    );

    #[test]
    fn result_operator_is_reported() {
        use crate::{
            options::TranslationOptions,
            translator::{QueryTranslator, ResultKind, ResultOperator},
        };
        let registry = super::registry();
        let translator = QueryTranslator::new(registry.clone(), TranslationOptions::default());
        let query = translator.translate_query(&c_source().count()).unwrap();
        assert_eq!(
            Some(ResultOperator::new(ResultKind::Count, Type::Int32)),
            query.result_operator
        );
    }
}

mod client_side_projection {
    use super::{c_source, registry, x};
    use crate::{
        expression::{builder::*, Type},
        options::TranslationOptions,
        translator::{Error, QueryTranslator},
    };

    fn with_client_side_projections() -> TranslationOptions {
        TranslationOptions {
            enable_client_side_projections: true,
            ..Default::default()
        }
    }

    fn untranslatable_select() -> crate::expression::Expression {
        let x = x();
        c_source().select(lambda(&x, x.member("NotMapped", Type::Int32)))
    }

    #[test]
    fn unsupported_select_is_deferred() {
        let registry = registry();
        let translator = QueryTranslator::new(registry.clone(), with_client_side_projections());
        let query = translator.translate_query(&untranslatable_select()).unwrap();
        assert!(query.pipeline.stages.is_empty());
        assert!(query.client_side_projection.is_some());
    }

    #[test]
    fn first_after_deferred_select_is_allowed() {
        let registry = registry();
        let translator = QueryTranslator::new(registry.clone(), with_client_side_projections());
        let query = translator
            .translate_query(&untranslatable_select().first())
            .unwrap();
        assert_eq!(1, query.pipeline.stages.len());
        assert!(query.client_side_projection.is_some());
    }

    #[test]
    fn count_after_deferred_select_fails() {
        let registry = registry();
        let translator = QueryTranslator::new(registry.clone(), with_client_side_projections());
        let result = translator.translate_query(&untranslatable_select().count());
        assert!(matches!(
            result,
            Err(Error::ExpressionNotSupported { reason: Some(r), .. })
                if r.contains("projection evaluated on the client")
        ));
    }

    #[test]
    fn without_the_option_the_select_fails() {
        let registry = registry();
        let translator = QueryTranslator::new(registry.clone(), TranslationOptions::default());
        let result = translator.translate_query(&untranslatable_select());
        assert!(matches!(
            result,
            Err(Error::ExpressionNotSupported { reason: Some(r), .. })
                if r.contains("NotMapped is not a serialized member of C")
        ));
    }
}

mod unsupported {
    use super::{c_source, field, x};
    use crate::expression::{builder::*, Type};

    test_translate_unsupported!(
        non_deterministic_call,
        reason = "non-deterministic",
        input = {
            let x = x();
            c_source().where_(lambda(&x, gt(field(&x, "D"), now())))
        },
    );

    test_translate_unsupported!(
        skip_count_must_be_constant,
        reason = "the count must be a constant",
        input = c_source().skip(param("n", Type::Int32).expr()),
    );

    test_translate_unsupported!(
        then_by_without_order_by,
        reason = "ThenBy must follow OrderBy",
        input = {
            let x = x();
            c_source().then_by(lambda(&x, field(&x, "N")))
        },
    );

    test_translate_unsupported!(
        join_inner_must_be_a_collection,
        reason = "must be a collection",
        input = {
            let (o, i) = (x(), param("i", Type::class("D")));
            c_source().join(
                source("d", Type::class("D")).take(int(1)),
                lambda(&o, field(&o, "N")),
                lambda(&i, field(&i, "CId")),
                lambda_n(&[&o, &i], o.expr()),
            )
        },
    );

    #[test]
    fn unregistered_class_has_no_serializer() {
        use crate::{
            options::TranslationOptions,
            serialization,
            translator::{Error, QueryTranslator},
        };
        let registry = super::registry();
        let translator = QueryTranslator::new(registry.clone(), TranslationOptions::default());
        let result = translator.translate_query(&source("nope", Type::class("Nope")));
        assert!(matches!(
            result,
            Err(Error::Serialization(serialization::Error::SerializerNotFound(_)))
        ));
    }

    #[test]
    fn unknown_parameter_is_reported() {
        use crate::{
            options::TranslationOptions,
            translator::{Error, QueryTranslator},
        };
        let registry = super::registry();
        let translator = QueryTranslator::new(registry.clone(), TranslationOptions::default());
        let (x, stray) = (x(), param("stray", Type::Int32));
        let query = c_source().where_(lambda(&x, eq(field(&x, "N"), stray.expr())));
        assert_eq!(
            Err(Error::UnknownSymbol("stray".to_string())),
            translator.translate_query(&query).map(|_| ())
        );
    }
}
