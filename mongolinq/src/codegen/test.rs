macro_rules! test_codegen_expr {
    ($func_name:ident, expected = $expected:expr, input = $input:expr $(,)?) => {
        #[test]
        fn $func_name() {
            use crate::codegen::MqlCodeGenerator;
            let expected = $expected;
            let input = $input;

            let gen = MqlCodeGenerator::new();
            assert_eq!(expected, gen.codegen_expression(input));
        }
    };
}

macro_rules! test_codegen_filter {
    ($func_name:ident, expected = $expected:expr, input = $input:expr $(,)?) => {
        #[test]
        fn $func_name() {
            use crate::codegen::MqlCodeGenerator;
            let expected = $expected;
            let input = $input;

            let gen = MqlCodeGenerator::new();
            assert_eq!(expected, gen.codegen_filter(input));
        }
    };
}

macro_rules! test_codegen_stage {
    ($func_name:ident, expected = $expected:expr, input = $input:expr $(,)?) => {
        #[test]
        fn $func_name() {
            use crate::codegen::MqlCodeGenerator;
            let expected = $expected;
            let input = $input;

            let gen = MqlCodeGenerator::new();
            assert_eq!(expected, gen.codegen_stage(input));
        }
    };
}

mod expression {
    use crate::ast::{BsonType, Convert, Expression, Op, Trim, TrimKind};
    use bson::{bson, doc, Bson};

    test_codegen_expr!(
        field_path,
        expected = Ok(Bson::String("$A.B".to_string())),
        input = Expression::field("A.B"),
    );

    test_codegen_expr!(
        dollar_string_literal,
        expected = Ok(bson!({ "$literal": "$notAField" })),
        input = Expression::constant("$notAField"),
    );

    test_codegen_expr!(
        plain_string_literal,
        expected = Ok(Bson::String("abc".to_string())),
        input = Expression::constant("abc"),
    );

    test_codegen_expr!(
        unary_operator_is_not_wrapped,
        expected = Ok(bson!({ "$size": "$A" })),
        input = Expression::unary(Op::Size, Expression::field("A")),
    );

    test_codegen_expr!(
        variadic_operator_with_one_argument_is_wrapped,
        expected = Ok(bson!({ "$concat": ["$A"] })),
        input = Expression::unary(Op::Concat, Expression::field("A")),
    );

    test_codegen_expr!(
        binary_operator,
        expected = Ok(bson!({ "$add": ["$A", 1] })),
        input = Expression::op(Op::Add, vec![Expression::field("A"), Expression::constant(1)]),
    );

    test_codegen_expr!(
        cond,
        expected = Ok(bson!({ "$cond": { "if": "$B", "then": 1, "else": 2 } })),
        input = Expression::cond(
            Expression::field("B"),
            Expression::constant(1),
            Expression::constant(2),
        ),
    );

    test_codegen_expr!(
        map,
        expected = Ok(bson!({ "$map": { "input": "$A", "as": "v", "in": "$$v.X" } })),
        input = Expression::map(Expression::field("A"), "v", Expression::var("v", "X")),
    );

    test_codegen_expr!(
        filter_with_limit,
        expected = Ok(bson!({ "$filter": {
            "input": "$A",
            "as": "v",
            "cond": { "$gt": ["$$v", 1] },
            "limit": 1,
        }})),
        input = Expression::filter(
            Expression::field("A"),
            "v",
            Expression::op(Op::Gt, vec![Expression::var("v", ""), Expression::constant(1)]),
            Some(Expression::constant(1)),
        ),
    );

    test_codegen_expr!(
        sub_field_of_a_path_extends_it,
        expected = Ok(Bson::String("$A.X".to_string())),
        input = Expression::field("A").sub_field("X"),
    );

    test_codegen_expr!(
        sub_field_of_an_operator_binds_it,
        expected = Ok(bson!({ "$let": {
            "vars": { "this": { "$arrayElemAt": ["$A", 0] } },
            "in": "$$this.X",
        }})),
        input = Expression::op(
            Op::ArrayElemAt,
            vec![Expression::field("A"), Expression::constant(0)],
        )
        .sub_field("X"),
    );

    test_codegen_expr!(
        convert_uses_shorthand,
        expected = Ok(bson!({ "$toLong": "$A" })),
        input = Expression::Convert(Convert {
            input: Box::new(Expression::field("A")),
            to: BsonType::Long,
            on_error: None,
            on_null: None,
        }),
    );

    test_codegen_expr!(
        convert_with_on_null_is_spelled_out,
        expected = Ok(bson!({ "$convert": { "input": "$A", "to": "long", "onNull": 0 } })),
        input = Expression::Convert(Convert {
            input: Box::new(Expression::field("A")),
            to: BsonType::Long,
            on_error: None,
            on_null: Some(Box::new(Expression::constant(0))),
        }),
    );

    test_codegen_expr!(
        trim_start,
        expected = Ok(bson!({ "$ltrim": { "input": "$S" } })),
        input = Expression::Trim(Trim {
            kind: TrimKind::Start,
            input: Box::new(Expression::field("S")),
            chars: None,
        }),
    );

    test_codegen_expr!(
        document_keeps_field_order,
        expected = Ok(Bson::Document(doc! { "b": "$B", "a": "$A" })),
        input = Expression::Document(crate::unchecked_unique_linked_hash_map! {
            "b".to_string() => Expression::field("B"),
            "a".to_string() => Expression::field("A"),
        }),
    );
}

mod filter {
    use crate::ast::{ComparisonOperator, Expression, FieldOperation, Filter, Op};
    use bson::{doc, Regex};

    test_codegen_filter!(match_all, expected = Ok(doc! {}), input = Filter::MatchAll);

    test_codegen_filter!(
        match_nothing,
        expected = Ok(doc! { "_id": { "$type": -1 } }),
        input = Filter::MatchNothing,
    );

    test_codegen_filter!(
        equality_is_compact,
        expected = Ok(doc! { "A": 2 }),
        input = Filter::eq("A", 2),
    );

    test_codegen_filter!(
        comparison,
        expected = Ok(doc! { "A": { "$gt": 2 } }),
        input = Filter::compare("A", ComparisonOperator::Gt, 2),
    );

    test_codegen_filter!(
        equality_with_operator_document_is_explicit,
        expected = Ok(doc! { "A": { "$eq": { "$x": 1 } } }),
        input = Filter::eq("A", doc! { "$x": 1 }),
    );

    test_codegen_filter!(
        equality_with_plain_document_is_compact,
        expected = Ok(doc! { "A": { "x": 1 } }),
        input = Filter::eq("A", doc! { "x": 1 }),
    );

    test_codegen_filter!(
        and_over_distinct_paths_is_merged,
        expected = Ok(doc! { "A": 1, "B": { "$lt": 2 } }),
        input = Filter::And(vec![
            Filter::eq("A", 1),
            Filter::compare("B", ComparisonOperator::Lt, 2),
        ]),
    );

    test_codegen_filter!(
        and_over_the_same_path_is_kept,
        expected = Ok(doc! { "$and": [
            { "A": { "$gt": 1 } },
            { "A": { "$lt": 5 } },
        ]}),
        input = Filter::And(vec![
            Filter::compare("A", ComparisonOperator::Gt, 1),
            Filter::compare("A", ComparisonOperator::Lt, 5),
        ]),
    );

    test_codegen_filter!(
        and_with_nested_or_is_kept,
        expected = Ok(doc! { "$and": [
            { "$or": [{ "A": 1 }, { "B": 1 }] },
            { "$or": [{ "C": 1 }, { "D": 1 }] },
        ]}),
        input = Filter::And(vec![
            Filter::Or(vec![Filter::eq("A", 1), Filter::eq("B", 1)]),
            Filter::Or(vec![Filter::eq("C", 1), Filter::eq("D", 1)]),
        ]),
    );

    test_codegen_filter!(
        in_list,
        expected = Ok(doc! { "S": { "$in": [null, ""] } }),
        input = Filter::field(
            "S",
            FieldOperation::In(vec![bson::Bson::Null, bson::Bson::String(String::new())]),
        ),
    );

    test_codegen_filter!(
        elem_match_of_the_element,
        expected = Ok(doc! { "A": { "$elemMatch": { "$gt": 2 } } }),
        input = Filter::field(
            "A",
            FieldOperation::ElemMatch(Box::new(Filter::compare("", ComparisonOperator::Gt, 2))),
        ),
    );

    test_codegen_filter!(
        elem_match_equality_of_the_element,
        expected = Ok(doc! { "A": { "$elemMatch": { "$eq": 2 } } }),
        input = Filter::field("A", FieldOperation::ElemMatch(Box::new(Filter::eq("", 2)))),
    );

    test_codegen_filter!(
        regex,
        expected = Ok(doc! { "S": Regex { pattern: "^abc".to_string(), options: "i".to_string() } }),
        input = Filter::field(
            "S",
            FieldOperation::Regex(Regex {
                pattern: "^abc".to_string(),
                options: "i".to_string(),
            }),
        ),
    );

    test_codegen_filter!(
        not_equal_via_not,
        expected = Ok(doc! { "A": { "$not": { "$eq": 1 } } }),
        input = Filter::field(
            "A",
            FieldOperation::Not(Box::new(FieldOperation::Comparison(
                ComparisonOperator::Eq,
                1.into(),
            ))),
        ),
    );

    test_codegen_filter!(
        modulo,
        expected = Ok(doc! { "A": { "$mod": [2, 1] } }),
        input = Filter::field("A", FieldOperation::Mod { divisor: 2, remainder: 1 }),
    );

    test_codegen_filter!(
        expr,
        expected = Ok(doc! { "$expr": { "$gt": ["$A", "$B"] } }),
        input = Filter::Expr(Expression::op(
            Op::Gt,
            vec![Expression::field("A"), Expression::field("B")],
        )),
    );
}

mod stage {
    use crate::{
        ast::{
            AccumulatorField, AccumulatorFunction, Expression, Filter, Group, Limit, Lookup,
            Match, Pipeline, Project, ProjectItem, Skip, Sort, SortSpecification, Stage,
            UnionWith, Unwind,
        },
        codegen::Error,
        unchecked_unique_linked_hash_map,
    };
    use bson::doc;

    test_codegen_stage!(
        match_stage,
        expected = Ok(doc! { "$match": { "A": 1 } }),
        input = Stage::Match(Match {
            filter: Filter::eq("A", 1),
        }),
    );

    test_codegen_stage!(
        project_appends_id_exclusion,
        expected = Ok(doc! { "$project": { "A": "$B", "_id": 0 } }),
        input = Stage::Project(Project {
            specifications: unchecked_unique_linked_hash_map! {
                "A".to_string() => ProjectItem::Assignment(Expression::field("B")),
            },
        }),
    );

    test_codegen_stage!(
        project_keeps_declared_id,
        expected = Ok(doc! { "$project": { "_id": 0, "_v": "$A" } }),
        input = Stage::Project(Project {
            specifications: unchecked_unique_linked_hash_map! {
                "_id".to_string() => ProjectItem::Exclusion,
                "_v".to_string() => ProjectItem::Assignment(Expression::field("A")),
            },
        }),
    );

    test_codegen_stage!(
        project_exclusion_only,
        expected = Ok(doc! { "$project": { "A": 0 } }),
        input = Stage::Project(Project {
            specifications: unchecked_unique_linked_hash_map! {
                "A".to_string() => ProjectItem::Exclusion,
            },
        }),
    );

    test_codegen_stage!(
        project_wraps_numeric_and_boolean_constants,
        expected = Ok(doc! { "$project": {
            "N": { "$literal": 1 },
            "B": { "$literal": true },
            "S": "x",
            "_id": 0,
        }}),
        input = Stage::Project(Project {
            specifications: unchecked_unique_linked_hash_map! {
                "N".to_string() => ProjectItem::Assignment(Expression::constant(1)),
                "B".to_string() => ProjectItem::Assignment(Expression::constant(true)),
                "S".to_string() => ProjectItem::Assignment(Expression::constant("x")),
            },
        }),
    );

    test_codegen_stage!(
        empty_project_is_an_error,
        expected = Err(Error::EmptyProjection),
        input = Stage::Project(Project {
            specifications: unchecked_unique_linked_hash_map! {},
        }),
    );

    test_codegen_stage!(
        group_renders_id_first,
        expected = Ok(doc! { "$group": {
            "_id": "$A",
            "__agg0": { "$first": "$$ROOT" },
            "__agg1": { "$sum": 1 },
        }}),
        input = Stage::Group(Group {
            id: Expression::field("A"),
            fields: vec![
                AccumulatorField {
                    name: "__agg0".to_string(),
                    function: AccumulatorFunction::First,
                    arg: Expression::root(),
                },
                AccumulatorField {
                    name: "__agg1".to_string(),
                    function: AccumulatorFunction::Sum,
                    arg: Expression::constant(1),
                },
            ],
        }),
    );

    test_codegen_stage!(
        sort,
        expected = Ok(doc! { "$sort": { "A": 1, "B": -1 } }),
        input = Stage::Sort(Sort {
            specs: vec![
                SortSpecification::Asc("A".to_string()),
                SortSpecification::Desc("B".to_string()),
            ],
        }),
    );

    test_codegen_stage!(
        empty_sort_is_an_error,
        expected = Err(Error::EmptySort),
        input = Stage::Sort(Sort { specs: vec![] }),
    );

    test_codegen_stage!(
        simple_unwind,
        expected = Ok(doc! { "$unwind": "$_v" }),
        input = Stage::Unwind(Unwind {
            path: "_v".to_string(),
            include_array_index: None,
            preserve_null_and_empty_arrays: false,
        }),
    );

    test_codegen_stage!(
        unwind_preserving_empty,
        expected = Ok(doc! { "$unwind": { "path": "$_inner", "preserveNullAndEmptyArrays": true } }),
        input = Stage::Unwind(Unwind {
            path: "_inner".to_string(),
            include_array_index: None,
            preserve_null_and_empty_arrays: true,
        }),
    );

    test_codegen_stage!(
        lookup,
        expected = Ok(doc! { "$lookup": {
            "from": "other",
            "localField": "_outer.A",
            "foreignField": "B",
            "as": "_inner",
        }}),
        input = Stage::Lookup(Lookup {
            from: "other".to_string(),
            local_field: "_outer.A".to_string(),
            foreign_field: "B".to_string(),
            as_var: "_inner".to_string(),
        }),
    );

    test_codegen_stage!(
        negative_limit_is_an_error,
        expected = Err(Error::NegativeValue {
            stage: "$limit",
            value: -1
        }),
        input = Stage::Limit(Limit { limit: -1 }),
    );

    test_codegen_stage!(
        large_skip_renders_as_long,
        expected = Ok(doc! { "$skip": 5_000_000_000i64 }),
        input = Stage::Skip(Skip { skip: 5_000_000_000 }),
    );

    test_codegen_stage!(
        union_with_pipeline,
        expected = Ok(doc! { "$unionWith": {
            "coll": "other",
            "pipeline": [{ "$match": { "A": 1 } }],
        }}),
        input = Stage::UnionWith(UnionWith {
            collection: "other".to_string(),
            pipeline: Pipeline::new(vec![Stage::Match(Match {
                filter: Filter::eq("A", 1),
            })]),
        }),
    );

    test_codegen_stage!(
        union_without_pipeline,
        expected = Ok(doc! { "$unionWith": { "coll": "other" } }),
        input = Stage::UnionWith(UnionWith {
            collection: "other".to_string(),
            pipeline: Pipeline::empty(),
        }),
    );
}

mod determinism {
    use crate::{
        ast::{Expression, Filter, Match, Op, Pipeline, Stage},
        codegen::MqlCodeGenerator,
    };
    use quickcheck::{QuickCheck, TestResult};

    const MAX_STAGES: usize = 6;

    #[test]
    fn prop_rendering_is_deterministic() {
        fn render_twice(mut stages: Vec<Stage>) -> TestResult {
            stages.truncate(MAX_STAGES);
            let pipeline = Pipeline::new(stages);
            let gen = MqlCodeGenerator::new();
            let first = gen.codegen_pipeline(pipeline.clone());
            let second = gen.codegen_pipeline(pipeline);
            match (first, second) {
                (Ok(a), Ok(b)) => {
                    let bytes = |docs: &Vec<bson::Document>| -> Vec<Vec<u8>> {
                        docs.iter()
                            .map(|d| bson::to_vec(d).unwrap_or_default())
                            .collect()
                    };
                    TestResult::from_bool(bytes(&a) == bytes(&b))
                }
                (Err(a), Err(b)) => TestResult::from_bool(a == b),
                _ => TestResult::failed(),
            }
        }

        QuickCheck::new().quickcheck(render_twice as fn(Vec<Stage>) -> TestResult);
    }

    #[test]
    fn expr_filter_renders_the_same_each_time() {
        let stage = Stage::Match(Match {
            filter: Filter::Expr(Expression::op(
                Op::Eq,
                vec![Expression::field("A"), Expression::constant("$x")],
            )),
        });
        let gen = MqlCodeGenerator::new();
        assert_eq!(
            gen.codegen_stage(stage.clone()),
            gen.codegen_stage(stage)
        );
    }
}
