use crate::{
    ast::{
        AccumulatorField, AccumulatorFunction, ComparisonOperator, Expression, FieldOperation,
        Filter, Group, Limit, Match, Op, Pipeline, Project, ProjectItem, Skip, Stage, UnionWith,
    },
    optimizer::optimize_pipeline,
    unchecked_unique_linked_hash_map,
};

macro_rules! test_optimize {
    ($func_name:ident, expected = $expected:expr, input = $input:expr $(,)?) => {
        #[test]
        fn $func_name() {
            let input: Vec<Stage> = $input;
            let expected: Vec<Stage> = $expected;
            let actual = optimize_pipeline(Pipeline::new(input));
            assert_eq!(Pipeline::new(expected), actual);
        }
    };
}

fn matching(filter: Filter) -> Stage {
    Stage::Match(Match { filter })
}

fn project(items: Vec<(&str, ProjectItem)>) -> Stage {
    let mut specifications = unchecked_unique_linked_hash_map! {};
    for (name, item) in items {
        specifications.insert(name.to_string(), item).unwrap();
    }
    Stage::Project(Project { specifications })
}

fn assign(e: Expression) -> ProjectItem {
    ProjectItem::Assignment(e)
}

fn group_elements(id: Expression, element: Expression) -> Stage {
    Stage::Group(Group {
        id,
        fields: vec![AccumulatorField {
            name: "_elements".to_string(),
            function: AccumulatorFunction::Push,
            arg: element,
        }],
    })
}

fn accumulator(name: &str, function: AccumulatorFunction, arg: Expression) -> AccumulatorField {
    AccumulatorField {
        name: name.to_string(),
        function,
        arg,
    }
}

fn first_element() -> Expression {
    Expression::op(
        Op::ArrayElemAt,
        vec![Expression::field("_elements"), Expression::constant(0)],
    )
}

mod stages {
    use super::*;

    test_optimize!(
        adjacent_matches_are_merged,
        expected = vec![matching(Filter::And(vec![
            Filter::eq("A", 1),
            Filter::eq("B", 2),
        ]))],
        input = vec![matching(Filter::eq("A", 1)), matching(Filter::eq("B", 2))],
    );

    test_optimize!(
        matches_separated_by_a_limit_are_kept_apart,
        expected = vec![
            matching(Filter::eq("A", 1)),
            Stage::Limit(Limit { limit: 2 }),
            matching(Filter::eq("B", 2)),
        ],
        input = vec![
            matching(Filter::eq("A", 1)),
            Stage::Limit(Limit { limit: 2 }),
            matching(Filter::eq("B", 2)),
        ],
    );

    test_optimize!(
        empty_match_and_zero_skip_are_dropped,
        expected = vec![Stage::Limit(Limit { limit: 3 })],
        input = vec![
            matching(Filter::MatchAll),
            Stage::Skip(Skip { skip: 0 }),
            Stage::Limit(Limit { limit: 3 }),
        ],
    );

    test_optimize!(
        consecutive_limits_keep_the_smaller,
        expected = vec![Stage::Limit(Limit { limit: 2 })],
        input = vec![
            Stage::Limit(Limit { limit: 5 }),
            Stage::Limit(Limit { limit: 2 }),
        ],
    );

    test_optimize!(
        projection_repeating_the_previous_one_is_dropped,
        expected = vec![project(vec![
            ("A", assign(Expression::field("X"))),
            ("B", assign(Expression::field("Y"))),
        ])],
        input = vec![
            project(vec![
                ("A", assign(Expression::field("X"))),
                ("B", assign(Expression::field("Y"))),
            ]),
            project(vec![
                ("B", assign(Expression::field("B"))),
                ("A", assign(Expression::field("A"))),
            ]),
        ],
    );

    test_optimize!(
        projection_dropping_a_field_is_kept,
        expected = vec![
            project(vec![
                ("A", assign(Expression::field("X"))),
                ("B", assign(Expression::field("Y"))),
            ]),
            project(vec![("A", assign(Expression::field("A")))]),
        ],
        input = vec![
            project(vec![
                ("A", assign(Expression::field("X"))),
                ("B", assign(Expression::field("Y"))),
            ]),
            project(vec![("A", assign(Expression::field("A")))]),
        ],
    );

    test_optimize!(
        nested_union_pipelines_are_optimized,
        expected = vec![Stage::UnionWith(UnionWith {
            collection: "other".to_string(),
            pipeline: Pipeline::new(vec![matching(Filter::And(vec![
                Filter::eq("A", 1),
                Filter::eq("B", 2),
            ]))]),
        })],
        input = vec![Stage::UnionWith(UnionWith {
            collection: "other".to_string(),
            pipeline: Pipeline::new(vec![
                matching(Filter::eq("A", 1)),
                matching(Filter::MatchAll),
                matching(Filter::eq("B", 2)),
            ]),
        })],
    );
}

mod filters {
    use super::*;

    test_optimize!(
        nested_conjunctions_are_flattened,
        expected = vec![matching(Filter::And(vec![
            Filter::eq("A", 1),
            Filter::eq("B", 2),
            Filter::eq("C", 3),
        ]))],
        input = vec![matching(Filter::And(vec![
            Filter::And(vec![Filter::eq("A", 1), Filter::eq("B", 2)]),
            Filter::eq("C", 3),
        ]))],
    );

    test_optimize!(
        nested_disjunctions_are_flattened,
        expected = vec![matching(Filter::Or(vec![
            Filter::eq("A", 1),
            Filter::eq("B", 2),
            Filter::eq("C", 3),
        ]))],
        input = vec![matching(Filter::Or(vec![
            Filter::eq("A", 1),
            Filter::Or(vec![Filter::eq("B", 2), Filter::eq("C", 3)]),
        ]))],
    );

    test_optimize!(
        elem_match_of_a_scalar_equality_is_collapsed,
        expected = vec![matching(Filter::eq("A", 2))],
        input = vec![matching(Filter::field(
            "A",
            FieldOperation::ElemMatch(Box::new(Filter::eq("", 2))),
        ))],
    );

    test_optimize!(
        elem_match_of_an_array_equality_is_kept,
        expected = vec![matching(Filter::field(
            "A",
            FieldOperation::ElemMatch(Box::new(Filter::eq("", vec![1, 2]))),
        ))],
        input = vec![matching(Filter::field(
            "A",
            FieldOperation::ElemMatch(Box::new(Filter::eq("", vec![1, 2]))),
        ))],
    );

    test_optimize!(
        elem_match_of_a_range_is_kept,
        expected = vec![matching(Filter::field(
            "A",
            FieldOperation::ElemMatch(Box::new(Filter::compare(
                "",
                ComparisonOperator::Gt,
                2
            ))),
        ))],
        input = vec![matching(Filter::field(
            "A",
            FieldOperation::ElemMatch(Box::new(Filter::compare(
                "",
                ComparisonOperator::Gt,
                2
            ))),
        ))],
    );
}

mod constant_folding {
    use super::*;

    test_optimize!(
        constant_true_expr_filter_disappears,
        expected = vec![],
        input = vec![matching(Filter::Expr(Expression::op(
            Op::Or,
            vec![Expression::constant(false), Expression::constant(true)],
        )))],
    );

    test_optimize!(
        neutral_constants_are_dropped_from_and,
        expected = vec![matching(Filter::Expr(Expression::op(
            Op::Gt,
            vec![Expression::field("A"), Expression::constant(1)],
        )))],
        input = vec![matching(Filter::Expr(Expression::op(
            Op::And,
            vec![
                Expression::constant(true),
                Expression::op(Op::Gt, vec![Expression::field("A"), Expression::constant(1)]),
            ],
        )))],
    );

    test_optimize!(
        cond_on_a_constant_picks_its_branch,
        expected = vec![project(vec![("A", assign(Expression::field("B")))])],
        input = vec![project(vec![(
            "A",
            assign(Expression::cond(
                Expression::constant(true),
                Expression::field("B"),
                Expression::field("C"),
            )),
        )])],
    );

    test_optimize!(
        if_null_with_a_constant_first_argument_folds,
        expected = vec![project(vec![("A", assign(Expression::constant("x")))])],
        input = vec![project(vec![(
            "A",
            assign(Expression::op(
                Op::IfNull,
                vec![Expression::constant("x"), Expression::field("B")],
            )),
        )])],
    );

    test_optimize!(
        if_null_on_a_field_is_kept,
        expected = vec![project(vec![(
            "A",
            assign(Expression::op(
                Op::IfNull,
                vec![Expression::field("B"), Expression::constant("x")],
            )),
        )])],
        input = vec![project(vec![(
            "A",
            assign(Expression::op(
                Op::IfNull,
                vec![Expression::field("B"), Expression::constant("x")],
            )),
        )])],
    );
}

mod grouping {
    use super::*;

    test_optimize!(
        count_becomes_a_sum_accumulator,
        expected = vec![
            Stage::Group(Group {
                id: Expression::field("A"),
                fields: vec![accumulator(
                    "__agg0",
                    AccumulatorFunction::Sum,
                    Expression::constant(1)
                )],
            }),
            project(vec![
                ("Key", assign(Expression::field("_id"))),
                ("Count", assign(Expression::field("__agg0"))),
            ]),
        ],
        input = vec![
            group_elements(Expression::field("A"), Expression::root()),
            project(vec![
                ("Key", assign(Expression::field("_id"))),
                (
                    "Count",
                    assign(Expression::unary(Op::Size, Expression::field("_elements")))
                ),
            ]),
        ],
    );

    test_optimize!(
        member_of_first_element_becomes_first_accumulator,
        expected = vec![
            Stage::Group(Group {
                id: Expression::field("A"),
                fields: vec![accumulator(
                    "__agg0",
                    AccumulatorFunction::First,
                    Expression::field("B")
                )],
            }),
            project(vec![("B", assign(Expression::field("__agg0")))]),
        ],
        input = vec![
            group_elements(Expression::field("A"), Expression::root()),
            project(vec![("B", assign(first_element().sub_field("B")))]),
        ],
    );

    test_optimize!(
        match_on_first_element_shares_the_accumulator,
        expected = vec![
            Stage::Group(Group {
                id: Expression::field("A"),
                fields: vec![accumulator(
                    "__agg0",
                    AccumulatorFunction::First,
                    Expression::field("B")
                )],
            }),
            matching(Filter::eq("__agg0", "Balloon")),
            project(vec![("B", assign(Expression::field("__agg0")))]),
        ],
        input = vec![
            group_elements(Expression::field("A"), Expression::root()),
            matching(Filter::eq("_elements.0.B", "Balloon")),
            project(vec![("B", assign(first_element().sub_field("B")))]),
        ],
    );

    test_optimize!(
        aggregate_of_mapped_elements_uses_the_mapped_value,
        expected = vec![
            Stage::Group(Group {
                id: Expression::field("A"),
                fields: vec![
                    accumulator("__agg0", AccumulatorFunction::Min, Expression::field("U")),
                    accumulator(
                        "__agg1",
                        AccumulatorFunction::Push,
                        Expression::Document(unchecked_unique_linked_hash_map! {
                            "_id".to_string() => Expression::field("_id"),
                        })
                    ),
                ],
            }),
            project(vec![
                ("Min", assign(Expression::field("__agg0"))),
                ("Ids", assign(Expression::field("__agg1"))),
            ]),
        ],
        input = vec![
            group_elements(Expression::field("A"), Expression::root()),
            project(vec![
                (
                    "Min",
                    assign(Expression::unary(
                        Op::Min,
                        Expression::map(
                            Expression::field("_elements"),
                            "x",
                            Expression::var("x", "U")
                        )
                    ))
                ),
                (
                    "Ids",
                    assign(Expression::map(
                        Expression::field("_elements"),
                        "y",
                        Expression::Document(unchecked_unique_linked_hash_map! {
                            "_id".to_string() => Expression::var("y", "_id"),
                        })
                    ))
                ),
            ]),
        ],
    );

    test_optimize!(
        elements_without_a_closing_projection_are_kept,
        expected = vec![
            group_elements(Expression::field("A"), Expression::root()),
            matching(Filter::eq("_elements.0.B", "Balloon")),
        ],
        input = vec![
            group_elements(Expression::field("A"), Expression::root()),
            matching(Filter::eq("_elements.0.B", "Balloon")),
        ],
    );

    test_optimize!(
        elements_read_directly_are_kept,
        expected = vec![
            group_elements(Expression::field("A"), Expression::root()),
            project(vec![("All", assign(Expression::field("_elements")))]),
        ],
        input = vec![
            group_elements(Expression::field("A"), Expression::root()),
            project(vec![("All", assign(Expression::field("_elements")))]),
        ],
    );

    test_optimize!(
        wrapped_elements_are_read_through_their_path,
        expected = vec![
            Stage::Group(Group {
                id: Expression::field("_v.A"),
                fields: vec![accumulator(
                    "__agg0",
                    AccumulatorFunction::Last,
                    Expression::field("_v")
                )],
            }),
            project(vec![("Last", assign(Expression::field("__agg0")))]),
        ],
        input = vec![
            group_elements(Expression::field("_v.A"), Expression::field("_v")),
            project(vec![(
                "Last",
                assign(Expression::op(
                    Op::ArrayElemAt,
                    vec![Expression::field("_elements"), Expression::constant(-1)],
                ))
            )]),
        ],
    );
}

mod idempotence {
    use crate::{ast::Stage, optimizer::optimize_pipeline};
    use quickcheck::{QuickCheck, TestResult};

    const MAX_STAGES: usize = 6;

    #[test]
    fn prop_optimizing_twice_equals_optimizing_once() {
        fn optimize_twice(mut stages: Vec<Stage>) -> TestResult {
            stages.truncate(MAX_STAGES);
            let once = optimize_pipeline(crate::ast::Pipeline::new(stages));
            let twice = optimize_pipeline(once.clone());
            TestResult::from_bool(once == twice)
        }

        QuickCheck::new().quickcheck(optimize_twice as fn(Vec<Stage>) -> TestResult);
    }
}

mod arbitrary {
    use crate::ast::{
        AccumulatorField, AccumulatorFunction, ComparisonOperator, Expression, FieldOperation,
        Filter, Group, Limit, Match, Op, Project, ProjectItem, Skip, Stage,
    };
    use crate::util::unique_linked_hash_map::UniqueLinkedHashMap;
    use quickcheck::{Arbitrary, Gen};

    // Bound on the nesting of generated filters and expressions.
    const MAX_DEPTH: u32 = 3;

    static PATHS: &[&str] = &["A", "B", "C.D", "_elements", "_elements.0.B"];
    static NAMES: &[&str] = &["A", "B", "C", "_id"];

    fn path(g: &mut Gen) -> String {
        g.choose(PATHS).copied().unwrap_or("A").to_string()
    }

    fn expression(g: &mut Gen, depth: u32) -> Expression {
        let choices: &[u8] = if depth >= MAX_DEPTH { &[0, 1, 2] } else { &[0, 1, 2, 3, 4, 5, 6, 7] };
        match g.choose(choices).copied().unwrap_or(0) {
            0 => Expression::field(&path(g)),
            1 => Expression::constant(bool::arbitrary(g)),
            2 => Expression::constant(i32::arbitrary(g) % 4),
            3 => Expression::op(
                *g.choose(&[Op::And, Op::Or]).unwrap_or(&Op::And),
                vec![expression(g, depth + 1), expression(g, depth + 1)],
            ),
            4 => Expression::unary(
                *g.choose(&[Op::Not, Op::Size, Op::Sum, Op::Min]).unwrap_or(&Op::Not),
                expression(g, depth + 1),
            ),
            5 => Expression::cond(
                expression(g, depth + 1),
                expression(g, depth + 1),
                expression(g, depth + 1),
            ),
            6 => Expression::op(
                Op::IfNull,
                vec![expression(g, depth + 1), expression(g, depth + 1)],
            ),
            _ => Expression::map(
                Expression::field("_elements"),
                "x",
                Expression::var("x", &path(g)),
            ),
        }
    }

    fn filter(g: &mut Gen, depth: u32) -> Filter {
        let choices: &[u8] = if depth >= MAX_DEPTH { &[0, 1, 2] } else { &[0, 1, 2, 3, 4, 5, 6] };
        match g.choose(choices).copied().unwrap_or(0) {
            0 => Filter::eq(&path(g), i32::arbitrary(g) % 4),
            1 => Filter::compare(&path(g), ComparisonOperator::Gt, i32::arbitrary(g) % 4),
            2 => g
                .choose(&[Filter::MatchAll, Filter::MatchNothing])
                .cloned()
                .unwrap_or(Filter::MatchAll),
            3 => Filter::And(vec![filter(g, depth + 1), filter(g, depth + 1)]),
            4 => Filter::Or(vec![filter(g, depth + 1), filter(g, depth + 1)]),
            5 => Filter::field(
                &path(g),
                FieldOperation::ElemMatch(Box::new(filter(g, depth + 1))),
            ),
            _ => Filter::Expr(expression(g, depth + 1)),
        }
    }

    impl Arbitrary for Filter {
        fn arbitrary(g: &mut Gen) -> Self {
            filter(g, 0)
        }
    }

    impl Arbitrary for Stage {
        fn arbitrary(g: &mut Gen) -> Self {
            match g.choose(&[0u8, 1, 2, 3, 4]).copied().unwrap_or(0) {
                0 => Stage::Match(Match {
                    filter: Filter::arbitrary(g),
                }),
                1 => Stage::Skip(Skip {
                    skip: i64::from(u8::arbitrary(g) % 3),
                }),
                2 => Stage::Limit(Limit {
                    limit: i64::from(u8::arbitrary(g) % 4 + 1),
                }),
                3 => {
                    let mut specifications = UniqueLinkedHashMap::new();
                    for name in NAMES {
                        if bool::arbitrary(g) {
                            let _ = specifications.insert(
                                name.to_string(),
                                ProjectItem::Assignment(expression(g, 0)),
                            );
                        }
                    }
                    if specifications.is_empty() {
                        let _ = specifications.insert(
                            "A".to_string(),
                            ProjectItem::Assignment(expression(g, 0)),
                        );
                    }
                    Stage::Project(Project { specifications })
                }
                _ => Stage::Group(Group {
                    id: Expression::field(&path(g)),
                    fields: vec![AccumulatorField {
                        name: "_elements".to_string(),
                        function: AccumulatorFunction::Push,
                        arg: if bool::arbitrary(g) {
                            Expression::root()
                        } else {
                            Expression::field("_v")
                        },
                    }],
                }),
            }
        }
    }
}
