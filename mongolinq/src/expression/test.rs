use crate::expression::Type;

fn c() -> Type {
    Type::class("C")
}

macro_rules! test_display {
    ($func_name:ident, expected = $expected:expr, input = $input:expr $(,)?) => {
        #[test]
        fn $func_name() {
            #[allow(unused_imports)]
            use crate::expression::{builder::*, Type};
            let expected: &str = $expected;
            let input = $input;
            assert_eq!(expected, input.to_string());
        }
    };
}

mod display {
    use super::c;

    test_display!(
        extension_calls_read_as_method_chains,
        expected = "c.AsQueryable().Where(x => (x.N > 5))",
        input = {
            let x = param("x", c());
            source("c", c()).where_(lambda(&x, gt(x.member("N", Type::Int32), int(5))))
        },
    );

    test_display!(
        static_calls_name_their_class,
        expected = "string.IsNullOrEmpty(x.S)",
        input = is_null_or_empty(param("x", c()).member("S", Type::String)),
    );

    test_display!(
        anonymous_construction,
        expected = "new { A = 1, B = \"b\" }",
        input = new_anonymous(vec![("A", int(1)), ("B", string("b"))]),
    );

    test_display!(
        multi_parameter_lambda,
        expected = "(k, g) => g.Count()",
        input = {
            let k = param("k", Type::Int32);
            let g = param("g", Type::grouping(Type::Int32, c()));
            lambda_n(&[&k, &g], g.expr().count())
        },
    );

    test_display!(
        type_test,
        expected = "(a is Dog)",
        input = type_is(param("a", Type::class("Animal")).expr(), Type::class("Dog")),
    );
}

mod types {
    use crate::expression::{builder::*, Type};

    #[test]
    fn nullable_is_not_nested() {
        assert_eq!(
            Type::nullable(Type::Int32),
            Type::nullable(Type::nullable(Type::Int32))
        );
    }

    #[test]
    fn grouping_enumerates_its_elements() {
        assert_eq!(
            Some(Type::class("C")),
            Type::grouping(Type::Int32, Type::class("C")).element_type()
        );
    }

    #[test]
    fn dictionary_enumerates_pairs() {
        assert_eq!(
            Some(Type::key_value_pair(Type::String, Type::Int32)),
            Type::dictionary(Type::String, Type::Int32).element_type()
        );
    }

    #[test]
    fn arithmetic_widens_to_the_larger_operand() {
        assert_eq!(Type::Int64, add(int(1), long(2)).ty());
        assert_eq!(Type::Double, multiply(long(1), double(2.0)).ty());
    }

    #[test]
    fn nullable_operand_lifts_the_result() {
        assert_eq!(
            Type::nullable(Type::Int32),
            add(null(Type::nullable(Type::Int32)), int(1)).ty()
        );
    }

    #[test]
    fn comparisons_are_boolean() {
        assert_eq!(Type::Boolean, lt(long(1), int(2)).ty());
    }

    #[test]
    fn select_keeps_the_source_queryable() {
        let x = param("x", Type::class("C"));
        let query = source("c", Type::class("C")).select(lambda(&x, x.member("S", Type::String)));
        assert_eq!(Type::queryable(Type::String), query.ty());
    }
}

mod tree {
    use super::c;
    use crate::expression::{builder::*, Type};

    #[test]
    fn closed_expressions_reference_no_parameter() {
        assert!(add(int(1), int(2)).is_closed());
        assert!(!add(param("x", Type::Int32).expr(), int(2)).is_closed());
        assert!(!now().is_closed());
    }

    #[test]
    fn lambda_parameters_shadow_outer_references() {
        let x = param("x", c());
        let inner = lambda(&x, x.member("N", Type::Int32));
        assert!(!inner.references("x"));
        assert!(add(x.member("N", Type::Int32), int(1)).references("x"));
    }

    #[test]
    fn substitute_replaces_free_occurrences() {
        let n = param("n", Type::Int32);
        let body = add(n.expr(), int(1));
        assert_eq!(add(int(4), int(1)), body.substitute("n", &int(4)));
    }
}

mod transparent_identifiers {
    use super::c;
    use crate::expression::{
        builder::*, transparent_identifiers::rewrite_transparent_identifiers, Type,
    };

    fn d() -> Type {
        Type::class("D")
    }

    #[test]
    fn select_after_pairing_join_is_folded() {
        let (o, i) = (param("o", c()), param("i", d()));
        let pair = new_anonymous(vec![("o", o.expr()), ("i", i.expr())]);
        let t = param("<>h__TransparentIdentifier0", pair.ty());
        let joined = source("c", c()).join(
            source("d", d()),
            lambda(&o, o.member("N", Type::Int32)),
            lambda(&i, i.member("CId", Type::Int32)),
            lambda_n(&[&o, &i], pair),
        );
        let query = joined.select(lambda(
            &t,
            new_anonymous(vec![
                ("S", t.member("o", c()).member("S", Type::String)),
                ("Name", t.member("i", d()).member("Name", Type::String)),
            ]),
        ));

        let expected = source("c", c()).join(
            source("d", d()),
            lambda(&o, o.member("N", Type::Int32)),
            lambda(&i, i.member("CId", Type::Int32)),
            lambda_n(
                &[&o, &i],
                new_anonymous(vec![
                    ("S", o.member("S", Type::String)),
                    ("Name", i.member("Name", Type::String)),
                ]),
            ),
        );
        assert_eq!(expected, rewrite_transparent_identifiers(query));
    }

    #[test]
    fn select_reading_the_pair_itself_is_kept() {
        let (o, i) = (param("o", c()), param("i", d()));
        let pair = new_anonymous(vec![("o", o.expr()), ("i", i.expr())]);
        let t = param("t", pair.ty());
        let query = source("c", c())
            .join(
                source("d", d()),
                lambda(&o, o.member("N", Type::Int32)),
                lambda(&i, i.member("CId", Type::Int32)),
                lambda_n(&[&o, &i], pair),
            )
            .select(lambda(&t, t.expr()));
        assert_eq!(query.clone(), rewrite_transparent_identifiers(query));
    }
}
