use crate::{
    ast::{self, Filter, Op},
    expression::{Expression, Type, TypeIs},
    serialization::DiscriminatorConvention,
    translator::{not_supported, QueryTranslator, Result, TranslatedExpression},
    util::join_path,
};
use bson::Bson;

/// What a type test compares the stored discriminator against.
enum DiscriminatorTest {
    Always,
    Equals(Bson),
    OneOf(Vec<Bson>),
    /// Exact test for the root of a hierarchy, which stores a plain string.
    RootOnly(Bson),
    Absent,
}

impl QueryTranslator {
    fn discriminator_test(
        &self,
        expr: &Expression,
        nominal: &Type,
        target: &Type,
        exact: bool,
    ) -> Result<(Option<DiscriminatorConvention>, DiscriminatorTest)> {
        let registry = &self.registry;
        let convention = registry
            .discriminator_convention(target)
            .or_else(|| registry.discriminator_convention(nominal));
        let Some(convention) = convention else {
            if target.non_nullable() == nominal.non_nullable() {
                return Ok((None, DiscriminatorTest::Always));
            }
            return Err(not_supported(
                expr,
                format!("{target} is not stored with a discriminator"),
            ));
        };
        if !exact && target.non_nullable() == nominal.non_nullable() {
            return Ok((Some(convention), DiscriminatorTest::Always));
        }
        let discriminator = registry.get_discriminator(target);
        let test = match (&convention, exact) {
            (DiscriminatorConvention::Scalar { .. }, true) => {
                match discriminator.filter(|_| registry.writes_discriminator(target)) {
                    Some(d) => DiscriminatorTest::Equals(d),
                    None => DiscriminatorTest::Absent,
                }
            }
            (DiscriminatorConvention::Scalar { .. }, false) => {
                let mut all = registry.get_discriminators_for_type_and_subtypes(target);
                match all.len() {
                    0 => DiscriminatorTest::Absent,
                    1 => DiscriminatorTest::Equals(all.remove(0)),
                    _ => DiscriminatorTest::OneOf(all),
                }
            }
            (DiscriminatorConvention::Hierarchical { .. }, true) => match discriminator {
                Some(d @ Bson::Array(_)) => DiscriminatorTest::Equals(d),
                Some(d) => DiscriminatorTest::RootOnly(d),
                None => DiscriminatorTest::Absent,
            },
            (DiscriminatorConvention::Hierarchical { .. }, false) => match discriminator {
                Some(Bson::Array(mut chain)) => match chain.pop() {
                    Some(leaf) => DiscriminatorTest::Equals(leaf),
                    None => DiscriminatorTest::Absent,
                },
                Some(d) => DiscriminatorTest::Equals(d),
                None => DiscriminatorTest::Absent,
            },
        };
        Ok((Some(convention), test))
    }

    /// A match filter testing the concrete type of the document (or
    /// sub-document) at `path`. Non-exact tests also accept subtypes.
    pub(crate) fn discriminator_filter(
        &self,
        expr: &Expression,
        path: &str,
        nominal: &Type,
        target: &Type,
        exact: bool,
    ) -> Result<Filter> {
        let (convention, test) = self.discriminator_test(expr, nominal, target, exact)?;
        let element = match &convention {
            Some(c) => join_path(path, c.element_name()),
            None => return Ok(Filter::MatchAll),
        };
        Ok(match test {
            DiscriminatorTest::Always => Filter::MatchAll,
            DiscriminatorTest::Equals(d) => Filter::eq(&element, d),
            DiscriminatorTest::OneOf(ds) => Filter::field(&element, ast::FieldOperation::In(ds)),
            DiscriminatorTest::RootOnly(d) => Filter::and(vec![
                Filter::exists(&join_path(&element, "0"), false),
                Filter::eq(&element, d),
            ]),
            DiscriminatorTest::Absent => Filter::exists(&element, false),
        })
    }

    /// The aggregation form of a type test over `value`.
    pub(crate) fn discriminator_expression(
        &self,
        expr: &Expression,
        value: ast::Expression,
        nominal: &Type,
        target: &Type,
        exact: bool,
    ) -> Result<ast::Expression> {
        let (convention, test) = self.discriminator_test(expr, nominal, target, exact)?;
        let Some(convention) = convention else {
            return Ok(ast::Expression::constant(true));
        };
        let element = value.sub_field(convention.element_name());
        Ok(match test {
            DiscriminatorTest::Always => ast::Expression::constant(true),
            DiscriminatorTest::Equals(d) if convention.is_hierarchical() && !exact => {
                let chain = ast::Expression::cond(
                    ast::Expression::unary(Op::IsArray, element.clone()),
                    element.clone(),
                    ast::Expression::Array(vec![element]),
                );
                ast::Expression::op(Op::In, vec![ast::Expression::Constant(d), chain])
            }
            DiscriminatorTest::Equals(d) | DiscriminatorTest::RootOnly(d) => {
                ast::Expression::op(Op::Eq, vec![element, ast::Expression::Constant(d)])
            }
            DiscriminatorTest::OneOf(ds) => ast::Expression::op(
                Op::In,
                vec![element, ast::Expression::Constant(Bson::Array(ds))],
            ),
            DiscriminatorTest::Absent => ast::Expression::op(
                Op::Eq,
                vec![
                    ast::Expression::unary(Op::Type, element),
                    ast::Expression::constant("missing"),
                ],
            ),
        })
    }

    pub(crate) fn translate_type_is_expression(
        &self,
        expr: &Expression,
        t: &TypeIs,
    ) -> Result<TranslatedExpression> {
        let value = self.translate_expression(&t.expr)?;
        let test =
            self.discriminator_expression(expr, value.ast, &t.expr.ty(), &t.target, false)?;
        Ok(TranslatedExpression::new(
            test,
            self.serializer_for(&Type::Boolean)?,
        ))
    }
}
