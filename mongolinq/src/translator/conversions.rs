use crate::{
    ast,
    expression::{Expression, Type, Unary, UnaryOp},
    serialization::{shared, EnumSerializer, Representation},
    translator::{not_supported, QueryTranslator, Result, TranslatedExpression},
};

pub(crate) fn convert_to(input: ast::Expression, to: ast::BsonType) -> ast::Expression {
    ast::Expression::Convert(ast::Convert {
        input: Box::new(input),
        to,
        on_error: None,
        on_null: None,
    })
}

/// True when every value of `from` converts to `to` without loss, so the
/// stored value can be used unchanged.
pub(crate) fn is_widening(from: &Type, to: &Type) -> bool {
    use Type::*;
    matches!(
        (from.non_nullable(), to.non_nullable()),
        (Int32, Int64 | Double | Decimal) | (Int64, Double | Decimal) | (Char, Int32 | Int64)
    )
}

/// Strips conversions a comparison can ignore: nullable lifts, widening
/// numeric conversions and enum to integral casts. The other operand is
/// re-encoded with the stripped operand's serializer.
pub(crate) fn unwrap_comparison_convert(expr: &Expression) -> &Expression {
    match expr {
        Expression::Unary(Unary {
            op: UnaryOp::Convert,
            operand,
            ty,
        }) => {
            let from = operand.ty();
            let lifts = from.non_nullable() == ty.non_nullable();
            let enum_to_integral = from.is_enum() && ty.is_integral();
            if lifts || enum_to_integral || is_widening(&from, ty) {
                unwrap_comparison_convert(operand)
            } else {
                expr
            }
        }
        _ => expr,
    }
}

impl QueryTranslator {
    pub(crate) fn translate_convert(
        &self,
        expr: &Expression,
        u: &Unary,
    ) -> Result<TranslatedExpression> {
        let operand = self.translate_expression(&u.operand)?;
        let from = u.operand.ty();
        let to = &u.ty;

        if from.non_nullable() == to.non_nullable() {
            return Ok(operand);
        }
        if *to == Type::Object {
            return Ok(operand);
        }
        if from.is_enum() {
            return self.translate_enum_convert(expr, operand, to);
        }
        if to.is_enum() && from.is_integral() {
            return Ok(TranslatedExpression::new(
                operand.ast,
                self.serializer_for(to)?,
            ));
        }
        if *to.non_nullable() == Type::String {
            return Ok(TranslatedExpression::new(
                convert_to(operand.ast, ast::BsonType::String),
                self.serializer_for(to)?,
            ));
        }
        if from.is_numeric() && to.is_numeric() {
            if from.non_nullable() == &Type::Int32 && to.non_nullable() == &Type::Int64 {
                return Ok(TranslatedExpression::new(
                    operand.ast,
                    self.serializer_for(to)?,
                ));
            }
            let target = match to.non_nullable() {
                Type::Int32 => ast::BsonType::Int,
                Type::Int64 => ast::BsonType::Long,
                Type::Double => ast::BsonType::Double,
                _ => ast::BsonType::Decimal,
            };
            return Ok(TranslatedExpression::new(
                convert_to(operand.ast, target),
                self.serializer_for(to)?,
            ));
        }
        Err(not_supported(
            expr,
            format!("conversion from {from} to {to} is not supported"),
        ))
    }

    /// Enums stored as numbers pass through conversions to integral types and
    /// other enums. Enums stored as strings cannot be converted on the
    /// server.
    fn translate_enum_convert(
        &self,
        expr: &Expression,
        operand: TranslatedExpression,
        to: &Type,
    ) -> Result<TranslatedExpression> {
        let representation = operand.serializer.representation();
        if representation == Representation::String {
            return Err(not_supported(
                expr,
                "the source enum is represented as a string",
            ));
        }
        if to.is_enum() {
            let target = self.serializer_for(to.non_nullable())?;
            let definition = target
                .enum_info()
                .ok_or_else(|| not_supported(expr, format!("{to} is not an enum")))?
                .with_representation(representation);
            let serializer = shared(EnumSerializer::new(definition));
            return Ok(TranslatedExpression::new(operand.ast, serializer));
        }
        if to.is_integral() {
            return Ok(TranslatedExpression::new(
                operand.ast,
                self.serializer_for(to)?,
            ));
        }
        Err(not_supported(
            expr,
            format!("conversion from {} to {to} is not supported", operand.serializer.value_type()),
        ))
    }
}
