use crate::{
    ast::{self, DateAdd, DatePart, DatePartKind, DateUnit, Op},
    expression::{Expression, Method, MethodCall, Type},
    options::Feature,
    translator::{
        conversions::convert_to, not_supported, unsupported, QueryTranslator, Result,
        TranslatedExpression,
    },
};

impl QueryTranslator {
    pub(crate) fn translate_date_member(
        &self,
        expr: &Expression,
        date: TranslatedExpression,
        member: &str,
    ) -> Result<TranslatedExpression> {
        let part = match member {
            "Year" => DatePartKind::Year,
            "Month" => DatePartKind::Month,
            "Day" => DatePartKind::DayOfMonth,
            "DayOfWeek" => DatePartKind::DayOfWeek,
            "DayOfYear" => DatePartKind::DayOfYear,
            "Hour" => DatePartKind::Hour,
            "Minute" => DatePartKind::Minute,
            "Second" => DatePartKind::Second,
            "Millisecond" => DatePartKind::Millisecond,
            _ => {
                return Err(not_supported(
                    expr,
                    format!("{member} is not a serialized member of DateTime"),
                ))
            }
        };
        let value = ast::Expression::DatePart(DatePart {
            part,
            date: Box::new(date.ast),
            timezone: None,
        });
        // $dayOfWeek counts from 1 (Sunday); DayOfWeek counts from 0.
        let value = match part {
            DatePartKind::DayOfWeek => {
                ast::Expression::op(Op::Subtract, vec![value, ast::Expression::constant(1)])
            }
            _ => value,
        };
        Ok(TranslatedExpression::new(
            value,
            self.serializer_for(&expr.ty())?,
        ))
    }

    /// `AddX` calls become `$dateAdd`. Fractional amounts of seconds or
    /// smaller units are added as whole milliseconds.
    pub(crate) fn translate_date_method(
        &self,
        expr: &Expression,
        c: &MethodCall,
    ) -> Result<TranslatedExpression> {
        self.require(Feature::DateOperators, expr)?;
        let (Some(date), [amount]) = (c.object.as_deref(), c.arguments.as_slice()) else {
            return Err(unsupported(expr));
        };
        let (unit, milliseconds) = match c.method {
            Method::AddYears => (DateUnit::Year, None),
            Method::AddMonths => (DateUnit::Month, None),
            Method::AddDays => (DateUnit::Day, Some(86_400_000)),
            Method::AddHours => (DateUnit::Hour, Some(3_600_000)),
            Method::AddMinutes => (DateUnit::Minute, Some(60_000)),
            Method::AddSeconds => (DateUnit::Second, Some(1_000)),
            Method::AddMilliseconds => (DateUnit::Millisecond, Some(1)),
            _ => return Err(unsupported(expr)),
        };
        let start = self.translate_expression(date)?;
        let amount_value = self.translate_expression(amount)?.ast;
        let (unit, amount_value) = match (amount.ty().non_nullable(), milliseconds) {
            (Type::Double | Type::Decimal, Some(factor)) => (
                DateUnit::Millisecond,
                convert_to(
                    ast::Expression::op(
                        Op::Multiply,
                        vec![amount_value, ast::Expression::constant(factor)],
                    ),
                    ast::BsonType::Long,
                ),
            ),
            _ => (unit, amount_value),
        };
        Ok(TranslatedExpression::new(
            ast::Expression::DateAdd(DateAdd {
                start_date: Box::new(start.ast),
                unit,
                amount: Box::new(amount_value),
                timezone: None,
            }),
            self.serializer_for(&Type::DateTime)?,
        ))
    }
}
