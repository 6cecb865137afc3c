use crate::{
    ast::{self, Op},
    expression::{Expression, Method, MethodCall},
    translator::{unsupported, QueryTranslator, Result, TranslatedExpression},
};

impl QueryTranslator {
    pub(crate) fn translate_math_method(
        &self,
        expr: &Expression,
        c: &MethodCall,
    ) -> Result<TranslatedExpression> {
        let args = c
            .arguments
            .iter()
            .map(|a| Ok(self.translate_expression(a)?.ast))
            .collect::<Result<Vec<_>>>()?;
        let op = match (c.method, args.len()) {
            (Method::Abs, 1) => Op::Abs,
            (Method::Ceiling, 1) => Op::Ceil,
            (Method::Floor, 1) => Op::Floor,
            (Method::Round, 1 | 2) => Op::Round,
            (Method::Truncate, 1) => Op::Trunc,
            (Method::Sqrt, 1) => Op::Sqrt,
            (Method::Exp, 1) => Op::Exp,
            (Method::Log, 1) => Op::Ln,
            (Method::Log, 2) => Op::Log,
            (Method::Log10, 1) => Op::Log10,
            (Method::Pow, 2) => Op::Pow,
            (Method::MathMin, 2) => Op::Min,
            (Method::MathMax, 2) => Op::Max,
            _ => return Err(unsupported(expr)),
        };
        Ok(TranslatedExpression::new(
            ast::Expression::op(op, args),
            self.serializer_for(&c.ty)?,
        ))
    }
}
