use crate::{
    ast::{visitor::Visitor, Cond, Expression, Filter, Op, Operator, Pipeline},
    optimizer::Pass,
};
use bson::Bson;

/// Folds operator expressions whose outcome is decided by constant
/// arguments.
pub(crate) struct ConstantFoldingPass;

impl Pass for ConstantFoldingPass {
    fn name(&self) -> &'static str {
        "constant_folding"
    }

    fn apply(&self, pipeline: Pipeline) -> Pipeline {
        ConstantFoldingVisitor.visit_pipeline(pipeline)
    }
}

struct ConstantFoldingVisitor;

fn as_bool(e: &Expression) -> Option<bool> {
    match e {
        Expression::Constant(Bson::Boolean(b)) => Some(*b),
        _ => None,
    }
}

/// `$and`/`$or`: an absorbing constant decides the result and neutral
/// constants are dropped.
fn fold_logical(op: Op, args: Vec<Expression>) -> Expression {
    let absorbing = op == Op::Or;
    if args.iter().any(|a| as_bool(a) == Some(absorbing)) {
        return Expression::constant(absorbing);
    }
    let mut args: Vec<Expression> = args
        .into_iter()
        .filter(|a| as_bool(a) != Some(!absorbing))
        .collect();
    match args.len() {
        0 => Expression::constant(!absorbing),
        1 => args.pop().unwrap_or_else(|| Expression::constant(!absorbing)),
        _ => Expression::op(op, args),
    }
}

impl Visitor for ConstantFoldingVisitor {
    fn visit_filter(&mut self, node: Filter) -> Filter {
        match node.walk(self) {
            Filter::Expr(e) => match as_bool(&e) {
                Some(true) => Filter::MatchAll,
                Some(false) => Filter::MatchNothing,
                None => Filter::Expr(e),
            },
            other => other,
        }
    }

    fn visit_expression(&mut self, node: Expression) -> Expression {
        match node.walk(self) {
            Expression::Operator(Operator {
                op: op @ (Op::And | Op::Or),
                args,
            }) => fold_logical(op, args),
            Expression::Operator(Operator { op: Op::Not, args }) => {
                if let [arg] = args.as_slice() {
                    if let Some(b) = as_bool(arg) {
                        return Expression::constant(!b);
                    }
                }
                Expression::Operator(Operator { op: Op::Not, args })
            }
            Expression::Cond(Cond {
                condition,
                then,
                otherwise,
            }) => match as_bool(&condition) {
                Some(true) => *then,
                Some(false) => *otherwise,
                None => Expression::Cond(Cond {
                    condition,
                    then,
                    otherwise,
                }),
            },
            Expression::Operator(Operator {
                op: Op::IfNull,
                mut args,
            }) if args.len() == 2 => match &args[0] {
                Expression::Constant(Bson::Null) => args.remove(1),
                Expression::Constant(_) => args.remove(0),
                _ => Expression::Operator(Operator {
                    op: Op::IfNull,
                    args,
                }),
            },
            other => other,
        }
    }
}
