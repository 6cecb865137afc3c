use crate::{
    ast::{visitor::Visitor, Expression, Filter, Op, Operator, Pipeline},
    optimizer::Pass,
};

/// Flattens nested `$and`/`$or` in filters and in aggregation expressions.
pub(crate) struct FlattenLogicalPass;

impl Pass for FlattenLogicalPass {
    fn name(&self) -> &'static str {
        "flatten_logical"
    }

    fn apply(&self, pipeline: Pipeline) -> Pipeline {
        FlattenLogicalVisitor.visit_pipeline(pipeline)
    }
}

struct FlattenLogicalVisitor;

impl Visitor for FlattenLogicalVisitor {
    fn visit_filter(&mut self, node: Filter) -> Filter {
        match node.walk(self) {
            Filter::And(filters) => Filter::and(filters),
            Filter::Or(filters) => Filter::or(filters),
            other => other,
        }
    }

    fn visit_expression(&mut self, node: Expression) -> Expression {
        match node.walk(self) {
            Expression::Operator(Operator {
                op: op @ (Op::And | Op::Or),
                args,
            }) => {
                let args = args
                    .into_iter()
                    .flat_map(|arg| match arg {
                        Expression::Operator(Operator { op: inner, args }) if inner == op => args,
                        other => vec![other],
                    })
                    .collect();
                Expression::Operator(Operator { op, args })
            }
            other => other,
        }
    }
}
