use crate::{
    ast::{
        visitor::Visitor, ComparisonOperator, FieldFilter, FieldOperation, Filter, Pipeline,
    },
    optimizer::Pass,
};
use bson::Bson;

/// `{ a: { $elemMatch: { $eq: v } } }` is `{ a: v }` when `v` is a scalar,
/// and likewise for a regular expression. Nested quantifiers leave this
/// shape behind.
pub(crate) struct ElemMatchPass;

impl Pass for ElemMatchPass {
    fn name(&self) -> &'static str {
        "elem_match"
    }

    fn apply(&self, pipeline: Pipeline) -> Pipeline {
        ElemMatchVisitor.visit_pipeline(pipeline)
    }
}

struct ElemMatchVisitor;

fn is_scalar(value: &Bson) -> bool {
    !matches!(value, Bson::Array(_) | Bson::Document(_))
}

impl Visitor for ElemMatchVisitor {
    fn visit_filter(&mut self, node: Filter) -> Filter {
        match node.walk(self) {
            Filter::Field(FieldFilter {
                path,
                operation: FieldOperation::ElemMatch(inner),
            }) => match *inner {
                Filter::Field(FieldFilter {
                    path: element,
                    operation:
                        operation @ (FieldOperation::Comparison(ComparisonOperator::Eq, _)
                        | FieldOperation::Regex(_)),
                }) if element.is_empty()
                    && !matches!(&operation, FieldOperation::Comparison(_, v) if !is_scalar(v)) =>
                {
                    Filter::field(&path, operation)
                }
                inner => Filter::field(&path, FieldOperation::ElemMatch(Box::new(inner))),
            },
            other => other,
        }
    }
}
