use crate::{
    ast::definitions::*,
    util::{join_path, unique_linked_hash_map::UniqueLinkedHashMap},
};
use bson::Bson;

pub const ROOT: &str = "$$ROOT";

impl Expression {
    /// A reference to a field of the current document.
    pub fn field(path: &str) -> Expression {
        Expression::FieldPath(format!("${path}"))
    }

    /// A reference to a variable, optionally descending into it.
    pub fn var(name: &str, path: &str) -> Expression {
        Expression::FieldPath(format!("$${}", join_path(name, path)))
    }

    pub fn root() -> Expression {
        Expression::FieldPath(ROOT.to_string())
    }

    pub fn op(op: Op, args: Vec<Expression>) -> Expression {
        Expression::Operator(Operator { op, args })
    }

    pub fn unary(op: Op, arg: Expression) -> Expression {
        Expression::op(op, vec![arg])
    }

    pub fn constant(value: impl Into<Bson>) -> Expression {
        Expression::Constant(value.into())
    }

    pub fn null() -> Expression {
        Expression::Constant(Bson::Null)
    }

    pub fn cond(condition: Expression, then: Expression, otherwise: Expression) -> Expression {
        Expression::Cond(Cond {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    pub fn map(input: Expression, as_var: &str, inside: Expression) -> Expression {
        Expression::Map(Map {
            input: Box::new(input),
            as_var: as_var.to_string(),
            inside: Box::new(inside),
        })
    }

    pub fn filter(
        input: Expression,
        as_var: &str,
        cond: Expression,
        limit: Option<Expression>,
    ) -> Expression {
        Expression::Filter(ArrayFilter {
            input: Box::new(input),
            as_var: as_var.to_string(),
            cond: Box::new(cond),
            limit: limit.map(Box::new),
        })
    }

    pub fn let_in(vars: Vec<(&str, Expression)>, inside: Expression) -> Expression {
        Expression::Let(Let {
            vars: vars
                .into_iter()
                .map(|(name, expr)| LetVariable {
                    name: name.to_string(),
                    expr: Box::new(expr),
                })
                .collect(),
            inside: Box::new(inside),
        })
    }

    pub fn as_constant(&self) -> Option<&Bson> {
        match self {
            Expression::Constant(b) => Some(b),
            _ => None,
        }
    }

    /// The dotted path of a reference into the current document, without the
    /// `$` prefix. Variables are not document fields.
    pub fn as_field_path(&self) -> Option<&str> {
        match self {
            Expression::FieldPath(p) if !p.starts_with("$$") => p.strip_prefix('$'),
            _ => None,
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Expression::FieldPath(p) if p == ROOT)
    }

    /// Descends into a sub-field. Paths are extended in place; anything else
    /// is bound with `$let` and read through `$$this`.
    pub fn sub_field(self, name: &str) -> Expression {
        match self {
            Expression::FieldPath(p) if p == ROOT => Expression::field(name),
            Expression::FieldPath(p) => Expression::FieldPath(join_path(&p, name)),
            other => Expression::let_in(vec![("this", other)], Expression::var("this", name)),
        }
    }

    pub fn is_constant_null(&self) -> bool {
        matches!(self, Expression::Constant(Bson::Null))
    }
}

impl Filter {
    pub fn field(path: &str, operation: FieldOperation) -> Filter {
        Filter::Field(FieldFilter {
            path: path.to_string(),
            operation,
        })
    }

    pub fn compare(path: &str, op: ComparisonOperator, value: impl Into<Bson>) -> Filter {
        Filter::field(path, FieldOperation::Comparison(op, value.into()))
    }

    pub fn eq(path: &str, value: impl Into<Bson>) -> Filter {
        Filter::compare(path, ComparisonOperator::Eq, value)
    }

    pub fn exists(path: &str, exists: bool) -> Filter {
        Filter::field(path, FieldOperation::Exists(exists))
    }

    /// Conjunction, flattening nested `$and`s and dropping `{}`.
    pub fn and(filters: Vec<Filter>) -> Filter {
        let mut out = vec![];
        for f in filters {
            match f {
                Filter::MatchAll => {}
                Filter::And(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        if out.iter().any(|f| matches!(f, Filter::MatchNothing)) {
            return Filter::MatchNothing;
        }
        match out.len() {
            0 => Filter::MatchAll,
            1 => out.pop().unwrap_or(Filter::MatchAll),
            _ => Filter::And(out),
        }
    }

    /// Disjunction, flattening nested `$or`s.
    pub fn or(filters: Vec<Filter>) -> Filter {
        let mut out = vec![];
        for f in filters {
            match f {
                Filter::MatchNothing => {}
                Filter::Or(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        if out.iter().any(|f| matches!(f, Filter::MatchAll)) {
            return Filter::MatchAll;
        }
        match out.len() {
            0 => Filter::MatchNothing,
            1 => out.pop().unwrap_or(Filter::MatchNothing),
            _ => Filter::Or(out),
        }
    }

    /// Logical negation, preferring operator-level forms (`$ne`, `$nin`,
    /// `$exists: false`) over `$not` where they mean the same thing.
    pub fn negate(self) -> Filter {
        match self {
            Filter::MatchAll => Filter::MatchNothing,
            Filter::MatchNothing => Filter::MatchAll,
            Filter::Field(FieldFilter { path, operation }) => Filter::Field(FieldFilter {
                path,
                operation: operation.negate(),
            }),
            Filter::And(filters) => Filter::Nor(vec![Filter::And(filters)]),
            Filter::Or(filters) => Filter::Nor(filters),
            Filter::Nor(filters) => Filter::or(filters),
            Filter::Expr(e) => Filter::Expr(Expression::unary(Op::Not, e)),
        }
    }

    /// Rewrites top-level field paths with `f`. Paths inside `$elemMatch` are
    /// relative to the element and are left alone.
    pub fn map_paths(self, f: &impl Fn(&str) -> String) -> Filter {
        match self {
            Filter::Field(FieldFilter { path, operation }) => Filter::Field(FieldFilter {
                path: f(&path),
                operation,
            }),
            Filter::And(fs) => Filter::And(fs.into_iter().map(|x| x.map_paths(f)).collect()),
            Filter::Or(fs) => Filter::Or(fs.into_iter().map(|x| x.map_paths(f)).collect()),
            Filter::Nor(fs) => Filter::Nor(fs.into_iter().map(|x| x.map_paths(f)).collect()),
            other => other,
        }
    }
}

impl FieldOperation {
    pub fn negate(self) -> FieldOperation {
        use ComparisonOperator::*;
        match self {
            FieldOperation::Comparison(Eq, v) if !matches!(v, Bson::RegularExpression(_)) => {
                FieldOperation::Comparison(Ne, v)
            }
            FieldOperation::Comparison(Ne, v) => FieldOperation::Comparison(Eq, v),
            FieldOperation::In(vs) => FieldOperation::Nin(vs),
            FieldOperation::Nin(vs) => FieldOperation::In(vs),
            FieldOperation::Exists(b) => FieldOperation::Exists(!b),
            FieldOperation::Not(op) => *op,
            other => FieldOperation::Not(Box::new(other)),
        }
    }
}

impl ComparisonOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "$eq",
            ComparisonOperator::Ne => "$ne",
            ComparisonOperator::Gt => "$gt",
            ComparisonOperator::Gte => "$gte",
            ComparisonOperator::Lt => "$lt",
            ComparisonOperator::Lte => "$lte",
        }
    }
}

impl Project {
    pub fn new() -> Self {
        Project {
            specifications: UniqueLinkedHashMap::new(),
        }
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Pipeline { stages }
    }

    pub fn empty() -> Self {
        Pipeline { stages: vec![] }
    }
}
