use crate::ast::definitions::*;

/// A bottom-up rewriting visitor. Override the node types of interest and
/// call `walk` to recurse into children.
pub trait Visitor: Sized {
    fn visit_pipeline(&mut self, node: Pipeline) -> Pipeline {
        node.walk(self)
    }

    fn visit_stage(&mut self, node: Stage) -> Stage {
        node.walk(self)
    }

    fn visit_filter(&mut self, node: Filter) -> Filter {
        node.walk(self)
    }

    fn visit_field_operation(&mut self, node: FieldOperation) -> FieldOperation {
        node.walk(self)
    }

    fn visit_expression(&mut self, node: Expression) -> Expression {
        node.walk(self)
    }
}

fn visit_box<V: Visitor>(visitor: &mut V, e: Box<Expression>) -> Box<Expression> {
    Box::new(visitor.visit_expression(*e))
}

impl Pipeline {
    pub fn walk<V: Visitor>(self, visitor: &mut V) -> Self {
        Pipeline {
            stages: self
                .stages
                .into_iter()
                .map(|s| visitor.visit_stage(s))
                .collect(),
        }
    }
}

impl Stage {
    pub fn walk<V: Visitor>(self, visitor: &mut V) -> Self {
        match self {
            Stage::Match(m) => Stage::Match(Match {
                filter: visitor.visit_filter(m.filter),
            }),
            Stage::Project(p) => {
                let specifications = p.specifications.map_values(|item| {
                    Ok::<_, std::convert::Infallible>(match item {
                        ProjectItem::Assignment(e) => {
                            ProjectItem::Assignment(visitor.visit_expression(e))
                        }
                        other => other,
                    })
                });
                match specifications {
                    Ok(specifications) => Stage::Project(Project { specifications }),
                    Err(never) => match never {},
                }
            }
            Stage::Group(g) => Stage::Group(Group {
                id: visitor.visit_expression(g.id),
                fields: g
                    .fields
                    .into_iter()
                    .map(|f| AccumulatorField {
                        arg: visitor.visit_expression(f.arg),
                        ..f
                    })
                    .collect(),
            }),
            Stage::UnionWith(u) => Stage::UnionWith(UnionWith {
                collection: u.collection,
                pipeline: visitor.visit_pipeline(u.pipeline),
            }),
            Stage::Documents(d) => Stage::Documents(Documents {
                documents: d
                    .documents
                    .into_iter()
                    .map(|e| visitor.visit_expression(e))
                    .collect(),
            }),
            Stage::ReplaceRoot(r) => Stage::ReplaceRoot(ReplaceRoot {
                new_root: visitor.visit_expression(r.new_root),
            }),
            other => other,
        }
    }
}

impl Filter {
    pub fn walk<V: Visitor>(self, visitor: &mut V) -> Self {
        match self {
            Filter::Field(f) => Filter::Field(FieldFilter {
                path: f.path,
                operation: visitor.visit_field_operation(f.operation),
            }),
            Filter::And(fs) => Filter::And(fs.into_iter().map(|f| visitor.visit_filter(f)).collect()),
            Filter::Or(fs) => Filter::Or(fs.into_iter().map(|f| visitor.visit_filter(f)).collect()),
            Filter::Nor(fs) => Filter::Nor(fs.into_iter().map(|f| visitor.visit_filter(f)).collect()),
            Filter::Expr(e) => Filter::Expr(visitor.visit_expression(e)),
            other => other,
        }
    }
}

impl FieldOperation {
    pub fn walk<V: Visitor>(self, visitor: &mut V) -> Self {
        match self {
            FieldOperation::ElemMatch(f) => {
                FieldOperation::ElemMatch(Box::new(visitor.visit_filter(*f)))
            }
            FieldOperation::Not(op) => {
                FieldOperation::Not(Box::new(visitor.visit_field_operation(*op)))
            }
            other => other,
        }
    }
}

impl Expression {
    pub fn walk<V: Visitor>(self, visitor: &mut V) -> Self {
        match self {
            Expression::Operator(o) => Expression::Operator(Operator {
                op: o.op,
                args: o
                    .args
                    .into_iter()
                    .map(|a| visitor.visit_expression(a))
                    .collect(),
            }),
            Expression::Cond(c) => Expression::Cond(Cond {
                condition: visit_box(visitor, c.condition),
                then: visit_box(visitor, c.then),
                otherwise: visit_box(visitor, c.otherwise),
            }),
            Expression::Switch(s) => Expression::Switch(Switch {
                branches: s
                    .branches
                    .into_iter()
                    .map(|(case, then)| (visitor.visit_expression(case), visitor.visit_expression(then)))
                    .collect(),
                default: visit_box(visitor, s.default),
            }),
            Expression::Let(l) => Expression::Let(Let {
                vars: l
                    .vars
                    .into_iter()
                    .map(|v| LetVariable {
                        name: v.name,
                        expr: visit_box(visitor, v.expr),
                    })
                    .collect(),
                inside: visit_box(visitor, l.inside),
            }),
            Expression::Map(m) => Expression::Map(Map {
                input: visit_box(visitor, m.input),
                as_var: m.as_var,
                inside: visit_box(visitor, m.inside),
            }),
            Expression::Filter(f) => Expression::Filter(ArrayFilter {
                input: visit_box(visitor, f.input),
                as_var: f.as_var,
                cond: visit_box(visitor, f.cond),
                limit: f.limit.map(|l| visit_box(visitor, l)),
            }),
            Expression::Reduce(r) => Expression::Reduce(Reduce {
                input: visit_box(visitor, r.input),
                initial_value: visit_box(visitor, r.initial_value),
                inside: visit_box(visitor, r.inside),
            }),
            Expression::Document(d) => {
                match d.map_values(|e| Ok::<_, std::convert::Infallible>(visitor.visit_expression(e))) {
                    Ok(d) => Expression::Document(d),
                    Err(never) => match never {},
                }
            }
            Expression::Array(items) => Expression::Array(
                items
                    .into_iter()
                    .map(|e| visitor.visit_expression(e))
                    .collect(),
            ),
            Expression::Convert(c) => Expression::Convert(Convert {
                input: visit_box(visitor, c.input),
                to: c.to,
                on_error: c.on_error.map(|e| visit_box(visitor, e)),
                on_null: c.on_null.map(|e| visit_box(visitor, e)),
            }),
            Expression::DateAdd(d) => Expression::DateAdd(DateAdd {
                start_date: visit_box(visitor, d.start_date),
                unit: d.unit,
                amount: visit_box(visitor, d.amount),
                timezone: d.timezone.map(|e| visit_box(visitor, e)),
            }),
            Expression::DatePart(d) => Expression::DatePart(DatePart {
                part: d.part,
                date: visit_box(visitor, d.date),
                timezone: d.timezone.map(|e| visit_box(visitor, e)),
            }),
            Expression::RegexMatch(r) => Expression::RegexMatch(RegexMatch {
                input: visit_box(visitor, r.input),
                regex: r.regex,
                options: r.options,
            }),
            Expression::GetField(g) => Expression::GetField(GetField {
                field: g.field,
                input: visit_box(visitor, g.input),
            }),
            Expression::Trim(t) => Expression::Trim(Trim {
                kind: t.kind,
                input: visit_box(visitor, t.input),
                chars: t.chars.map(|e| visit_box(visitor, e)),
            }),
            Expression::ReplaceAll(r) => Expression::ReplaceAll(ReplaceAll {
                input: visit_box(visitor, r.input),
                find: visit_box(visitor, r.find),
                replacement: visit_box(visitor, r.replacement),
            }),
            Expression::SortArray(s) => Expression::SortArray(SortArray {
                input: visit_box(visitor, s.input),
                sort_by: s.sort_by,
            }),
            leaf => leaf,
        }
    }
}
