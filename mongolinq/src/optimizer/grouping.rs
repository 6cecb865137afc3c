use crate::{
    ast::{
        visitor::Visitor, AccumulatorField, AccumulatorFunction, ArrayFilter, Expression,
        FieldFilter, FieldOperation, Filter, Group, Let, LetVariable, Map, Match, Op, Operator,
        Pipeline, Project, ProjectItem, Stage, ROOT,
    },
    optimizer::Pass,
    serialization::GROUPING_ELEMENTS_ELEMENT,
};
use bson::Bson;

/// A `$group` that pushes every element to `_elements` is rewritten to
/// compute only the accumulators the following stages read, when those stages
/// end in a `$project` and use the elements only through aggregates, `$map`
/// or the first and last element.
pub(crate) struct GroupingPass;

impl Pass for GroupingPass {
    fn name(&self) -> &'static str {
        "grouping"
    }

    fn apply(&self, pipeline: Pipeline) -> Pipeline {
        let mut stages = pipeline.stages;
        let mut i = 0;
        while i < stages.len() {
            if let Some((end, rewritten)) = optimize_group_at(&stages, i) {
                stages.splice(i..=end, rewritten);
            }
            i += 1;
        }
        Pipeline::new(stages)
    }
}

fn elements_path() -> String {
    format!("${GROUPING_ELEMENTS_ELEMENT}")
}

/// The pushed element of a `$group` whose only field is `_elements`.
fn pushed_element(stage: &Stage) -> Option<(&Expression, &Expression)> {
    match stage {
        Stage::Group(Group { id, fields }) => match fields.as_slice() {
            [AccumulatorField {
                name,
                function: AccumulatorFunction::Push,
                arg,
            }] if name == GROUPING_ELEMENTS_ELEMENT => Some((id, arg)),
            _ => None,
        },
        _ => None,
    }
}

/// The rewritten `$group` and the stages after it, up to and including the
/// closing `$project`, with the index of that `$project`.
fn optimize_group_at(stages: &[Stage], i: usize) -> Option<(usize, Vec<Stage>)> {
    let (id, element) = pushed_element(&stages[i])?;
    let end = stages[i + 1..]
        .iter()
        .position(|s| !matches!(s, Stage::Limit(_) | Stage::Skip(_) | Stage::Match(_)))
        .map(|n| n + i + 1)?;
    let Stage::Project(project) = &stages[end] else {
        return None;
    };
    if projects_root(project) {
        return None;
    }
    let mut rewriter = ElementsRewriter {
        element: element.clone(),
        accumulators: vec![],
        failed: false,
    };
    let following = stages[i + 1..=end]
        .iter()
        .cloned()
        .map(|stage| match stage {
            Stage::Match(Match { filter }) => Stage::Match(Match {
                filter: rewriter.visit_filter(filter),
            }),
            Stage::Project(Project { specifications }) => {
                if specifications.iter().any(|(name, item)| {
                    name == GROUPING_ELEMENTS_ELEMENT && !matches!(item, ProjectItem::Exclusion)
                }) {
                    rewriter.failed = true;
                }
                rewriter.visit_stage(Stage::Project(Project { specifications }))
            }
            other => other,
        })
        .collect::<Vec<_>>();
    if rewriter.failed {
        return None;
    }
    let mut rewritten = vec![Stage::Group(Group {
        id: id.clone(),
        fields: rewriter.accumulators,
    })];
    rewritten.extend(following);
    Some((end, rewritten))
}

fn projects_root(project: &Project) -> bool {
    struct RootFinder(bool);
    impl Visitor for RootFinder {
        fn visit_expression(&mut self, node: Expression) -> Expression {
            if node.is_root() {
                self.0 = true;
            }
            node.walk(self)
        }
    }
    let mut finder = RootFinder(false);
    finder.visit_stage(Stage::Project(project.clone()));
    finder.0
}

/// True when `expr` reads nothing but variables: no document fields and no
/// `$$ROOT`. Such an expression means the same before and after `$group`
/// once the variable is replaced by the element.
fn reads_only_variables(expr: &Expression) -> bool {
    struct FieldFinder(bool);
    impl Visitor for FieldFinder {
        fn visit_expression(&mut self, node: Expression) -> Expression {
            if let Expression::FieldPath(p) = &node {
                if !p.starts_with("$$") || p == ROOT || p.starts_with("$$CURRENT") {
                    self.0 = true;
                }
            }
            node.walk(self)
        }
    }
    let mut finder = FieldFinder(false);
    finder.visit_expression(expr.clone());
    !finder.0
}

/// Reads `path` of `element`, looking through constructed documents.
fn select_path(element: &Expression, path: &str) -> Expression {
    if path.is_empty() {
        return element.clone();
    }
    if let Expression::Document(fields) = element {
        let (head, rest) = path.split_once('.').unwrap_or((path, ""));
        if let Some(value) = fields.get(&head.to_string()) {
            return select_path(value, rest);
        }
    }
    element.clone().sub_field(path)
}

/// Replaces `$$variable` (and paths below it) with the element.
struct Substitute<'a> {
    variable: &'a str,
    element: &'a Expression,
}

impl Visitor for Substitute<'_> {
    fn visit_expression(&mut self, node: Expression) -> Expression {
        let prefix = format!("$${}", self.variable);
        match node {
            Expression::FieldPath(p) if p == prefix => self.element.clone(),
            Expression::FieldPath(p) if p.starts_with(&format!("{prefix}.")) => {
                select_path(self.element, &p[prefix.len() + 1..])
            }
            // An inner binding of the same name shadows the variable.
            Expression::Map(Map {
                input,
                as_var,
                inside,
            }) if as_var == self.variable => Expression::Map(Map {
                input: Box::new(self.visit_expression(*input)),
                as_var,
                inside,
            }),
            Expression::Filter(ArrayFilter {
                input,
                as_var,
                cond,
                limit,
            }) if as_var == self.variable => Expression::Filter(ArrayFilter {
                input: Box::new(self.visit_expression(*input)),
                as_var,
                cond,
                limit,
            }),
            other => other.walk(self),
        }
    }
}

fn substitute(inside: Expression, variable: &str, element: &Expression) -> Expression {
    Substitute { variable, element }.visit_expression(inside)
}

struct ElementsRewriter {
    element: Expression,
    accumulators: Vec<AccumulatorField>,
    failed: bool,
}

impl ElementsRewriter {
    /// A reference to the accumulator computing `function` of `arg`, shared
    /// with an identical one computed already.
    fn accumulate(&mut self, function: AccumulatorFunction, arg: Expression) -> String {
        if let Some(existing) = self
            .accumulators
            .iter()
            .find(|a| a.function == function && a.arg == arg)
        {
            return existing.name.clone();
        }
        let name = format!("__agg{}", self.accumulators.len());
        self.accumulators.push(AccumulatorField {
            name: name.clone(),
            function,
            arg,
        });
        name
    }

    fn is_elements(expr: &Expression) -> bool {
        matches!(expr, Expression::FieldPath(p) if *p == elements_path())
    }

    /// The element at index 0 (`$first`) or -1 (`$last`) of `_elements`.
    fn positional(args: &[Expression]) -> Option<AccumulatorFunction> {
        match args {
            [elements, Expression::Constant(index)] if Self::is_elements(elements) => {
                match index {
                    Bson::Int32(0) | Bson::Int64(0) => Some(AccumulatorFunction::First),
                    Bson::Int32(-1) | Bson::Int64(-1) => Some(AccumulatorFunction::Last),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// `$map` over `_elements` with a body that reads only its variable, as
    /// the body applied to the element.
    fn mapped(&self, expr: &Expression) -> Option<Expression> {
        match expr {
            Expression::Map(Map {
                input,
                as_var,
                inside,
            }) if Self::is_elements(input) && reads_only_variables(inside) => {
                Some(substitute((**inside).clone(), as_var, &self.element))
            }
            _ => None,
        }
    }

    /// The accumulator that computes an operator applied to `_elements`.
    fn accumulator_for(
        &self,
        op: Op,
        args: &[Expression],
    ) -> Option<(AccumulatorFunction, Expression)> {
        let function = match op {
            Op::Size => {
                return match args {
                    [elements] if Self::is_elements(elements) => {
                        Some((AccumulatorFunction::Sum, Expression::constant(1)))
                    }
                    _ => None,
                }
            }
            Op::ArrayElemAt => {
                return Self::positional(args).map(|f| (f, self.element.clone()));
            }
            Op::Sum => AccumulatorFunction::Sum,
            Op::Avg => AccumulatorFunction::Avg,
            Op::Min => AccumulatorFunction::Min,
            Op::Max => AccumulatorFunction::Max,
            Op::First => AccumulatorFunction::First,
            Op::Last => AccumulatorFunction::Last,
            _ => return None,
        };
        match args {
            [elements] if Self::is_elements(elements) => Some((function, self.element.clone())),
            [mapped] => self.mapped(mapped).map(|arg| (function, arg)),
            _ => None,
        }
    }

    /// `$let` binding the first or last element, as the body applied to that
    /// element.
    fn positional_let(
        &self,
        vars: &[LetVariable],
        inside: &Expression,
    ) -> Option<(AccumulatorFunction, Expression)> {
        let [var] = vars else {
            return None;
        };
        let Expression::Operator(Operator {
            op: Op::ArrayElemAt,
            args,
        }) = &*var.expr
        else {
            return None;
        };
        if !reads_only_variables(inside) {
            return None;
        }
        let function = Self::positional(args)?;
        Some((function, substitute(inside.clone(), &var.name, &self.element)))
    }
}

impl Visitor for ElementsRewriter {
    fn visit_expression(&mut self, node: Expression) -> Expression {
        if self.failed {
            return node;
        }
        let accumulator = match &node {
            Expression::Operator(Operator { op, args }) => self.accumulator_for(*op, args),
            Expression::Map(_) => self
                .mapped(&node)
                .map(|arg| (AccumulatorFunction::Push, arg)),
            Expression::Let(Let { vars, inside }) => self.positional_let(vars, inside),
            _ => None,
        };
        if let Some((function, arg)) = accumulator {
            return Expression::field(&self.accumulate(function, arg));
        }
        match node {
            Expression::FieldPath(p)
                if p == elements_path() || p.starts_with(&format!("{}.", elements_path())) =>
            {
                self.failed = true;
                Expression::FieldPath(p)
            }
            other => other.walk(self),
        }
    }

    fn visit_filter(&mut self, node: Filter) -> Filter {
        if self.failed {
            return node;
        }
        match node {
            Filter::Field(FieldFilter { path, operation }) => {
                let first = format!("{GROUPING_ELEMENTS_ELEMENT}.0");
                if path == first || path.starts_with(&format!("{first}.")) {
                    let rest = path[first.len()..].trim_start_matches('.');
                    let arg = select_path(&self.element, rest);
                    let name = self.accumulate(AccumulatorFunction::First, arg);
                    return Filter::Field(FieldFilter {
                        path: name,
                        operation,
                    });
                }
                if path == GROUPING_ELEMENTS_ELEMENT
                    || path.starts_with(&format!("{GROUPING_ELEMENTS_ELEMENT}."))
                {
                    self.failed = true;
                }
                Filter::Field(FieldFilter { path, operation })
            }
            other => other.walk(self),
        }
    }

    // Paths inside `$elemMatch` are relative to the array element.
    fn visit_field_operation(&mut self, node: FieldOperation) -> FieldOperation {
        node
    }
}
