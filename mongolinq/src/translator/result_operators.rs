use crate::{
    ast::{self, AccumulatorField, AccumulatorFunction, Group, Limit, Project, ProjectItem, Skip, Stage},
    client_side::{self, default_value},
    expression::{Binary, BinaryOp, Expression, Method, MethodCall, Parameter, Type, Value},
    serialization::WRAPPED_VALUE_FIELD,
    translator::{
        lambda_argument, not_supported, stages::PipelineState, unsupported, QueryTranslator,
        Result, TranslatedQuery,
    },
    util::unique_linked_hash_map::UniqueLinkedHashMap,
};
use serde::{Deserialize, Serialize};
use tracing::{event, Level};

/// Name of the accumulator that terminal aggregates compute.
const AGGREGATE_FIELD: &str = "__agg0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultKind {
    First,
    FirstOrDefault,
    Single,
    SingleOrDefault,
    Last,
    LastOrDefault,
    ElementAt,
    ElementAtOrDefault,
    Any,
    All,
    Count,
    LongCount,
    Sum,
    Average,
    Min,
    Max,
    Contains,
}

impl ResultKind {
    fn from_method(method: Method) -> Option<Self> {
        Some(match method {
            Method::First => ResultKind::First,
            Method::FirstOrDefault => ResultKind::FirstOrDefault,
            Method::Single => ResultKind::Single,
            Method::SingleOrDefault => ResultKind::SingleOrDefault,
            Method::Last => ResultKind::Last,
            Method::LastOrDefault => ResultKind::LastOrDefault,
            Method::ElementAt => ResultKind::ElementAt,
            Method::ElementAtOrDefault => ResultKind::ElementAtOrDefault,
            Method::Any => ResultKind::Any,
            Method::All => ResultKind::All,
            Method::Count => ResultKind::Count,
            Method::LongCount => ResultKind::LongCount,
            Method::Sum => ResultKind::Sum,
            Method::Average => ResultKind::Average,
            Method::Min => ResultKind::Min,
            Method::Max => ResultKind::Max,
            Method::Contains => ResultKind::Contains,
            _ => return None,
        })
    }

    fn or_default(&self) -> bool {
        matches!(
            self,
            ResultKind::FirstOrDefault
                | ResultKind::SingleOrDefault
                | ResultKind::LastOrDefault
                | ResultKind::ElementAtOrDefault
        )
    }
}

/// How the documents a pipeline returns become the single value of a query
/// that ends in a terminal operator.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultOperator {
    pub kind: ResultKind,
    pub result_type: Type,
}

impl ResultOperator {
    pub fn new(kind: ResultKind, result_type: Type) -> Self {
        Self { kind, result_type }
    }

    /// Reduces the decoded results to the value of the query.
    pub fn finish(&self, mut values: Vec<Value>) -> client_side::Result<Value> {
        use ResultKind::*;
        let empty = || match self.kind {
            Any | Contains => Ok(Value::Boolean(false)),
            All => Ok(Value::Boolean(true)),
            Count => Ok(Value::Int32(0)),
            LongCount => Ok(Value::Int64(0)),
            Sum => Ok(default_value(&self.result_type)),
            kind if kind.or_default() => Ok(default_value(&self.result_type)),
            Average | Min | Max if self.result_type.is_nullable() => Ok(Value::Null),
            _ => Err(client_side::Error::EmptySequence),
        };
        match (self.kind, values.len()) {
            (_, 0) => empty(),
            (Single | SingleOrDefault, n) if n > 1 => Err(client_side::Error::MoreThanOneElement),
            _ => Ok(values.remove(0)),
        }
    }
}

impl QueryTranslator {
    /// Lowers a query that ends in a terminal operator: the source pipeline,
    /// the stages that compute the result and the operator that reduces the
    /// returned documents.
    pub(crate) fn translate_result_operator(
        &self,
        expr: &Expression,
        c: &MethodCall,
    ) -> Result<TranslatedQuery> {
        let kind = ResultKind::from_method(c.method).ok_or_else(|| unsupported(expr))?;
        let (source, rest) = c.arguments.split_first().ok_or_else(|| unsupported(expr))?;
        let mut state = self.translate_pipeline(source)?;
        event!(Level::TRACE, operator = ?c.method, "lowering result operator");
        if state.client_side_projection.is_some()
            && !matches!(
                kind,
                ResultKind::First
                    | ResultKind::FirstOrDefault
                    | ResultKind::Single
                    | ResultKind::SingleOrDefault
                    | ResultKind::ElementAt
                    | ResultKind::ElementAtOrDefault
            )
        {
            return Err(not_supported(
                expr,
                "it follows a projection evaluated on the client",
            ));
        }
        let operator = ResultOperator::new(kind, c.ty.clone());
        use ResultKind::*;
        match kind {
            First | FirstOrDefault | Single | SingleOrDefault | Last | LastOrDefault
                if !rest.is_empty() =>
            {
                self.apply_where(&mut state, lambda_argument(c, 1, expr)?)?;
            }
            Any | Count | LongCount if !rest.is_empty() => {
                self.apply_where(&mut state, lambda_argument(c, 1, expr)?)?;
            }
            _ => {}
        }
        match kind {
            First | FirstOrDefault => state.push(Stage::Limit(Limit { limit: 1 })),
            Single | SingleOrDefault => state.push(Stage::Limit(Limit { limit: 2 })),
            Last | LastOrDefault => self.apply_last(&mut state)?,
            ElementAt | ElementAtOrDefault => {
                let index = rest.first().ok_or_else(|| unsupported(expr))?;
                let index = self.constant_count(expr, index)?;
                if index > 0 {
                    state.push(Stage::Skip(Skip { skip: index }));
                }
                state.push(Stage::Limit(Limit { limit: 1 }));
            }
            Any => self.apply_exists(&mut state, true)?,
            All => {
                let predicate = lambda_argument(c, 1, expr)?;
                let parameter = predicate
                    .parameters
                    .first()
                    .ok_or_else(|| unsupported(expr))?;
                let filter = self
                    .with_symbol(state.element_symbol(&parameter.name))
                    .translate_filter(&predicate.body)?;
                state.push(Stage::Match(ast::Match {
                    filter: filter.negate(),
                }));
                self.apply_exists(&mut state, false)?;
            }
            Contains => {
                let value = rest.first().ok_or_else(|| unsupported(expr))?;
                let item = Parameter {
                    name: "item".to_string(),
                    ty: state.element.value_type(),
                };
                let equals = Expression::Binary(Binary {
                    op: BinaryOp::Equal,
                    left: Box::new(Expression::Parameter(item.clone())),
                    right: Box::new(value.clone()),
                    ty: Type::Boolean,
                });
                let filter = self
                    .with_symbol(state.element_symbol(&item.name))
                    .translate_filter(&equals)?;
                state.push(Stage::Match(ast::Match { filter }));
                self.apply_exists(&mut state, true)?;
            }
            Count | LongCount => {
                self.apply_aggregate(
                    &mut state,
                    AccumulatorFunction::Sum,
                    ast::Expression::constant(1),
                    &c.ty,
                )?;
            }
            Sum | Average | Min | Max => {
                let function = match kind {
                    Sum => AccumulatorFunction::Sum,
                    Average => AccumulatorFunction::Avg,
                    Min => AccumulatorFunction::Min,
                    _ => AccumulatorFunction::Max,
                };
                let value = match rest.first() {
                    None => state.element_ast(),
                    Some(_) => {
                        let selector = lambda_argument(c, 1, expr)?;
                        let symbols = selector
                            .parameters
                            .iter()
                            .map(|p| state.element_symbol(&p.name))
                            .collect();
                        self.bind(selector, symbols)
                            .translate_expression(&selector.body)?
                            .ast
                    }
                };
                self.apply_aggregate(&mut state, function, value, &c.ty)?;
            }
        }
        Ok(state.into_query(Some(operator)))
    }

    /// `$limit: 1` and a `{ _v: found }` projection. An empty result means
    /// nothing matched.
    fn apply_exists(&self, state: &mut PipelineState, found: bool) -> Result<()> {
        state.push(Stage::Limit(Limit { limit: 1 }));
        let mut specifications = UniqueLinkedHashMap::new();
        specifications.insert("_id".to_string(), ProjectItem::Exclusion)?;
        specifications.insert(
            WRAPPED_VALUE_FIELD.to_string(),
            ProjectItem::Assignment(ast::Expression::constant(found)),
        )?;
        state.push(Stage::Project(Project { specifications }));
        state.element = self.serializer_for(&Type::Boolean)?;
        state.path = WRAPPED_VALUE_FIELD.to_string();
        Ok(())
    }

    /// `$group` over every document followed by a projection of the result.
    fn apply_aggregate(
        &self,
        state: &mut PipelineState,
        function: AccumulatorFunction,
        value: ast::Expression,
        result_type: &Type,
    ) -> Result<()> {
        state.push(Stage::Group(Group {
            id: ast::Expression::constant(1),
            fields: vec![AccumulatorField {
                name: AGGREGATE_FIELD.to_string(),
                function,
                arg: value,
            }],
        }));
        let mut specifications = UniqueLinkedHashMap::new();
        specifications.insert("_id".to_string(), ProjectItem::Exclusion)?;
        specifications.insert(
            WRAPPED_VALUE_FIELD.to_string(),
            ProjectItem::Assignment(ast::Expression::field(AGGREGATE_FIELD)),
        )?;
        state.push(Stage::Project(Project { specifications }));
        state.element = self.serializer_for(result_type)?;
        state.path = WRAPPED_VALUE_FIELD.to_string();
        Ok(())
    }

    /// The last element is the first one under the inverted sort order. With
    /// no usable sort the `$last` accumulator picks it.
    fn apply_last(&self, state: &mut PipelineState) -> Result<()> {
        let sort = state.stages.iter().rposition(|s| matches!(s, Stage::Sort(_)));
        let order_preserved = |i: usize| {
            state.stages[i + 1..].iter().all(|s| {
                matches!(
                    s,
                    Stage::Match(_) | Stage::Project(_) | Stage::ReplaceRoot(_)
                )
            })
        };
        match sort {
            Some(i) if order_preserved(i) => {
                if let Stage::Sort(sort) = &mut state.stages[i] {
                    sort.specs = sort
                        .specs
                        .drain(..)
                        .map(|spec| match spec {
                            ast::SortSpecification::Asc(p) => ast::SortSpecification::Desc(p),
                            ast::SortSpecification::Desc(p) => ast::SortSpecification::Asc(p),
                        })
                        .collect();
                }
                state.push(Stage::Limit(Limit { limit: 1 }));
            }
            _ => {
                let element = state.element_ast();
                state.push(Stage::Group(Group {
                    id: ast::Expression::null(),
                    fields: vec![AccumulatorField {
                        name: AGGREGATE_FIELD.to_string(),
                        function: AccumulatorFunction::Last,
                        arg: element,
                    }],
                }));
                let last = ast::Expression::field(AGGREGATE_FIELD);
                if state.path.is_empty() {
                    state.push(Stage::ReplaceRoot(ast::ReplaceRoot { new_root: last }));
                } else {
                    let mut specifications = UniqueLinkedHashMap::new();
                    specifications.insert(state.path.clone(), ProjectItem::Assignment(last))?;
                    state.push(Stage::Project(Project { specifications }));
                }
            }
        }
        Ok(())
    }

    /// A `Skip`/`Take`/`ElementAt` count, which must be known at translation
    /// time.
    pub(crate) fn constant_count(&self, expr: &Expression, count: &Expression) -> Result<i64> {
        if !count.is_closed() {
            return Err(not_supported(expr, "the count must be a constant"));
        }
        match self.evaluate_closed(count)? {
            Value::Null => Err(not_supported(expr, "the count must not be null")),
            value => value
                .as_i64()
                .ok_or_else(|| not_supported(expr, "the count must be an integer")),
        }
    }
}
