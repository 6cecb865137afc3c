use crate::{
    ast::{self, Op, SortArray},
    client_side::default_value,
    expression::{Expression, Lambda, Method, MethodCall, Type, Value},
    options::Feature,
    serialization::{shared, ArraySerializer, Serializer, SerializerRef},
    translator::{
        filters::call_operands, is_identity, lambda_argument, not_supported, unsupported,
        Error, QueryTranslator, Result, Symbol, TranslatedExpression,
    },
    util::unique_linked_hash_map::UniqueLinkedHashMap,
};
use bson::{doc, Bson};

/// The largest count `$slice` accepts, used to take "the rest" of an array.
const SLICE_TO_END: i32 = i32::MAX;

fn int_constant(i: i64) -> ast::Expression {
    match i32::try_from(i) {
        Ok(small) => ast::Expression::constant(small),
        Err(_) => ast::Expression::constant(i),
    }
}

impl QueryTranslator {
    /// Translates a lambda body with its parameter bound to the aggregation
    /// variable `variable` holding a value encoded by `item`.
    pub(crate) fn translate_lambda_over(
        &self,
        lambda: &Lambda,
        variable: &str,
        item: SerializerRef,
    ) -> Result<TranslatedExpression> {
        let symbols = lambda
            .parameters
            .iter()
            .map(|p| Symbol::variable(&p.name, variable, item.clone()))
            .collect();
        self.bind(lambda, symbols).translate_expression(&lambda.body)
    }

    fn variable_for(&self, lambda: &Lambda) -> String {
        let name = lambda
            .parameters
            .first()
            .map(|p| p.name.as_str())
            .unwrap_or("item");
        self.context.names().variable_for(name)
    }

    /// `$map` of a lambda over an array.
    fn map_lambda(
        &self,
        array: ast::Expression,
        lambda: &Lambda,
        item: SerializerRef,
    ) -> Result<TranslatedExpression> {
        let variable = self.variable_for(lambda);
        let body = self.translate_lambda_over(lambda, &variable, item)?;
        Ok(TranslatedExpression::new(
            ast::Expression::map(array, &variable, body.ast),
            body.serializer,
        ))
    }

    fn filter_lambda(
        &self,
        array: ast::Expression,
        lambda: &Lambda,
        item: SerializerRef,
        limit: Option<i32>,
    ) -> Result<ast::Expression> {
        let variable = self.variable_for(lambda);
        let predicate = self.translate_lambda_over(lambda, &variable, item)?;
        let limit = limit
            .filter(|_| self.options.supports(Feature::FilterLimit))
            .map(ast::Expression::constant);
        Ok(ast::Expression::filter(
            array,
            &variable,
            predicate.ast,
            limit,
        ))
    }

    fn array_of(&self, ty: &Type, item: SerializerRef) -> SerializerRef {
        let ty = match ty.element_type() {
            Some(_) => ty.clone(),
            None => Type::enumerable(item.value_type()),
        };
        shared(ArraySerializer::new(ty, item))
    }

    fn default_for(&self, ty: &Type, serializer: &SerializerRef) -> Result<ast::Expression> {
        let value = serializer.serialize(&default_value(ty))?;
        Ok(ast::Expression::Constant(value))
    }

    /// A second sequence operand: arrays stored in the document or constant
    /// lists encoded like the first sequence's items.
    fn translate_other_sequence(
        &self,
        expr: &Expression,
        item: &SerializerRef,
    ) -> Result<ast::Expression> {
        if expr.is_closed() {
            let values = self.evaluate_closed(expr)?;
            let array = ArraySerializer::new(Type::enumerable(item.value_type()), item.clone());
            return Ok(ast::Expression::Constant(array.serialize(&values)?));
        }
        Ok(self.translate_sequence(expr)?.0)
    }

    /// Sequence operators applied to arrays inside the document.
    pub(crate) fn translate_collection_method(
        &self,
        expr: &Expression,
        c: &MethodCall,
    ) -> Result<TranslatedExpression> {
        match c.method {
            Method::Repeat => return self.translate_repeat(expr, c),
            Method::Range => return self.translate_range(expr, c),
            Method::OrderBy
            | Method::OrderByDescending
            | Method::ThenBy
            | Method::ThenByDescending => return self.translate_sort_array(expr, c),
            _ => {}
        }
        let (source, rest) = call_operands(c).ok_or_else(|| unsupported(expr))?;
        let (array, item) = self.translate_sequence(source)?;
        let lambda = |i: usize| lambda_argument(c, c.arguments.len() - rest.len() + i, expr);
        let int = || self.serializer_for(&c.ty);
        let ast = match (c.method, rest.len()) {
            (Method::ToList | Method::ToArray | Method::AsQueryable | Method::AsEnumerable, 0) => {
                return Ok(TranslatedExpression::new(
                    array,
                    self.array_of(&c.ty, item),
                ))
            }
            (Method::Count | Method::LongCount, 0) => {
                return Ok(TranslatedExpression::new(
                    ast::Expression::unary(Op::Size, array),
                    int()?,
                ))
            }
            (Method::Count | Method::LongCount, 1) => {
                let variable = self.variable_for(lambda(0)?);
                let predicate = self.translate_lambda_over(lambda(0)?, &variable, item)?;
                let ones = ast::Expression::map(
                    array,
                    &variable,
                    ast::Expression::cond(
                        predicate.ast,
                        ast::Expression::constant(1),
                        ast::Expression::constant(0),
                    ),
                );
                return Ok(TranslatedExpression::new(
                    ast::Expression::unary(Op::Sum, ones),
                    int()?,
                ));
            }
            (Method::Any, 0) => ast::Expression::op(
                Op::Gt,
                vec![
                    ast::Expression::unary(Op::Size, array),
                    ast::Expression::constant(0),
                ],
            ),
            (Method::Any, 1) => ast::Expression::unary(
                Op::AnyElementTrue,
                self.map_lambda(array, lambda(0)?, item.clone())?.ast,
            ),
            (Method::All, 1) => ast::Expression::unary(
                Op::AllElementsTrue,
                self.map_lambda(array, lambda(0)?, item.clone())?.ast,
            ),
            (Method::Contains, 1) => {
                let value = self.translate_with_serializer(&rest[0], &item)?;
                ast::Expression::op(Op::In, vec![value.ast, array])
            }
            (
                Method::First
                | Method::Last
                | Method::Single
                | Method::FirstOrDefault
                | Method::LastOrDefault
                | Method::SingleOrDefault,
                0 | 1,
            ) => return self.translate_element_method(c, array, item, rest, lambda),
            (Method::ElementAt, 1) => {
                let index = self.translate_expression(&rest[0])?;
                return Ok(TranslatedExpression::new(
                    ast::Expression::op(Op::ArrayElemAt, vec![array, index.ast]),
                    item,
                ));
            }
            (Method::ElementAtOrDefault, 1) => {
                let index = self.translate_expression(&rest[0])?;
                let default = self.default_for(&c.ty, &item)?;
                return Ok(TranslatedExpression::new(
                    ast::Expression::op(
                        Op::IfNull,
                        vec![
                            ast::Expression::op(Op::ArrayElemAt, vec![array, index.ast]),
                            default,
                        ],
                    ),
                    item,
                ));
            }
            (Method::Sum | Method::Average | Method::Min | Method::Max, 0 | 1) => {
                let op = match c.method {
                    Method::Sum => Op::Sum,
                    Method::Average => Op::Avg,
                    Method::Min => Op::Min,
                    _ => Op::Max,
                };
                let (values, serializer) = match rest.len() {
                    0 => (array, item),
                    _ => {
                        let mapped = self.map_lambda(array, lambda(0)?, item)?;
                        (mapped.ast, mapped.serializer)
                    }
                };
                let serializer = match c.method {
                    Method::Min | Method::Max => serializer,
                    _ => self.serializer_for(&c.ty)?,
                };
                return Ok(TranslatedExpression::new(
                    ast::Expression::unary(op, values),
                    serializer,
                ));
            }
            (Method::Where, 1) => {
                let filtered = self.filter_lambda(array, lambda(0)?, item.clone(), None)?;
                return Ok(TranslatedExpression::new(
                    filtered,
                    self.array_of(&c.ty, item),
                ));
            }
            (Method::Select, 1) => {
                let mapped = self.map_lambda(array, lambda(0)?, item)?;
                return Ok(TranslatedExpression::new(
                    mapped.ast,
                    self.array_of(&c.ty, mapped.serializer),
                ));
            }
            (Method::SelectMany, 1) => {
                let mapped = self.map_lambda(array, lambda(0)?, item)?;
                let inner = mapped
                    .serializer
                    .item_serializer()
                    .ok_or_else(|| not_supported(expr, "the selector must return a sequence"))?;
                let flattened = ast::Expression::Reduce(ast::Reduce {
                    input: Box::new(mapped.ast),
                    initial_value: Box::new(ast::Expression::Array(vec![])),
                    inside: Box::new(ast::Expression::op(
                        Op::ConcatArrays,
                        vec![
                            ast::Expression::var("value", ""),
                            ast::Expression::var("this", ""),
                        ],
                    )),
                });
                return Ok(TranslatedExpression::new(
                    flattened,
                    self.array_of(&c.ty, inner),
                ));
            }
            (Method::OfType, 1) => {
                let Value::Type(target) = self.evaluate_closed(&rest[0])? else {
                    return Err(unsupported(expr));
                };
                let variable = self.context.names().variable_for("item");
                let test = self.discriminator_expression(
                    expr,
                    ast::Expression::var(&variable, ""),
                    &item.value_type(),
                    &target,
                    false,
                )?;
                let target_serializer = self.serializer_for(&target)?;
                return Ok(TranslatedExpression::new(
                    ast::Expression::filter(array, &variable, test, None),
                    self.array_of(&c.ty, target_serializer),
                ));
            }
            (Method::Distinct, 0) => ast::Expression::op(Op::SetUnion, vec![array]),
            (Method::Concat | Method::Union | Method::Intersect | Method::Except, 1) => {
                let other = self.translate_other_sequence(&rest[0], &item)?;
                let op = match c.method {
                    Method::Concat => Op::ConcatArrays,
                    Method::Union => Op::SetUnion,
                    Method::Intersect => Op::SetIntersection,
                    _ => Op::SetDifference,
                };
                ast::Expression::op(op, vec![array, other])
            }
            (Method::Reverse, 0) => ast::Expression::unary(Op::ReverseArray, array),
            (Method::Skip, 1) => {
                let count = self.translate_expression(&rest[0])?;
                ast::Expression::op(
                    Op::Slice,
                    vec![array, count.ast, ast::Expression::constant(SLICE_TO_END)],
                )
            }
            (Method::Take, 1) => {
                let count = self.translate_expression(&rest[0])?;
                ast::Expression::op(Op::Slice, vec![array, count.ast])
            }
            (Method::Append | Method::Prepend, 1) => {
                let value = self.translate_with_serializer(&rest[0], &item)?;
                let single = ast::Expression::Array(vec![value.ast]);
                let args = match c.method {
                    Method::Append => vec![array, single],
                    _ => vec![single, array],
                };
                ast::Expression::op(Op::ConcatArrays, args)
            }
            (Method::DefaultIfEmpty, 0 | 1) => {
                let default = match rest.first() {
                    Some(value) => self.translate_with_serializer(value, &item)?.ast,
                    None => self.default_for(&item.value_type(), &item)?,
                };
                ast::Expression::cond(
                    ast::Expression::op(
                        Op::Eq,
                        vec![
                            ast::Expression::unary(Op::Size, array.clone()),
                            ast::Expression::constant(0),
                        ],
                    ),
                    ast::Expression::Array(vec![default]),
                    array,
                )
            }
            (Method::TakeWhile | Method::SkipWhile, 1) => {
                self.translate_while(c.method, array, lambda(0)?, item.clone())?
            }
            _ => return Err(unsupported(expr)),
        };
        let serializer = match c.ty {
            Type::Boolean => self.serializer_for(&Type::Boolean)?,
            _ => self.array_of(&c.ty, item),
        };
        Ok(TranslatedExpression::new(ast, serializer))
    }

    fn translate_element_method<'a>(
        &self,
        c: &MethodCall,
        array: ast::Expression,
        item: SerializerRef,
        rest: &[Expression],
        lambda: impl Fn(usize) -> Result<&'a Lambda>,
    ) -> Result<TranslatedExpression> {
        let last = matches!(c.method, Method::Last | Method::LastOrDefault);
        let or_default = matches!(
            c.method,
            Method::FirstOrDefault | Method::LastOrDefault | Method::SingleOrDefault
        );
        let values = match rest.len() {
            0 => array,
            _ => self.filter_lambda(array, lambda(0)?, item.clone(), (!last).then_some(1))?,
        };
        let pick = |values: ast::Expression| {
            let index = if last { -1 } else { 0 };
            ast::Expression::op(
                Op::ArrayElemAt,
                vec![values, ast::Expression::constant(index)],
            )
        };
        if !or_default {
            return Ok(TranslatedExpression::new(pick(values), item));
        }
        let default = self.default_for(&c.ty, &item)?;
        let is_empty = |values: ast::Expression| {
            ast::Expression::op(
                Op::Eq,
                vec![
                    ast::Expression::unary(Op::Size, values),
                    ast::Expression::constant(0),
                ],
            )
        };
        let ast = match rest.len() {
            0 => ast::Expression::cond(is_empty(values.clone()), default, pick(values)),
            _ => {
                let bound = ast::Expression::var("values", "");
                ast::Expression::let_in(
                    vec![("values", values)],
                    ast::Expression::cond(is_empty(bound.clone()), default, pick(bound)),
                )
            }
        };
        Ok(TranslatedExpression::new(ast, item))
    }

    /// `TakeWhile` and `SkipWhile` count the leading elements that satisfy
    /// the predicate with `$reduce`, then slice at that count.
    fn translate_while(
        &self,
        method: Method,
        array: ast::Expression,
        predicate: &Lambda,
        item: SerializerRef,
    ) -> Result<ast::Expression> {
        let test = self.translate_lambda_over(predicate, "this", item)?;
        let state = |predicate: ast::Expression, count: ast::Expression| {
            let mut fields = UniqueLinkedHashMap::new();
            fields.insert("predicate".to_string(), predicate)?;
            fields.insert("count".to_string(), count)?;
            Ok::<_, Error>(ast::Expression::Document(fields))
        };
        let count = ast::Expression::var("value", "count");
        let reduce = ast::Expression::Reduce(ast::Reduce {
            input: Box::new(array.clone()),
            initial_value: Box::new(state(
                ast::Expression::constant(true),
                ast::Expression::constant(0),
            )?),
            inside: Box::new(ast::Expression::cond(
                ast::Expression::op(
                    Op::And,
                    vec![ast::Expression::var("value", "predicate"), test.ast],
                ),
                state(
                    ast::Expression::constant(true),
                    ast::Expression::op(Op::Add, vec![count.clone(), ast::Expression::constant(1)]),
                )?,
                state(ast::Expression::constant(false), count)?,
            )),
        });
        let taken = ast::Expression::var("state", "count");
        let body = match method {
            Method::TakeWhile => ast::Expression::cond(
                ast::Expression::op(Op::Eq, vec![taken.clone(), ast::Expression::constant(0)]),
                ast::Expression::Array(vec![]),
                ast::Expression::op(Op::Slice, vec![array, taken]),
            ),
            _ => ast::Expression::op(
                Op::Slice,
                vec![array, taken, ast::Expression::constant(SLICE_TO_END)],
            ),
        };
        Ok(ast::Expression::let_in(vec![("state", reduce)], body))
    }

    fn translate_repeat(&self, expr: &Expression, c: &MethodCall) -> Result<TranslatedExpression> {
        let [value, count] = c.arguments.as_slice() else {
            return Err(unsupported(expr));
        };
        let value = self.translate_expression(value)?;
        let count = self.translate_expression(count)?;
        let range = ast::Expression::op(Op::Range, vec![ast::Expression::constant(0), count.ast]);
        Ok(TranslatedExpression::new(
            ast::Expression::map(range, "i", value.ast),
            self.array_of(&c.ty, value.serializer),
        ))
    }

    fn translate_range(&self, expr: &Expression, c: &MethodCall) -> Result<TranslatedExpression> {
        let [start, count] = c.arguments.as_slice() else {
            return Err(unsupported(expr));
        };
        let int = self.serializer_for(&Type::Int32)?;
        let folded = if start.is_closed() && count.is_closed() {
            self.evaluate_closed(start)?
                .as_i64()
                .zip(self.evaluate_closed(count)?.as_i64())
        } else {
            None
        };
        let args = match folded {
            Some((start, count)) => vec![
                int_constant(start),
                int_constant(start + count),
            ],
            None => {
                let start = self.translate_expression(start)?.ast;
                let count = self.translate_expression(count)?.ast;
                vec![
                    start.clone(),
                    ast::Expression::op(Op::Add, vec![start, count]),
                ]
            }
        };
        Ok(TranslatedExpression::new(
            ast::Expression::op(Op::Range, args),
            self.array_of(&c.ty, int),
        ))
    }

    /// `OrderBy` chains over arrays become `$sortArray` when every key is the
    /// element itself or a field of it.
    fn translate_sort_array(&self, expr: &Expression, c: &MethodCall) -> Result<TranslatedExpression> {
        self.require(Feature::SortArray, expr)?;
        let mut keys = vec![];
        let mut current = c;
        let source = loop {
            let (source, rest) = call_operands(current).ok_or_else(|| unsupported(expr))?;
            let [key] = rest else {
                return Err(unsupported(expr));
            };
            let key = key.as_lambda().ok_or_else(|| unsupported(expr))?;
            let descending = matches!(
                current.method,
                Method::OrderByDescending | Method::ThenByDescending
            );
            keys.push((key, descending));
            match current.method {
                Method::OrderBy | Method::OrderByDescending => break source,
                _ => {
                    current = source.as_call().ok_or_else(|| unsupported(expr))?;
                }
            }
        };
        keys.reverse();
        let (array, item) = self.translate_sequence(source)?;
        let direction = |descending: bool| if descending { -1 } else { 1 };
        let sort_by = match keys.as_slice() {
            [(key, descending)] if is_identity(key) => Bson::Int32(direction(*descending)),
            _ => {
                let mut spec = doc! {};
                for (key, descending) in keys {
                    let parameter = key.parameters.first().ok_or_else(|| unsupported(expr))?;
                    let scope = self.context.elem_match_scope(Symbol::element(
                        &parameter.name,
                        "this",
                        item.clone(),
                    ));
                    let field = self
                        .with_context(scope)
                        .try_translate_field(&key.body)?
                        .filter(|f| !f.path.is_empty())
                        .ok_or_else(|| {
                            not_supported(expr, "array sort keys must be fields of the element")
                        })?;
                    spec.insert(field.path, direction(descending));
                }
                Bson::Document(spec)
            }
        };
        Ok(TranslatedExpression::new(
            ast::Expression::SortArray(SortArray {
                input: Box::new(array),
                sort_by,
            }),
            self.array_of(&c.ty, item),
        ))
    }
}
