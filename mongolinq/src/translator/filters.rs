use crate::{
    ast::{ComparisonOperator, FieldFilter, FieldOperation, Filter},
    expression::{
        Binary, BinaryOp, Expression, MemberAccess, Method, MethodCall, StringComparison, Type,
        Unary, UnaryOp, Value,
    },
    options::Feature,
    serialization::{
        Representation, SerializerRef, GROUPING_ELEMENTS_ELEMENT, KEY_ELEMENT, VALUE_ELEMENT,
    },
    translator::{
        conversions::{is_widening, unwrap_comparison_convert},
        lambda_argument, not_supported, QueryTranslator, Result, Symbol,
    },
    util::join_path,
};
use bson::{Bson, Regex};

/// A value stored at a known field path of the matched document.
#[derive(Debug, Clone)]
pub(crate) struct FieldRef {
    pub path: String,
    pub serializer: SerializerRef,
}

impl FieldRef {
    fn child(&self, name: &str, serializer: SerializerRef) -> FieldRef {
        FieldRef {
            path: join_path(&self.path, name),
            serializer,
        }
    }

    /// A grouping is stored as its key and `_elements`; sequence operators
    /// iterate the elements.
    fn elements(self) -> FieldRef {
        match self.serializer.value_type() {
            Type::Grouping(..) => self.child(GROUPING_ELEMENTS_ELEMENT, self.serializer.clone()),
            _ => self,
        }
    }
}

fn comparison_operator(op: BinaryOp) -> ComparisonOperator {
    match op {
        BinaryOp::Equal => ComparisonOperator::Eq,
        BinaryOp::NotEqual => ComparisonOperator::Ne,
        BinaryOp::LessThan => ComparisonOperator::Lt,
        BinaryOp::LessThanOrEqual => ComparisonOperator::Lte,
        BinaryOp::GreaterThan => ComparisonOperator::Gt,
        _ => ComparisonOperator::Gte,
    }
}

fn regex_operation(pattern: String, options: &str) -> FieldOperation {
    FieldOperation::Regex(Regex {
        pattern,
        options: options.to_string(),
    })
}

/// The source and remaining arguments of a call written either as an
/// extension (`Enumerable.Any(xs, ..)`) or as an instance method
/// (`xs.Contains(..)`).
pub(crate) fn call_operands(c: &MethodCall) -> Option<(&Expression, &[Expression])> {
    match &c.object {
        Some(object) => Some((object, c.arguments.as_slice())),
        None => c.arguments.split_first(),
    }
}

type SpecialComparison = fn(
    &QueryTranslator,
    &Expression,
    BinaryOp,
    &Expression,
    &Expression,
) -> Result<Option<Filter>>;

/// True when the filter needs `$expr`, which is not allowed inside
/// `$elemMatch`.
fn contains_expr(filter: &Filter) -> bool {
    match filter {
        Filter::Expr(_) => true,
        Filter::And(fs) | Filter::Or(fs) | Filter::Nor(fs) => fs.iter().any(contains_expr),
        Filter::Field(FieldFilter {
            operation: FieldOperation::ElemMatch(inner),
            ..
        }) => contains_expr(inner),
        _ => false,
    }
}

/// True when a predicate on the implied element appears under `$or` or
/// `$nor`.
fn implied_element_in_or(filter: &Filter, under_or: bool) -> bool {
    match filter {
        Filter::Field(f) => under_or && f.path.is_empty(),
        Filter::And(fs) => fs.iter().any(|f| implied_element_in_or(f, under_or)),
        Filter::Or(fs) | Filter::Nor(fs) => fs.iter().any(|f| implied_element_in_or(f, true)),
        _ => false,
    }
}

impl QueryTranslator {
    /// Translates a boolean expression to a match filter, falling back to
    /// `$expr` for anything the query language cannot express.
    pub(crate) fn translate_filter(&self, expr: &Expression) -> Result<Filter> {
        match expr {
            Expression::Binary(b) => match b.op {
                BinaryOp::AndAlso | BinaryOp::And if b.ty == Type::Boolean => Ok(Filter::and(vec![
                    self.translate_filter(&b.left)?,
                    self.translate_filter(&b.right)?,
                ])),
                BinaryOp::OrElse | BinaryOp::Or if b.ty == Type::Boolean => Ok(Filter::or(vec![
                    self.translate_filter(&b.left)?,
                    self.translate_filter(&b.right)?,
                ])),
                op if op.is_comparison() => self.translate_comparison_filter(expr, b),
                _ => self.expr_filter(expr),
            },
            Expression::Unary(Unary {
                op: UnaryOp::Not,
                operand,
                ..
            }) => Ok(self.translate_filter(operand)?.negate()),
            Expression::Constant(c) => match c.value {
                Value::Boolean(true) => Ok(Filter::MatchAll),
                Value::Boolean(false) => Ok(Filter::MatchNothing),
                _ => Err(not_supported(expr, "a predicate must be boolean")),
            },
            Expression::Call(c) => match self.try_translate_method_filter(expr, c)? {
                Some(filter) => Ok(filter),
                None => self.expr_filter(expr),
            },
            // The discriminator is a sub-field, so even the root document has
            // a usable path for it.
            Expression::TypeIs(t) => match self.try_translate_field(&t.expr)? {
                Some(field) => {
                    self.discriminator_filter(expr, &field.path, &t.expr.ty(), &t.target, false)
                }
                _ => self.expr_filter(expr),
            },
            Expression::Member(MemberAccess { expr: base, member, .. })
                if member == "HasValue" && base.ty().is_nullable() =>
            {
                match self.try_translate_field(base)? {
                    Some(field) if self.is_usable_path(&field) => Ok(Filter::compare(
                        &field.path,
                        ComparisonOperator::Ne,
                        Bson::Null,
                    )),
                    _ => self.expr_filter(expr),
                }
            }
            _ if *expr.ty().non_nullable() == Type::Boolean => {
                match self.try_translate_field(expr)? {
                    Some(field) if self.is_usable_path(&field) => {
                        Ok(Filter::eq(&field.path, true))
                    }
                    _ => self.expr_filter(expr),
                }
            }
            _ => self.expr_filter(expr),
        }
    }

    fn expr_filter(&self, expr: &Expression) -> Result<Filter> {
        Ok(Filter::Expr(self.translate_expression(expr)?.ast))
    }

    /// The empty path names the matched document itself, which the query
    /// language can only test as the implied element of `$elemMatch`.
    fn is_usable_path(&self, field: &FieldRef) -> bool {
        !field.path.is_empty() || self.context.in_elem_match()
    }

    /// Resolves an expression to the stored field it reads, when it reads one
    /// directly.
    pub(crate) fn try_translate_field(&self, expr: &Expression) -> Result<Option<FieldRef>> {
        match expr {
            Expression::Parameter(p) => {
                let symbol = self.lookup(&p.name)?;
                Ok(symbol.field_path.clone().map(|path| FieldRef {
                    path,
                    serializer: symbol.serializer.clone(),
                }))
            }
            Expression::Member(m) => {
                let Some(base) = self.try_translate_field(&m.expr)? else {
                    return Ok(None);
                };
                if m.expr.ty().is_nullable() {
                    return Ok(match m.member.as_str() {
                        "Value" => Some(FieldRef {
                            serializer: base.serializer.underlying().unwrap_or(base.serializer),
                            path: base.path,
                        }),
                        _ => None,
                    });
                }
                if let Some(info) = base.serializer.try_get_member_info(&m.member) {
                    return Ok(Some(base.child(&info.storage_path(), info.serializer)));
                }
                if base.serializer.representation() == Representation::Array {
                    if let Type::KeyValuePair(k, v) = base.serializer.value_type() {
                        return Ok(match m.member.as_str() {
                            "Key" => Some(base.child("0", self.serializer_for(&k)?)),
                            "Value" => Some(base.child("1", self.serializer_for(&v)?)),
                            _ => None,
                        });
                    }
                }
                Ok(None)
            }
            Expression::Index(i) => {
                let Some(base) = self.try_translate_field(&i.expr)? else {
                    return Ok(None);
                };
                if !i.index.is_closed() {
                    return Ok(None);
                }
                if let Some(info) = base.serializer.dictionary_info() {
                    if info.representation != Representation::Document {
                        return Ok(None);
                    }
                    return Ok(match self.evaluate_closed(&i.index)? {
                        Value::String(key) => Some(base.child(&key, info.value)),
                        _ => None,
                    });
                }
                let Some(item) = base.serializer.item_serializer() else {
                    return Ok(None);
                };
                Ok(self
                    .evaluate_closed(&i.index)?
                    .as_i64()
                    .filter(|n| *n >= 0)
                    .map(|n| base.child(&n.to_string(), item)))
            }
            Expression::Unary(Unary {
                op: UnaryOp::Convert,
                operand,
                ty,
            }) if is_widening(&operand.ty(), ty)
                || operand.ty().non_nullable() == ty.non_nullable() =>
            {
                self.try_translate_field(operand)
            }
            Expression::Call(c) => self.try_translate_call_field(c),
            _ => Ok(None),
        }
    }

    fn try_translate_call_field(&self, c: &MethodCall) -> Result<Option<FieldRef>> {
        let Some((source, rest)) = call_operands(c) else {
            return Ok(None);
        };
        let index = match (c.method, rest) {
            (Method::First, []) => 0,
            (Method::ElementAt, [n]) if n.is_closed() => {
                match self.evaluate_closed(n)?.as_i64() {
                    Some(n) if n >= 0 => n,
                    _ => return Ok(None),
                }
            }
            (Method::GetValueOrDefault, []) => {
                return Ok(self.try_translate_field(source)?.map(|base| FieldRef {
                    serializer: base.serializer.underlying().unwrap_or(base.serializer),
                    path: base.path,
                }))
            }
            _ => return Ok(None),
        };
        let Some(base) = self.try_translate_field(source)? else {
            return Ok(None);
        };
        if base.serializer.dictionary_info().is_some() {
            return Ok(None);
        }
        let base = base.elements();
        Ok(base
            .serializer
            .item_serializer()
            .map(|item| base.child(&index.to_string(), item)))
    }

    /// Encodes a parameter-free expression with a field's serializer.
    fn serialize_for_field(&self, field: &FieldRef, value: &Expression) -> Result<Bson> {
        let value = self.evaluate_closed(value)?;
        let value = match field.serializer.underlying() {
            Some(underlying) if !value.is_null() => {
                self.coerce_value(value, &underlying.value_type())
            }
            _ => self.coerce_value(value, &field.serializer.value_type()),
        };
        Ok(field.serializer.serialize(&value)?)
    }

    fn translate_comparison_filter(&self, expr: &Expression, b: &Binary) -> Result<Filter> {
        let (op, left, right) = if b.left.is_closed() && !b.right.is_closed() {
            (b.op.flip(), &*b.right, &*b.left)
        } else {
            (b.op, &*b.left, &*b.right)
        };
        if !right.is_closed() {
            return self.expr_filter(expr);
        }
        let special: [SpecialComparison; 6] = [
            Self::try_case_folded_comparison,
            Self::try_count_comparison,
            Self::try_string_length_comparison,
            Self::try_modulo_comparison,
            Self::try_get_type_comparison,
            Self::try_dictionary_entry_comparison,
        ];
        for translate in special {
            if let Some(filter) = translate(self, expr, op, left, right)? {
                return Ok(filter);
            }
        }
        match self.try_translate_field(unwrap_comparison_convert(left))? {
            Some(field) if self.is_usable_path(&field) => {
                let value = self.serialize_for_field(&field, right)?;
                Ok(Filter::compare(&field.path, comparison_operator(op), value))
            }
            _ => self.expr_filter(expr),
        }
    }

    /// `s.ToLower() == "abc"` is a case-insensitive anchored regex. A literal
    /// that is not already in the folded case can never match.
    fn try_case_folded_comparison(
        &self,
        _expr: &Expression,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
    ) -> Result<Option<Filter>> {
        let Expression::Call(c) = left else {
            return Ok(None);
        };
        let lower = match c.method {
            Method::ToLower | Method::ToLowerInvariant => true,
            Method::ToUpper | Method::ToUpperInvariant => false,
            _ => return Ok(None),
        };
        if !matches!(op, BinaryOp::Equal | BinaryOp::NotEqual) {
            return Ok(None);
        }
        let Some(object) = c.object.as_deref() else {
            return Ok(None);
        };
        let Some(field) = self.try_translate_field(object)? else {
            return Ok(None);
        };
        if !self.is_usable_path(&field) {
            return Ok(None);
        }
        let Value::String(literal) = self.evaluate_closed(right)? else {
            return Ok(None);
        };
        let folded = if lower {
            literal.to_lowercase()
        } else {
            literal.to_uppercase()
        };
        let filter = if folded != literal {
            Filter::MatchNothing
        } else {
            Filter::field(
                &field.path,
                regex_operation(format!("^{}$", regex::escape(&literal)), "is"),
            )
        };
        Ok(Some(match op {
            BinaryOp::Equal => filter,
            _ => filter.negate(),
        }))
    }

    /// Array sizes compare through `$size` for equality and through the
    /// existence of the element at the boundary index otherwise.
    fn try_count_comparison(
        &self,
        _expr: &Expression,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
    ) -> Result<Option<Filter>> {
        let source = match left {
            Expression::Member(m)
                if matches!(m.member.as_str(), "Count" | "Length")
                    && m.expr.ty().is_sequence() =>
            {
                &*m.expr
            }
            Expression::Unary(Unary {
                op: UnaryOp::ArrayLength,
                operand,
                ..
            }) => &**operand,
            Expression::Call(c) if matches!(c.method, Method::Count | Method::LongCount) => {
                match call_operands(c) {
                    Some((source, [])) => source,
                    _ => return Ok(None),
                }
            }
            _ => return Ok(None),
        };
        let Some(field) = self.try_translate_field(source)? else {
            return Ok(None);
        };
        if field.path.is_empty() || field.serializer.representation() == Representation::Document
        {
            return Ok(None);
        }
        let Some(n) = self.evaluate_closed(right)?.as_i64() else {
            return Ok(None);
        };
        let at = |i: i64| join_path(&field.path, &i.to_string());
        Ok(Some(match op {
            BinaryOp::Equal => Filter::field(&field.path, FieldOperation::Size(n)),
            BinaryOp::NotEqual => {
                Filter::field(&field.path, FieldOperation::Size(n).negate())
            }
            BinaryOp::GreaterThan if n < 0 => Filter::MatchAll,
            BinaryOp::GreaterThan => Filter::exists(&at(n), true),
            BinaryOp::GreaterThanOrEqual if n <= 0 => Filter::MatchAll,
            BinaryOp::GreaterThanOrEqual => Filter::exists(&at(n - 1), true),
            BinaryOp::LessThan if n <= 0 => Filter::MatchNothing,
            BinaryOp::LessThan => Filter::exists(&at(n - 1), false),
            BinaryOp::LessThanOrEqual if n < 0 => Filter::MatchNothing,
            _ => Filter::exists(&at(n), false),
        }))
    }

    /// String lengths compare as regular expressions counting code points.
    fn try_string_length_comparison(
        &self,
        _expr: &Expression,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
    ) -> Result<Option<Filter>> {
        let Expression::Member(m) = left else {
            return Ok(None);
        };
        if m.member != "Length" || *m.expr.ty().non_nullable() != Type::String {
            return Ok(None);
        }
        let Some(field) = self.try_translate_field(&m.expr)? else {
            return Ok(None);
        };
        if !self.is_usable_path(&field) {
            return Ok(None);
        }
        let Some(n) = self.evaluate_closed(right)?.as_i64() else {
            return Ok(None);
        };
        let pattern = match op {
            BinaryOp::Equal | BinaryOp::NotEqual => format!("^.{{{n}}}$"),
            BinaryOp::GreaterThan => format!("^.{{{},}}$", n + 1),
            BinaryOp::GreaterThanOrEqual => format!("^.{{{},}}$", n.max(0)),
            BinaryOp::LessThan if n <= 0 => return Ok(Some(Filter::MatchNothing)),
            BinaryOp::LessThan => format!("^.{{0,{}}}$", n - 1),
            _ if n < 0 => return Ok(Some(Filter::MatchNothing)),
            _ => format!("^.{{0,{n}}}$"),
        };
        let filter = Filter::field(&field.path, regex_operation(pattern, "s"));
        Ok(Some(match op {
            BinaryOp::NotEqual => filter.negate(),
            _ => filter,
        }))
    }

    fn try_modulo_comparison(
        &self,
        _expr: &Expression,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
    ) -> Result<Option<Filter>> {
        let Expression::Binary(Binary {
            op: BinaryOp::Modulo,
            left: dividend,
            right: divisor,
            ..
        }) = left
        else {
            return Ok(None);
        };
        if !matches!(op, BinaryOp::Equal | BinaryOp::NotEqual) || !divisor.is_closed() {
            return Ok(None);
        }
        let Some(field) = self.try_translate_field(unwrap_comparison_convert(dividend))? else {
            return Ok(None);
        };
        if !self.is_usable_path(&field) {
            return Ok(None);
        }
        let (Some(divisor), Some(remainder)) = (
            self.evaluate_closed(divisor)?.as_i64(),
            self.evaluate_closed(right)?.as_i64(),
        ) else {
            return Ok(None);
        };
        let operation = FieldOperation::Mod { divisor, remainder };
        Ok(Some(Filter::field(
            &field.path,
            match op {
                BinaryOp::Equal => operation,
                _ => operation.negate(),
            },
        )))
    }

    /// `x.GetType() == typeof(T)` matches documents of exactly `T`.
    fn try_get_type_comparison(
        &self,
        expr: &Expression,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
    ) -> Result<Option<Filter>> {
        let Expression::Call(MethodCall {
            method: Method::GetType,
            object: Some(object),
            ..
        }) = left
        else {
            return Ok(None);
        };
        if !matches!(op, BinaryOp::Equal | BinaryOp::NotEqual) {
            return Ok(None);
        }
        let Value::Type(target) = self.evaluate_closed(right)? else {
            return Ok(None);
        };
        let Some(field) = self.try_translate_field(object)? else {
            return Ok(None);
        };
        let filter = self.discriminator_filter(expr, &field.path, &object.ty(), &target, true)?;
        Ok(Some(match op {
            BinaryOp::Equal => filter,
            _ => filter.negate(),
        }))
    }

    /// `d[key] == value` over dictionaries stored as arrays of pairs matches
    /// an element holding both.
    fn try_dictionary_entry_comparison(
        &self,
        _expr: &Expression,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
    ) -> Result<Option<Filter>> {
        let Expression::Index(i) = left else {
            return Ok(None);
        };
        if !i.index.is_closed() {
            return Ok(None);
        }
        let Some(field) = self.try_translate_field(&i.expr)? else {
            return Ok(None);
        };
        let Some(info) = field.serializer.dictionary_info() else {
            return Ok(None);
        };
        let (key_path, value_path) = match info.representation {
            Representation::ArrayOfDocuments => (KEY_ELEMENT, VALUE_ELEMENT),
            Representation::ArrayOfArrays => ("0", "1"),
            _ => return Ok(None),
        };
        if !self.is_usable_path(&field) {
            return Ok(None);
        }
        let key = info.key.serialize(&self.evaluate_closed(&i.index)?)?;
        let value = self.serialize_for_field(
            &FieldRef {
                path: value_path.to_string(),
                serializer: info.value,
            },
            right,
        )?;
        let entry = Filter::and(vec![
            Filter::eq(key_path, key),
            Filter::compare(value_path, comparison_operator(op), value),
        ]);
        Ok(Some(Filter::field(
            &field.path,
            FieldOperation::ElemMatch(Box::new(entry)),
        )))
    }

    fn try_translate_method_filter(
        &self,
        expr: &Expression,
        c: &MethodCall,
    ) -> Result<Option<Filter>> {
        match c.method {
            Method::Any | Method::All => self.try_translate_quantifier_filter(expr, c),
            Method::Contains => self.try_translate_contains_filter(c),
            Method::StringContains | Method::StartsWith | Method::EndsWith => {
                self.try_translate_substring_filter(c)
            }
            Method::IsNullOrEmpty | Method::IsNullOrWhiteSpace => {
                let Some(field) = self.usable_field(c.arguments.first())? else {
                    return Ok(None);
                };
                let blank = match c.method {
                    Method::IsNullOrEmpty => Bson::String(String::new()),
                    _ => Bson::RegularExpression(Regex {
                        pattern: r"^\s*$".to_string(),
                        options: String::new(),
                    }),
                };
                Ok(Some(Filter::field(
                    &field.path,
                    FieldOperation::In(vec![Bson::Null, blank]),
                )))
            }
            Method::StringEquals | Method::Equals => self.try_translate_equals_filter(expr, c),
            Method::ContainsKey | Method::ContainsValue => self.try_translate_dictionary_filter(c),
            Method::RegexIsMatch => {
                let (Some(field), Some(pattern)) = (
                    self.usable_field(c.arguments.first())?,
                    c.arguments.get(1).filter(|p| p.is_closed()),
                ) else {
                    return Ok(None);
                };
                let Value::String(pattern) = self.evaluate_closed(pattern)? else {
                    return Ok(None);
                };
                Ok(Some(Filter::field(&field.path, regex_operation(pattern, ""))))
            }
            _ => Ok(None),
        }
    }

    fn usable_field(&self, expr: Option<&Expression>) -> Result<Option<FieldRef>> {
        let Some(expr) = expr else {
            return Ok(None);
        };
        Ok(self
            .try_translate_field(expr)?
            .map(FieldRef::elements)
            .filter(|f| self.is_usable_path(f)))
    }

    /// `Any` and `All` over a stored array become `$elemMatch` when the
    /// element predicate is expressible in the query language.
    fn try_translate_quantifier_filter(
        &self,
        expr: &Expression,
        c: &MethodCall,
    ) -> Result<Option<Filter>> {
        let Some((source, rest)) = call_operands(c) else {
            return Ok(None);
        };
        let Some(field) = self.usable_field(Some(source))? else {
            return Ok(None);
        };
        if field.path.is_empty() || field.serializer.dictionary_info().is_some() {
            return Ok(None);
        }
        let Some(item) = field.serializer.item_serializer() else {
            return Ok(None);
        };
        if rest.is_empty() {
            return Ok(match c.method {
                Method::Any => Some(Filter::exists(&join_path(&field.path, "0"), true)),
                _ => Some(Filter::MatchAll),
            });
        }
        let predicate = lambda_argument(c, c.arguments.len() - 1, expr)?;
        let Some(parameter) = predicate.parameters.first() else {
            return Ok(None);
        };
        let variable = self.context.names().variable_for(&parameter.name);
        let scope = self
            .context
            .elem_match_scope(Symbol::element(&parameter.name, &variable, item));
        let element_filter = self.with_context(scope).translate_filter(&predicate.body)?;
        if contains_expr(&element_filter)
            || (implied_element_in_or(&element_filter, false)
                && !self.options.supports(Feature::ImpliedElementInOr))
        {
            return Ok(None);
        }
        Ok(Some(match c.method {
            Method::Any => match element_filter {
                Filter::Field(FieldFilter { path, operation })
                    if path.is_empty()
                        && matches!(
                            operation,
                            FieldOperation::Comparison(ComparisonOperator::Eq, _)
                                | FieldOperation::Regex(_)
                        ) =>
                {
                    Filter::field(&field.path, operation)
                }
                Filter::MatchAll => Filter::exists(&join_path(&field.path, "0"), true),
                Filter::MatchNothing => Filter::MatchNothing,
                other => Filter::field(&field.path, FieldOperation::ElemMatch(Box::new(other))),
            },
            _ => match element_filter.negate() {
                Filter::MatchNothing => Filter::MatchAll,
                Filter::MatchAll => Filter::exists(&join_path(&field.path, "0"), false),
                negated => Filter::field(
                    &field.path,
                    FieldOperation::ElemMatch(Box::new(negated)).negate(),
                ),
            },
        }))
    }

    /// `list.Contains(x.F)` over a constant list is `$in`; `x.Tags.Contains(v)`
    /// over a stored array matches any element equal to `v`.
    fn try_translate_contains_filter(&self, c: &MethodCall) -> Result<Option<Filter>> {
        let Some((source, [item])) = call_operands(c) else {
            return Ok(None);
        };
        if source.is_closed() && !item.is_closed() {
            let Some(field) = self.usable_field(Some(unwrap_comparison_convert(item)))? else {
                return Ok(None);
            };
            let values = match self.evaluate_closed(source)? {
                Value::Array(values) => values,
                _ => return Ok(None),
            };
            let target = field
                .serializer
                .underlying()
                .unwrap_or_else(|| field.serializer.clone());
            let values = values
                .into_iter()
                .map(|v| {
                    let v = self.coerce_value(v, &target.value_type());
                    Ok(field.serializer.serialize(&v)?)
                })
                .collect::<Result<Vec<_>>>()?;
            return Ok(Some(Filter::field(&field.path, FieldOperation::In(values))));
        }
        if item.is_closed() {
            let Some(field) = self.usable_field(Some(source))? else {
                return Ok(None);
            };
            if field.path.is_empty() || field.serializer.dictionary_info().is_some() {
                return Ok(None);
            }
            let Some(item_serializer) = field.serializer.item_serializer() else {
                return Ok(None);
            };
            let value = self.serialize_for_field(
                &FieldRef {
                    path: field.path.clone(),
                    serializer: item_serializer,
                },
                item,
            )?;
            return Ok(Some(Filter::eq(&field.path, value)));
        }
        Ok(None)
    }

    fn comparison_argument(&self, argument: Option<&Expression>) -> Result<bool> {
        match argument {
            Some(a) if a.is_closed() => Ok(StringComparison::from_value(&self.evaluate_closed(a)?)
                .map_or(false, |c| c.ignore_case())),
            _ => Ok(false),
        }
    }

    fn try_translate_substring_filter(&self, c: &MethodCall) -> Result<Option<Filter>> {
        let Some((source, rest)) = call_operands(c) else {
            return Ok(None);
        };
        let Some(value) = rest.first().filter(|v| v.is_closed()) else {
            return Ok(None);
        };
        let Some(field) = self.usable_field(Some(source))? else {
            return Ok(None);
        };
        let literal = match self.evaluate_closed(value)? {
            Value::String(s) => s,
            Value::Char(ch) => ch.to_string(),
            _ => return Ok(None),
        };
        let escaped = regex::escape(&literal);
        let pattern = match c.method {
            Method::StartsWith => format!("^{escaped}"),
            Method::EndsWith => format!("{escaped}$"),
            _ => escaped,
        };
        let options = if self.comparison_argument(rest.get(1))? {
            "is"
        } else {
            "s"
        };
        Ok(Some(Filter::field(&field.path, regex_operation(pattern, options))))
    }

    fn try_translate_equals_filter(
        &self,
        expr: &Expression,
        c: &MethodCall,
    ) -> Result<Option<Filter>> {
        let (left, right, comparison) = match (&c.object, c.arguments.as_slice()) {
            (Some(object), [argument, rest @ ..]) => (&**object, argument, rest.first()),
            (None, [left, right, rest @ ..]) => (left, right, rest.first()),
            _ => return Ok(None),
        };
        let (left, right) = if left.is_closed() {
            (right, left)
        } else {
            (left, right)
        };
        if !right.is_closed() {
            return Ok(None);
        }
        if self.comparison_argument(comparison)? {
            let Some(field) = self.usable_field(Some(left))? else {
                return Ok(None);
            };
            let Value::String(literal) = self.evaluate_closed(right)? else {
                return Ok(None);
            };
            return Ok(Some(Filter::field(
                &field.path,
                regex_operation(format!("^{}$", regex::escape(&literal)), "is"),
            )));
        }
        let equality = Binary {
            op: BinaryOp::Equal,
            left: Box::new(left.clone()),
            right: Box::new(right.clone()),
            ty: Type::Boolean,
        };
        self.translate_comparison_filter(expr, &equality).map(Some)
    }

    fn try_translate_dictionary_filter(&self, c: &MethodCall) -> Result<Option<Filter>> {
        let Some((source, [argument])) = call_operands(c) else {
            return Ok(None);
        };
        if !argument.is_closed() {
            return Ok(None);
        }
        let Some(field) = self.usable_field(Some(source))? else {
            return Ok(None);
        };
        let Some(info) = field.serializer.dictionary_info() else {
            return Ok(None);
        };
        let argument = self.evaluate_closed(argument)?;
        let (key_path, value_path) = match info.representation {
            Representation::ArrayOfDocuments => (KEY_ELEMENT, VALUE_ELEMENT),
            Representation::ArrayOfArrays => ("0", "1"),
            _ => ("", ""),
        };
        Ok(match (c.method, info.representation) {
            (Method::ContainsKey, Representation::Document) => match info.key.serialize(&argument)? {
                Bson::String(key) => Some(Filter::exists(&join_path(&field.path, &key), true)),
                _ => None,
            },
            (Method::ContainsKey, _) => Some(Filter::field(
                &field.path,
                FieldOperation::ElemMatch(Box::new(Filter::eq(
                    key_path,
                    info.key.serialize(&argument)?,
                ))),
            )),
            (_, Representation::Document) => None,
            _ => Some(Filter::field(
                &field.path,
                FieldOperation::ElemMatch(Box::new(Filter::eq(
                    value_path,
                    info.value.serialize(&argument)?,
                ))),
            )),
        })
    }
}
