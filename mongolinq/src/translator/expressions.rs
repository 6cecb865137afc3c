use crate::{
    ast::{self, Op},
    expression::{
        Binary, BinaryOp, Conditional, Expression, Index, MemberAccess, Method, MethodCall, New,
        NewArray, Type, Unary, UnaryOp, Value,
    },
    options::Feature,
    serialization::{
        default_element_name, shared, ArraySerializer, ClassSerializer, MemberMap, Representation,
        SerializerRef,
    },
    translator::{
        conversions::unwrap_comparison_convert, not_supported, unsupported, Error,
        QueryTranslator, Result, TranslatedExpression,
    },
    util::unique_linked_hash_map::UniqueLinkedHashMap,
};
use bson::Bson;
use std::sync::Weak;

fn comparison_op(op: BinaryOp) -> Op {
    match op {
        BinaryOp::Equal => Op::Eq,
        BinaryOp::NotEqual => Op::Ne,
        BinaryOp::LessThan => Op::Lt,
        BinaryOp::LessThanOrEqual => Op::Lte,
        BinaryOp::GreaterThan => Op::Gt,
        _ => Op::Gte,
    }
}

/// Builds an n-ary operator, absorbing arguments that already apply the same
/// associative operator.
pub(crate) fn flatten(op: Op, args: Vec<ast::Expression>) -> ast::Expression {
    let mut out = vec![];
    for arg in args {
        match arg {
            ast::Expression::Operator(inner) if inner.op == op => out.extend(inner.args),
            other => out.push(other),
        }
    }
    ast::Expression::op(op, out)
}

impl QueryTranslator {
    pub(crate) fn translate_expression(&self, expr: &Expression) -> Result<TranslatedExpression> {
        match expr {
            Expression::Constant(c) => {
                let serializer = self.serializer_for(&c.ty)?;
                self.translate_constant_with(&c.value, serializer)
            }
            Expression::Parameter(p) => {
                let symbol = self.lookup(&p.name)?;
                Ok(TranslatedExpression::new(
                    symbol.ast.clone(),
                    symbol.serializer.clone(),
                ))
            }
            Expression::Member(m) => self.translate_member(expr, m),
            Expression::Index(i) => self.translate_index(expr, i),
            Expression::Binary(b) => self.translate_binary(expr, b),
            Expression::Unary(u) => self.translate_unary(expr, u),
            Expression::Conditional(c) => self.translate_conditional(c),
            Expression::Call(c) => self.translate_call(expr, c),
            Expression::New(n) => self.translate_new(n),
            Expression::NewArray(a) => self.translate_new_array(a),
            Expression::TypeIs(t) => self.translate_type_is_expression(expr, t),
            Expression::Lambda(_) => Err(not_supported(expr, "a lambda is not a value")),
            Expression::Source(_) => Err(not_supported(
                expr,
                "sub-queries over other collections are not supported",
            )),
        }
    }

    pub(crate) fn translate_constant_with(
        &self,
        value: &Value,
        serializer: SerializerRef,
    ) -> Result<TranslatedExpression> {
        let bson = serializer.serialize(value)?;
        Ok(TranslatedExpression::new(
            ast::Expression::Constant(bson),
            serializer,
        ))
    }

    /// Translates an expression, folding it to a constant encoded by
    /// `serializer` when it references no parameters.
    pub(crate) fn translate_with_serializer(
        &self,
        expr: &Expression,
        serializer: &SerializerRef,
    ) -> Result<TranslatedExpression> {
        if expr.is_closed() {
            let value = self.evaluate_closed(expr)?;
            let target = match serializer.underlying() {
                Some(underlying) if !value.is_null() => underlying,
                _ => serializer.clone(),
            };
            let value = self.coerce_value(value, &target.value_type());
            return self.translate_constant_with(&value, serializer.clone());
        }
        self.translate_expression(expr)
    }

    /// Constants compared against enums arrive as their underlying integers.
    pub(crate) fn coerce_value(&self, value: Value, target: &Type) -> Value {
        match (&value, target.non_nullable()) {
            (Value::Int32(_) | Value::Int64(_), Type::Enum(name)) => Value::Enum {
                type_name: name.clone(),
                ordinal: value.as_i64().unwrap_or_default(),
            },
            _ => value,
        }
    }

    /// Translates both operands of a binary operator. A side that references
    /// no parameters is encoded with the other side's serializer so it
    /// compares correctly against stored values.
    pub(crate) fn translate_operands(
        &self,
        left: &Expression,
        right: &Expression,
    ) -> Result<(TranslatedExpression, TranslatedExpression)> {
        match (left.is_closed(), right.is_closed()) {
            (false, true) => {
                let l = self.translate_expression(left)?;
                let r = self.translate_with_serializer(right, &l.serializer)?;
                Ok((l, r))
            }
            (true, false) => {
                let r = self.translate_expression(right)?;
                let l = self.translate_with_serializer(left, &r.serializer)?;
                Ok((l, r))
            }
            _ => Ok((
                self.translate_expression(left)?,
                self.translate_expression(right)?,
            )),
        }
    }

    fn translate_member(&self, expr: &Expression, m: &MemberAccess) -> Result<TranslatedExpression> {
        let base_type = m.expr.ty();
        let base = self.translate_expression(&m.expr)?;
        if base_type.is_nullable() {
            match m.member.as_str() {
                "Value" => {
                    let serializer = base.serializer.underlying().unwrap_or(base.serializer);
                    return Ok(TranslatedExpression::new(base.ast, serializer));
                }
                "HasValue" => {
                    return Ok(TranslatedExpression::new(
                        ast::Expression::op(Op::Ne, vec![base.ast, ast::Expression::null()]),
                        self.serializer_for(&Type::Boolean)?,
                    ))
                }
                _ => {}
            }
        }
        if let Some(info) = base.serializer.try_get_member_info(&m.member) {
            return Ok(TranslatedExpression::new(
                base.ast.sub_field(&info.storage_path()),
                info.serializer,
            ));
        }
        match (base_type.non_nullable(), m.member.as_str()) {
            (Type::String, "Length") => Ok(TranslatedExpression::new(
                ast::Expression::unary(Op::StrLenCP, base.ast),
                self.serializer_for(&Type::Int32)?,
            )),
            (Type::DateTime, _) => self.translate_date_member(expr, base, &m.member),
            (Type::KeyValuePair(..), "Key" | "Value") => {
                self.translate_array_pair_member(expr, base, &m.member)
            }
            (Type::Dictionary(..), _) => self.translate_dictionary_member(expr, base, &m.member),
            (ty, "Count" | "Length") if ty.is_sequence() => {
                let (array, _) = self.sequence_of(expr, base)?;
                Ok(TranslatedExpression::new(
                    ast::Expression::unary(Op::Size, array),
                    self.serializer_for(&Type::Int32)?,
                ))
            }
            _ => Err(not_supported(
                expr,
                format!(
                    "{} is not a serialized member of {}",
                    m.member,
                    base.serializer.value_type()
                ),
            )),
        }
    }

    fn translate_index(&self, expr: &Expression, i: &Index) -> Result<TranslatedExpression> {
        let base = self.translate_expression(&i.expr)?;
        if base.serializer.dictionary_info().is_some() {
            return self.translate_dictionary_index(expr, base, &i.index);
        }
        let item = base
            .serializer
            .item_serializer()
            .ok_or_else(|| not_supported(expr, "only arrays and dictionaries can be indexed"))?;
        let index = self.translate_expression(&i.index)?;
        Ok(TranslatedExpression::new(
            ast::Expression::op(Op::ArrayElemAt, vec![base.ast, index.ast]),
            item,
        ))
    }

    fn translate_binary(&self, expr: &Expression, b: &Binary) -> Result<TranslatedExpression> {
        match b.op {
            BinaryOp::Coalesce => self.translate_coalesce(b),
            BinaryOp::AndAlso | BinaryOp::OrElse => {
                let l = self.translate_expression(&b.left)?;
                let r = self.translate_expression(&b.right)?;
                let op = if b.op == BinaryOp::AndAlso {
                    Op::And
                } else {
                    Op::Or
                };
                Ok(TranslatedExpression::new(
                    flatten(op, vec![l.ast, r.ast]),
                    self.serializer_for(&Type::Boolean)?,
                ))
            }
            op if op.is_comparison() => {
                let (l, r) = self.translate_operands(
                    unwrap_comparison_convert(&b.left),
                    unwrap_comparison_convert(&b.right),
                )?;
                Ok(TranslatedExpression::new(
                    ast::Expression::op(comparison_op(op), vec![l.ast, r.ast]),
                    self.serializer_for(&Type::Boolean)?,
                ))
            }
            BinaryOp::And | BinaryOp::Or | BinaryOp::ExclusiveOr => {
                self.translate_logical_or_bitwise(expr, b)
            }
            _ => self.translate_arithmetic(expr, b),
        }
    }

    fn translate_coalesce(&self, b: &Binary) -> Result<TranslatedExpression> {
        if b.left.is_closed() {
            let left = self.evaluate_closed(&b.left)?;
            if !left.is_null() {
                let serializer = self.serializer_for(&b.ty)?;
                let value = self.coerce_value(left, &b.ty);
                return self.translate_constant_with(&value, serializer);
            }
            return self.translate_expression(&b.right);
        }
        let left = self.translate_expression(&b.left)?;
        let serializer = left.serializer.underlying().unwrap_or(left.serializer);
        let right = self.translate_with_serializer(&b.right, &serializer)?;
        Ok(TranslatedExpression::new(
            ast::Expression::op(Op::IfNull, vec![left.ast, right.ast]),
            serializer,
        ))
    }

    fn translate_logical_or_bitwise(
        &self,
        expr: &Expression,
        b: &Binary,
    ) -> Result<TranslatedExpression> {
        let (l, r) = self.translate_operands(&b.left, &b.right)?;
        if *b.ty.non_nullable() == Type::Boolean {
            let ast = match b.op {
                BinaryOp::And => flatten(Op::And, vec![l.ast, r.ast]),
                BinaryOp::Or => flatten(Op::Or, vec![l.ast, r.ast]),
                _ => ast::Expression::op(Op::Ne, vec![l.ast, r.ast]),
            };
            return Ok(TranslatedExpression::new(
                ast,
                self.serializer_for(&Type::Boolean)?,
            ));
        }
        if !b.ty.is_integral() {
            return Err(unsupported(expr));
        }
        self.require(Feature::BitwiseOperators, expr)?;
        let op = match b.op {
            BinaryOp::And => Op::BitAnd,
            BinaryOp::Or => Op::BitOr,
            _ => Op::BitXor,
        };
        Ok(TranslatedExpression::new(
            flatten(op, vec![l.ast, r.ast]),
            l.serializer,
        ))
    }

    fn translate_arithmetic(&self, expr: &Expression, b: &Binary) -> Result<TranslatedExpression> {
        let (l, r) = self.translate_operands(&b.left, &b.right)?;
        if b.op == BinaryOp::Add && b.ty == Type::String {
            return Ok(TranslatedExpression::new(
                flatten(Op::Concat, vec![l.ast, r.ast]),
                self.serializer_for(&Type::String)?,
            ));
        }
        let (left_rep, right_rep) = (l.serializer.representation(), r.serializer.representation());
        if !left_rep.is_numeric() || !right_rep.is_numeric() {
            return Err(Error::RepresentationConflict {
                expression: expr.to_string(),
                left: left_rep,
                right: right_rep,
            });
        }
        let serializer = if l.serializer.value_type() == b.ty {
            l.serializer.clone()
        } else {
            self.serializer_for(&b.ty)?
        };
        let ast = match b.op {
            BinaryOp::Add => flatten(Op::Add, vec![l.ast, r.ast]),
            BinaryOp::Multiply => flatten(Op::Multiply, vec![l.ast, r.ast]),
            BinaryOp::Subtract => ast::Expression::op(Op::Subtract, vec![l.ast, r.ast]),
            BinaryOp::Modulo => ast::Expression::op(Op::Mod, vec![l.ast, r.ast]),
            BinaryOp::Divide if b.ty.is_integral() => ast::Expression::unary(
                Op::Trunc,
                ast::Expression::op(Op::Divide, vec![l.ast, r.ast]),
            ),
            BinaryOp::Divide => ast::Expression::op(Op::Divide, vec![l.ast, r.ast]),
            _ => return Err(unsupported(expr)),
        };
        Ok(TranslatedExpression::new(ast, serializer))
    }

    fn translate_unary(&self, expr: &Expression, u: &Unary) -> Result<TranslatedExpression> {
        match u.op {
            UnaryOp::Convert => self.translate_convert(expr, u),
            UnaryOp::Not => {
                let operand = self.translate_expression(&u.operand)?;
                Ok(TranslatedExpression::new(
                    ast::Expression::unary(Op::Not, operand.ast),
                    operand.serializer,
                ))
            }
            UnaryOp::Negate => {
                let operand = self.translate_expression(&u.operand)?;
                if !operand.serializer.representation().is_numeric() {
                    return Err(not_supported(
                        expr,
                        format!(
                            "the operand is represented as {:?}",
                            operand.serializer.representation()
                        ),
                    ));
                }
                Ok(TranslatedExpression::new(
                    ast::Expression::op(
                        Op::Subtract,
                        vec![ast::Expression::constant(0), operand.ast],
                    ),
                    operand.serializer,
                ))
            }
            UnaryOp::ArrayLength => {
                let operand = self.translate_expression(&u.operand)?;
                Ok(TranslatedExpression::new(
                    ast::Expression::unary(Op::Size, operand.ast),
                    self.serializer_for(&Type::Int32)?,
                ))
            }
        }
    }

    fn translate_conditional(&self, c: &Conditional) -> Result<TranslatedExpression> {
        let test = self.translate_expression(&c.test)?;
        let (then, otherwise) = self.translate_operands(&c.if_true, &c.if_false)?;
        let serializer = if then.serializer.value_type() == c.ty {
            then.serializer
        } else {
            self.serializer_for(&c.ty)?
        };
        Ok(TranslatedExpression::new(
            ast::Expression::cond(test.ast, then.ast, otherwise.ast),
            serializer,
        ))
    }

    /// Object construction becomes a document with the members in declaration
    /// order. Classes with a class map store members under their element
    /// names.
    fn translate_new(&self, n: &New) -> Result<TranslatedExpression> {
        let class_serializer = match &n.ty {
            Type::Class(_) => self.serializer_for(&n.ty).ok(),
            _ => None,
        };
        let mut fields = UniqueLinkedHashMap::new();
        let mut members = vec![];
        for (name, e) in &n.members {
            let value = self.translate_expression(e)?;
            let element_name = class_serializer
                .as_ref()
                .and_then(|s| s.try_get_member_info(name))
                .map(|info| info.element_name)
                .unwrap_or_else(|| default_element_name(name));
            fields.insert(element_name.clone(), value.ast)?;
            members.push(MemberMap {
                member_name: name.clone(),
                element_name,
                member_type: e.ty(),
                serializer: Some(value.serializer),
                is_grouped_member: false,
            });
        }
        Ok(TranslatedExpression::new(
            ast::Expression::Document(fields),
            shared(ClassSerializer::new(
                n.ty.clone(),
                members,
                None,
                Weak::new(),
            )),
        ))
    }

    fn translate_new_array(&self, a: &NewArray) -> Result<TranslatedExpression> {
        let item = self.serializer_for(&a.element_type)?;
        let items = a
            .items
            .iter()
            .map(|i| Ok(self.translate_with_serializer(i, &item)?.ast))
            .collect::<Result<Vec<_>>>()?;
        let array = match items
            .iter()
            .map(|i| i.as_constant().cloned())
            .collect::<Option<Vec<Bson>>>()
        {
            Some(constants) => ast::Expression::Constant(Bson::Array(constants)),
            None => ast::Expression::Array(items),
        };
        Ok(TranslatedExpression::new(
            array,
            shared(ArraySerializer::new(Type::array(a.element_type.clone()), item)),
        ))
    }

    fn translate_call(&self, expr: &Expression, c: &MethodCall) -> Result<TranslatedExpression> {
        use Method::*;
        if c.method.is_non_deterministic() {
            return Err(not_supported(
                expr,
                "its value is non-deterministic and cannot be evaluated on the server",
            ));
        }
        match c.method {
            ToLower | ToLowerInvariant | ToUpper | ToUpperInvariant | StringContains
            | StartsWith | EndsWith | IsNullOrEmpty | IsNullOrWhiteSpace | Substring | Trim
            | TrimStart | TrimEnd | IndexOf | Split | Replace | StringConcat | StringEquals
            | RegexIsMatch | ToString => self.translate_string_method(expr, c),
            Abs | Ceiling | Floor | Round | Pow | Sqrt | Log | Log10 | Exp | Truncate
            | MathMin | MathMax => self.translate_math_method(expr, c),
            AddYears | AddMonths | AddDays | AddHours | AddMinutes | AddSeconds
            | AddMilliseconds => self.translate_date_method(expr, c),
            ContainsKey | ContainsValue => self.translate_dictionary_method(expr, c),
            Equals => {
                let (object, argument) = match (&c.object, c.arguments.as_slice()) {
                    (Some(object), [argument]) => (&**object, argument),
                    (None, [left, right]) => (left, right),
                    _ => return Err(unsupported(expr)),
                };
                let (l, r) = self.translate_operands(object, argument)?;
                Ok(TranslatedExpression::new(
                    ast::Expression::op(Op::Eq, vec![l.ast, r.ast]),
                    self.serializer_for(&Type::Boolean)?,
                ))
            }
            GetValueOrDefault => {
                let object = c.object.as_deref().ok_or_else(|| unsupported(expr))?;
                let value = self.translate_expression(object)?;
                let serializer = value.serializer.underlying().unwrap_or(value.serializer);
                let default = crate::client_side::default_value(&c.ty);
                let default = serializer.serialize(&default)?;
                Ok(TranslatedExpression::new(
                    ast::Expression::op(
                        Op::IfNull,
                        vec![value.ast, ast::Expression::Constant(default)],
                    ),
                    serializer,
                ))
            }
            GetType => Err(not_supported(
                expr,
                "GetType can only be compared with typeof in a predicate",
            )),
            _ => self.translate_collection_method(expr, c),
        }
    }

    /// `$arrayElemAt` access to the key or value of a pair stored as `[k, v]`.
    fn translate_array_pair_member(
        &self,
        expr: &Expression,
        base: TranslatedExpression,
        member: &str,
    ) -> Result<TranslatedExpression> {
        if base.serializer.representation() != Representation::Array {
            return Err(unsupported(expr));
        }
        let (index, ty) = match (member, base.serializer.value_type()) {
            ("Key", Type::KeyValuePair(k, _)) => (0, *k),
            (_, Type::KeyValuePair(_, v)) => (1, *v),
            _ => return Err(unsupported(expr)),
        };
        Ok(TranslatedExpression::new(
            ast::Expression::op(
                Op::ArrayElemAt,
                vec![base.ast, ast::Expression::constant(index)],
            ),
            self.serializer_for(&ty)?,
        ))
    }

    /// The array a sequence-valued translation iterates, and the serializer
    /// of its items. Groupings iterate their `_elements` and dictionaries
    /// stored as documents iterate `$objectToArray` pairs.
    pub(crate) fn sequence_of(
        &self,
        expr: &Expression,
        sequence: TranslatedExpression,
    ) -> Result<(ast::Expression, SerializerRef)> {
        let item = sequence
            .serializer
            .item_serializer()
            .ok_or_else(|| not_supported(expr, "the source is not a sequence"))?;
        match sequence.serializer.value_type() {
            Type::Grouping(..) => Ok((
                sequence
                    .ast
                    .sub_field(crate::serialization::GROUPING_ELEMENTS_ELEMENT),
                item,
            )),
            Type::Dictionary(..)
                if sequence.serializer.representation() == Representation::Document =>
            {
                Ok((
                    ast::Expression::unary(Op::ObjectToArray, sequence.ast),
                    item,
                ))
            }
            _ => Ok((sequence.ast, item)),
        }
    }

    pub(crate) fn translate_sequence(
        &self,
        expr: &Expression,
    ) -> Result<(ast::Expression, SerializerRef)> {
        let sequence = self.translate_expression(expr)?;
        self.sequence_of(expr, sequence)
    }
}
