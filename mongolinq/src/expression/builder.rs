//! Constructors for query expressions. The chainable operator methods compute
//! result types the way a compiler would, so queries read close to their
//! source form:
//!
//! ```
//! use mongolinq::expression::{builder::*, Type};
//!
//! let c = param("c", Type::class("C"));
//! let query = source("test", Type::class("C"))
//!     .where_(lambda(&c, eq(c.member("A", Type::Int32), int(1))));
//! assert_eq!(query.ty(), Type::queryable(Type::class("C")));
//! ```
use crate::expression::{
    Binary, BinaryOp, Conditional, Constant, Expression, Index, Lambda, MemberAccess, Method,
    MethodCall, New, NewArray, Parameter, Source, StringComparison, Type, TypeIs, Unary, UnaryOp,
    Value,
};
use bson::Decimal128;

pub fn source(collection: &str, document_type: Type) -> Expression {
    Expression::Source(Source {
        collection: collection.to_string(),
        document_type,
    })
}

pub fn param(name: &str, ty: Type) -> Parameter {
    Parameter {
        name: name.to_string(),
        ty,
    }
}

impl Parameter {
    pub fn expr(&self) -> Expression {
        Expression::Parameter(self.clone())
    }

    pub fn member(&self, name: &str, ty: Type) -> Expression {
        member(self.expr(), name, ty)
    }
}

impl From<&Parameter> for Expression {
    fn from(p: &Parameter) -> Self {
        p.expr()
    }
}

pub fn constant(value: impl Into<Value>, ty: Type) -> Expression {
    Expression::Constant(Constant {
        value: value.into(),
        ty,
    })
}

pub fn int(i: i32) -> Expression {
    constant(i, Type::Int32)
}

pub fn long(i: i64) -> Expression {
    constant(i, Type::Int64)
}

pub fn double(d: f64) -> Expression {
    constant(d, Type::Double)
}

pub fn decimal(d: Decimal128) -> Expression {
    constant(Value::Decimal(d), Type::Decimal)
}

pub fn string(s: &str) -> Expression {
    constant(s, Type::String)
}

pub fn character(c: char) -> Expression {
    constant(c, Type::Char)
}

pub fn boolean(b: bool) -> Expression {
    constant(b, Type::Boolean)
}

pub fn null(ty: Type) -> Expression {
    constant(Value::Null, ty)
}

pub fn enum_value(type_name: &str, ordinal: i64) -> Expression {
    constant(
        Value::Enum {
            type_name: type_name.to_string(),
            ordinal,
        },
        Type::enumeration(type_name),
    )
}

pub fn type_of(ty: Type) -> Expression {
    constant(Value::Type(ty), Type::TypeOf)
}

pub fn string_comparison(comparison: StringComparison) -> Expression {
    constant(
        comparison.to_value(),
        Type::enumeration(crate::expression::STRING_COMPARISON_TYPE),
    )
}

pub fn member(expr: Expression, name: &str, ty: Type) -> Expression {
    Expression::Member(MemberAccess {
        expr: Box::new(expr),
        member: name.to_string(),
        ty,
    })
}

pub fn index(expr: Expression, idx: Expression, ty: Type) -> Expression {
    Expression::Index(Index {
        expr: Box::new(expr),
        index: Box::new(idx),
        ty,
    })
}

fn numeric_rank(ty: &Type) -> u8 {
    match ty.non_nullable() {
        Type::Char => 0,
        Type::Int32 => 1,
        Type::Int64 => 2,
        Type::Double => 3,
        Type::Decimal => 4,
        _ => 5,
    }
}

fn arithmetic_type(left: &Type, right: &Type) -> Type {
    if matches!(left, Type::String) || matches!(right, Type::String) {
        return Type::String;
    }
    if matches!(left.non_nullable(), Type::DateTime) {
        return left.clone();
    }
    let widest = if numeric_rank(left) >= numeric_rank(right) {
        left.non_nullable().clone()
    } else {
        right.non_nullable().clone()
    };
    let widest = if matches!(widest, Type::Char) {
        Type::Int32
    } else {
        widest
    };
    if left.is_nullable() || right.is_nullable() {
        Type::nullable(widest)
    } else {
        widest
    }
}

pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Expression {
    let (lt, rt) = (left.ty(), right.ty());
    let ty = match op {
        _ if op.is_comparison() => Type::Boolean,
        BinaryOp::AndAlso | BinaryOp::OrElse => Type::Boolean,
        BinaryOp::And | BinaryOp::Or | BinaryOp::ExclusiveOr => {
            if matches!(lt, Type::Boolean) {
                Type::Boolean
            } else {
                arithmetic_type(&lt, &rt)
            }
        }
        BinaryOp::Coalesce => {
            if lt.non_nullable() == &rt {
                rt
            } else {
                lt
            }
        }
        _ => arithmetic_type(&lt, &rt),
    };
    Expression::Binary(Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
        ty,
    })
}

pub fn eq(l: Expression, r: Expression) -> Expression {
    binary(BinaryOp::Equal, l, r)
}

pub fn ne(l: Expression, r: Expression) -> Expression {
    binary(BinaryOp::NotEqual, l, r)
}

pub fn lt(l: Expression, r: Expression) -> Expression {
    binary(BinaryOp::LessThan, l, r)
}

pub fn lte(l: Expression, r: Expression) -> Expression {
    binary(BinaryOp::LessThanOrEqual, l, r)
}

pub fn gt(l: Expression, r: Expression) -> Expression {
    binary(BinaryOp::GreaterThan, l, r)
}

pub fn gte(l: Expression, r: Expression) -> Expression {
    binary(BinaryOp::GreaterThanOrEqual, l, r)
}

pub fn and_also(l: Expression, r: Expression) -> Expression {
    binary(BinaryOp::AndAlso, l, r)
}

pub fn or_else(l: Expression, r: Expression) -> Expression {
    binary(BinaryOp::OrElse, l, r)
}

pub fn add(l: Expression, r: Expression) -> Expression {
    binary(BinaryOp::Add, l, r)
}

pub fn subtract(l: Expression, r: Expression) -> Expression {
    binary(BinaryOp::Subtract, l, r)
}

pub fn multiply(l: Expression, r: Expression) -> Expression {
    binary(BinaryOp::Multiply, l, r)
}

pub fn divide(l: Expression, r: Expression) -> Expression {
    binary(BinaryOp::Divide, l, r)
}

pub fn modulo(l: Expression, r: Expression) -> Expression {
    binary(BinaryOp::Modulo, l, r)
}

pub fn coalesce(l: Expression, r: Expression) -> Expression {
    binary(BinaryOp::Coalesce, l, r)
}

pub fn unary(op: UnaryOp, operand: Expression, ty: Type) -> Expression {
    Expression::Unary(Unary {
        op,
        operand: Box::new(operand),
        ty,
    })
}

pub fn not(operand: Expression) -> Expression {
    let ty = operand.ty();
    unary(UnaryOp::Not, operand, ty)
}

pub fn negate(operand: Expression) -> Expression {
    let ty = operand.ty();
    unary(UnaryOp::Negate, operand, ty)
}

pub fn convert(operand: Expression, ty: Type) -> Expression {
    unary(UnaryOp::Convert, operand, ty)
}

pub fn array_length(operand: Expression) -> Expression {
    unary(UnaryOp::ArrayLength, operand, Type::Int32)
}

pub fn conditional(test: Expression, if_true: Expression, if_false: Expression) -> Expression {
    let ty = if_true.ty();
    Expression::Conditional(Conditional {
        test: Box::new(test),
        if_true: Box::new(if_true),
        if_false: Box::new(if_false),
        ty,
    })
}

pub fn lambda(parameter: &Parameter, body: Expression) -> Expression {
    lambda_n(&[parameter], body)
}

pub fn lambda_n(parameters: &[&Parameter], body: Expression) -> Expression {
    Expression::Lambda(Lambda {
        parameters: parameters.iter().map(|p| (*p).clone()).collect(),
        body: Box::new(body),
    })
}

pub fn call_instance(
    method: Method,
    object: Expression,
    arguments: Vec<Expression>,
    ty: Type,
) -> Expression {
    Expression::Call(MethodCall {
        method,
        object: Some(Box::new(object)),
        arguments,
        ty,
    })
}

pub fn call_static(method: Method, arguments: Vec<Expression>, ty: Type) -> Expression {
    Expression::Call(MethodCall {
        method,
        object: None,
        arguments,
        ty,
    })
}

pub fn new_anonymous(members: Vec<(&str, Expression)>) -> Expression {
    let members: Vec<(String, Expression)> = members
        .into_iter()
        .map(|(name, e)| (name.to_string(), e))
        .collect();
    let ty = Type::Anonymous(
        members
            .iter()
            .map(|(name, e)| (name.clone(), e.ty()))
            .collect(),
    );
    Expression::New(New { ty, members })
}

pub fn new_class(class: &str, members: Vec<(&str, Expression)>) -> Expression {
    Expression::New(New {
        ty: Type::class(class),
        members: members
            .into_iter()
            .map(|(name, e)| (name.to_string(), e))
            .collect(),
    })
}

pub fn new_array(element_type: Type, items: Vec<Expression>) -> Expression {
    Expression::NewArray(NewArray {
        element_type,
        items,
    })
}

pub fn type_is(expr: Expression, target: Type) -> Expression {
    Expression::TypeIs(TypeIs {
        expr: Box::new(expr),
        target,
    })
}

pub fn is_null_or_empty(s: Expression) -> Expression {
    call_static(Method::IsNullOrEmpty, vec![s], Type::Boolean)
}

/// `x.GetType()`, only meaningful compared against `typeof(T)`.
pub fn get_type(object: Expression) -> Expression {
    call_instance(Method::GetType, object, vec![], Type::TypeOf)
}

pub fn now() -> Expression {
    call_static(Method::Now, vec![], Type::DateTime)
}

fn lambda_body_type(selector: &Expression) -> Type {
    match selector {
        Expression::Lambda(l) => l.body.ty(),
        other => other.ty(),
    }
}

fn element_of(source: &Expression) -> Type {
    source.ty().element_type().unwrap_or(Type::Object)
}

/// Keeps queryables queryable and everything else enumerable.
fn sequence_like(source: &Expression, item: Type) -> Type {
    match source.ty() {
        Type::Queryable(_) => Type::queryable(item),
        _ => Type::enumerable(item),
    }
}

fn average_type(ty: Type) -> Type {
    match ty.non_nullable() {
        Type::Decimal if ty.is_nullable() => Type::nullable(Type::Decimal),
        Type::Decimal => Type::Decimal,
        _ if ty.is_nullable() => Type::nullable(Type::Double),
        _ => Type::Double,
    }
}

impl Expression {
    pub fn member(self, name: &str, ty: Type) -> Expression {
        member(self, name, ty)
    }

    /// An extension call with `self` as the source argument.
    pub fn ext(self, method: Method, mut arguments: Vec<Expression>, ty: Type) -> Expression {
        arguments.insert(0, self);
        call_static(method, arguments, ty)
    }

    pub fn call(self, method: Method, arguments: Vec<Expression>, ty: Type) -> Expression {
        call_instance(method, self, arguments, ty)
    }

    pub fn where_(self, predicate: Expression) -> Expression {
        let ty = self.ty();
        self.ext(Method::Where, vec![predicate], ty)
    }

    pub fn select(self, selector: Expression) -> Expression {
        let ty = sequence_like(&self, lambda_body_type(&selector));
        self.ext(Method::Select, vec![selector], ty)
    }

    pub fn select_many(self, collection_selector: Expression) -> Expression {
        let item = lambda_body_type(&collection_selector)
            .element_type()
            .unwrap_or(Type::Object);
        let ty = sequence_like(&self, item);
        self.ext(Method::SelectMany, vec![collection_selector], ty)
    }

    pub fn select_many_with(
        self,
        collection_selector: Expression,
        result_selector: Expression,
    ) -> Expression {
        let ty = sequence_like(&self, lambda_body_type(&result_selector));
        self.ext(
            Method::SelectMany,
            vec![collection_selector, result_selector],
            ty,
        )
    }

    pub fn group_by(self, key_selector: Expression) -> Expression {
        let item = Type::grouping(lambda_body_type(&key_selector), element_of(&self));
        let ty = sequence_like(&self, item);
        self.ext(Method::GroupBy, vec![key_selector], ty)
    }

    pub fn group_by_element(
        self,
        key_selector: Expression,
        element_selector: Expression,
    ) -> Expression {
        let item = Type::grouping(
            lambda_body_type(&key_selector),
            lambda_body_type(&element_selector),
        );
        let ty = sequence_like(&self, item);
        self.ext(Method::GroupBy, vec![key_selector, element_selector], ty)
    }

    /// `GroupBy(key, (k, g) => result)`.
    pub fn group_by_result(self, key_selector: Expression, result_selector: Expression) -> Expression {
        let ty = sequence_like(&self, lambda_body_type(&result_selector));
        self.ext(Method::GroupBy, vec![key_selector, result_selector], ty)
    }

    pub fn join(
        self,
        inner: Expression,
        outer_key: Expression,
        inner_key: Expression,
        result_selector: Expression,
    ) -> Expression {
        let ty = sequence_like(&self, lambda_body_type(&result_selector));
        self.ext(
            Method::Join,
            vec![inner, outer_key, inner_key, result_selector],
            ty,
        )
    }

    pub fn group_join(
        self,
        inner: Expression,
        outer_key: Expression,
        inner_key: Expression,
        result_selector: Expression,
    ) -> Expression {
        let ty = sequence_like(&self, lambda_body_type(&result_selector));
        self.ext(
            Method::GroupJoin,
            vec![inner, outer_key, inner_key, result_selector],
            ty,
        )
    }

    pub fn order_by(self, key: Expression) -> Expression {
        let ty = self.ty();
        self.ext(Method::OrderBy, vec![key], ty)
    }

    pub fn order_by_descending(self, key: Expression) -> Expression {
        let ty = self.ty();
        self.ext(Method::OrderByDescending, vec![key], ty)
    }

    pub fn then_by(self, key: Expression) -> Expression {
        let ty = self.ty();
        self.ext(Method::ThenBy, vec![key], ty)
    }

    pub fn then_by_descending(self, key: Expression) -> Expression {
        let ty = self.ty();
        self.ext(Method::ThenByDescending, vec![key], ty)
    }

    pub fn skip(self, count: Expression) -> Expression {
        let ty = self.ty();
        self.ext(Method::Skip, vec![count], ty)
    }

    pub fn take(self, count: Expression) -> Expression {
        let ty = self.ty();
        self.ext(Method::Take, vec![count], ty)
    }

    pub fn skip_while(self, predicate: Expression) -> Expression {
        let ty = self.ty();
        self.ext(Method::SkipWhile, vec![predicate], ty)
    }

    pub fn take_while(self, predicate: Expression) -> Expression {
        let ty = self.ty();
        self.ext(Method::TakeWhile, vec![predicate], ty)
    }

    pub fn distinct(self) -> Expression {
        let ty = self.ty();
        self.ext(Method::Distinct, vec![], ty)
    }

    pub fn of_type(self, target: Type) -> Expression {
        let ty = sequence_like(&self, target.clone());
        self.ext(Method::OfType, vec![type_of(target)], ty)
    }

    pub fn concat(self, other: Expression) -> Expression {
        let ty = self.ty();
        self.ext(Method::Concat, vec![other], ty)
    }

    pub fn union(self, other: Expression) -> Expression {
        let ty = self.ty();
        self.ext(Method::Union, vec![other], ty)
    }

    pub fn intersect(self, other: Expression) -> Expression {
        let ty = self.ty();
        self.ext(Method::Intersect, vec![other], ty)
    }

    pub fn except(self, other: Expression) -> Expression {
        let ty = self.ty();
        self.ext(Method::Except, vec![other], ty)
    }

    pub fn append(self, item: Expression) -> Expression {
        let ty = sequence_like(&self, element_of(&self));
        self.ext(Method::Append, vec![item], ty)
    }

    pub fn prepend(self, item: Expression) -> Expression {
        let ty = sequence_like(&self, element_of(&self));
        self.ext(Method::Prepend, vec![item], ty)
    }

    pub fn default_if_empty(self) -> Expression {
        let ty = sequence_like(&self, element_of(&self));
        self.ext(Method::DefaultIfEmpty, vec![], ty)
    }

    pub fn default_if_empty_with(self, value: Expression) -> Expression {
        let ty = sequence_like(&self, element_of(&self));
        self.ext(Method::DefaultIfEmpty, vec![value], ty)
    }

    pub fn reverse(self) -> Expression {
        let ty = sequence_like(&self, element_of(&self));
        self.ext(Method::Reverse, vec![], ty)
    }

    pub fn to_list(self) -> Expression {
        let ty = Type::list(element_of(&self));
        self.ext(Method::ToList, vec![], ty)
    }

    pub fn to_array(self) -> Expression {
        let ty = Type::array(element_of(&self));
        self.ext(Method::ToArray, vec![], ty)
    }

    pub fn as_queryable(self) -> Expression {
        let ty = Type::queryable(element_of(&self));
        self.ext(Method::AsQueryable, vec![], ty)
    }

    pub fn any(self) -> Expression {
        self.ext(Method::Any, vec![], Type::Boolean)
    }

    pub fn any_with(self, predicate: Expression) -> Expression {
        self.ext(Method::Any, vec![predicate], Type::Boolean)
    }

    pub fn all(self, predicate: Expression) -> Expression {
        self.ext(Method::All, vec![predicate], Type::Boolean)
    }

    pub fn count(self) -> Expression {
        self.ext(Method::Count, vec![], Type::Int32)
    }

    pub fn count_with(self, predicate: Expression) -> Expression {
        self.ext(Method::Count, vec![predicate], Type::Int32)
    }

    pub fn long_count(self) -> Expression {
        self.ext(Method::LongCount, vec![], Type::Int64)
    }

    pub fn contains(self, item: Expression) -> Expression {
        self.ext(Method::Contains, vec![item], Type::Boolean)
    }

    fn element_operator(self, method: Method, arguments: Vec<Expression>) -> Expression {
        let ty = element_of(&self);
        self.ext(method, arguments, ty)
    }

    pub fn first(self) -> Expression {
        self.element_operator(Method::First, vec![])
    }

    pub fn first_with(self, predicate: Expression) -> Expression {
        self.element_operator(Method::First, vec![predicate])
    }

    pub fn first_or_default(self) -> Expression {
        self.element_operator(Method::FirstOrDefault, vec![])
    }

    pub fn first_or_default_with(self, predicate: Expression) -> Expression {
        self.element_operator(Method::FirstOrDefault, vec![predicate])
    }

    pub fn single(self) -> Expression {
        self.element_operator(Method::Single, vec![])
    }

    pub fn single_or_default(self) -> Expression {
        self.element_operator(Method::SingleOrDefault, vec![])
    }

    pub fn last(self) -> Expression {
        self.element_operator(Method::Last, vec![])
    }

    pub fn last_or_default(self) -> Expression {
        self.element_operator(Method::LastOrDefault, vec![])
    }

    pub fn element_at(self, index: Expression) -> Expression {
        self.element_operator(Method::ElementAt, vec![index])
    }

    pub fn element_at_or_default(self, index: Expression) -> Expression {
        self.element_operator(Method::ElementAtOrDefault, vec![index])
    }

    pub fn sum(self) -> Expression {
        self.element_operator(Method::Sum, vec![])
    }

    pub fn sum_of(self, selector: Expression) -> Expression {
        let ty = lambda_body_type(&selector);
        self.ext(Method::Sum, vec![selector], ty)
    }

    pub fn average(self) -> Expression {
        let ty = average_type(element_of(&self));
        self.ext(Method::Average, vec![], ty)
    }

    pub fn average_of(self, selector: Expression) -> Expression {
        let ty = average_type(lambda_body_type(&selector));
        self.ext(Method::Average, vec![selector], ty)
    }

    pub fn min(self) -> Expression {
        self.element_operator(Method::Min, vec![])
    }

    pub fn min_of(self, selector: Expression) -> Expression {
        let ty = lambda_body_type(&selector);
        self.ext(Method::Min, vec![selector], ty)
    }

    pub fn max(self) -> Expression {
        self.element_operator(Method::Max, vec![])
    }

    pub fn max_of(self, selector: Expression) -> Expression {
        let ty = lambda_body_type(&selector);
        self.ext(Method::Max, vec![selector], ty)
    }
}
