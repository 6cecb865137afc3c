use crate::expression::{Method, Type, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Source(Source),
    Constant(Constant),
    Parameter(Parameter),
    Member(MemberAccess),
    Index(Index),
    Binary(Binary),
    Unary(Unary),
    Conditional(Conditional),
    Call(MethodCall),
    Lambda(Lambda),
    New(New),
    NewArray(NewArray),
    TypeIs(TypeIs),
}

/// The root of a query: every document of a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub collection: String,
    pub document_type: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub value: Value,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberAccess {
    pub expr: Box<Expression>,
    pub member: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub expr: Box<Expression>,
    pub index: Box<Expression>,
    pub ty: Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    AndAlso,
    OrElse,
    And,
    Or,
    ExclusiveOr,
    Coalesce,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanOrEqual
        )
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Subtract
                | BinaryOp::Multiply
                | BinaryOp::Divide
                | BinaryOp::Modulo
        )
    }

    /// The comparison that holds when the operands are swapped.
    pub fn flip(&self) -> BinaryOp {
        match self {
            BinaryOp::LessThan => BinaryOp::GreaterThan,
            BinaryOp::LessThanOrEqual => BinaryOp::GreaterThanOrEqual,
            BinaryOp::GreaterThan => BinaryOp::LessThan,
            BinaryOp::GreaterThanOrEqual => BinaryOp::LessThanOrEqual,
            other => *other,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::AndAlso => "&&",
            BinaryOp::OrElse => "||",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::ExclusiveOr => "^",
            BinaryOp::Coalesce => "??",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    pub op: BinaryOp,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    pub ty: Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Negate,
    /// Conversion to the node's type.
    Convert,
    ArrayLength,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unary {
    pub op: UnaryOp,
    pub operand: Box<Expression>,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub test: Box<Expression>,
    pub if_true: Box<Expression>,
    pub if_false: Box<Expression>,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method: Method,
    pub object: Option<Box<Expression>>,
    pub arguments: Vec<Expression>,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub parameters: Vec<Parameter>,
    pub body: Box<Expression>,
}

/// Object construction. Members appear in declaration order; for anonymous
/// types `ty` is `Type::Anonymous`.
#[derive(Debug, Clone, PartialEq)]
pub struct New {
    pub ty: Type,
    pub members: Vec<(String, Expression)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewArray {
    pub element_type: Type,
    pub items: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeIs {
    pub expr: Box<Expression>,
    pub target: Type,
}

impl Expression {
    /// The static type of the expression.
    pub fn ty(&self) -> Type {
        match self {
            Expression::Source(s) => Type::queryable(s.document_type.clone()),
            Expression::Constant(c) => c.ty.clone(),
            Expression::Parameter(p) => p.ty.clone(),
            Expression::Member(m) => m.ty.clone(),
            Expression::Index(i) => i.ty.clone(),
            Expression::Binary(b) => b.ty.clone(),
            Expression::Unary(u) => u.ty.clone(),
            Expression::Conditional(c) => c.ty.clone(),
            Expression::Call(c) => c.ty.clone(),
            Expression::Lambda(l) => l.body.ty(),
            Expression::New(n) => n.ty.clone(),
            Expression::NewArray(a) => Type::array(a.element_type.clone()),
            Expression::TypeIs(_) => Type::Boolean,
        }
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            Expression::Constant(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_lambda(&self) -> Option<&Lambda> {
        match self {
            Expression::Lambda(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_call(&self) -> Option<&MethodCall> {
        match self {
            Expression::Call(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_null_constant(&self) -> bool {
        matches!(self, Expression::Constant(Constant { value: Value::Null, .. }))
    }

    /// True when the expression references no parameter, so it can be
    /// evaluated at translation time.
    pub fn is_closed(&self) -> bool {
        match self {
            Expression::Constant(_) => true,
            Expression::Source(_) | Expression::Parameter(_) | Expression::Lambda(_) => false,
            Expression::Member(m) => m.expr.is_closed(),
            Expression::Index(i) => i.expr.is_closed() && i.index.is_closed(),
            Expression::Binary(b) => b.left.is_closed() && b.right.is_closed(),
            Expression::Unary(u) => u.operand.is_closed(),
            Expression::Conditional(c) => {
                c.test.is_closed() && c.if_true.is_closed() && c.if_false.is_closed()
            }
            // Calls are translated, never folded.
            Expression::Call(_) => false,
            Expression::New(n) => n.members.iter().all(|(_, e)| e.is_closed()),
            Expression::NewArray(a) => a.items.iter().all(Expression::is_closed),
            Expression::TypeIs(t) => t.expr.is_closed(),
        }
    }

    /// Immediate sub-expressions, in evaluation order.
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::Source(_) | Expression::Constant(_) | Expression::Parameter(_) => vec![],
            Expression::Member(m) => vec![&m.expr],
            Expression::Index(i) => vec![&i.expr, &i.index],
            Expression::Binary(b) => vec![&b.left, &b.right],
            Expression::Unary(u) => vec![&u.operand],
            Expression::Conditional(c) => vec![&c.test, &c.if_true, &c.if_false],
            Expression::Call(c) => c.object.iter().map(|o| &**o).chain(c.arguments.iter()).collect(),
            Expression::Lambda(l) => vec![&l.body],
            Expression::New(n) => n.members.iter().map(|(_, e)| e).collect(),
            Expression::NewArray(a) => a.items.iter().collect(),
            Expression::TypeIs(t) => vec![&t.expr],
        }
    }

    /// Rebuilds the node with `f` applied to each immediate sub-expression.
    pub fn map_children<F>(self, f: &mut F) -> Expression
    where
        F: FnMut(Expression) -> Expression,
    {
        fn boxed<F: FnMut(Expression) -> Expression>(f: &mut F, e: Box<Expression>) -> Box<Expression> {
            Box::new(f(*e))
        }
        match self {
            Expression::Member(m) => Expression::Member(MemberAccess {
                expr: boxed(f, m.expr),
                member: m.member,
                ty: m.ty,
            }),
            Expression::Index(i) => Expression::Index(Index {
                expr: boxed(f, i.expr),
                index: boxed(f, i.index),
                ty: i.ty,
            }),
            Expression::Binary(b) => Expression::Binary(Binary {
                op: b.op,
                left: boxed(f, b.left),
                right: boxed(f, b.right),
                ty: b.ty,
            }),
            Expression::Unary(u) => Expression::Unary(Unary {
                op: u.op,
                operand: boxed(f, u.operand),
                ty: u.ty,
            }),
            Expression::Conditional(c) => Expression::Conditional(Conditional {
                test: boxed(f, c.test),
                if_true: boxed(f, c.if_true),
                if_false: boxed(f, c.if_false),
                ty: c.ty,
            }),
            Expression::Call(c) => Expression::Call(MethodCall {
                method: c.method,
                object: c.object.map(|o| boxed(f, o)),
                arguments: c.arguments.into_iter().map(|a| f(a)).collect(),
                ty: c.ty,
            }),
            Expression::Lambda(l) => Expression::Lambda(Lambda {
                parameters: l.parameters,
                body: boxed(f, l.body),
            }),
            Expression::New(n) => Expression::New(New {
                ty: n.ty,
                members: n.members.into_iter().map(|(name, e)| (name, f(e))).collect(),
            }),
            Expression::NewArray(a) => Expression::NewArray(NewArray {
                element_type: a.element_type,
                items: a.items.into_iter().map(|e| f(e)).collect(),
            }),
            Expression::TypeIs(t) => Expression::TypeIs(TypeIs {
                expr: boxed(f, t.expr),
                target: t.target,
            }),
            leaf => leaf,
        }
    }

    /// True when `parameter` occurs free in the expression.
    pub fn references(&self, parameter: &str) -> bool {
        match self {
            Expression::Parameter(p) => p.name == parameter,
            Expression::Lambda(l) if l.parameters.iter().any(|p| p.name == parameter) => false,
            other => other.children().into_iter().any(|c| c.references(parameter)),
        }
    }

    /// Replaces every free reference to `parameter` with `replacement`.
    pub fn substitute(self, parameter: &str, replacement: &Expression) -> Expression {
        match self {
            Expression::Parameter(p) if p.name == parameter => replacement.clone(),
            Expression::Lambda(l) if l.parameters.iter().any(|p| p.name == parameter) => {
                Expression::Lambda(l)
            }
            other => other.map_children(&mut |c| c.substitute(parameter, replacement)),
        }
    }
}
