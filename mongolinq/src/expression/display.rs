use crate::expression::{CallStyle, Expression, Type, UnaryOp};
use itertools::Itertools;
use std::fmt;

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expression]) -> fmt::Result {
    write!(f, "{}", items.iter().format(", "))
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Source(s) => write!(f, "{}.AsQueryable()", s.collection),
            Expression::Constant(c) => write!(f, "{}", c.value),
            Expression::Parameter(p) => write!(f, "{}", p.name),
            Expression::Member(m) => write!(f, "{}.{}", m.expr, m.member),
            Expression::Index(i) => write!(f, "{}[{}]", i.expr, i.index),
            Expression::Binary(b) => write!(f, "({} {} {})", b.left, b.op.symbol(), b.right),
            Expression::Unary(u) => match u.op {
                UnaryOp::Not => write!(f, "!{}", u.operand),
                UnaryOp::Negate => write!(f, "-{}", u.operand),
                UnaryOp::Convert => write!(f, "Convert({}, {})", u.operand, u.ty),
                UnaryOp::ArrayLength => write!(f, "ArrayLength({})", u.operand),
            },
            Expression::Conditional(c) => {
                write!(f, "IIF({}, {}, {})", c.test, c.if_true, c.if_false)
            }
            Expression::Call(c) => {
                let name = c.method.name();
                match (c.method.call_style(), &c.object) {
                    (CallStyle::Instance, Some(object)) => {
                        write!(f, "{object}.{name}(")?;
                        write_list(f, &c.arguments)?;
                        write!(f, ")")
                    }
                    (CallStyle::Extension, _) if !c.arguments.is_empty() => {
                        write!(f, "{}.{name}(", c.arguments[0])?;
                        write_list(f, &c.arguments[1..])?;
                        write!(f, ")")
                    }
                    (CallStyle::Static(class), _) => {
                        write!(f, "{class}.{name}(")?;
                        write_list(f, &c.arguments)?;
                        write!(f, ")")
                    }
                    _ => {
                        write!(f, "{name}(")?;
                        write_list(f, &c.arguments)?;
                        write!(f, ")")
                    }
                }
            }
            Expression::Lambda(l) => {
                if l.parameters.len() == 1 {
                    write!(f, "{} => {}", l.parameters[0].name, l.body)
                } else {
                    write!(
                        f,
                        "({}) => {}",
                        l.parameters.iter().map(|p| &p.name).format(", "),
                        l.body
                    )
                }
            }
            Expression::New(n) => {
                let members = n
                    .members
                    .iter()
                    .format_with(", ", |(name, e), g| g(&format_args!("{name} = {e}")));
                match &n.ty {
                    Type::Anonymous(_) => write!(f, "new {{ {members} }}"),
                    other => write!(f, "new {other} {{ {members} }}"),
                }
            }
            Expression::NewArray(a) => {
                write!(f, "new {}[] {{ ", a.element_type)?;
                write_list(f, &a.items)?;
                write!(f, " }}")
            }
            Expression::TypeIs(t) => write!(f, "({} is {})", t.expr, t.target),
        }
    }
}
