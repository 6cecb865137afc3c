use crate::{
    client_side::{Error, Result},
    expression::{
        Binary, BinaryOp, Expression, Lambda, Method, MethodCall, StringComparison, Type, Unary,
        UnaryOp, Value,
    },
};
use bson::{DateTime, Decimal128};
use linked_hash_map::LinkedHashMap;
use std::{cmp::Ordering, str::FromStr};

/// Parameter bindings visible to the expression being evaluated. Inner
/// bindings shadow outer ones.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    bindings: Vec<(String, Value)>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, name: &str, value: Value) -> Self {
        let mut env = self.clone();
        env.bindings.push((name.to_string(), value));
        env
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.bindings
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

fn invalid(operation: &str, value: &Value) -> Error {
    Error::InvalidOperand {
        operation: operation.to_string(),
        value: value.to_string(),
    }
}

fn unsupported(expr: &Expression) -> Error {
    Error::Unsupported(expr.to_string())
}

fn length(n: usize) -> Value {
    Value::Int32(i32::try_from(n).unwrap_or(i32::MAX))
}

/// Evaluates `expr` in process.
pub fn evaluate(expr: &Expression, env: &Environment) -> Result<Value> {
    match expr {
        Expression::Constant(c) => Ok(c.value.clone()),
        Expression::Parameter(p) => env
            .lookup(&p.name)
            .cloned()
            .ok_or_else(|| Error::UnboundParameter(p.name.clone())),
        Expression::Member(m) => member(evaluate(&m.expr, env)?, &m.expr.ty(), &m.member, expr),
        Expression::Index(i) => index(evaluate(&i.expr, env)?, evaluate(&i.index, env)?),
        Expression::Binary(b) => binary(b, env),
        Expression::Unary(u) => unary(u, env),
        Expression::Conditional(c) => match evaluate(&c.test, env)? {
            Value::Boolean(true) => evaluate(&c.if_true, env),
            Value::Boolean(false) => evaluate(&c.if_false, env),
            other => Err(invalid("?:", &other)),
        },
        Expression::Call(c) => call(c, env, expr),
        Expression::New(n) => {
            let mut fields = LinkedHashMap::new();
            for (name, e) in &n.members {
                fields.insert(name.clone(), evaluate(e, env)?);
            }
            Ok(Value::Object(fields))
        }
        Expression::NewArray(a) => Ok(Value::Array(
            a.items
                .iter()
                .map(|i| evaluate(i, env))
                .collect::<Result<_>>()?,
        )),
        Expression::Source(_) | Expression::Lambda(_) | Expression::TypeIs(_) => {
            Err(unsupported(expr))
        }
    }
}

/// Binds the lambda's parameters to `arguments` in order and evaluates its
/// body.
pub fn apply_lambda(lambda: &Lambda, arguments: Vec<Value>, env: &Environment) -> Result<Value> {
    let mut env = env.clone();
    for (parameter, value) in lambda.parameters.iter().zip(arguments) {
        env = env.bind(&parameter.name, value);
    }
    evaluate(&lambda.body, &env)
}

fn member(target: Value, static_type: &Type, name: &str, expr: &Expression) -> Result<Value> {
    if static_type.is_nullable() {
        match name {
            "HasValue" => return Ok(Value::Boolean(!target.is_null())),
            "Value" if target.is_null() => return Err(invalid("Value", &target)),
            "Value" => return Ok(target),
            _ => {}
        }
    }
    match (target, name) {
        (Value::Object(mut fields), _) => fields.remove(name).ok_or_else(|| unsupported(expr)),
        (Value::Array(mut pair), "Key" | "Value")
            if matches!(static_type, Type::KeyValuePair(..)) && pair.len() == 2 =>
        {
            Ok(if name == "Key" {
                pair.swap_remove(0)
            } else {
                pair.swap_remove(1)
            })
        }
        (Value::String(s), "Length") => Ok(length(s.chars().count())),
        (Value::Array(items), "Count" | "Length") => Ok(length(items.len())),
        (Value::Dictionary(entries), "Count") => Ok(length(entries.len())),
        (Value::Dictionary(entries), "Keys") => {
            Ok(Value::Array(entries.into_iter().map(|(k, _)| k).collect()))
        }
        (Value::Dictionary(entries), "Values") => {
            Ok(Value::Array(entries.into_iter().map(|(_, v)| v).collect()))
        }
        (other, _) => Err(invalid(name, &other)),
    }
}

fn index(target: Value, key: Value) -> Result<Value> {
    match target {
        Value::Array(items) => {
            let i = key.as_i64().ok_or_else(|| invalid("[]", &key))?;
            usize::try_from(i)
                .ok()
                .and_then(|i| items.into_iter().nth(i))
                .ok_or_else(|| invalid("[]", &key))
        }
        Value::Dictionary(entries) => entries
            .into_iter()
            .find(|(k, _)| values_equal(k, &key))
            .map(|(_, v)| v)
            .ok_or_else(|| invalid("[]", &key)),
        Value::String(s) => {
            let i = key.as_i64().ok_or_else(|| invalid("[]", &key))?;
            usize::try_from(i)
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map(Value::Char)
                .ok_or_else(|| invalid("[]", &key))
        }
        other => Err(invalid("[]", &other)),
    }
}

fn truthy(value: Value) -> Result<bool> {
    value.as_bool().ok_or_else(|| invalid("bool", &value))
}

fn binary(b: &Binary, env: &Environment) -> Result<Value> {
    match b.op {
        BinaryOp::AndAlso => {
            return Ok(Value::Boolean(
                truthy(evaluate(&b.left, env)?)? && truthy(evaluate(&b.right, env)?)?,
            ))
        }
        BinaryOp::OrElse => {
            return Ok(Value::Boolean(
                truthy(evaluate(&b.left, env)?)? || truthy(evaluate(&b.right, env)?)?,
            ))
        }
        BinaryOp::Coalesce => {
            let left = evaluate(&b.left, env)?;
            return if left.is_null() {
                evaluate(&b.right, env)
            } else {
                Ok(left)
            };
        }
        _ => {}
    }
    let left = evaluate(&b.left, env)?;
    let right = evaluate(&b.right, env)?;
    match b.op {
        BinaryOp::Equal => Ok(Value::Boolean(values_equal(&left, &right))),
        BinaryOp::NotEqual => Ok(Value::Boolean(!values_equal(&left, &right))),
        BinaryOp::LessThan
        | BinaryOp::LessThanOrEqual
        | BinaryOp::GreaterThan
        | BinaryOp::GreaterThanOrEqual => {
            // Lifted comparisons are false when either side is null.
            if left.is_null() || right.is_null() {
                return Ok(Value::Boolean(false));
            }
            let ordering = compare(&left, &right)
                .ok_or_else(|| invalid(b.op.symbol(), &right))?;
            Ok(Value::Boolean(match b.op {
                BinaryOp::LessThan => ordering == Ordering::Less,
                BinaryOp::LessThanOrEqual => ordering != Ordering::Greater,
                BinaryOp::GreaterThan => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOp::Add if b.ty == Type::String => Ok(Value::String(format!(
            "{}{}",
            string_of(&left),
            string_of(&right)
        ))),
        BinaryOp::And | BinaryOp::Or | BinaryOp::ExclusiveOr => logical(b.op, left, right),
        op => arithmetic(op, left, right),
    }
}

fn logical(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    if let (Some(l), Some(r)) = (left.as_bool(), right.as_bool()) {
        return Ok(Value::Boolean(match op {
            BinaryOp::And => l && r,
            BinaryOp::Or => l || r,
            _ => l != r,
        }));
    }
    let (l, r) = match (left.as_i64(), right.as_i64()) {
        (Some(l), Some(r)) => (l, r),
        _ => return Err(invalid(op.symbol(), &left)),
    };
    let result = match op {
        BinaryOp::And => l & r,
        BinaryOp::Or => l | r,
        _ => l ^ r,
    };
    Ok(match (left, right) {
        (Value::Int32(_), Value::Int32(_)) => Value::Int32(result as i32),
        _ => Value::Int64(result),
    })
}

enum Numeric {
    Int32(i32),
    Int64(i64),
    Double(f64),
    Decimal(f64),
}

fn numeric(value: &Value) -> Option<Numeric> {
    Some(match value {
        Value::Int32(i) => Numeric::Int32(*i),
        Value::Char(c) => Numeric::Int32(*c as i32),
        Value::Int64(i) => Numeric::Int64(*i),
        Value::Double(d) => Numeric::Double(*d),
        Value::Decimal(_) => Numeric::Decimal(value.as_f64()?),
        _ => return None,
    })
}

fn decimal(d: f64) -> Result<Value> {
    Decimal128::from_str(&d.to_string())
        .map(Value::Decimal)
        .map_err(|_| invalid("decimal", &Value::Double(d)))
}

fn arithmetic(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    let (l, r) = match (numeric(&left), numeric(&right)) {
        (Some(l), Some(r)) => (l, r),
        _ => return Err(invalid(op.symbol(), &left)),
    };
    let as_f64 = |n: &Numeric| match n {
        Numeric::Int32(i) => *i as f64,
        Numeric::Int64(i) => *i as f64,
        Numeric::Double(d) | Numeric::Decimal(d) => *d,
    };
    let as_i64 = |n: &Numeric| match n {
        Numeric::Int32(i) => *i as i64,
        Numeric::Int64(i) => *i,
        Numeric::Double(d) | Numeric::Decimal(d) => *d as i64,
    };
    let float = |a: f64, b: f64| match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide => a / b,
        _ => a % b,
    };
    let integral = |a: i64, b: i64| -> Result<i64> {
        Ok(match op {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Subtract => a.wrapping_sub(b),
            BinaryOp::Multiply => a.wrapping_mul(b),
            BinaryOp::Divide if b == 0 => return Err(invalid("/", &Value::Int64(b))),
            BinaryOp::Divide => a.wrapping_div(b),
            _ if b == 0 => return Err(invalid("%", &Value::Int64(b))),
            _ => a.wrapping_rem(b),
        })
    };
    match (&l, &r) {
        (Numeric::Decimal(_), _) | (_, Numeric::Decimal(_)) => {
            decimal(float(as_f64(&l), as_f64(&r)))
        }
        (Numeric::Double(_), _) | (_, Numeric::Double(_)) => {
            Ok(Value::Double(float(as_f64(&l), as_f64(&r))))
        }
        (Numeric::Int32(a), Numeric::Int32(b)) => {
            Ok(Value::Int32(integral(*a as i64, *b as i64)? as i32))
        }
        _ => Ok(Value::Int64(integral(as_i64(&l), as_i64(&r))?)),
    }
}

/// Equality with numeric values compared across widths.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Double(_) | Value::Decimal(_), _) | (_, Value::Double(_) | Value::Decimal(_)) => {
            match (left.as_f64(), right.as_f64()) {
                (Some(l), Some(r)) => l == r,
                _ => left == right,
            }
        }
        (Value::String(_), _) | (_, Value::String(_)) => left == right,
        _ => match (left.as_i64(), right.as_i64()) {
            (Some(l), Some(r)) => l == r,
            _ => left == right,
        },
    }
}

pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Boolean(l), Value::Boolean(r)) => Some(l.cmp(r)),
        (Value::DateTime(l), Value::DateTime(r)) => {
            Some(l.timestamp_millis().cmp(&r.timestamp_millis()))
        }
        (Value::Double(_) | Value::Decimal(_), _) | (_, Value::Double(_) | Value::Decimal(_)) => {
            left.as_f64()?.partial_cmp(&right.as_f64()?)
        }
        _ => Some(left.as_i64()?.cmp(&right.as_i64()?)),
    }
}

/// The text of a value as `ToString` and string concatenation see it.
fn string_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Char(c) => c.to_string(),
        Value::Boolean(true) => "True".to_string(),
        Value::Boolean(false) => "False".to_string(),
        Value::Int32(i) => i.to_string(),
        Value::Int64(i) => i.to_string(),
        Value::Double(d) => d.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::ObjectId(o) => o.to_hex(),
        other => other.to_string(),
    }
}

fn unary(u: &Unary, env: &Environment) -> Result<Value> {
    let operand = evaluate(&u.operand, env)?;
    match u.op {
        UnaryOp::Not => match operand {
            Value::Boolean(b) => Ok(Value::Boolean(!b)),
            Value::Null => Ok(Value::Null),
            other => Err(invalid("!", &other)),
        },
        UnaryOp::Negate => match operand {
            Value::Null => Ok(Value::Null),
            Value::Int32(i) => Ok(Value::Int32(i.wrapping_neg())),
            Value::Int64(i) => Ok(Value::Int64(i.wrapping_neg())),
            Value::Double(d) => Ok(Value::Double(-d)),
            other @ Value::Decimal(_) => decimal(-other.as_f64().unwrap_or_default()),
            other => Err(invalid("-", &other)),
        },
        UnaryOp::ArrayLength => match operand {
            Value::Array(items) => Ok(length(items.len())),
            other => Err(invalid("Length", &other)),
        },
        UnaryOp::Convert => convert_value(operand, &u.ty),
    }
}

/// Converts a value to `target` the way an explicit cast would.
pub fn convert_value(value: Value, target: &Type) -> Result<Value> {
    if value.is_null() {
        return if target.can_be_null() {
            Ok(Value::Null)
        } else {
            Err(invalid(&format!("({target})"), &value))
        };
    }
    let fail = || invalid(&format!("({target})"), &value);
    match target.non_nullable() {
        Type::Int32 => {
            let i = match &value {
                Value::Double(d) => *d as i64,
                Value::Decimal(_) => value.as_f64().ok_or_else(fail)? as i64,
                other => other.as_i64().ok_or_else(fail)?,
            };
            Ok(Value::Int32(i32::try_from(i).map_err(|_| fail())?))
        }
        Type::Int64 => match &value {
            Value::Double(_) | Value::Decimal(_) => {
                Ok(Value::Int64(value.as_f64().ok_or_else(fail)? as i64))
            }
            other => Ok(Value::Int64(other.as_i64().ok_or_else(fail)?)),
        },
        Type::Double => Ok(Value::Double(match &value {
            Value::Char(c) => *c as u32 as f64,
            Value::Enum { ordinal, .. } => *ordinal as f64,
            other => other.as_f64().ok_or_else(fail)?,
        })),
        Type::Decimal if matches!(value, Value::Decimal(_)) => Ok(value),
        Type::Decimal => decimal(value.as_f64().ok_or_else(fail)?),
        Type::String => Ok(Value::String(string_of(&value))),
        Type::Char => {
            let code = value.as_i64().ok_or_else(fail)?;
            u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .map(Value::Char)
                .ok_or_else(fail)
        }
        Type::Enum(name) => Ok(Value::Enum {
            type_name: name.clone(),
            ordinal: value.as_i64().ok_or_else(fail)?,
        }),
        _ => Ok(value),
    }
}

/// The value `default(T)` produces.
pub fn default_value(ty: &Type) -> Value {
    match ty {
        Type::Boolean => Value::Boolean(false),
        Type::Char => Value::Char('\0'),
        Type::Int32 => Value::Int32(0),
        Type::Int64 => Value::Int64(0),
        Type::Double => Value::Double(0.0),
        Type::Decimal => Decimal128::from_str("0")
            .map(Value::Decimal)
            .unwrap_or(Value::Null),
        Type::DateTime => Value::DateTime(DateTime::MIN),
        Type::Enum(name) => Value::Enum {
            type_name: name.clone(),
            ordinal: 0,
        },
        _ => Value::Null,
    }
}

/// The elements of anything enumerable: arrays, groupings and dictionaries.
fn items(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut fields) => match fields.remove("Elements") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(invalid("enumerate", &Value::Object(fields))),
        },
        Value::Dictionary(entries) => Ok(entries
            .into_iter()
            .map(|(k, v)| Value::Array(vec![k, v]))
            .collect()),
        Value::String(s) => Ok(s.chars().map(Value::Char).collect()),
        other => Err(invalid("enumerate", &other)),
    }
}

fn argument(c: &MethodCall, i: usize, env: &Environment, expr: &Expression) -> Result<Value> {
    c.arguments
        .get(i)
        .ok_or_else(|| unsupported(expr))
        .and_then(|a| evaluate(a, env))
}

fn lambda_argument<'a>(c: &'a MethodCall, i: usize) -> Option<&'a Lambda> {
    c.arguments.get(i).and_then(Expression::as_lambda)
}

fn text(value: Option<Value>, operation: &str) -> Result<String> {
    match value {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(invalid(operation, &other)),
        None => Err(invalid(operation, &Value::Null)),
    }
}

fn comparison_argument(c: &MethodCall, i: usize, env: &Environment) -> Result<bool> {
    match c.arguments.get(i) {
        Some(e) => Ok(StringComparison::from_value(&evaluate(e, env)?)
            .map(|sc| sc.ignore_case())
            .unwrap_or(false)),
        None => Ok(false),
    }
}

fn call(c: &MethodCall, env: &Environment, expr: &Expression) -> Result<Value> {
    use Method::*;
    if c.method.is_non_deterministic() {
        return Err(Error::NonDeterministic(expr.to_string()));
    }
    let target = c
        .object
        .as_deref()
        .map(|o| evaluate(o, env))
        .transpose()?;
    let name = c.method.name();
    match c.method {
        ToLower | ToLowerInvariant => Ok(Value::String(text(target, name)?.to_lowercase())),
        ToUpper | ToUpperInvariant => Ok(Value::String(text(target, name)?.to_uppercase())),
        Trim | TrimStart | TrimEnd => {
            let s = text(target, name)?;
            let chars: Vec<char> = match c.arguments.first() {
                None => vec![],
                Some(a) => match evaluate(a, env)? {
                    Value::Char(ch) => vec![ch],
                    Value::Array(cs) => cs
                        .iter()
                        .filter_map(|v| match v {
                            Value::Char(ch) => Some(*ch),
                            _ => None,
                        })
                        .collect(),
                    other => return Err(invalid(name, &other)),
                },
            };
            let matches = |ch: char| {
                if chars.is_empty() {
                    ch.is_whitespace()
                } else {
                    chars.contains(&ch)
                }
            };
            Ok(Value::String(match c.method {
                Trim => s.trim_matches(matches).to_string(),
                TrimStart => s.trim_start_matches(matches).to_string(),
                _ => s.trim_end_matches(matches).to_string(),
            }))
        }
        StringContains | StartsWith | EndsWith => {
            let mut s = text(target, name)?;
            let mut value = match argument(c, 0, env, expr)? {
                Value::Char(ch) => ch.to_string(),
                other => text(Some(other), name)?,
            };
            if comparison_argument(c, 1, env)? {
                s = s.to_lowercase();
                value = value.to_lowercase();
            }
            Ok(Value::Boolean(match c.method {
                StringContains => s.contains(&value),
                StartsWith => s.starts_with(&value),
                _ => s.ends_with(&value),
            }))
        }
        IsNullOrEmpty | IsNullOrWhiteSpace => Ok(Value::Boolean(match argument(c, 0, env, expr)? {
            Value::Null => true,
            Value::String(s) if c.method == IsNullOrEmpty => s.is_empty(),
            Value::String(s) => s.trim().is_empty(),
            other => return Err(invalid(name, &other)),
        })),
        Substring => {
            let s: Vec<char> = text(target, name)?.chars().collect();
            let start = argument(c, 0, env, expr)?
                .as_i64()
                .and_then(|i| usize::try_from(i).ok())
                .filter(|i| *i <= s.len())
                .ok_or_else(|| invalid(name, &length(s.len())))?;
            let len = match c.arguments.get(1) {
                Some(e) => evaluate(e, env)?
                    .as_i64()
                    .and_then(|i| usize::try_from(i).ok())
                    .filter(|l| start + l <= s.len())
                    .ok_or_else(|| invalid(name, &length(s.len())))?,
                None => s.len() - start,
            };
            Ok(Value::String(s[start..start + len].iter().collect()))
        }
        IndexOf => {
            let s = text(target, name)?;
            let needle = match argument(c, 0, env, expr)? {
                Value::Char(ch) => ch.to_string(),
                other => text(Some(other), name)?,
            };
            Ok(Value::Int32(match s.find(&needle) {
                Some(byte) => s[..byte].chars().count() as i32,
                None => -1,
            }))
        }
        Split => {
            let s = text(target, name)?;
            let separator = match argument(c, 0, env, expr)? {
                Value::Char(ch) => ch.to_string(),
                other => text(Some(other), name)?,
            };
            Ok(Value::Array(
                s.split(separator.as_str())
                    .map(|p| Value::String(p.to_string()))
                    .collect(),
            ))
        }
        Replace => {
            let s = text(target, name)?;
            let from = string_of(&argument(c, 0, env, expr)?);
            let to = string_of(&argument(c, 1, env, expr)?);
            Ok(Value::String(s.replace(&from, &to)))
        }
        StringConcat => {
            let mut out = String::new();
            for a in &c.arguments {
                out.push_str(&string_of(&evaluate(a, env)?));
            }
            Ok(Value::String(out))
        }
        ToString => Ok(Value::String(string_of(
            &target.ok_or_else(|| unsupported(expr))?,
        ))),
        StringEquals | Equals => {
            let (left, right, comparison_index) = match target {
                Some(t) => (t, argument(c, 0, env, expr)?, 1),
                None => (argument(c, 0, env, expr)?, argument(c, 1, env, expr)?, 2),
            };
            if comparison_argument(c, comparison_index, env)? {
                if let (Value::String(l), Value::String(r)) = (&left, &right) {
                    return Ok(Value::Boolean(l.to_lowercase() == r.to_lowercase()));
                }
            }
            Ok(Value::Boolean(values_equal(&left, &right)))
        }
        RegexIsMatch => {
            let input = text(Some(argument(c, 0, env, expr)?), name)?;
            let pattern = text(Some(argument(c, 1, env, expr)?), name)?;
            let regex = regex::Regex::new(&pattern)
                .map_err(|_| invalid(name, &Value::String(pattern.clone())))?;
            Ok(Value::Boolean(regex.is_match(&input)))
        }
        Abs | Ceiling | Floor | Round | Sqrt | Log | Log10 | Exp | Truncate | Pow | MathMin
        | MathMax => math(c, env, expr),
        AddDays | AddHours | AddMinutes | AddSeconds | AddMilliseconds => {
            let millis_per_unit: f64 = match c.method {
                AddDays => 86_400_000.0,
                AddHours => 3_600_000.0,
                AddMinutes => 60_000.0,
                AddSeconds => 1_000.0,
                _ => 1.0,
            };
            let date = match target {
                Some(Value::DateTime(d)) => d,
                Some(other) => return Err(invalid(name, &other)),
                None => return Err(unsupported(expr)),
            };
            let amount = argument(c, 0, env, expr)?;
            let delta = amount.as_f64().ok_or_else(|| invalid(name, &amount))? * millis_per_unit;
            Ok(Value::DateTime(DateTime::from_millis(
                date.timestamp_millis() + delta as i64,
            )))
        }
        ContainsKey | ContainsValue => match target {
            Some(Value::Dictionary(entries)) => {
                let probe = argument(c, 0, env, expr)?;
                Ok(Value::Boolean(entries.iter().any(|(k, v)| {
                    values_equal(if c.method == ContainsKey { k } else { v }, &probe)
                })))
            }
            Some(other) => Err(invalid(name, &other)),
            None => Err(unsupported(expr)),
        },
        GetValueOrDefault => match target {
            Some(Value::Null) => Ok(default_value(&c.ty)),
            Some(v) => Ok(v),
            None => Err(unsupported(expr)),
        },
        AddYears | AddMonths | GetType | Now | UtcNow | NewGuid | RandomNext => {
            Err(unsupported(expr))
        }
        _ => sequence(c, env, expr),
    }
}

fn math(c: &MethodCall, env: &Environment, expr: &Expression) -> Result<Value> {
    use Method::*;
    let x = argument(c, 0, env, expr)?;
    if x.is_null() {
        return Ok(Value::Null);
    }
    let name = c.method.name();
    let f = x.as_f64().ok_or_else(|| invalid(name, &x))?;
    let keep_type = |r: f64| -> Result<Value> {
        match &x {
            Value::Int32(_) => Ok(Value::Int32(r as i32)),
            Value::Int64(_) => Ok(Value::Int64(r as i64)),
            Value::Decimal(_) => decimal(r),
            _ => Ok(Value::Double(r)),
        }
    };
    match c.method {
        Abs => keep_type(f.abs()),
        Ceiling => keep_type(f.ceil()),
        Floor => keep_type(f.floor()),
        Truncate => keep_type(f.trunc()),
        Round => {
            let digits = match c.arguments.get(1) {
                Some(e) => evaluate(e, env)?.as_i64().unwrap_or(0),
                None => 0,
            };
            let scale = 10f64.powi(digits as i32);
            let scaled = f * scale;
            // Midpoints round to even.
            let rounded = if (scaled - scaled.trunc()).abs() == 0.5 {
                2.0 * (scaled / 2.0).round()
            } else {
                scaled.round()
            };
            keep_type(rounded / scale)
        }
        Sqrt => Ok(Value::Double(f.sqrt())),
        Exp => Ok(Value::Double(f.exp())),
        Log10 => Ok(Value::Double(f.log10())),
        Log => match c.arguments.get(1) {
            Some(b) => {
                let base = evaluate(b, env)?;
                Ok(Value::Double(
                    f.log(base.as_f64().ok_or_else(|| invalid(name, &base))?),
                ))
            }
            None => Ok(Value::Double(f.ln())),
        },
        Pow => {
            let y = argument(c, 1, env, expr)?;
            Ok(Value::Double(
                f.powf(y.as_f64().ok_or_else(|| invalid(name, &y))?),
            ))
        }
        _ => {
            let y = argument(c, 1, env, expr)?;
            let ordering = compare(&x, &y).ok_or_else(|| invalid(name, &y))?;
            let take_x = match c.method {
                MathMin => ordering != Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(if take_x { x } else { y })
        }
    }
}

fn sequence(c: &MethodCall, env: &Environment, expr: &Expression) -> Result<Value> {
    use Method::*;
    match c.method {
        Repeat => {
            let value = argument(c, 0, env, expr)?;
            let count = argument(c, 1, env, expr)?.as_i64().unwrap_or(0).max(0);
            return Ok(Value::Array(vec![value; count as usize]));
        }
        Range => {
            let start = argument(c, 0, env, expr)?.as_i64().unwrap_or(0);
            let count = argument(c, 1, env, expr)?.as_i64().unwrap_or(0).max(0);
            return Ok(Value::Array(
                (start..start + count)
                    .map(|i| Value::Int32(i as i32))
                    .collect(),
            ));
        }
        _ => {}
    }
    let source = items(argument(c, 0, env, expr)?)?;
    let predicate = lambda_argument(c, 1);
    let test = |item: &Value| -> Result<bool> {
        match predicate {
            Some(p) => truthy(apply_lambda(p, vec![item.clone()], env)?),
            None => Ok(true),
        }
    };
    let filtered = |source: Vec<Value>| -> Result<Vec<Value>> {
        let mut out = vec![];
        for item in source {
            if test(&item)? {
                out.push(item);
            }
        }
        Ok(out)
    };
    let projected = |source: Vec<Value>| -> Result<Vec<Value>> {
        match predicate {
            Some(selector) => source
                .into_iter()
                .map(|item| apply_lambda(selector, vec![item], env))
                .collect(),
            None => Ok(source),
        }
    };
    let count_argument = || -> Result<usize> {
        let n = argument(c, 1, env, expr)?;
        Ok(usize::try_from(n.as_i64().ok_or_else(|| invalid(c.method.name(), &n))?.max(0))
            .unwrap_or(0))
    };
    match c.method {
        Where => Ok(Value::Array(filtered(source)?)),
        Select => Ok(Value::Array(projected(source)?)),
        SelectMany => {
            let mut out = vec![];
            for inner in projected(source)? {
                out.extend(items(inner)?);
            }
            Ok(Value::Array(out))
        }
        Count | LongCount => {
            let n = filtered(source)?.len();
            Ok(if c.method == Count {
                length(n)
            } else {
                Value::Int64(n as i64)
            })
        }
        Any => Ok(Value::Boolean(!filtered(source)?.is_empty())),
        All => {
            for item in &source {
                if !test(item)? {
                    return Ok(Value::Boolean(false));
                }
            }
            Ok(Value::Boolean(true))
        }
        Contains => {
            let probe = argument(c, 1, env, expr)?;
            Ok(Value::Boolean(source.iter().any(|v| values_equal(v, &probe))))
        }
        First | Single | FirstOrDefault | SingleOrDefault => {
            match filtered(source)?.into_iter().next() {
                Some(v) => Ok(v),
                None if matches!(c.method, FirstOrDefault | SingleOrDefault) => {
                    Ok(default_value(&c.ty))
                }
                None => Err(Error::EmptySequence),
            }
        }
        Last | LastOrDefault => match filtered(source)?.pop() {
            Some(v) => Ok(v),
            None if c.method == LastOrDefault => Ok(default_value(&c.ty)),
            None => Err(Error::EmptySequence),
        },
        ElementAt | ElementAtOrDefault => {
            let i = count_argument()?;
            match source.into_iter().nth(i) {
                Some(v) => Ok(v),
                None if c.method == ElementAtOrDefault => Ok(default_value(&c.ty)),
                None => Err(Error::EmptySequence),
            }
        }
        Sum => {
            let mut total = Value::Int32(0);
            for v in projected(source)? {
                if !v.is_null() {
                    total = arithmetic(BinaryOp::Add, total, v)?;
                }
            }
            convert_value(total, &c.ty)
        }
        Average => {
            let values: Vec<Value> = projected(source)?
                .into_iter()
                .filter(|v| !v.is_null())
                .collect();
            if values.is_empty() {
                return if c.ty.is_nullable() {
                    Ok(Value::Null)
                } else {
                    Err(Error::EmptySequence)
                };
            }
            let mut total = 0.0;
            for v in &values {
                total += v.as_f64().ok_or_else(|| invalid("Average", v))?;
            }
            convert_value(Value::Double(total / values.len() as f64), &c.ty)
        }
        Min | Max => {
            let mut best: Option<Value> = None;
            for v in projected(source)?.into_iter().filter(|v| !v.is_null()) {
                best = Some(match best {
                    None => v,
                    Some(b) => {
                        let ordering = compare(&v, &b).ok_or_else(|| invalid("compare", &v))?;
                        let better = if c.method == Min {
                            ordering == Ordering::Less
                        } else {
                            ordering == Ordering::Greater
                        };
                        if better {
                            v
                        } else {
                            b
                        }
                    }
                });
            }
            match best {
                Some(v) => Ok(v),
                None if c.ty.can_be_null() => Ok(Value::Null),
                None => Err(Error::EmptySequence),
            }
        }
        Distinct => {
            let mut out: Vec<Value> = vec![];
            for v in source {
                if !out.iter().any(|o| values_equal(o, &v)) {
                    out.push(v);
                }
            }
            Ok(Value::Array(out))
        }
        Reverse => Ok(Value::Array(source.into_iter().rev().collect())),
        Skip => {
            let n = count_argument()?;
            Ok(Value::Array(source.into_iter().skip(n).collect()))
        }
        Take => {
            let n = count_argument()?;
            Ok(Value::Array(source.into_iter().take(n).collect()))
        }
        SkipWhile | TakeWhile => {
            let mut passing = 0;
            for item in &source {
                if !test(item)? {
                    break;
                }
                passing += 1;
            }
            Ok(Value::Array(if c.method == TakeWhile {
                source.into_iter().take(passing).collect()
            } else {
                source.into_iter().skip(passing).collect()
            }))
        }
        Append => {
            let mut out = source;
            out.push(argument(c, 1, env, expr)?);
            Ok(Value::Array(out))
        }
        Prepend => {
            let mut out = vec![argument(c, 1, env, expr)?];
            out.extend(source);
            Ok(Value::Array(out))
        }
        DefaultIfEmpty => {
            if !source.is_empty() {
                return Ok(Value::Array(source));
            }
            let default = match c.arguments.get(1) {
                Some(e) => evaluate(e, env)?,
                None => default_value(&c.ty.element_type().unwrap_or(Type::Object)),
            };
            Ok(Value::Array(vec![default]))
        }
        Concat | Union | Intersect | Except => {
            let other = items(argument(c, 1, env, expr)?)?;
            let contains = |set: &[Value], v: &Value| set.iter().any(|o| values_equal(o, v));
            let mut out: Vec<Value> = vec![];
            match c.method {
                Concat => {
                    out = source;
                    out.extend(other);
                }
                Union => {
                    for v in source.into_iter().chain(other) {
                        if !contains(&out, &v) {
                            out.push(v);
                        }
                    }
                }
                Intersect => {
                    for v in source {
                        if contains(&other, &v) && !contains(&out, &v) {
                            out.push(v);
                        }
                    }
                }
                _ => {
                    for v in source {
                        if !contains(&other, &v) && !contains(&out, &v) {
                            out.push(v);
                        }
                    }
                }
            }
            Ok(Value::Array(out))
        }
        ToList | ToArray | AsEnumerable | AsQueryable => Ok(Value::Array(source)),
        _ => Err(unsupported(expr)),
    }
}
