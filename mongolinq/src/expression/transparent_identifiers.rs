use crate::expression::{Expression, Lambda, Method, MethodCall, New, Type};

/// Prefix the compiler uses for parameters that carry a pair of range
/// variables between query clauses.
pub const TRANSPARENT_IDENTIFIER_PREFIX: &str = "<>h__TransparentIdentifier";

/// Rewrites `SelectMany`/`Join`/`GroupJoin` calls whose result selector only
/// pairs up both range variables, when they are immediately followed by a
/// `Select` reading those variables back out. The `Select` is folded into the
/// result selector so the pipeline never materializes the pair.
pub fn rewrite_transparent_identifiers(expr: Expression) -> Expression {
    let expr = expr.map_children(&mut rewrite_transparent_identifiers);
    match expr {
        Expression::Call(call) if call.method == Method::Select && call.arguments.len() == 2 => {
            match try_fold_select(&call) {
                Some(folded) => folded,
                None => Expression::Call(call),
            }
        }
        other => other,
    }
}

fn result_selector_index(method: Method, arity: usize) -> Option<usize> {
    match (method, arity) {
        (Method::SelectMany, 3) => Some(2),
        (Method::Join, 5) | (Method::GroupJoin, 5) => Some(4),
        _ => None,
    }
}

fn try_fold_select(select: &MethodCall) -> Option<Expression> {
    let inner = select.arguments[0].as_call()?;
    let index = result_selector_index(inner.method, inner.arguments.len())?;
    let pairing = inner.arguments[index].as_lambda()?;
    let pairs = pair_members(pairing)?;
    let selector = select.arguments[1].as_lambda()?;
    if selector.parameters.len() != 1 {
        return None;
    }
    let carrier = &selector.parameters[0].name;
    let body = replace_pair_members(*selector.body.clone(), carrier, &pairs);
    if body.references(carrier) {
        return None;
    }
    let mut arguments = inner.arguments.clone();
    arguments[index] = Expression::Lambda(Lambda {
        parameters: pairing.parameters.clone(),
        body: Box::new(body),
    });
    Some(Expression::Call(MethodCall {
        method: inner.method,
        object: None,
        arguments,
        ty: select.ty.clone(),
    }))
}

/// For `(a, b) => new { a, b }` returns the member name and parameter
/// expression of each range variable.
fn pair_members(selector: &Lambda) -> Option<Vec<(String, Expression)>> {
    if selector.parameters.len() != 2 {
        return None;
    }
    match &*selector.body {
        Expression::New(New {
            ty: Type::Anonymous(_),
            members,
        }) if members.len() == 2 => {
            let all_parameters = members.iter().zip(selector.parameters.iter()).all(
                |((_, e), p)| matches!(e, Expression::Parameter(q) if q.name == p.name),
            );
            all_parameters.then(|| members.clone())
        }
        _ => None,
    }
}

fn replace_pair_members(
    expr: Expression,
    carrier: &str,
    pairs: &[(String, Expression)],
) -> Expression {
    match expr {
        Expression::Member(m)
            if matches!(&*m.expr, Expression::Parameter(p) if p.name == carrier) =>
        {
            match pairs.iter().find(|(name, _)| *name == m.member) {
                Some((_, replacement)) => replacement.clone(),
                None => Expression::Member(m),
            }
        }
        other => other.map_children(&mut |c| replace_pair_members(c, carrier, pairs)),
    }
}
