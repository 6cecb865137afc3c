//! Lowers query expressions to the pipeline AST: binding lambda parameters to
//! symbols, translating predicates to match filters, values to aggregation
//! expressions, and query operators to stages.
use crate::{
    ast,
    client_side::{self, ClientSideProjection, Environment},
    expression::{self, Expression, Lambda, Value},
    options::{Feature, ServerVersion, TranslationOptions},
    serialization::{self, Representation, SerializerRef, SerializerRegistry},
    util::unique_linked_hash_map::DuplicateKeyError,
};
use thiserror::Error;

mod collection_methods;
mod context;
pub use context::*;
mod conversions;
mod date_methods;
mod dictionary_methods;
mod discriminators;
mod expressions;
mod filters;
mod math_methods;
mod result_operators;
pub use result_operators::{ResultKind, ResultOperator};
mod stages;
mod string_methods;

#[cfg(test)]
mod test;

pub type Result<T> = std::result::Result<T, Error>;

fn because(reason: &Option<String>) -> String {
    reason
        .as_ref()
        .map(|r| format!(" because {r}"))
        .unwrap_or_default()
}

#[derive(Debug, Error, PartialEq, Clone)]
pub enum Error {
    #[error("Expression not supported: {expression}{}.", because(.reason))]
    ExpressionNotSupported {
        expression: String,
        reason: Option<String>,
    },
    #[error("Expression not supported: {expression} because the operands are represented as {left:?} and {right:?}.")]
    RepresentationConflict {
        expression: String,
        left: Representation,
        right: Representation,
    },
    #[error("parameter {0} is not in scope")]
    UnknownSymbol(String),
    #[error(transparent)]
    Serialization(#[from] serialization::Error),
    #[error(transparent)]
    DuplicateKey(#[from] DuplicateKeyError),
}

pub(crate) fn not_supported(expr: &Expression, reason: impl Into<String>) -> Error {
    Error::ExpressionNotSupported {
        expression: expr.to_string(),
        reason: Some(reason.into()),
    }
}

pub(crate) fn unsupported(expr: &Expression) -> Error {
    Error::ExpressionNotSupported {
        expression: expr.to_string(),
        reason: None,
    }
}

/// The outcome of translating a query, before simplification and rendering.
#[derive(Debug, Clone)]
pub struct TranslatedQuery {
    pub collection: String,
    pub pipeline: ast::Pipeline,
    /// Decodes each document the pipeline returns.
    pub output_serializer: SerializerRef,
    pub result_operator: Option<ResultOperator>,
    pub client_side_projection: Option<ClientSideProjection>,
}

/// An aggregation expression and the serializer of the value it produces.
#[derive(Debug, Clone)]
pub struct TranslatedExpression {
    pub ast: ast::Expression,
    pub serializer: SerializerRef,
}

impl TranslatedExpression {
    pub fn new(ast: ast::Expression, serializer: SerializerRef) -> Self {
        Self { ast, serializer }
    }
}

#[derive(Clone, Debug)]
pub struct QueryTranslator {
    registry: SerializerRegistry,
    options: TranslationOptions,
    context: TranslationContext,
}

impl QueryTranslator {
    pub fn new(registry: SerializerRegistry, options: TranslationOptions) -> Self {
        Self {
            registry,
            options,
            context: TranslationContext::new(),
        }
    }

    /// Translates a standalone predicate over documents decoded by
    /// `serializer` to a match filter.
    pub fn translate_predicate(
        &self,
        predicate: &Lambda,
        serializer: SerializerRef,
    ) -> Result<ast::Filter> {
        let parameter = predicate.parameters.first().ok_or_else(|| {
            not_supported(
                &Expression::Lambda(predicate.clone()),
                "a predicate takes one parameter",
            )
        })?;
        self.with_symbol(Symbol::current(&parameter.name, "", serializer))
            .translate_filter(&predicate.body)
    }

    pub(crate) fn with_symbol(&self, symbol: Symbol) -> Self {
        self.with_context(self.context.with_symbol(symbol))
    }

    pub(crate) fn with_context(&self, context: TranslationContext) -> Self {
        Self {
            registry: self.registry.clone(),
            options: self.options,
            context,
        }
    }

    /// A translator with each lambda parameter bound to the matching symbol.
    pub(crate) fn bind(&self, lambda: &Lambda, symbols: Vec<Symbol>) -> Self {
        let mut context = self.context.clone();
        for (parameter, symbol) in lambda.parameters.iter().zip(symbols) {
            context = context.with_symbol(Symbol {
                name: parameter.name.clone(),
                ..symbol
            });
        }
        self.with_context(context)
    }

    pub(crate) fn lookup(&self, name: &str) -> Result<&Symbol> {
        self.context
            .lookup(name)
            .ok_or_else(|| Error::UnknownSymbol(name.to_string()))
    }

    pub(crate) fn serializer_for(&self, ty: &expression::Type) -> Result<SerializerRef> {
        Ok(self.registry.get_serializer(ty)?)
    }

    /// Fails unless the target server has `feature`.
    pub(crate) fn require(&self, feature: Feature, expr: &Expression) -> Result<()> {
        if self.options.supports(feature) {
            return Ok(());
        }
        Err(not_supported(
            expr,
            match ServerVersion::introduced(feature) {
                Some(version) => format!(
                    "it requires server version {version} or later and the target is {}",
                    self.options.server_version
                ),
                None => "no server version supports it".to_string(),
            },
        ))
    }

    /// Evaluates an expression that references no parameters.
    pub(crate) fn evaluate_closed(&self, expr: &Expression) -> Result<Value> {
        client_side::evaluate(expr, &Environment::new()).map_err(|e| match e {
            client_side::Error::NonDeterministic(_) => not_supported(
                expr,
                "its value is non-deterministic and cannot be evaluated on the server",
            ),
            other => not_supported(expr, other.to_string()),
        })
    }
}

/// The lambda at argument `i` of a call.
pub(crate) fn lambda_argument<'a>(
    call: &'a expression::MethodCall,
    i: usize,
    expr: &Expression,
) -> Result<&'a Lambda> {
    call.arguments
        .get(i)
        .and_then(Expression::as_lambda)
        .ok_or_else(|| not_supported(expr, format!("argument {i} must be a lambda")))
}

/// True when the lambda returns its only parameter unchanged.
pub(crate) fn is_identity(lambda: &Lambda) -> bool {
    matches!(
        (&*lambda.body, lambda.parameters.as_slice()),
        (Expression::Parameter(p), [only]) if p.name == only.name
    )
}
