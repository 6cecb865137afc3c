//! Compiles typed query expressions (the LINQ operator chains of a MongoDB
//! driver) into aggregation pipelines, along with the serializer that decodes
//! the documents the pipeline returns.
mod ast;
pub mod client_side;
mod codegen;
pub mod expression;
pub mod logging;
mod optimizer;
pub mod options;
pub mod result;
pub mod serialization;
mod translator;
mod util;

pub use translator::{ResultKind, ResultOperator};

use crate::{
    client_side::ClientSideProjection,
    codegen::MqlCodeGenerator,
    expression::{Expression, Lambda},
    options::TranslationOptions,
    result::Result,
    serialization::{SerializerRef, SerializerRegistry},
    translator::QueryTranslator,
};
use bson::Document;
use tracing::{event, instrument, Level};

/// Everything needed to run a query and decode its results.
#[derive(Debug, Clone)]
pub struct Translation {
    pub collection: String,
    pub stages: Vec<Document>,
    /// Decodes each document the pipeline returns.
    pub output_serializer: SerializerRef,
    /// Set when the query ends in a terminal operator such as `First` or
    /// `Count`; the caller reduces the returned documents accordingly.
    pub result_operator: Option<ResultOperator>,
    /// Set when part of the projection runs in process after the pipeline.
    pub client_side_projection: Option<ClientSideProjection>,
}

/// Returns the aggregation pipeline for the provided query expression.
#[instrument(level = "debug", skip_all, fields(query = %expr))]
pub fn translate_query(
    expr: &Expression,
    registry: &SerializerRegistry,
    options: TranslationOptions,
) -> Result<Translation> {
    let translator = QueryTranslator::new(registry.clone(), options);
    let query = translator.translate_query(expr)?;

    let pipeline = if options.optimize {
        optimizer::optimize_pipeline(query.pipeline)
    } else {
        query.pipeline
    };

    let stages = MqlCodeGenerator::new().codegen_pipeline(pipeline)?;
    event!(
        Level::DEBUG,
        collection = query.collection.as_str(),
        stages = stages.len(),
        "translated query"
    );

    Ok(Translation {
        collection: query.collection,
        stages,
        output_serializer: query.output_serializer,
        result_operator: query.result_operator,
        client_side_projection: query.client_side_projection,
    })
}

/// Returns the `$match` filter for a one-parameter predicate over documents
/// decoded by `serializer`.
#[instrument(level = "debug", skip_all, fields(predicate = %Expression::Lambda(predicate.clone())))]
pub fn translate_filter(
    predicate: &Lambda,
    serializer: SerializerRef,
    registry: &SerializerRegistry,
    options: TranslationOptions,
) -> Result<Document> {
    let translator = QueryTranslator::new(registry.clone(), options);
    let filter = translator.translate_predicate(predicate, serializer)?;
    let filter = if options.optimize {
        optimizer::optimize_filter(filter)
    } else {
        filter
    };
    Ok(MqlCodeGenerator::new().codegen_filter(filter)?)
}
