//! Renders the pipeline IR as BSON documents.
use bson::Document;
use thiserror::Error;

mod expressions;
mod filters;
mod stages;

#[cfg(test)]
mod test;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("$project must specify at least one field")]
    EmptyProjection,
    #[error("{stage} requires a non-negative value, found {value}")]
    NegativeValue { stage: &'static str, value: i64 },
    #[error("$sort requires at least one sort key")]
    EmptySort,
}

#[derive(Clone, Debug, Default)]
pub struct MqlCodeGenerator {}

impl MqlCodeGenerator {
    pub fn new() -> Self {
        MqlCodeGenerator {}
    }

    pub fn codegen_pipeline(&self, pipeline: crate::ast::Pipeline) -> Result<Vec<Document>> {
        pipeline
            .stages
            .into_iter()
            .map(|s| self.codegen_stage(s))
            .collect()
    }
}
