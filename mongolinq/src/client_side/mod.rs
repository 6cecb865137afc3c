//! Projections that cannot be expressed in a pipeline. The pipeline returns
//! the input documents unchanged and the projection lambda runs in process
//! over each decoded document.
mod evaluator;
pub use evaluator::*;

use crate::{
    expression::{Lambda, Type, Value},
    serialization::{self, Representation, Serializer, SerializerRef},
};
use bson::Bson;
use thiserror::Error;


pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum Error {
    #[error("{0} cannot be evaluated in process")]
    Unsupported(String),
    #[error("parameter {0} is not bound")]
    UnboundParameter(String),
    #[error("{operation} is not defined for {value}")]
    InvalidOperand { operation: String, value: String },
    #[error("{0} is non-deterministic")]
    NonDeterministic(String),
    #[error("sequence contains no elements")]
    EmptySequence,
    #[error("sequence contains more than one element")]
    MoreThanOneElement,
    #[error(transparent)]
    Serialization(#[from] serialization::Error),
}

/// The part of a query left for the client: how to decode the documents the
/// pipeline returns and the lambda to apply to each of them.
#[derive(Debug, Clone)]
pub struct ClientSideProjection {
    input: SerializerRef,
    projection: Lambda,
}

impl ClientSideProjection {
    pub fn new(input: SerializerRef, projection: Lambda) -> Self {
        Self { input, projection }
    }

    pub fn input_serializer(&self) -> &SerializerRef {
        &self.input
    }

    pub fn projection(&self) -> &Lambda {
        &self.projection
    }

    /// Decodes one returned document and projects it.
    pub fn apply(&self, document: &Bson) -> Result<Value> {
        let input = self.input.deserialize(document)?;
        apply_lambda(&self.projection, vec![input], &Environment::new())
    }
}

/// The output serializer of a translation that ends in a client-side
/// projection. Decoding a document runs the projection.
#[derive(Debug, Clone)]
pub struct ClientSideProjectionSerializer {
    projection: ClientSideProjection,
}

impl ClientSideProjectionSerializer {
    pub fn new(projection: ClientSideProjection) -> Self {
        Self { projection }
    }

    pub fn projection(&self) -> &ClientSideProjection {
        &self.projection
    }
}

impl Serializer for ClientSideProjectionSerializer {
    fn value_type(&self) -> Type {
        self.projection.projection.body.ty()
    }

    fn representation(&self) -> Representation {
        Representation::Custom
    }

    fn is_client_side_projection(&self) -> bool {
        true
    }

    fn serialize(&self, value: &Value) -> serialization::Result<Bson> {
        Err(serialization::Error::CannotSerialize {
            value: value.to_string(),
            ty: self.value_type(),
            representation: Representation::Custom,
        })
    }

    fn deserialize(&self, bson: &Bson) -> serialization::Result<Value> {
        self.projection.apply(bson).map_err(|e| match e {
            Error::Serialization(inner) => inner,
            _ => serialization::Error::CannotDeserialize {
                bson: bson.to_string(),
                ty: self.value_type(),
            },
        })
    }
}
