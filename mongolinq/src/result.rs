use crate::{client_side, codegen, serialization, translator};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum Error {
    #[error("translation error: {0}")]
    Translator(#[from] translator::Error),
    #[error("codegen error: {0}")]
    Codegen(#[from] codegen::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serialization::Error),
    #[error("client-side projection error: {0}")]
    ClientSide(#[from] client_side::Error),
}
