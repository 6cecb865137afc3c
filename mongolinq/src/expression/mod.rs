//! The typed query expression tree consumed by the translator.
pub mod builder;
mod definitions;
pub use definitions::*;
mod display;
mod methods;
pub use methods::*;
pub mod transparent_identifiers;
mod types;
pub use types::*;
mod value;
pub use value::*;

#[cfg(test)]
mod test;
