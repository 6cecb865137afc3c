//! The aggregation pipeline IR produced by the translator, rewritten by the
//! optimizer and rendered by codegen.
mod definitions;
pub use definitions::*;
mod util;
pub use util::ROOT;
pub mod visitor;
