use serde::{Deserialize, Serialize};

pub const DEFAULT_DISCRIMINATOR_ELEMENT: &str = "_t";

/// How the concrete type of a polymorphically stored document is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscriminatorConvention {
    /// `_t: "Dog"`: one value naming the concrete class.
    Scalar { element_name: String },
    /// `_t: ["Animal", "Mammal", "Dog"]`: the chain from the root class down to
    /// the concrete class. The root class itself is stored as a plain string.
    Hierarchical { element_name: String },
}

impl DiscriminatorConvention {
    pub fn element_name(&self) -> &str {
        match self {
            DiscriminatorConvention::Scalar { element_name }
            | DiscriminatorConvention::Hierarchical { element_name } => element_name,
        }
    }

    pub fn is_hierarchical(&self) -> bool {
        matches!(self, DiscriminatorConvention::Hierarchical { .. })
    }
}
