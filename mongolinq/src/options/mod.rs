use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};

/// Options passed in for translation, used throughout the various translation components
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationOptions {
    pub server_version: ServerVersion,
    /// Defer projections that cannot be expressed in the pipeline to in-process
    /// evaluation instead of failing.
    pub enable_client_side_projections: bool,
    pub rewrite_transparent_identifiers: bool,
    /// Run the pipeline simplifier after planning.
    pub optimize: bool,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        TranslationOptions {
            server_version: ServerVersion::default(),
            enable_client_side_projections: false,
            rewrite_transparent_identifiers: true,
            optimize: true,
        }
    }
}

impl TranslationOptions {
    pub fn new(server_version: ServerVersion) -> Self {
        TranslationOptions {
            server_version,
            ..Default::default()
        }
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.server_version.supports(feature)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
}

impl ServerVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        ServerVersion { major, minor }
    }

    pub fn supports(&self, feature: Feature) -> bool {
        match Self::introduced(feature) {
            Some(since) => *self >= since,
            None => false,
        }
    }

    /// The first server version that has `feature`.
    pub fn introduced(feature: Feature) -> Option<ServerVersion> {
        CAPABILITIES.get(&feature).copied().flatten()
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl Default for ServerVersion {
    fn default() -> Self {
        ServerVersion::new(7, 0)
    }
}

/// Server features whose availability changes the shape of the emitted
/// pipeline.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    /// `$dateAdd` and friends.
    DateOperators,
    /// `$getField`.
    GetField,
    /// The `limit` argument of `$filter`.
    FilterLimit,
    /// `$sortArray`.
    SortArray,
    /// `$bitAnd`, `$bitOr`, `$bitXor`.
    BitwiseOperators,
    /// Predicates on the implied element of an `$elemMatch` combined with
    /// `$or`. No server accepts these, so `Any` with such predicates is
    /// translated with `$expr` and `$anyElementTrue` instead.
    ImpliedElementInOr,
}

lazy_static! {
    /// Minimum server version per feature; `None` means no server has it.
    static ref CAPABILITIES: HashMap<Feature, Option<ServerVersion>> = {
        let mut m = HashMap::new();
        m.insert(Feature::DateOperators, Some(ServerVersion::new(5, 0)));
        m.insert(Feature::GetField, Some(ServerVersion::new(5, 0)));
        m.insert(Feature::FilterLimit, Some(ServerVersion::new(5, 2)));
        m.insert(Feature::SortArray, Some(ServerVersion::new(5, 2)));
        m.insert(Feature::BitwiseOperators, Some(ServerVersion::new(6, 3)));
        m.insert(Feature::ImpliedElementInOr, None);
        m
    };
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn capability_table_respects_versions() {
        let v50 = ServerVersion::new(5, 0);
        let v52 = ServerVersion::new(5, 2);
        assert!(v50.supports(Feature::DateOperators));
        assert!(!v50.supports(Feature::FilterLimit));
        assert!(v52.supports(Feature::FilterLimit));
        assert!(!ServerVersion::new(4, 4).supports(Feature::GetField));
        assert!(!ServerVersion::new(99, 0).supports(Feature::ImpliedElementInOr));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: TranslationOptions = bson::from_document(bson::doc! {
            "enable_client_side_projections": true,
            "server_version": { "major": 4, "minor": 4 },
        })
        .unwrap();
        assert_eq!(
            TranslationOptions {
                server_version: ServerVersion::new(4, 4),
                enable_client_side_projections: true,
                rewrite_transparent_identifiers: true,
                optimize: true,
            },
            options
        );
    }
}
