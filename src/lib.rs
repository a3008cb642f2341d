//! Extracts line tables and local variable tables from class files and dex
//! files compiled from the same sources, so they can be compared method by
//! method.

pub mod attributes;
pub mod dex;
pub mod error;
pub mod flatten;
pub mod jvm;
pub mod matcher;
pub mod model;
pub mod smap;

pub use error::{DebugInfoError, ExtractError, FormatError, ReconstructionError};
pub use matcher::{MatchedPair, Matcher, MethodKey, match_methods};
pub use model::{ClassInfo, LocalVariable, Location, MethodInfo, MethodInfoPair};

/// Type descriptor of the `kotlin.Metadata` annotation
pub const KOTLIN_METADATA: &str = "Lkotlin/Metadata;";

/// Knobs shared by the jvm and dex extractors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Only extract classes annotated with `kotlin.Metadata`
    pub kotlin_only: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self { kotlin_only: true }
    }
}
