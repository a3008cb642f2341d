//! `SourceDebugExtension` (SMAP) line remapping tables

pub mod parser;
pub mod table;

pub use parser::parse_smap;
pub use table::{FileRef, LineMapping, LineRemapTable, RemappedLine, Stratum};

/// Stratum holding the call sites of inlined code
pub const KOTLIN_DEBUG_STRATUM: &str = "KotlinDebug";
