use std::sync::Arc;

use crate::smap::LineRemapTable;

/// One row of a method's line table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub offset: u32, // First code offset belonging to `line`
    pub line: u32,   // Output line, may need remapping through the class SMAP
}

/// A local variable live over the half-open range `[start, start + length)`
///
/// Variables of type `J` or `D` occupy `slot` and `slot + 1`. Several variables
/// can share a slot as long as their ranges are disjoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalVariable {
    pub start: u32,
    pub length: u32,
    pub name: String,
    pub descriptor: String,
    pub slot: u32,
}

impl LocalVariable {
    /// First offset past the end of the live range
    pub fn end(&self) -> u32 {
        self.start + self.length
    }
}

/// Class-level data shared by every method of the class
#[derive(Debug)]
pub struct ClassInfo {
    pub name: String,                       // Qualified name, e.g. `foo.Bar`
    pub source_file: Option<String>,        // Declared `SourceFile`
    pub line_remap: Option<LineRemapTable>, // Decoded `SourceDebugExtension`
}

/// Debug tables of one method, from either bytecode format
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub name: String,
    pub descriptor: String,
    pub flags: u32,
    pub line_table: Vec<Location>,
    pub local_variables: Vec<LocalVariable>,
    pub class: Arc<ClassInfo>,
}

/// Slots for the same method seen from both formats
#[derive(Debug, Default, Clone)]
pub struct MethodInfoPair {
    pub jvm: Option<MethodInfo>,
    pub dex: Option<MethodInfo>,
}
