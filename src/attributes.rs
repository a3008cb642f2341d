//! Decoders for class attributes, looked up by attribute name

use std::collections::HashMap;

use crate::error::FormatError;
use crate::smap::{LineRemapTable, parse_smap};
use log::trace;

pub const SOURCE_DEBUG_EXTENSION: &str = "SourceDebugExtension";

/// An attribute as read from the class file, `info` not yet interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    pub name: String,
    pub info: Vec<u8>,
}

/// A decoded class attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassAttribute {
    SourceDebugExtension(LineRemapTable),
}

pub type AttributeReader = fn(&[u8]) -> Result<ClassAttribute, FormatError>;

/// Attribute name to decoder table handed to the class loader
#[derive(Debug, Clone)]
pub struct AttributeReaders {
    readers: HashMap<String, AttributeReader>,
}

fn read_source_debug_extension(info: &[u8]) -> Result<ClassAttribute, FormatError> {
    parse_smap(info).map(ClassAttribute::SourceDebugExtension)
}

impl AttributeReaders {
    /// A table without any readers, every attribute stays raw
    pub fn empty() -> Self {
        Self {
            readers: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, reader: AttributeReader) -> &mut Self {
        self.readers.insert(name.into(), reader);
        self
    }

    /// Decode `attribute`, `None` if no reader knows its name
    pub fn read(&self, attribute: &RawAttribute) -> Option<Result<ClassAttribute, FormatError>> {
        let Some(reader) = self.readers.get(&attribute.name) else {
            trace!("No reader for attribute {}", attribute.name);
            return None;
        };
        Some(reader(&attribute.info))
    }
}

impl Default for AttributeReaders {
    fn default() -> Self {
        let mut readers = Self::empty();
        readers.register(SOURCE_DEBUG_EXTENSION, read_source_debug_extension);
        readers
    }
}
