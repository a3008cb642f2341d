//! Stack-machine (class file) side. The tables are already explicit, so
//! this only copies them into the shared model.

use std::sync::Arc;

use crate::attributes::{AttributeReaders, ClassAttribute, RawAttribute};
use crate::error::ExtractError;
use crate::model::{ClassInfo, LocalVariable, Location, MethodInfo};
use crate::{ExtractOptions, KOTLIN_METADATA};
use log::{debug, trace, warn};

/// Entry of a `LineNumberTable` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumberEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

/// Entry of a `LocalVariableTable` attribute with its constant pool
/// references resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableEntry {
    pub start_pc: u16,
    pub length: u16,
    pub name: String,
    pub descriptor: String,
    pub index: u16,
}

#[derive(Debug, Clone)]
pub struct JvmMethod {
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
    pub line_numbers: Option<Vec<LineNumberEntry>>,
    pub local_variables: Option<Vec<LocalVariableEntry>>,
}

#[derive(Debug, Clone)]
pub struct JvmClass {
    pub name: String, // Binary name with dots, e.g. `foo.Bar$Baz`
    pub source_file: Option<String>,
    pub annotations: Vec<String>, // Annotation type descriptors
    pub attributes: Vec<RawAttribute>,
    pub methods: Vec<JvmMethod>,
}

impl JvmClass {
    pub fn is_kotlin(&self) -> bool {
        self.annotations.iter().any(|a| a == KOTLIN_METADATA)
    }

    /// Build the shared class info, decoding attributes through `readers`.
    /// The first `SourceDebugExtension` wins.
    pub fn class_info(&self, readers: &AttributeReaders) -> Result<ClassInfo, ExtractError> {
        let mut line_remap = None;
        for attribute in &self.attributes {
            let decoded = readers.read(attribute).transpose().map_err(|source| {
                ExtractError::Format {
                    class: self.name.clone(),
                    source,
                }
            })?;
            match decoded {
                Some(ClassAttribute::SourceDebugExtension(table)) if line_remap.is_none() => {
                    line_remap = Some(table);
                }
                Some(_) => trace!(
                    "Ignoring repeated attribute {} in {}",
                    attribute.name, self.name
                ),
                None => {}
            }
        }
        Ok(ClassInfo {
            name: self.name.clone(),
            source_file: self.source_file.clone(),
            line_remap,
        })
    }
}

impl JvmMethod {
    pub fn normalize(&self, class: &Arc<ClassInfo>) -> MethodInfo {
        let line_table = self
            .line_numbers
            .iter()
            .flatten()
            .map(|entry| Location {
                offset: u32::from(entry.start_pc),
                line: u32::from(entry.line_number),
            })
            .collect();
        let local_variables = self
            .local_variables
            .iter()
            .flatten()
            .map(|entry| LocalVariable {
                start: u32::from(entry.start_pc),
                length: u32::from(entry.length),
                name: entry.name.clone(),
                descriptor: entry.descriptor.clone(),
                slot: u32::from(entry.index),
            })
            .collect();
        MethodInfo {
            name: self.name.clone(),
            descriptor: self.descriptor.clone(),
            flags: u32::from(self.access_flags),
            line_table,
            local_variables,
            class: Arc::clone(class),
        }
    }
}

/// Normalize every method of one class
pub fn extract_class(
    class: &JvmClass,
    options: &ExtractOptions,
    readers: &AttributeReaders,
) -> Result<Vec<MethodInfo>, ExtractError> {
    if options.kotlin_only && !class.is_kotlin() {
        trace!("Skipping non-Kotlin class {}", class.name);
        return Ok(Vec::new());
    }
    let info = Arc::new(class.class_info(readers)?);
    Ok(class.methods.iter().map(|m| m.normalize(&info)).collect())
}

/// Extract all classes, logging and skipping classes that fail
pub fn extract_classes<'a, I>(
    classes: I,
    options: &ExtractOptions,
    readers: &AttributeReaders,
) -> Vec<MethodInfo>
where
    I: IntoIterator<Item = &'a JvmClass>,
{
    let mut methods = Vec::new();
    for class in classes {
        match extract_class(class, options, readers) {
            Ok(extracted) => methods.extend(extracted),
            Err(err) => warn!("Skipping class: {}", err),
        }
    }
    debug!("Extracted {} jvm methods", methods.len());
    methods
}
