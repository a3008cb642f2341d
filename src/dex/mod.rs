//! Register-machine (dex) side: debug info decoding and local reconstruction

pub mod debug;
pub mod locals;
pub mod parsers;

use std::sync::Arc;

use crate::error::ExtractError;
use crate::model::{ClassInfo, Location, MethodInfo};
use crate::smap::parse_smap;
use crate::{ExtractOptions, KOTLIN_METADATA};
use self::debug::{DebugEvent, DebugInfo};
use self::locals::{Frame, Parameter, reconstruct_locals};
use log::{debug, trace, warn};

pub use self::locals::type_size;

pub const SOURCE_DEBUG_EXTENSION_TYPE: &str = "Ldalvik/annotation/SourceDebugExtension;";
pub const ACC_STATIC: u32 = 0x0008;

/// An annotation reduced to its single string element, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexAnnotation {
    pub type_descriptor: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DexClass {
    pub type_descriptor: String, // e.g. `Lfoo/Bar;`
    pub source_file: Option<String>,
    pub annotations: Vec<DexAnnotation>,
    pub methods: Vec<DexMethod>,
}

#[derive(Debug, Clone)]
pub struct DexMethod {
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub return_type: String,
    pub access_flags: u32,
    pub code: Option<DexCode>,
}

/// The parts of a `code_item` this crate needs
#[derive(Debug, Clone)]
pub struct DexCode {
    pub register_count: u32,
    pub insns_size: u32, // Sum of the sizes of all instructions, in code units
    pub debug_info: Option<DebugInfo>,
}

impl DexClass {
    /// Qualified name, `Lfoo/Bar$Baz;` becomes `foo.Bar$Baz`
    pub fn name(&self) -> String {
        self.type_descriptor
            .strip_prefix('L')
            .and_then(|s| s.strip_suffix(';'))
            .unwrap_or(&self.type_descriptor)
            .replace('/', ".")
    }

    fn annotation(&self, type_descriptor: &str) -> Option<&DexAnnotation> {
        self.annotations
            .iter()
            .find(|a| a.type_descriptor == type_descriptor)
    }

    pub fn is_kotlin(&self) -> bool {
        self.annotation(KOTLIN_METADATA).is_some()
    }

    /// Build the shared class info, parsing the SMAP carried in the
    /// `SourceDebugExtension` annotation
    pub fn class_info(&self) -> Result<ClassInfo, ExtractError> {
        let name = self.name();
        let line_remap = self
            .annotation(SOURCE_DEBUG_EXTENSION_TYPE)
            .and_then(|a| a.value.as_deref())
            .map(|smap| parse_smap(smap.as_bytes()))
            .transpose()
            .map_err(|source| ExtractError::Format {
                class: name.clone(),
                source,
            })?;
        Ok(ClassInfo {
            name,
            source_file: self.source_file.clone(),
            line_remap,
        })
    }
}

impl DexMethod {
    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    /// Method descriptor in JVM form, e.g. `(IJ)V`
    pub fn descriptor(&self) -> String {
        let parameters: String = self.parameters.iter().map(|p| p.descriptor.as_str()).collect();
        format!("({}){}", parameters, self.return_type)
    }

    /// Parameters with names filled in from the debug info header
    fn named_parameters(&self, debug_info: &DebugInfo) -> Vec<Parameter> {
        self.parameters
            .iter()
            .enumerate()
            .map(|(i, p)| Parameter {
                name: p
                    .name
                    .clone()
                    .or_else(|| debug_info.parameter_names.get(i).cloned().flatten()),
                ..p.clone()
            })
            .collect()
    }

    /// Build the method info, reconstructing its local variable table
    pub fn extract(
        &self,
        class: &Arc<ClassInfo>,
        defining_class: &str,
    ) -> Result<MethodInfo, ExtractError> {
        let descriptor = self.descriptor();
        let mut info = MethodInfo {
            name: self.name.clone(),
            descriptor,
            flags: self.access_flags,
            line_table: Vec::new(),
            local_variables: Vec::new(),
            class: Arc::clone(class),
        };
        let Some(code) = &self.code else {
            return Ok(info);
        };
        let Some(debug_info) = &code.debug_info else {
            trace!("{}.{} has no debug info", class.name, self.name);
            return Ok(info);
        };

        info.line_table = line_table(&debug_info.events);

        let parameters = self.named_parameters(debug_info);
        let frame = Frame {
            register_count: code.register_count,
            receiver: (!self.is_static()).then_some(defining_class),
            parameters: &parameters,
            insns_size: code.insns_size,
        };
        info.local_variables = reconstruct_locals(&frame, &debug_info.events).map_err(|source| {
            ExtractError::Reconstruction {
                method: format!("{}.{}{}", class.name, info.name, info.descriptor),
                source,
            }
        })?;
        Ok(info)
    }
}

/// Line table from the position events of a debug info stream
pub fn line_table(events: &[DebugEvent]) -> Vec<Location> {
    events
        .iter()
        .filter_map(|event| match event {
            DebugEvent::LineNumber { line, offset } => Some(Location {
                offset: *offset,
                line: *line,
            }),
            _ => None,
        })
        .collect()
}

/// Extract every method of one class, failing on the first error
pub fn extract_class(
    class: &DexClass,
    options: &ExtractOptions,
) -> Result<Vec<MethodInfo>, ExtractError> {
    if options.kotlin_only && !class.is_kotlin() {
        trace!("Skipping non-Kotlin class {}", class.type_descriptor);
        return Ok(Vec::new());
    }
    let info = Arc::new(class.class_info()?);
    class
        .methods
        .iter()
        .map(|method| method.extract(&info, &class.type_descriptor))
        .collect()
}

/// Extract all classes, logging and skipping classes and methods that fail
pub fn extract_classes<'a, I>(classes: I, options: &ExtractOptions) -> Vec<MethodInfo>
where
    I: IntoIterator<Item = &'a DexClass>,
{
    let mut methods = Vec::new();
    for class in classes {
        if options.kotlin_only && !class.is_kotlin() {
            continue;
        }
        let info = match class.class_info() {
            Ok(info) => Arc::new(info),
            Err(err) => {
                warn!("Skipping dex class: {}", err);
                continue;
            }
        };
        for method in &class.methods {
            match method.extract(&info, &class.type_descriptor) {
                Ok(method) => methods.push(method),
                Err(err) => warn!("Skipping dex method: {}", err),
            }
        }
    }
    debug!("Extracted {} dex methods", methods.len());
    methods
}
