//! Flat integer-array encoding of a method's debug tables, the shape
//! debugger test fixtures consume

use std::collections::HashMap;

use crate::model::MethodInfo;
use crate::smap::{FileRef, KOTLIN_DEBUG_STRATUM};

const MISSING_SOURCE: &str = "<missing source>";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatMethodInfo {
    pub name: String,
    pub source_names: Vec<String>,
    pub source_paths: Vec<Option<String>>, // Parallel to `source_names`
    pub variable_names: Vec<String>,       // `name:descriptor`
    /// 4 per line: offset, output line, remapped line, source index
    pub all_line_locations: Vec<u32>,
    /// 4 per local: start, length, slot, variable name index
    pub local_variable_table: Vec<u32>,
    /// 3 per inlined line: line table index, call site line, source index
    pub kotlin_debug_segment: Vec<u32>,
}

/// Assigns increasing indices to values in order of first use
struct Interner<K> {
    indices: HashMap<K, u32>,
}

impl<K: std::hash::Hash + Eq + Clone> Interner<K> {
    fn new() -> Self {
        Self {
            indices: HashMap::new(),
        }
    }

    /// Index of `key`, and whether it was seen for the first time
    fn intern(&mut self, key: &K) -> (u32, bool) {
        if let Some(&index) = self.indices.get(key) {
            return (index, false);
        }
        let index = self.indices.len() as u32;
        self.indices.insert(key.clone(), index);
        (index, true)
    }
}

impl FlatMethodInfo {
    pub fn from_method(method: &MethodInfo) -> Self {
        let class = &method.class;
        let remap = class.line_remap.as_ref();
        let declared = FileRef {
            name: class
                .source_file
                .clone()
                .unwrap_or_else(|| MISSING_SOURCE.to_string()),
            path: None,
        };

        let mut flat = FlatMethodInfo {
            name: method.name.clone(),
            ..Self::default()
        };
        let mut sources = Interner::new();
        let mut source_index = |flat: &mut FlatMethodInfo, file: &FileRef| {
            let (index, fresh) = sources.intern(file);
            if fresh {
                flat.source_names.push(file.name.clone());
                flat.source_paths.push(file.path.clone());
            }
            index
        };

        for location in &method.line_table {
            flat.all_line_locations.push(location.offset);
            flat.all_line_locations.push(location.line);
            // Lines outside the SMAP belong to the declared source file
            let (line, index) = match remap.and_then(|r| r.remap(location.line)) {
                Some(remapped) => (remapped.line, source_index(&mut flat, &remapped.file)),
                None => (location.line, source_index(&mut flat, &declared)),
            };
            flat.all_line_locations.push(line);
            flat.all_line_locations.push(index);
        }

        let mut variables = Interner::new();
        for local in &method.local_variables {
            let key = format!("{}:{}", local.name, local.descriptor);
            let (index, fresh) = variables.intern(&key);
            if fresh {
                flat.variable_names.push(key);
            }
            flat.local_variable_table
                .extend([local.start, local.length, local.slot, index]);
        }

        for (i, location) in method.line_table.iter().enumerate() {
            let Some(call_site) =
                remap.and_then(|r| r.remap_in(KOTLIN_DEBUG_STRATUM, location.line))
            else {
                continue;
            };
            let index = source_index(&mut flat, &call_site.file);
            flat.kotlin_debug_segment
                .extend([i as u32, call_site.line, index]);
        }

        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassInfo, LocalVariable, Location};
    use crate::smap::parse_smap;
    use std::sync::Arc;

    const SMAP: &str = "SMAP
Foo.kt
Kotlin
*S Kotlin
*F
+ 1 Foo.kt
foo/Foo.kt
+ 2 Inline.kt
foo/Inline.kt
*L
1#1,10:1
3#2,2:11
*E
*S KotlinDebug
*F
+ 1 Foo.kt
foo/Foo.kt
*L
5#1:11,2
*E
";

    fn method(source_file: Option<&str>, smap: Option<&str>) -> MethodInfo {
        let class = ClassInfo {
            name: "foo.FooKt".to_string(),
            source_file: source_file.map(str::to_string),
            line_remap: smap.map(|s| parse_smap(s.as_bytes()).unwrap()),
        };
        MethodInfo {
            name: "main".to_string(),
            descriptor: "()V".to_string(),
            flags: 9,
            line_table: vec![
                Location { offset: 0, line: 4 },
                Location { offset: 3, line: 12 },
                Location { offset: 6, line: 40 },
            ],
            local_variables: vec![
                LocalVariable {
                    start: 0,
                    length: 9,
                    name: "x".to_string(),
                    descriptor: "I".to_string(),
                    slot: 0,
                },
                LocalVariable {
                    start: 3,
                    length: 2,
                    name: "x".to_string(),
                    descriptor: "I".to_string(),
                    slot: 1,
                },
            ],
            class: Arc::new(class),
        }
    }

    #[test]
    fn remapped_lines_and_call_sites() {
        let flat = FlatMethodInfo::from_method(&method(Some("Foo.kt"), Some(SMAP)));
        assert_eq!(flat.source_names, vec!["Foo.kt", "Inline.kt", "Foo.kt"]);
        assert_eq!(
            flat.source_paths,
            vec![
                Some("foo/Foo.kt".to_string()),
                Some("foo/Inline.kt".to_string()),
                None,
            ]
        );
        assert_eq!(flat.all_line_locations, vec![0, 4, 4, 0, 3, 12, 4, 1, 6, 40, 40, 2]);
        assert_eq!(flat.variable_names, vec!["x:I"]);
        assert_eq!(flat.local_variable_table, vec![0, 9, 0, 0, 3, 2, 1, 0]);
        assert_eq!(flat.kotlin_debug_segment, vec![1, 5, 0]);
    }

    #[test]
    fn without_smap_lines_keep_the_declared_source() {
        let flat = FlatMethodInfo::from_method(&method(None, None));
        assert_eq!(flat.source_names, vec![MISSING_SOURCE]);
        assert_eq!(flat.all_line_locations, vec![0, 4, 4, 0, 3, 12, 12, 0, 6, 40, 40, 0]);
        assert!(flat.kotlin_debug_segment.is_empty());
    }
}
