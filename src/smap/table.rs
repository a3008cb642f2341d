use std::collections::BTreeMap;
use std::fmt;

/// Decoded `SourceDebugExtension` (JSR-045 SMAP)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRemapTable {
    pub generated_file: String,
    pub default_stratum: String,
    pub strata: BTreeMap<String, Stratum>,
}

/// One named coordinate system of a remap table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stratum {
    pub name: String,
    pub files: BTreeMap<u32, FileRef>,
    pub lines: Vec<LineMapping>, // Kept in payload order, first match wins
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileRef {
    pub name: String,
    pub path: Option<String>,
}

/// Maps the output lines
/// `[output_start, output_start + increment * repeat_count)` back to input
/// lines starting at `input_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineMapping {
    pub input_start: u32,
    pub file_id: u32,
    pub output_start: u32,
    pub repeat_count: u32,
    pub increment: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemappedLine {
    pub file: FileRef,
    pub line: u32,
}

impl LineRemapTable {
    /// Remap through the default stratum
    pub fn remap(&self, output_line: u32) -> Option<RemappedLine> {
        self.remap_in(&self.default_stratum, output_line)
    }

    pub fn remap_in(&self, stratum: &str, output_line: u32) -> Option<RemappedLine> {
        self.strata.get(stratum)?.remap(output_line)
    }
}

impl Stratum {
    pub fn remap(&self, output_line: u32) -> Option<RemappedLine> {
        let mapping = self.lines.iter().find(|m| m.contains(output_line))?;
        let file = self.files.get(&mapping.file_id)?;
        Some(RemappedLine {
            file: file.clone(),
            line: mapping.remap(output_line)?,
        })
    }
}

impl LineMapping {
    /// One past the last output line covered
    pub fn output_end(&self) -> u64 {
        u64::from(self.output_start) + u64::from(self.increment) * u64::from(self.repeat_count)
    }

    pub fn contains(&self, output_line: u32) -> bool {
        output_line >= self.output_start && u64::from(output_line) < self.output_end()
    }

    /// Input line of a covered output line, `None` if it does not fit in a `u32`
    pub fn remap(&self, output_line: u32) -> Option<u32> {
        let step = output_line.checked_sub(self.output_start)? / self.increment;
        self.input_start.checked_add(step)
    }
}

// Serialization back to the SMAP grammar. Optional fields are written only
// when they differ from their defaults, except for the file id which is
// always explicit.

impl fmt::Display for LineMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.input_start, self.file_id)?;
        if self.repeat_count != 1 {
            write!(f, ",{}", self.repeat_count)?;
        }
        write!(f, ":{}", self.output_start)?;
        if self.increment != 1 {
            write!(f, ",{}", self.increment)?;
        }
        Ok(())
    }
}

impl fmt::Display for Stratum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "*S {}", self.name)?;
        writeln!(f, "*F")?;
        for (id, file) in &self.files {
            match &file.path {
                Some(path) => writeln!(f, "+ {} {}\n{}", id, file.name, path)?,
                None => writeln!(f, "{} {}", id, file.name)?,
            }
        }
        writeln!(f, "*L")?;
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

impl fmt::Display for LineRemapTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SMAP")?;
        writeln!(f, "{}", self.generated_file)?;
        writeln!(f, "{}", self.default_stratum)?;
        for stratum in self.strata.values() {
            write!(f, "{}", stratum)?;
        }
        writeln!(f, "*E")
    }
}
