use num_enum::TryFromPrimitive;

/// Opcodes of the `debug_info_item` state machine. Bytes from
/// `FIRST_SPECIAL` upwards are special opcodes that advance the address and
/// line registers at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum DebugOpcode {
    EndSequence = 0x00,
    AdvancePc = 0x01,
    AdvanceLine = 0x02,
    StartLocal = 0x03,
    StartLocalExtended = 0x04,
    EndLocal = 0x05,
    RestartLocal = 0x06,
    SetPrologueEnd = 0x07,
    SetEpilogueBegin = 0x08,
    SetFile = 0x09,
}

pub const FIRST_SPECIAL: u8 = 0x0a;
pub const LINE_BASE: i32 = -4;
pub const LINE_RANGE: u8 = 15;

/// Name, type and generic signature of a local
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInfo {
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
}

/// One decoded debug event, `offset` in code units
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    StartLocal {
        register: u32,
        local: LocalInfo,
        offset: u32,
    },
    RestartLocal {
        register: u32,
        local: LocalInfo,
        offset: u32,
    },
    EndLocal { register: u32, offset: u32 },
    LineNumber { line: u32, offset: u32 },
    PrologueEnd { offset: u32 },
    EpilogueBegin { offset: u32 },
    SetSourceFile { name: Option<String>, offset: u32 },
}

impl DebugEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DebugEvent::StartLocal { .. } => "StartLocal",
            DebugEvent::RestartLocal { .. } => "RestartLocal",
            DebugEvent::EndLocal { .. } => "EndLocal",
            DebugEvent::LineNumber { .. } => "LineNumber",
            DebugEvent::PrologueEnd { .. } => "PrologueEnd",
            DebugEvent::EpilogueBegin { .. } => "EpilogueBegin",
            DebugEvent::SetSourceFile { .. } => "SetSourceFile",
        }
    }
}

/// Decoded `debug_info_item` of one method
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugInfo {
    pub line_start: u32,
    pub parameter_names: Vec<Option<String>>, // None for unnamed parameters
    pub events: Vec<DebugEvent>,
}
