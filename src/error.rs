use thiserror::Error;

/// Malformed `SMAP` payload
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("incorrect SMAP header: {0:?}")]
    BadHeader(String),

    #[error("duplicate stratum {0:?}")]
    DuplicateStratum(String),

    #[error("unsupported section *{section} in stratum {stratum:?}")]
    UnsupportedSection { stratum: String, section: char },

    #[error("missing *E trailer")]
    MissingTrailer,

    #[error("expected {what} at byte {offset}")]
    Expected { what: &'static str, offset: usize },

    #[error("line mapping at byte {offset} is empty or overflows its input lines")]
    InvalidMapping { offset: usize },

    #[error("stratum {stratum:?} maps lines to undeclared file id {file_id}")]
    UnknownFileId { stratum: String, file_id: u32 },
}

/// Impossible debug event order in a register-machine method
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconstructionError {
    #[error("register v{register} is undefined at {offset:#x}")]
    UndefinedRegister { register: u32, offset: u32 },

    #[error("unsupported debug event {kind} at {offset:#x}")]
    UnsupportedEvent { kind: &'static str, offset: u32 },

    #[error("register v{register} is outside the frame of {count} registers")]
    RegisterOutOfRange { register: u32, count: u32 },

    #[error("{ins} parameter registers do not fit in a frame of {count} registers")]
    ParameterWindow { ins: u32, count: u32 },

    #[error("register v{register} ends at {end:#x} before it starts at {start:#x}")]
    NegativeRange {
        register: u32,
        start: u32,
        end: u32,
    },
}

/// Malformed dex `debug_info_item`
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DebugInfoError {
    #[error("truncated debug info at byte {offset}")]
    Truncated { offset: usize },

    #[error("string index {0} out of range")]
    StringIndex(u32),

    #[error("type index {0} out of range")]
    TypeIndex(u32),

    #[error("local started in v{register} at {offset:#x} has no {what}")]
    Unnamed {
        register: u32,
        offset: u32,
        what: &'static str,
    },

    #[error("line or address overflow at {offset:#x}")]
    Overflow { offset: u32 },

    #[error("restart of v{register} at {offset:#x} which never held a local")]
    RestartWithoutStart { register: u32, offset: u32 },
}

/// Failure to extract one class or one method
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("class {class}: {source}")]
    Format {
        class: String,
        #[source]
        source: FormatError,
    },

    #[error("method {method}: {source}")]
    Reconstruction {
        method: String,
        #[source]
        source: ReconstructionError,
    },

    #[error("method {method}: {source}")]
    DebugInfo {
        method: String,
        #[source]
        source: DebugInfoError,
    },
}
