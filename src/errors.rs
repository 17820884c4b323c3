use std::io;
use thiserror::Error;

/// Errors that can occur while encoding, decoding, or preparing programs.
#[derive(Debug, Error)]
pub enum VmError {
    /// An instruction field value does not fit its declared bit width.
    #[error("{instruction}: field {field} value {value} does not fit in {width} bits")]
    FieldOutOfRange {
        instruction: &'static str,
        field: &'static str,
        value: i64,
        width: u32,
    },
    /// A byte that is not one of the recognized opcodes.
    #[error("unknown opcode {opcode} at offset {offset:#x}")]
    UnknownOpcode { opcode: u8, offset: usize },
    /// Fewer bytes remain than the declared instruction shape requires.
    #[error("unexpected end of image at offset {offset:#x}: needed {needed} bytes, {available} available")]
    UnexpectedEnd {
        offset: usize,
        needed: usize,
        available: usize,
    },
    /// A word access past the end of machine memory.
    #[error("memory access at {addr:#010x} crosses the end of memory ({size} bytes)")]
    MemoryFault { addr: u64, size: usize },
    /// Program image larger than machine memory.
    #[error("program image is {len} bytes but memory holds only {capacity}")]
    ProgramTooLarge { len: usize, capacity: usize },
    /// A program description entry omits a field its opcode requires.
    #[error("missing required field {field}")]
    MissingField { field: &'static str },
    /// A program description entry carries a field its opcode does not use.
    #[error("field {field} is not supported by opcode {opcode}")]
    UnexpectedField { field: &'static str, opcode: u8 },
    /// A program description field value cannot be represented at all.
    #[error("field {field} value {value} is out of range")]
    InvalidField { field: &'static str, value: i64 },
    /// A program description entry that failed to lower or encode.
    #[error("instruction {index}: {source}")]
    BadInstruction { index: usize, source: Box<VmError> },
    /// A program description with no instructions.
    #[error("program contains no instructions")]
    EmptyProgram,
    /// A program description that is not valid JSON.
    #[error("malformed program description: {0}")]
    MalformedSource(String),
    /// Dump range outside the machine's memory.
    #[error("invalid dump range {start:#x}..={end:#x} for {size} bytes of memory")]
    InvalidDumpRange {
        start: usize,
        end: usize,
        size: usize,
    },
    /// File I/O error while reading programs or writing reports.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
