//! JSON program descriptions.
//!
//! Programs are authored as a JSON mapping with an ordered `instructions`
//! list; each entry names an opcode and the fields its shape uses. This
//! layer owns field presence and type validation, so the codec only ever
//! sees typed [`Instruction`] values.
//!
//! ```json
//! {
//!     "name": "negate",
//!     "instructions": [
//!         { "opcode": 72, "field_b": 1, "field_c": 100 },
//!         { "opcode": 72, "field_b": 2, "field_c": 1536 },
//!         { "opcode": 91, "field_b": 0, "field_c": 2, "field_d": 1 }
//!     ]
//! }
//! ```

use crate::codec::{self, ConstantPolicy};
use crate::errors::VmError;
use crate::isa::{Instruction, Opcode};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// One entry of the `instructions` list.
///
/// Fields B and C default to zero when omitted. Field D is only meaningful
/// for the four-byte shape (opcode 91); it is required there and rejected
/// everywhere else.
#[derive(Clone, Debug, Deserialize)]
pub struct SourceInstruction {
    pub opcode: u8,
    #[serde(default)]
    pub field_b: i64,
    #[serde(default)]
    pub field_c: i64,
    #[serde(default)]
    pub field_d: Option<i64>,
}

/// A parsed program description.
#[derive(Clone, Debug, Deserialize)]
pub struct ProgramSource {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub instructions: Vec<SourceInstruction>,
}

impl ProgramSource {
    /// Parses a program description from JSON text.
    pub fn from_json(text: &str) -> Result<Self, VmError> {
        serde_json::from_str(text).map_err(|e| VmError::MalformedSource(e.to_string()))
    }

    /// Reads and parses a program description file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, VmError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Lowers the description to instruction values.
    ///
    /// Errors are reported with the index of the offending entry.
    pub fn build(&self) -> Result<Vec<Instruction>, VmError> {
        if self.instructions.is_empty() {
            return Err(VmError::EmptyProgram);
        }
        self.instructions
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                lower(entry).map_err(|source| VmError::BadInstruction {
                    index,
                    source: Box::new(source),
                })
            })
            .collect()
    }

    /// Lowers the description and encodes it into a program image.
    pub fn assemble(&self, policy: ConstantPolicy) -> Result<Vec<u8>, VmError> {
        codec::encode_program(&self.build()?, policy)
    }
}

/// Lowers one description entry to a typed instruction.
fn lower(entry: &SourceInstruction) -> Result<Instruction, VmError> {
    let opcode = Opcode::try_from(entry.opcode)?;
    if opcode != Opcode::NegStore && entry.field_d.is_some() {
        return Err(VmError::UnexpectedField {
            field: "field_d",
            opcode: entry.opcode,
        });
    }

    match opcode {
        Opcode::LoadConst => Ok(Instruction::LoadConst {
            dest_reg: narrow("field_b", entry.field_b)?,
            value: constant("field_c", entry.field_c)?,
        }),
        Opcode::MemRead => Ok(Instruction::MemRead {
            dest_reg: narrow("field_b", entry.field_b)?,
            addr_reg: narrow("field_c", entry.field_c)?,
        }),
        Opcode::MemWrite => Ok(Instruction::MemWrite {
            src_reg: narrow("field_b", entry.field_b)?,
            addr_reg: narrow("field_c", entry.field_c)?,
        }),
        Opcode::NegStore => {
            let field_d = entry.field_d.ok_or(VmError::MissingField {
                field: "field_d",
            })?;
            Ok(Instruction::NegStore {
                offset: narrow("field_b", entry.field_b)?,
                base_reg: narrow("field_c", entry.field_c)?,
                src_reg: narrow("field_d", field_d)?,
            })
        }
    }
}

/// Narrows a description value into a register/offset carrier byte.
///
/// Only the carrier range is checked here; the exact bit widths are enforced
/// by the codec at encode time.
fn narrow(field: &'static str, value: i64) -> Result<u8, VmError> {
    u8::try_from(value).map_err(|_| VmError::InvalidField { field, value })
}

/// Converts a description constant into its 32-bit register image.
///
/// Negative literals are taken as 32-bit two's complement; whether the
/// wrapped value fits the 28-bit wire field is the encoder's policy call.
fn constant(field: &'static str, value: i64) -> Result<u32, VmError> {
    if (0..=i64::from(u32::MAX)).contains(&value) {
        Ok(value as u32)
    } else if (i64::from(i32::MIN)..0).contains(&value) {
        Ok(value as i32 as u32)
    } else {
        Err(VmError::InvalidField { field, value })
    }
}

/// Renders a program image as the `0xXX, 0xXX, ...` listing used by the
/// machine's reference documents.
pub fn hex_listing(image: &[u8]) -> String {
    image
        .iter()
        .map(|b| format!("{b:#04X}"))
        .collect::<Vec<_>>()
        .join(", ")
}
