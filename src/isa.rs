//! Instruction Set Architecture (ISA) definitions.
//!
//! Defines the machine's instruction set. The [`for_each_opcode!`](crate::for_each_opcode)
//! macro holds the canonical opcode table and invokes a callback macro for
//! code generation, so the codec and the engine derive opcode-related code
//! from a single definition list.
//!
//! This module generates:
//! - The [`Opcode`] enum with code, mnemonic, and wire-size mappings
//! - `TryFrom<u8>` for recognizing opcode bytes
//!
//! # Wire Format
//!
//! Instructions use fixed-size encodings of 3, 4, or 6 bytes. The opcode
//! always occupies the low 7 bits of the first byte; the remaining fields are
//! bit-packed across the rest of the window (see [`codec`](crate::codec) for
//! the exact layouts).

use crate::errors::VmError;

/// Invokes a callback macro with the complete opcode definition list.
///
/// Each entry carries the variant name, opcode value, assembly mnemonic, and
/// the fixed wire size of the instruction in bytes.
#[macro_export]
macro_rules! for_each_opcode {
    ($callback:ident) => {
        $callback! {
            /// LOAD_CONST rd, imm ; rd = imm (28-bit constant, zero-extended)
            LoadConst = 72, "LOAD_CONST", 6,
            /// MEM_READ rd, ra ; rd = mem[ra] (32-bit little-endian load)
            MemRead = 113, "MEM_READ", 3,
            /// MEM_WRITE rs, ra ; mem[ra] = rs (32-bit little-endian store)
            MemWrite = 8, "MEM_WRITE", 3,
            /// NEG_STORE off, rb, rs ; mem[rb + off] = -rs (two's complement)
            NegStore = 91, "NEG_STORE", 4,
        }
    };
}

#[macro_export]
macro_rules! define_opcodes {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $code:expr, $mnemonic:literal, $size:expr
        ),* $(,)?
    ) => {
        /// Operation selector stored in the low 7 bits of an instruction's
        /// first byte.
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $code,
            )*
        }

        impl TryFrom<u8> for Opcode {
            type Error = VmError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $code => Ok(Opcode::$name), )*
                    _ => Err(VmError::UnknownOpcode {
                        opcode: value,
                        offset: 0,
                    }),
                }
            }
        }

        impl Opcode {
            /// Returns the assembly mnemonic for this opcode.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Returns the fixed encoded size of this shape in bytes.
            pub const fn wire_size(&self) -> usize {
                match self {
                    $( Opcode::$name => $size, )*
                }
            }

            /// Returns the opcode byte value.
            pub const fn code(&self) -> u8 {
                *self as u8
            }
        }
    };
}

for_each_opcode!(define_opcodes);

/// A decoded instruction, one variant per wire shape.
///
/// Each variant carries only the fields its shape defines, so "field D is
/// only valid for the four-byte shape" is a compile-time distinction rather
/// than a runtime presence check. Field values are narrower than their Rust
/// carrier types; the codec enforces the declared widths at encode time and
/// can never produce out-of-width values when decoding.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Instruction {
    /// Load a 28-bit constant into a register.
    LoadConst { dest_reg: u8, value: u32 },
    /// Read the 32-bit word addressed by `addr_reg` into `dest_reg`.
    MemRead { dest_reg: u8, addr_reg: u8 },
    /// Write the 32-bit word in `src_reg` to the address in `addr_reg`.
    MemWrite { src_reg: u8, addr_reg: u8 },
    /// Negate `src_reg` and store the result at `base_reg + offset`.
    NegStore {
        offset: u8,
        base_reg: u8,
        src_reg: u8,
    },
}

impl Instruction {
    /// Returns the opcode of this instruction's shape.
    pub const fn opcode(&self) -> Opcode {
        match self {
            Instruction::LoadConst { .. } => Opcode::LoadConst,
            Instruction::MemRead { .. } => Opcode::MemRead,
            Instruction::MemWrite { .. } => Opcode::MemWrite,
            Instruction::NegStore { .. } => Opcode::NegStore,
        }
    }

    /// Returns the fixed encoded size of this instruction in bytes.
    pub const fn wire_size(&self) -> usize {
        self.opcode().wire_size()
    }
}
