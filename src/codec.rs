//! Binary instruction codec.
//!
//! Pure, stateless translation between [`Instruction`] values and their
//! fixed-size wire forms, and back. Safe to call concurrently; no machine
//! state is involved.
//!
//! # Wire Layouts
//!
//! The opcode (A) always occupies the low 7 bits of byte 0; bit 7 of byte 0
//! holds the most significant bit of the following field. Bit ranges are
//! written high:low.
//!
//! LOAD_CONST, 6 bytes, fields B(7) C(28):
//! - byte0: bit7 = B\[6\], bits6:0 = A
//! - byte1: bits7:6 = C\[27:26\], bits5:0 = B\[5:0\]
//! - byte2: bits1:0 = C\[25:24\], bits7:2 reserved
//! - byte3: C\[23:16\]; byte4: C\[15:8\]; byte5: C\[7:0\]
//!
//! MEM_READ / MEM_WRITE, 3 bytes, fields B(7) C(7):
//! - byte0: bit7 = B\[6\], bits6:0 = A
//! - byte1: bits7:6 = C\[6:5\], bits5:0 = B\[5:0\]
//! - byte2: bits4:0 = C\[4:0\], bits7:5 reserved
//!
//! NEG_STORE, 4 bytes, fields B(6) C(7) D(7):
//! - byte0: bit7 = B\[5\], bits6:0 = A
//! - byte1: bits7:5 = C\[6:4\], bits4:0 = B\[4:0\]
//! - byte2: bits7:4 = D\[6:3\], bits3:0 = C\[3:0\]
//! - byte3: bits2:0 = D\[2:0\], bits7:3 reserved
//!
//! Reserved bits are written as zero and ignored on decode. Every field is
//! range-checked against its declared width before any byte is produced; the
//! 28-bit constant is the one field whose overflow handling is a policy
//! choice (see [`ConstantPolicy`]).

use crate::bits::{BitReader, BitWriter};
use crate::errors::VmError;
use crate::isa::{Instruction, Opcode};
use crate::warn;

/// Bit width of the opcode field (A).
pub const OPCODE_BITS: u32 = 7;
/// Bit width of a register index field.
pub const REG_BITS: u32 = 7;
/// Bit width of the NEG_STORE offset field.
pub const OFFSET_BITS: u32 = 6;
/// Bit width of the LOAD_CONST constant field.
pub const CONST_BITS: u32 = 28;

/// Mask selecting the low 28 bits of a constant.
const CONST_MASK: u32 = (1 << CONST_BITS) - 1;

/// How the encoder treats LOAD_CONST constants wider than 28 bits.
///
/// The wire format cannot carry more than 28 constant bits, but program
/// sources in the wild hold full 32-bit two's-complement literals. Masking
/// them to 28 bits does not round-trip through a 32-bit register, so the
/// strict policy rejects them; the legacy policy keeps the historical
/// warn-and-mask behavior for compatibility with existing images.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ConstantPolicy {
    /// Reject constants that do not fit 28 bits.
    #[default]
    Reject,
    /// Mask constants to their low 28 bits, logging a warning.
    Truncate,
}

/// Encodes `instr` and appends its wire form to `out`.
///
/// Fields are validated before anything is written; on error `out` is left
/// untouched. Reserved bits are written as zero.
pub fn encode_into(
    instr: &Instruction,
    out: &mut Vec<u8>,
    policy: ConstantPolicy,
) -> Result<(), VmError> {
    match *instr {
        Instruction::LoadConst { dest_reg, value } => {
            let name = Opcode::LoadConst.mnemonic();
            let b = field(name, "dest_reg", i64::from(dest_reg), REG_BITS)?;
            let c = constant(value, policy)?;
            let mut w = BitWriter::new(grow(out, Opcode::LoadConst.wire_size()));
            w.write(1, OPCODE_BITS, u32::from(Opcode::LoadConst.code()));
            w.write(0, 1, b >> 6);
            w.write(10, 6, b & 0x3F);
            w.write(8, 2, c >> 26);
            w.write(22, 2, (c >> 24) & 0x03);
            w.write(24, 24, c & 0xFF_FFFF);
        }
        Instruction::MemRead { dest_reg, addr_reg } => {
            encode_reg_pair(Opcode::MemRead, "dest_reg", dest_reg, addr_reg, out)?;
        }
        Instruction::MemWrite { src_reg, addr_reg } => {
            encode_reg_pair(Opcode::MemWrite, "src_reg", src_reg, addr_reg, out)?;
        }
        Instruction::NegStore {
            offset,
            base_reg,
            src_reg,
        } => {
            let name = Opcode::NegStore.mnemonic();
            let b = field(name, "offset", i64::from(offset), OFFSET_BITS)?;
            let c = field(name, "base_reg", i64::from(base_reg), REG_BITS)?;
            let d = field(name, "src_reg", i64::from(src_reg), REG_BITS)?;
            let mut w = BitWriter::new(grow(out, Opcode::NegStore.wire_size()));
            w.write(1, OPCODE_BITS, u32::from(Opcode::NegStore.code()));
            w.write(0, 1, b >> 5);
            w.write(11, 5, b & 0x1F);
            w.write(8, 3, c >> 4);
            w.write(20, 4, c & 0x0F);
            w.write(16, 4, d >> 3);
            w.write(29, 3, d & 0x07);
        }
    }
    Ok(())
}

/// Encodes a single instruction into a fresh buffer.
pub fn encode(instr: &Instruction, policy: ConstantPolicy) -> Result<Vec<u8>, VmError> {
    let mut out = Vec::with_capacity(instr.wire_size());
    encode_into(instr, &mut out, policy)?;
    Ok(out)
}

/// Encodes an instruction sequence into a program image.
///
/// The image is the raw concatenation of wire forms, in order, with no
/// header and no padding. Errors are reported with the index of the
/// offending instruction.
pub fn encode_program(
    instructions: &[Instruction],
    policy: ConstantPolicy,
) -> Result<Vec<u8>, VmError> {
    let mut image = Vec::with_capacity(instructions.len() * 4);
    for (index, instr) in instructions.iter().enumerate() {
        encode_into(instr, &mut image, policy).map_err(|source| VmError::BadInstruction {
            index,
            source: Box::new(source),
        })?;
    }
    Ok(image)
}

/// Decodes the instruction at the start of `window`.
///
/// Only byte 0 is consulted to learn the opcode and the required size; the
/// window length is then re-checked before the remaining bytes are consumed.
/// Trailing bytes beyond the shape's size are ignored, as are reserved bits.
/// Returns the instruction together with its wire size. Errors carry offset
/// 0; callers anchored in a larger buffer re-attach their own offsets.
pub fn decode(window: &[u8]) -> Result<(Instruction, usize), VmError> {
    if window.is_empty() {
        return Err(VmError::UnexpectedEnd {
            offset: 0,
            needed: 1,
            available: 0,
        });
    }

    let opcode = Opcode::try_from(window[0] & 0x7F)?;
    let size = opcode.wire_size();
    if window.len() < size {
        return Err(VmError::UnexpectedEnd {
            offset: 0,
            needed: size,
            available: window.len(),
        });
    }

    let r = BitReader::new(&window[..size]);
    let instr = match opcode {
        Opcode::LoadConst => Instruction::LoadConst {
            dest_reg: ((r.read(0, 1) << 6) | r.read(10, 6)) as u8,
            value: (r.read(8, 2) << 26) | (r.read(22, 2) << 24) | r.read(24, 24),
        },
        Opcode::MemRead => {
            let (b, c) = read_reg_pair(&r);
            Instruction::MemRead {
                dest_reg: b,
                addr_reg: c,
            }
        }
        Opcode::MemWrite => {
            let (b, c) = read_reg_pair(&r);
            Instruction::MemWrite {
                src_reg: b,
                addr_reg: c,
            }
        }
        Opcode::NegStore => Instruction::NegStore {
            offset: ((r.read(0, 1) << 5) | r.read(11, 5)) as u8,
            base_reg: ((r.read(8, 3) << 4) | r.read(20, 4)) as u8,
            src_reg: ((r.read(16, 4) << 3) | r.read(29, 3)) as u8,
        },
    };
    Ok((instr, size))
}

/// Encodes the shared three-byte layout of MEM_READ and MEM_WRITE.
fn encode_reg_pair(
    opcode: Opcode,
    b_name: &'static str,
    b: u8,
    c: u8,
    out: &mut Vec<u8>,
) -> Result<(), VmError> {
    let b = field(opcode.mnemonic(), b_name, i64::from(b), REG_BITS)?;
    let c = field(opcode.mnemonic(), "addr_reg", i64::from(c), REG_BITS)?;
    let mut w = BitWriter::new(grow(out, opcode.wire_size()));
    w.write(1, OPCODE_BITS, u32::from(opcode.code()));
    w.write(0, 1, b >> 6);
    w.write(10, 6, b & 0x3F);
    w.write(8, 2, c >> 5);
    w.write(19, 5, c & 0x1F);
    Ok(())
}

/// Reads the two register fields of the shared three-byte layout.
fn read_reg_pair(r: &BitReader<'_>) -> (u8, u8) {
    let b = ((r.read(0, 1) << 6) | r.read(10, 6)) as u8;
    let c = ((r.read(8, 2) << 5) | r.read(19, 5)) as u8;
    (b, c)
}

/// Appends `size` zero bytes to `out` and returns the new window.
fn grow(out: &mut Vec<u8>, size: usize) -> &mut [u8] {
    let start = out.len();
    out.resize(start + size, 0);
    &mut out[start..]
}

/// Checks that `value` fits in `width` bits.
fn field(
    instruction: &'static str,
    field: &'static str,
    value: i64,
    width: u32,
) -> Result<u32, VmError> {
    if (0..1i64 << width).contains(&value) {
        Ok(value as u32)
    } else {
        Err(VmError::FieldOutOfRange {
            instruction,
            field,
            value,
            width,
        })
    }
}

/// Applies the constant policy to a LOAD_CONST value.
fn constant(value: u32, policy: ConstantPolicy) -> Result<u32, VmError> {
    let masked = value & CONST_MASK;
    if masked == value {
        return Ok(value);
    }
    match policy {
        ConstantPolicy::Reject => Err(VmError::FieldOutOfRange {
            instruction: Opcode::LoadConst.mnemonic(),
            field: "value",
            value: i64::from(value),
            width: CONST_BITS,
        }),
        ConstantPolicy::Truncate => {
            warn!("LOAD_CONST constant {value:#x} masked to {masked:#x} (28 bits)");
            Ok(masked)
        }
    }
}
