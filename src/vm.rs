//! Execution engine.
//!
//! [`Machine`] owns the register file, flat memory, and program counter for a
//! single run. The loop asks the codec for the instruction at the program
//! counter, executes it, advances by the instruction's wire size, and stops
//! at the first halt condition. The program counter only ever moves forward;
//! there is no control flow.
//!
//! Every memory access is bounds-checked before anything is mutated, so a
//! faulting instruction has no partial side effects.

use crate::codec;
use crate::errors::VmError;
use crate::isa::Instruction;
use std::fmt::Display;

/// Number of registers in the file (register fields are 7 bits wide).
pub const REGISTER_COUNT: usize = 128;
/// Default machine memory size in bytes.
pub const DEFAULT_MEMORY_SIZE: usize = 1024 * 1024;
/// Default executed-instruction budget for one run.
pub const DEFAULT_INSTRUCTION_LIMIT: u64 = 10_000;
/// Width in bytes of every memory access.
const WORD_SIZE: usize = 4;

/// Why a run stopped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HaltReason {
    /// The program counter ran past the end of memory.
    EndOfProgram,
    /// The byte at the program counter is not a recognized opcode. The
    /// counter is left pointing at the offending byte.
    UnknownOpcode { opcode: u8, offset: usize },
    /// A recognized opcode with fewer bytes remaining than its shape needs.
    TruncatedInstruction {
        offset: usize,
        needed: usize,
        available: usize,
    },
    /// A word access crossed the end of memory.
    MemoryFault { addr: u64 },
    /// The executed-instruction budget was spent. A safety stop, not a
    /// fault.
    InstructionLimit,
}

impl HaltReason {
    /// True for genuine faults, false for ordinary termination and the
    /// safety cap.
    pub const fn is_fault(&self) -> bool {
        matches!(self, HaltReason::MemoryFault { .. })
    }
}

impl Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltReason::EndOfProgram => write!(f, "end of program"),
            HaltReason::UnknownOpcode { opcode, offset } => {
                write!(f, "unknown opcode {opcode} at {offset:#x}")
            }
            HaltReason::TruncatedInstruction {
                offset,
                needed,
                available,
            } => write!(
                f,
                "truncated instruction at {offset:#x}: needed {needed} bytes, {available} available"
            ),
            HaltReason::MemoryFault { addr } => write!(f, "memory fault at {addr:#010x}"),
            HaltReason::InstructionLimit => write!(f, "instruction limit reached"),
        }
    }
}

/// Result of driving a machine to a halt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RunSummary {
    /// Why the machine stopped.
    pub reason: HaltReason,
    /// How many instructions completed before the stop.
    pub executed: u64,
}

/// Machine construction parameters.
#[derive(Clone, Copy, Debug)]
pub struct MachineConfig {
    /// Memory size in bytes.
    pub memory_size: usize,
    /// Executed-instruction budget; reaching it halts the run.
    pub instruction_limit: u64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_SIZE,
            instruction_limit: DEFAULT_INSTRUCTION_LIMIT,
        }
    }
}

/// Register file: 128 zero-initialized 32-bit cells.
struct RegisterFile {
    regs: [u32; REGISTER_COUNT],
}

impl RegisterFile {
    fn new() -> Self {
        Self {
            regs: [0; REGISTER_COUNT],
        }
    }

    /// Register fields are 7 bits wide, so decoded indices are always in
    /// range.
    fn get(&self, idx: u8) -> u32 {
        self.regs[idx as usize]
    }

    fn set(&mut self, idx: u8, value: u32) {
        self.regs[idx as usize] = value;
    }
}

/// Register-memory virtual machine.
///
/// Registers, memory, and the program counter are created together for one
/// run and discarded with the machine; nothing persists across runs. Code
/// and data share the flat memory: [`load`](Machine::load) copies the
/// program image to address 0 and [`run`](Machine::run) starts decoding
/// there.
pub struct Machine {
    /// Flat byte-addressable memory shared by code and data.
    memory: Vec<u8>,
    /// Register file.
    registers: RegisterFile,
    /// Byte offset of the next instruction to decode.
    pc: usize,
    /// Instructions completed so far.
    executed: u64,
    /// Budget after which the run is stopped.
    instruction_limit: u64,
}

impl Machine {
    /// Creates a machine with the default configuration (1 MiB of memory,
    /// 10,000-instruction budget).
    pub fn new() -> Self {
        Self::with_config(MachineConfig::default())
    }

    /// Creates a machine with explicit memory size and instruction budget.
    pub fn with_config(config: MachineConfig) -> Self {
        Self {
            memory: vec![0; config.memory_size],
            registers: RegisterFile::new(),
            pc: 0,
            executed: 0,
            instruction_limit: config.instruction_limit,
        }
    }

    /// Copies a program image into memory starting at address 0.
    pub fn load(&mut self, image: &[u8]) -> Result<(), VmError> {
        if image.len() > self.memory.len() {
            return Err(VmError::ProgramTooLarge {
                len: image.len(),
                capacity: self.memory.len(),
            });
        }
        self.memory[..image.len()].copy_from_slice(image);
        Ok(())
    }

    /// Runs until a halt condition and reports why, with the executed count.
    pub fn run(&mut self) -> RunSummary {
        let reason = loop {
            if self.executed >= self.instruction_limit {
                break HaltReason::InstructionLimit;
            }
            if let Some(reason) = self.step() {
                break reason;
            }
        };
        RunSummary {
            reason,
            executed: self.executed,
        }
    }

    /// Decodes and executes the instruction at the program counter.
    ///
    /// Returns a halt reason when the machine cannot continue; otherwise the
    /// counter has advanced past the executed instruction.
    fn step(&mut self) -> Option<HaltReason> {
        let offset = self.pc;
        let (instr, size) = match codec::decode(&self.memory[offset..]) {
            Ok(decoded) => decoded,
            Err(VmError::UnknownOpcode { opcode, .. }) => {
                return Some(HaltReason::UnknownOpcode { opcode, offset });
            }
            Err(VmError::UnexpectedEnd { available: 0, .. }) => {
                return Some(HaltReason::EndOfProgram);
            }
            Err(VmError::UnexpectedEnd {
                needed, available, ..
            }) => {
                return Some(HaltReason::TruncatedInstruction {
                    offset,
                    needed,
                    available,
                });
            }
            // decode only produces the variants matched above
            Err(_) => unreachable!("unexpected codec error"),
        };

        if let Err(reason) = self.exec(instr) {
            return Some(reason);
        }
        self.pc += size;
        self.executed += 1;
        None
    }

    /// Executes a single decoded instruction.
    fn exec(&mut self, instr: Instruction) -> Result<(), HaltReason> {
        match instr {
            Instruction::LoadConst { dest_reg, value } => {
                self.registers.set(dest_reg, value);
            }
            Instruction::MemRead { dest_reg, addr_reg } => {
                let at = self.checked_word(u64::from(self.registers.get(addr_reg)))?;
                let word =
                    u32::from_le_bytes(self.memory[at..at + WORD_SIZE].try_into().unwrap());
                self.registers.set(dest_reg, word);
            }
            Instruction::MemWrite { src_reg, addr_reg } => {
                let at = self.checked_word(u64::from(self.registers.get(addr_reg)))?;
                let bytes = self.registers.get(src_reg).to_le_bytes();
                self.memory[at..at + WORD_SIZE].copy_from_slice(&bytes);
            }
            Instruction::NegStore {
                offset,
                base_reg,
                src_reg,
            } => {
                let addr = u64::from(self.registers.get(base_reg)) + u64::from(offset);
                let at = self.checked_word(addr)?;
                let negated = self.registers.get(src_reg).wrapping_neg();
                self.memory[at..at + WORD_SIZE].copy_from_slice(&negated.to_le_bytes());
            }
        }
        Ok(())
    }

    /// Bounds-checks a word access before anything is mutated.
    fn checked_word(&self, addr: u64) -> Result<usize, HaltReason> {
        if addr + WORD_SIZE as u64 > self.memory.len() as u64 {
            return Err(HaltReason::MemoryFault { addr });
        }
        Ok(addr as usize)
    }

    /// Value of register `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`REGISTER_COUNT`].
    pub fn register(&self, index: u8) -> u32 {
        assert!((index as usize) < REGISTER_COUNT, "register index {index}");
        self.registers.get(index)
    }

    /// All register values, in index order.
    pub fn registers(&self) -> &[u32] {
        &self.registers.regs
    }

    /// The full machine memory.
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Bytes in `lo..hi`, clamped to memory bounds.
    pub fn memory_range(&self, lo: usize, hi: usize) -> &[u8] {
        let hi = hi.min(self.memory.len());
        &self.memory[lo.min(hi)..hi]
    }

    /// Current program counter.
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Instructions completed so far.
    pub fn executed(&self) -> u64 {
        self.executed
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_program, ConstantPolicy};

    fn image(instructions: &[Instruction]) -> Vec<u8> {
        encode_program(instructions, ConstantPolicy::Reject).expect("encoding failed")
    }

    fn run_program(instructions: &[Instruction]) -> (Machine, RunSummary) {
        let mut machine = Machine::new();
        machine.load(&image(instructions)).expect("load failed");
        let summary = machine.run();
        (machine, summary)
    }

    /// Runs `value` through NEG_STORE and reads the result back.
    ///
    /// The image carries the input as a data word at 0x100; execution halts
    /// on the zero padding after the last instruction.
    fn negate_on_machine(value: u32) -> u32 {
        let mut bytes = image(&[
            Instruction::LoadConst {
                dest_reg: 2,
                value: 0x100,
            },
            Instruction::MemRead {
                dest_reg: 1,
                addr_reg: 2,
            },
            Instruction::LoadConst {
                dest_reg: 4,
                value: 0x200,
            },
            Instruction::NegStore {
                offset: 0,
                base_reg: 4,
                src_reg: 1,
            },
            Instruction::MemRead {
                dest_reg: 3,
                addr_reg: 4,
            },
        ]);
        bytes.resize(0x100, 0);
        bytes.extend_from_slice(&value.to_le_bytes());

        let mut machine = Machine::new();
        machine.load(&bytes).unwrap();
        let summary = machine.run();
        assert_eq!(summary.executed, 5);
        machine.register(3)
    }

    // ==================== Basic execution ====================

    #[test]
    fn load_const_sets_register() {
        let (machine, summary) = run_program(&[Instruction::LoadConst {
            dest_reg: 7,
            value: 440,
        }]);
        assert_eq!(machine.register(7), 440);
        assert_eq!(summary.executed, 1);
    }

    #[test]
    fn registers_start_zeroed() {
        let machine = Machine::new();
        for i in 0..REGISTER_COUNT {
            assert_eq!(machine.register(i as u8), 0);
        }
    }

    #[test]
    fn memory_write_read_round_trip() {
        let (machine, summary) = run_program(&[
            Instruction::LoadConst {
                dest_reg: 1,
                value: 0xABCDEF,
            },
            Instruction::LoadConst {
                dest_reg: 2,
                value: 0x400,
            },
            Instruction::MemWrite {
                src_reg: 1,
                addr_reg: 2,
            },
            Instruction::MemRead {
                dest_reg: 3,
                addr_reg: 2,
            },
        ]);
        assert_eq!(summary.executed, 4);
        assert_eq!(machine.register(3), machine.register(1));
        assert_eq!(machine.memory_range(0x400, 0x404), [0xEF, 0xCD, 0xAB, 0x00]);
    }

    #[test]
    fn end_to_end_negation_scenario() {
        let (machine, summary) = run_program(&[
            Instruction::LoadConst {
                dest_reg: 1,
                value: 100,
            },
            Instruction::LoadConst {
                dest_reg: 2,
                value: 0x600,
            },
            Instruction::NegStore {
                offset: 0,
                base_reg: 2,
                src_reg: 1,
            },
            Instruction::MemRead {
                dest_reg: 3,
                addr_reg: 2,
            },
        ]);

        assert_eq!(machine.register(1), 100);
        assert_eq!(machine.register(2), 0x600);
        assert_eq!(machine.register(3), 0xFFFF_FF9C);
        assert_eq!(machine.memory_range(0x600, 0x604), [0x9C, 0xFF, 0xFF, 0xFF]);
        assert_eq!(summary.executed, 4);
        // The zero padding after the program is not a recognized opcode.
        assert_eq!(
            summary.reason,
            HaltReason::UnknownOpcode {
                opcode: 0,
                offset: 19,
            }
        );
        assert!(!summary.reason.is_fault());
    }

    #[test]
    fn neg_store_applies_offset() {
        let (machine, _) = run_program(&[
            Instruction::LoadConst {
                dest_reg: 1,
                value: 1,
            },
            Instruction::LoadConst {
                dest_reg: 2,
                value: 0x500,
            },
            Instruction::NegStore {
                offset: 8,
                base_reg: 2,
                src_reg: 1,
            },
        ]);
        assert_eq!(machine.memory_range(0x508, 0x50C), [0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(machine.memory_range(0x500, 0x504), [0, 0, 0, 0]);
    }

    // ==================== Two's-complement negation ====================

    #[test]
    fn negation_of_zero_is_zero() {
        assert_eq!(negate_on_machine(0), 0);
    }

    #[test]
    fn negation_of_max_positive() {
        assert_eq!(negate_on_machine(0x7FFF_FFFF), 0x8000_0001);
    }

    #[test]
    fn negation_of_min_negative_is_fixed_point() {
        assert_eq!(negate_on_machine(0x8000_0000), 0x8000_0000);
    }

    #[test]
    fn negation_of_all_ones() {
        assert_eq!(negate_on_machine(0xFFFF_FFFF), 1);
    }

    #[test]
    fn double_negation_restores_value() {
        for value in [0u32, 1, 100, 0x7FFF_FFFF, 0x8000_0000, 0xFFFF_FF9C] {
            assert_eq!(negate_on_machine(negate_on_machine(value)), value);
        }
    }

    // ==================== Halt conditions ====================

    #[test]
    fn unknown_opcode_stops_without_advancing() {
        let mut machine = Machine::new();
        machine.load(&[0x7F]).unwrap();
        let summary = machine.run();
        assert_eq!(
            summary.reason,
            HaltReason::UnknownOpcode {
                opcode: 0x7F,
                offset: 0,
            }
        );
        assert_eq!(summary.executed, 0);
        assert_eq!(machine.pc(), 0);
    }

    #[test]
    fn unknown_opcode_masks_high_bit() {
        // 0x8B has bit 7 set; the opcode is its low 7 bits.
        let mut machine = Machine::new();
        machine.load(&[0x8B]).unwrap();
        let summary = machine.run();
        assert_eq!(
            summary.reason,
            HaltReason::UnknownOpcode {
                opcode: 0x0B,
                offset: 0,
            }
        );
    }

    #[test]
    fn truncated_instruction_halts() {
        let mut machine = Machine::with_config(MachineConfig {
            memory_size: 8,
            instruction_limit: DEFAULT_INSTRUCTION_LIMIT,
        });
        let mut bytes = image(&[Instruction::LoadConst {
            dest_reg: 1,
            value: 5,
        }]);
        bytes.extend_from_slice(&[0x48, 0x01]);
        machine.load(&bytes).unwrap();
        let summary = machine.run();
        assert_eq!(
            summary.reason,
            HaltReason::TruncatedInstruction {
                offset: 6,
                needed: 6,
                available: 2,
            }
        );
        assert_eq!(summary.executed, 1);
        assert_eq!(machine.pc(), 6);
    }

    #[test]
    fn end_of_program_at_memory_edge() {
        let mut machine = Machine::with_config(MachineConfig {
            memory_size: 6,
            instruction_limit: DEFAULT_INSTRUCTION_LIMIT,
        });
        machine
            .load(&image(&[Instruction::LoadConst {
                dest_reg: 1,
                value: 5,
            }]))
            .unwrap();
        let summary = machine.run();
        assert_eq!(summary.reason, HaltReason::EndOfProgram);
        assert_eq!(summary.executed, 1);
        assert_eq!(machine.register(1), 5);
    }

    #[test]
    fn program_too_large_rejected() {
        let mut machine = Machine::with_config(MachineConfig {
            memory_size: 4,
            instruction_limit: DEFAULT_INSTRUCTION_LIMIT,
        });
        let err = machine
            .load(&image(&[Instruction::LoadConst {
                dest_reg: 1,
                value: 5,
            }]))
            .unwrap_err();
        assert!(matches!(
            err,
            VmError::ProgramTooLarge {
                len: 6,
                capacity: 4,
            }
        ));
    }

    // ==================== Memory faults ====================

    #[test]
    fn read_past_end_of_memory_faults() {
        let end = (DEFAULT_MEMORY_SIZE - 3) as u32;
        let (machine, summary) = run_program(&[
            Instruction::LoadConst {
                dest_reg: 1,
                value: end,
            },
            Instruction::MemRead {
                dest_reg: 2,
                addr_reg: 1,
            },
        ]);
        assert_eq!(
            summary.reason,
            HaltReason::MemoryFault {
                addr: u64::from(end),
            }
        );
        assert!(summary.reason.is_fault());
        assert_eq!(summary.executed, 1);
        assert_eq!(machine.register(2), 0);
    }

    #[test]
    fn fault_leaves_memory_untouched() {
        let mut machine = Machine::with_config(MachineConfig {
            memory_size: 64,
            instruction_limit: DEFAULT_INSTRUCTION_LIMIT,
        });
        // Marker bytes ride in the image's data section at the memory edge.
        let mut bytes = image(&[
            Instruction::LoadConst {
                dest_reg: 1,
                value: 62,
            },
            Instruction::MemWrite {
                src_reg: 0,
                addr_reg: 1,
            },
        ]);
        bytes.resize(60, 0);
        bytes.extend_from_slice(&[0xAA; 4]);
        machine.load(&bytes).unwrap();

        let summary = machine.run();
        assert_eq!(summary.reason, HaltReason::MemoryFault { addr: 62 });
        assert_eq!(machine.memory_range(60, 64), [0xAA; 4]);
    }

    #[test]
    fn neg_store_offset_can_cross_memory_edge() {
        let base = (DEFAULT_MEMORY_SIZE - 4) as u32;
        let (_, summary) = run_program(&[
            Instruction::LoadConst {
                dest_reg: 1,
                value: base,
            },
            Instruction::NegStore {
                offset: 1,
                base_reg: 1,
                src_reg: 0,
            },
        ]);
        assert_eq!(
            summary.reason,
            HaltReason::MemoryFault {
                addr: u64::from(base) + 1,
            }
        );
    }

    // ==================== Instruction budget ====================

    #[test]
    fn instruction_limit_halts_run() {
        let mut machine = Machine::with_config(MachineConfig {
            memory_size: 30,
            instruction_limit: 5,
        });
        let filler = [Instruction::MemRead {
            dest_reg: 0,
            addr_reg: 0,
        }; 10];
        machine.load(&image(&filler)).unwrap();
        let summary = machine.run();
        assert_eq!(summary.reason, HaltReason::InstructionLimit);
        assert_eq!(summary.executed, 5);
        assert!(!summary.reason.is_fault());
    }

    #[test]
    fn default_limit_halts_at_ten_thousand() {
        let mut machine = Machine::with_config(MachineConfig {
            memory_size: 30_000,
            instruction_limit: DEFAULT_INSTRUCTION_LIMIT,
        });
        let filler = vec![
            Instruction::MemRead {
                dest_reg: 0,
                addr_reg: 0,
            };
            10_000
        ];
        machine.load(&image(&filler)).unwrap();
        let summary = machine.run();
        assert_eq!(summary.reason, HaltReason::InstructionLimit);
        assert_eq!(summary.executed, 10_000);
    }

    // ==================== Accessors ====================

    #[test]
    fn memory_range_clamps_to_bounds() {
        let machine = Machine::with_config(MachineConfig {
            memory_size: 16,
            instruction_limit: 1,
        });
        assert_eq!(machine.memory_range(8, 32).len(), 8);
        assert_eq!(machine.memory_range(32, 64).len(), 0);
        assert_eq!(machine.memory().len(), 16);
    }
}
