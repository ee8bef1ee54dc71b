use std::{error::Error, fmt};

use miette::{miette, Report, Severity};

/// Error turning program source into memory contents.
///
/// A failed load leaves no partially loaded program behind.
#[derive(Debug, PartialEq, Eq)]
pub enum LoadError {
    /// A non-blank line was not a binary byte literal.
    InvalidInstructionEncoding {
        /// 1-based source line
        line: usize,
        text: String,
    },
    /// Program does not fit in memory.
    ProgramTooLarge { len: usize },
}

/// Unrecoverable condition raised while executing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    MemoryOutOfBounds { pc: usize, address: usize },
    RegisterOutOfBounds { pc: usize, register: u8 },
    UnsupportedAluOperation { pc: usize, opcode: u8 },
    UnknownOpcode { pc: usize, opcode: u8 },
}

impl Fault {
    /// Program counter of the instruction which faulted.
    pub fn pc(&self) -> usize {
        match *self {
            Fault::MemoryOutOfBounds { pc, .. }
            | Fault::RegisterOutOfBounds { pc, .. }
            | Fault::UnsupportedAluOperation { pc, .. }
            | Fault::UnknownOpcode { pc, .. } => pc,
        }
    }
}

impl Error for LoadError {}
impl Error for Fault {}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInstructionEncoding { line, text } => {
                write!(f, "Invalid instruction encoding `{text}` on line {line}")
            }
            Self::ProgramTooLarge { len } => write!(
                f,
                "Program is {len} bytes long and cannot fit in {} bytes of memory",
                crate::memory::MEMORY_SIZE
            ),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MemoryOutOfBounds { pc, address } => {
                write!(f, "Memory access out of bounds at 0x{address:X} (pc 0x{pc:02X})")
            }
            Self::RegisterOutOfBounds { pc, register } => {
                write!(f, "No such register R{register} (pc 0x{pc:02X})")
            }
            Self::UnsupportedAluOperation { pc, opcode } => {
                write!(f, "Unsupported ALU operation 0b{opcode:08b} (pc 0x{pc:02X})")
            }
            Self::UnknownOpcode { pc, opcode } => {
                write!(f, "Unknown opcode 0b{opcode:08b} (pc 0x{pc:02X})")
            }
        }
    }
}

// Diagnostics shown to the user

pub fn load_report(err: &LoadError) -> Report {
    match err {
        LoadError::InvalidInstructionEncoding { .. } => miette!(
            severity = Severity::Error,
            code = "load::encoding",
            help = "each line must hold one byte written in binary, like 10000010",
            "{err}",
        ),
        LoadError::ProgramTooLarge { .. } => miette!(
            severity = Severity::Error,
            code = "load::too_large",
            help = "programs can be at most 256 bytes long",
            "{err}",
        ),
    }
}

pub fn fault_report(fault: &Fault) -> Report {
    match fault {
        Fault::MemoryOutOfBounds { .. } => miette!(
            severity = Severity::Error,
            code = "run::memory_bounds",
            help = "the program counter ran off the end of memory; is a HLT missing?",
            "{fault}",
        ),
        Fault::RegisterOutOfBounds { .. } => miette!(
            severity = Severity::Error,
            code = "run::register_bounds",
            help = "registers are numbered 0 to 7",
            "{fault}",
        ),
        Fault::UnsupportedAluOperation { .. } => miette!(
            severity = Severity::Error,
            code = "run::alu",
            help = "the ALU supports ADD, MUL and CMP",
            "{fault}",
        ),
        Fault::UnknownOpcode { .. } => miette!(
            severity = Severity::Error,
            code = "run::unknown_opcode",
            help = "check the program for data placed where an instruction is expected",
            "{fault}",
        ),
    }
}
