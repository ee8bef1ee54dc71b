use std::fmt;

/// Opcode bytes follow the layout `AABCDDDD`:
/// `AA` operand count, `B` ALU operation, `C` sets PC, `DDDD` identifier.
const OPERANDS_SHIFT: u8 = 6;
const ALU_BIT: u8 = 0b0010_0000;
const SETS_PC_BIT: u8 = 0b0001_0000;

/// Every instruction the CPU understands.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Load immediate into register
    LDI = 0b1000_0010,
    /// Print register as decimal
    PRN = 0b0100_0111,
    HLT = 0b0000_0001,
    PUSH = 0b0100_0101,
    POP = 0b0100_0110,
    /// Push return address and jump to address in register
    CALL = 0b0101_0000,
    RET = 0b0001_0001,
    ADD = 0b1010_0000,
    MUL = 0b1010_0010,
    /// Compare two registers, setting flags
    CMP = 0b1010_0111,
    JMP = 0b0101_0100,
    /// Jump if equal flag is set
    JEQ = 0b0101_0101,
    /// Jump if equal flag is clear
    JNE = 0b0101_0110,
}

impl Opcode {
    pub const ALL: [Opcode; 13] = [
        Opcode::LDI,
        Opcode::PRN,
        Opcode::HLT,
        Opcode::PUSH,
        Opcode::POP,
        Opcode::CALL,
        Opcode::RET,
        Opcode::ADD,
        Opcode::MUL,
        Opcode::CMP,
        Opcode::JMP,
        Opcode::JEQ,
        Opcode::JNE,
    ];

    pub fn byte(self) -> u8 {
        self as u8
    }

    pub fn size(self) -> usize {
        instruction_len(self.byte())
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::LDI => "LDI",
            Opcode::PRN => "PRN",
            Opcode::HLT => "HLT",
            Opcode::PUSH => "PUSH",
            Opcode::POP => "POP",
            Opcode::CALL => "CALL",
            Opcode::RET => "RET",
            Opcode::ADD => "ADD",
            Opcode::MUL => "MUL",
            Opcode::CMP => "CMP",
            Opcode::JMP => "JMP",
            Opcode::JEQ => "JEQ",
            Opcode::JNE => "JNE",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;
    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Opcode::ALL
            .into_iter()
            .find(|op| op.byte() == byte)
            .ok_or(byte)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

/// Number of operand bytes following the opcode.
#[inline]
pub(crate) const fn operand_count(byte: u8) -> usize {
    (byte >> OPERANDS_SHIFT) as usize
}

/// Length of the whole instruction in bytes, including the opcode.
#[inline]
pub const fn instruction_len(byte: u8) -> usize {
    operand_count(byte) + 1
}

#[inline]
pub const fn is_alu(byte: u8) -> bool {
    byte & ALU_BIT != 0
}

#[inline]
pub(crate) const fn sets_pc(byte: u8) -> bool {
    byte & SETS_PC_BIT != 0
}
