use std::cmp::Ordering;

use crate::error::Fault;
use crate::isa::Opcode;

/// Condition code, laid out as `00000LGE`. Only `CMP` sets it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Flag {
    L = 0b100,
    G = 0b010,
    E = 0b001,
    #[default]
    Uninit = 0b000,
}

impl Flag {
    pub fn bits(self) -> u8 {
        self as u8
    }

    pub fn is_equal(self) -> bool {
        self == Flag::E
    }
}

impl From<Ordering> for Flag {
    fn from(ord: Ordering) -> Self {
        match ord {
            Ordering::Less => Flag::L,
            Ordering::Equal => Flag::E,
            Ordering::Greater => Flag::G,
        }
    }
}

/// Operations the ALU can perform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Mul,
    Cmp,
}

/// Result of an ALU operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AluOut {
    /// Store into the first operand register
    Value(u8),
    /// Replace the flags register
    Flags(Flag),
}

impl AluOp {
    /// Any opcode other than `ADD`, `MUL` or `CMP` is unsupported.
    pub fn decode(pc: usize, opcode: u8) -> Result<AluOp, Fault> {
        match Opcode::try_from(opcode) {
            Ok(Opcode::ADD) => Ok(AluOp::Add),
            Ok(Opcode::MUL) => Ok(AluOp::Mul),
            Ok(Opcode::CMP) => Ok(AluOp::Cmp),
            _ => Err(Fault::UnsupportedAluOperation { pc, opcode }),
        }
    }

    /// Arithmetic wraps at 8 bits. Comparison is unsigned.
    pub fn apply(self, a: u8, b: u8) -> AluOut {
        match self {
            AluOp::Add => AluOut::Value(a.wrapping_add(b)),
            AluOp::Mul => AluOut::Value(a.wrapping_mul(b)),
            AluOp::Cmp => AluOut::Flags(a.cmp(&b).into()),
        }
    }
}
