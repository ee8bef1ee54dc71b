// Machine
mod alu;
pub use alu::{AluOp, AluOut, Flag};
mod isa;
pub use isa::{instruction_len, is_alu, Opcode};
mod memory;
pub use memory::{Memory, Registers, MEMORY_SIZE, REGISTER_COUNT, SP, STACK_EMPTY};

// Running
mod runtime;
pub use runtime::{Cpu, Status};
mod output;
pub use output::{print_trace, trace_line, Sink, StdoutSink};

// Loading
mod loader;
pub use loader::parse_program;

mod error;
pub use error::{fault_report, load_report, Fault, LoadError};

