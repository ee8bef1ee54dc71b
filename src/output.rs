use std::io::{stdout, Write};

use colored::Colorize;

use crate::runtime::Cpu;

/// Receives values emitted by `PRN`, in program order.
pub trait Sink {
    fn emit(&mut self, value: u8);
}

/// Prints each value as a decimal line on stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl Sink for StdoutSink {
    fn emit(&mut self, value: u8) {
        let mut out = stdout().lock();
        // Nothing sensible to do if stdout is gone
        let _ = writeln!(out, "{value}");
        let _ = out.flush();
    }
}

/// Collects emitted values, mostly for tests and embedding.
impl Sink for Vec<u8> {
    fn emit(&mut self, value: u8) {
        self.push(value);
    }
}

/// Render one line of CPU state:
/// `TRACE: PC | FL | M[pc] M[pc+1] M[pc+2] | R0 .. R7`.
///
/// Memory past the end of RAM is shown as `--`.
pub fn trace_line<S: Sink>(cpu: &Cpu<S>) -> String {
    let pc = cpu.pc();
    let mut line = format!("TRACE: {:02X} | {:02X} |", pc, cpu.flags().bits());
    for addr in pc..pc + 3 {
        match cpu.memory().peek(addr) {
            Some(byte) => line.push_str(&format!(" {byte:02X}")),
            None => line.push_str(" --"),
        }
    }
    line.push_str(" |");
    for reg in cpu.registers().as_slice() {
        line.push_str(&format!(" {reg:02X}"));
    }
    line
}

/// Print the trace to stderr so it never mixes with program output.
pub fn print_trace<S: Sink>(cpu: &Cpu<S>, minimal: bool) {
    let line = trace_line(cpu);
    if minimal {
        eprintln!("{line}");
    } else {
        eprintln!("{}", line.dimmed());
    }
}
