use crate::alu::{AluOp, AluOut, Flag};
use crate::error::{Fault, LoadError};
use crate::isa::{instruction_len, is_alu, sets_pc, Opcode};
use crate::loader;
use crate::memory::{Memory, Registers, MEMORY_SIZE};
use crate::output::Sink;

/// Where the execution loop is. `Halted` and `Faulted` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Running,
    Halted,
    Faulted(Fault),
}

/// What the loop does with the program counter after an instruction.
#[derive(Debug, PartialEq, Eq)]
enum Next {
    /// Move past the instruction
    Advance,
    /// Instruction set PC itself
    Jump(usize),
    Halt,
}

/// Complete CPU state, owned by one execution loop.
pub struct Cpu<S: Sink> {
    mem: Memory,
    reg: Registers,
    /// Always the address of the next opcode while running
    pc: usize,
    flag: Flag,
    status: Status,
    /// Receives `PRN` output
    sink: S,
}

impl<S: Sink> Cpu<S> {
    pub fn new(sink: S) -> Self {
        Cpu {
            mem: Memory::new(),
            reg: Registers::new(),
            pc: 0,
            flag: Flag::Uninit,
            status: Status::Running,
            sink,
        }
    }

    /// Place `program` at address 0. Memory past the program stays zeroed.
    ///
    /// Nothing is written if the program does not fit.
    pub fn load(&mut self, program: &[u8]) -> Result<(), LoadError> {
        loader::check_size(program)?;
        self.mem.fill_from(program);
        Ok(())
    }

    /// Parse program source then load it.
    pub fn load_source(&mut self, src: &str) -> Result<(), LoadError> {
        let program = loader::parse_program(src)?;
        self.load(&program)
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn flags(&self) -> Flag {
        self.flag
    }

    pub fn memory(&self) -> &Memory {
        &self.mem
    }

    pub fn registers(&self) -> &Registers {
        &self.reg
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Run until `HLT` or a fault.
    pub fn run(&mut self) -> Result<(), Fault> {
        while self.step() == Status::Running {}
        match self.status {
            Status::Faulted(fault) => Err(fault),
            _ => Ok(()),
        }
    }

    /// Execute a single instruction. Does nothing once terminal.
    pub fn step(&mut self) -> Status {
        if self.status != Status::Running {
            return self.status;
        }
        match self.execute() {
            Ok((Next::Advance, len)) => self.advance(len),
            Ok((Next::Jump(addr), _)) => self.pc = addr,
            Ok((Next::Halt, _)) => self.status = Status::Halted,
            Err(fault) => self.status = Status::Faulted(fault),
        }
        self.status
    }

    /// Move past an instruction of `len` bytes, faulting if that leaves memory.
    fn advance(&mut self, len: usize) {
        let next = self.pc + len;
        if next < MEMORY_SIZE {
            self.pc = next;
        } else {
            self.status = Status::Faulted(Fault::MemoryOutOfBounds {
                pc: self.pc,
                address: next,
            });
        }
    }

    /// Decode and run the instruction at PC. Returns its length alongside,
    /// since the instruction may overwrite its own opcode.
    fn execute(&mut self) -> Result<(Next, usize), Fault> {
        let pc = self.pc;
        let ir = self.mem.read(pc, pc)?;
        let len = instruction_len(ir);
        let op = match Opcode::try_from(ir) {
            Ok(op) => Some(op),
            Err(opcode) if is_alu(opcode) => None,
            Err(opcode) => return Err(Fault::UnknownOpcode { pc, opcode }),
        };
        let (a, b) = self.operands(ir)?;

        let next = match op {
            Some(op) => self.dispatch(op, a, b, len)?,
            // Unsupported ALU operations fault in the ALU
            None => self.alu_op(ir, a, b)?,
        };
        debug_assert!(
            sets_pc(ir) || !matches!(next, Next::Jump(_)),
            "0x{ir:02X} set PC without the PC bit"
        );
        Ok((next, len))
    }

    fn dispatch(&mut self, op: Opcode, a: u8, b: u8, len: usize) -> Result<Next, Fault> {
        let pc = self.pc;
        match op {
            Opcode::HLT => Ok(Next::Halt),
            Opcode::LDI => {
                self.reg.write(pc, a, b)?;
                Ok(Next::Advance)
            }
            Opcode::PRN => {
                let val = self.reg.read(pc, a)?;
                self.sink.emit(val);
                Ok(Next::Advance)
            }
            Opcode::ADD | Opcode::MUL | Opcode::CMP => self.alu_op(op.byte(), a, b),
            Opcode::PUSH => {
                let val = self.reg.read(pc, a)?;
                self.push_val(val)?;
                Ok(Next::Advance)
            }
            Opcode::POP => {
                let val = self.pop_val()?;
                self.reg.write(pc, a, val)?;
                Ok(Next::Advance)
            }
            Opcode::CALL => {
                let target = self.reg.read(pc, a)?;
                // Return address must itself be a valid PC
                let ret = pc + len;
                if ret >= MEMORY_SIZE {
                    return Err(Fault::MemoryOutOfBounds { pc, address: ret });
                }
                self.push_val(ret as u8)?;
                Ok(Next::Jump(target as usize))
            }
            Opcode::RET => Ok(Next::Jump(self.pop_val()? as usize)),
            Opcode::JMP => Ok(Next::Jump(self.reg.read(pc, a)? as usize)),
            Opcode::JEQ => self.jump_if(a, self.flag.is_equal()),
            Opcode::JNE => self.jump_if(a, !self.flag.is_equal()),
        }
    }

    /// Fetch only the operand bytes the instruction has. Missing ones read as 0.
    fn operands(&self, ir: u8) -> Result<(u8, u8), Fault> {
        let pc = self.pc;
        let len = instruction_len(ir);
        let a = if len > 1 { self.mem.read(pc, pc + 1)? } else { 0 };
        let b = if len > 2 { self.mem.read(pc, pc + 2)? } else { 0 };
        Ok((a, b))
    }

    fn alu_op(&mut self, ir: u8, reg_a: u8, reg_b: u8) -> Result<Next, Fault> {
        let pc = self.pc;
        let op = AluOp::decode(pc, ir)?;
        let a = self.reg.read(pc, reg_a)?;
        let b = self.reg.read(pc, reg_b)?;
        match op.apply(a, b) {
            AluOut::Value(val) => self.reg.write(pc, reg_a, val)?,
            AluOut::Flags(flag) => self.flag = flag,
        }
        Ok(Next::Advance)
    }

    fn jump_if(&self, reg: u8, cond: bool) -> Result<Next, Fault> {
        let target = self.reg.read(self.pc, reg)?;
        Ok(if cond {
            Next::Jump(target as usize)
        } else {
            Next::Advance
        })
    }

    fn push_val(&mut self, val: u8) -> Result<(), Fault> {
        // Decrement stack
        let sp = self.reg.sp().wrapping_sub(1);
        self.reg.set_sp(sp);
        // Save onto stack
        self.mem.write(self.pc, sp as usize, val)
    }

    fn pop_val(&mut self) -> Result<u8, Fault> {
        let sp = self.reg.sp();
        let val = self.mem.read(self.pc, sp as usize)?;
        self.reg.set_sp(sp.wrapping_add(1));
        Ok(val)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::memory::STACK_EMPTY;
    use crate::isa::Opcode::*;

    fn cpu_with(program: &[u8]) -> Cpu<Vec<u8>> {
        let mut cpu = Cpu::new(Vec::new());
        cpu.load(program).unwrap();
        cpu
    }

    fn prog(ops: &[(Opcode, &[u8])]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for (op, args) in ops {
            assert_eq!(args.len() + 1, op.size(), "operands for {op}");
            bytes.push(op.byte());
            bytes.extend_from_slice(args);
        }
        bytes
    }

    #[test]
    fn load_places_program_at_zero() {
        let program = [1, 2, 3, 4];
        let cpu = cpu_with(&program);
        assert_eq!(&cpu.memory().as_slice()[..4], &program);
        assert!(cpu.memory().as_slice()[4..].iter().all(|&b| b == 0));
        assert_eq!(cpu.pc(), 0);
        assert_eq!(cpu.status(), Status::Running);
        assert_eq!(cpu.registers().sp(), STACK_EMPTY);
    }

    #[test]
    fn load_rejects_oversized_without_writing() {
        let mut cpu = Cpu::new(Vec::new());
        let program = vec![HLT.byte(); 257];
        assert_eq!(
            cpu.load(&program),
            Err(LoadError::ProgramTooLarge { len: 257 })
        );
        assert!(cpu.memory().as_slice().iter().all(|&b| b == 0));
        assert!(cpu.load(&program[..256]).is_ok());
    }

    #[test]
    fn print8() {
        let mut cpu = cpu_with(&prog(&[(LDI, &[0, 8]), (PRN, &[0]), (HLT, &[])]));
        assert_eq!(cpu.run(), Ok(()));
        assert_eq!(cpu.status(), Status::Halted);
        assert_eq!(cpu.pc(), 5);
        assert_eq!(cpu.sink(), &vec![8]);
    }

    #[test]
    fn add_and_mul_wrap() {
        let mut cpu = cpu_with(&prog(&[
            (LDI, &[0, 200]),
            (LDI, &[1, 100]),
            (ADD, &[0, 1]),
            (PRN, &[0]),
            (LDI, &[2, 8]),
            (LDI, &[3, 9]),
            (MUL, &[2, 3]),
            (PRN, &[2]),
            (MUL, &[1, 1]),
            (PRN, &[1]),
            (HLT, &[]),
        ]));
        cpu.run().unwrap();
        // 100 * 100 = 10000 = 39 * 256 + 16
        assert_eq!(cpu.into_sink(), vec![44, 72, 16]);
    }

    #[test]
    fn compare_flags() {
        for (a, b, flag) in [(3, 3, Flag::E), (4, 3, Flag::G), (3, 4, Flag::L)] {
            let mut cpu = cpu_with(&prog(&[
                (LDI, &[0, a]),
                (LDI, &[1, b]),
                (CMP, &[0, 1]),
                (HLT, &[]),
            ]));
            cpu.run().unwrap();
            assert_eq!(cpu.flags(), flag, "cmp {a} {b}");
            // Registers untouched
            assert_eq!(cpu.registers().read(0, 0), Ok(a));
        }
    }

    #[test]
    fn flags_persist_until_next_compare() {
        let mut cpu = cpu_with(&prog(&[
            (LDI, &[0, 1]),
            (CMP, &[0, 0]),
            (LDI, &[1, 2]),
            (ADD, &[0, 1]),
            (HLT, &[]),
        ]));
        cpu.run().unwrap();
        assert_eq!(cpu.flags(), Flag::E);
    }

    #[test]
    fn push_then_pop() {
        let mut cpu = cpu_with(&prog(&[(LDI, &[0, 42]), (PUSH, &[0]), (HLT, &[])]));
        cpu.run().unwrap();
        assert_eq!(cpu.registers().sp(), STACK_EMPTY - 1);
        assert_eq!(cpu.memory().peek(0xF3), Some(42));

        let mut cpu = cpu_with(&prog(&[
            (LDI, &[0, 42]),
            (PUSH, &[0]),
            (POP, &[1]),
            (HLT, &[]),
        ]));
        cpu.run().unwrap();
        assert_eq!(cpu.registers().read(0, 1), Ok(42));
        assert_eq!(cpu.registers().sp(), STACK_EMPTY);
    }

    #[test]
    fn stack_is_last_in_first_out() {
        let mut cpu = cpu_with(&prog(&[
            (LDI, &[0, 1]),
            (LDI, &[1, 2]),
            (PUSH, &[0]),
            (PUSH, &[1]),
            (POP, &[2]),
            (POP, &[3]),
            (PRN, &[2]),
            (PRN, &[3]),
            (HLT, &[]),
        ]));
        cpu.run().unwrap();
        assert_eq!(cpu.into_sink(), vec![2, 1]);
    }

    #[test]
    fn call_and_return() {
        // 0: LDI R1,10  3: CALL R1  5: PRN R0  7: HLT  8..9: padding  10: LDI R0,99  13: RET
        let mut program = prog(&[
            (LDI, &[1, 10]),
            (CALL, &[1]),
            (PRN, &[0]),
            (HLT, &[]),
        ]);
        program.extend_from_slice(&[0, 0]);
        program.extend(prog(&[(LDI, &[0, 99]), (RET, &[])]));
        let mut cpu = cpu_with(&program);

        cpu.step();
        assert_eq!(cpu.step(), Status::Running);
        assert_eq!(cpu.pc(), 10);
        assert_eq!(cpu.registers().sp(), STACK_EMPTY - 1);
        // Return address is the byte right after CALL
        assert_eq!(cpu.memory().peek(0xF3), Some(5));

        cpu.step();
        cpu.step();
        assert_eq!(cpu.pc(), 5);
        assert_eq!(cpu.registers().sp(), STACK_EMPTY);

        cpu.run().unwrap();
        assert_eq!(cpu.into_sink(), vec![99]);
    }

    #[test]
    fn conditional_jumps() {
        // JEQ/JNE to address 16 which prints R3, otherwise fall through to HLT
        let build = |a: u8, b: u8, jump: Opcode| {
            let mut program = prog(&[
                (LDI, &[0, a]),
                (LDI, &[1, b]),
                (LDI, &[2, 16]),
                (CMP, &[0, 1]),
                (jump, &[2]),
                (HLT, &[]),
            ]);
            program.resize(16, 0);
            program.extend(prog(&[(LDI, &[3, 7]), (PRN, &[3]), (HLT, &[])]));
            program
        };

        let run = |program: Vec<u8>| {
            let mut cpu = cpu_with(&program);
            cpu.run().unwrap();
            (cpu.pc(), cpu.into_sink())
        };

        assert_eq!(run(build(5, 5, JEQ)), (21, vec![7]));
        assert_eq!(run(build(5, 6, JEQ)), (14, vec![]));
        assert_eq!(run(build(5, 6, JNE)), (21, vec![7]));
        assert_eq!(run(build(5, 5, JNE)), (14, vec![]));
    }

    #[test]
    fn jne_jumps_when_flags_unset() {
        let mut program = prog(&[(LDI, &[0, 8]), (JNE, &[0]), (HLT, &[])]);
        program.resize(8, 0);
        program.extend(prog(&[(PRN, &[0]), (HLT, &[])]));
        let mut cpu = cpu_with(&program);
        cpu.run().unwrap();
        assert_eq!(cpu.into_sink(), vec![8]);
    }

    #[test]
    fn jmp_loops() {
        // Count down from 3, printing each value
        let program = prog(&[
            (LDI, &[0, 3]),   // 0
            (LDI, &[1, 255]), // 3  -1
            (LDI, &[2, 0]),   // 6
            (LDI, &[3, 12]),  // 9  loop target
            (PRN, &[0]),      // 12
            (ADD, &[0, 1]),   // 14
            (CMP, &[0, 2]),   // 17
            (JNE, &[3]),      // 20
            (HLT, &[]),       // 22
        ]);
        let mut cpu = cpu_with(&program);
        cpu.run().unwrap();
        assert_eq!(cpu.pc(), 22);
        assert_eq!(cpu.into_sink(), vec![3, 2, 1]);
    }

    #[test]
    fn halt_stops_execution() {
        let mut cpu = cpu_with(&prog(&[(HLT, &[]), (LDI, &[0, 1]), (PRN, &[0])]));
        cpu.run().unwrap();
        assert_eq!(cpu.pc(), 0);
        assert_eq!(cpu.step(), Status::Halted);
        assert_eq!(cpu.pc(), 0);
        assert!(cpu.sink().is_empty());
    }

    #[test]
    fn unknown_opcode_faults() {
        let mut program = prog(&[(LDI, &[0, 1]), (PRN, &[0])]);
        program.push(0b0000_0000);
        program.extend(prog(&[(PRN, &[0]), (HLT, &[])]));
        let mut cpu = cpu_with(&program);
        let fault = Fault::UnknownOpcode { pc: 5, opcode: 0 };
        assert_eq!(cpu.run(), Err(fault));
        assert_eq!(cpu.status(), Status::Faulted(fault));
        assert_eq!(cpu.pc(), 5);
        // Terminal
        assert_eq!(cpu.step(), Status::Faulted(fault));
        assert_eq!(cpu.into_sink(), vec![1]);
    }

    #[test]
    fn unsupported_alu_operation_faults() {
        // 0b10101000 has the ALU bit set but is not ADD/MUL/CMP
        let mut cpu = cpu_with(&[0b1010_1000, 0, 1, HLT.byte()]);
        assert_eq!(
            cpu.run(),
            Err(Fault::UnsupportedAluOperation {
                pc: 0,
                opcode: 0b1010_1000
            })
        );
    }

    #[test]
    fn alu_bit_without_operation_faults_in_alu() {
        // Lengths 1 and 2 with the ALU bit set, even with a bad register operand
        for program in [vec![0b0010_0000, HLT.byte()], vec![0b0110_0000, 9, HLT.byte()]] {
            let opcode = program[0];
            let mut cpu = cpu_with(&program);
            assert_eq!(
                cpu.run(),
                Err(Fault::UnsupportedAluOperation { pc: 0, opcode })
            );
        }
    }

    #[test]
    fn advance_uses_length_of_executed_instruction() {
        // PUSH at 6 with SP = 7 overwrites its own opcode with HLT
        let mut cpu = cpu_with(&prog(&[
            (LDI, &[0, 1]),
            (LDI, &[7, 7]),
            (PUSH, &[0]),
            (LDI, &[1, 9]),
            (PRN, &[1]),
            (HLT, &[]),
        ]));
        assert_eq!(cpu.run(), Ok(()));
        assert_eq!(cpu.memory().peek(6), Some(HLT.byte()));
        assert_eq!(cpu.pc(), 13);
        assert_eq!(cpu.into_sink(), vec![9]);
    }

    #[test]
    fn advancing_past_memory_faults_in_same_step() {
        let mut program = prog(&[(LDI, &[0, 254]), (JMP, &[0])]);
        program.resize(256, 0);
        program[254] = PRN.byte();
        let mut cpu = cpu_with(&program);

        cpu.step();
        cpu.step();
        assert_eq!(cpu.pc(), 254);
        let fault = Fault::MemoryOutOfBounds {
            pc: 254,
            address: 256,
        };
        assert_eq!(cpu.step(), Status::Faulted(fault));
        assert_eq!(cpu.pc(), 254);
        assert_eq!(cpu.run(), Err(fault));
        // PRN itself completed
        assert_eq!(cpu.into_sink(), vec![254]);
    }

    #[test]
    fn call_without_valid_return_address_faults() {
        let mut program = prog(&[(LDI, &[0, 254]), (LDI, &[1, 10]), (JMP, &[0])]);
        program.resize(256, 0);
        program[254] = CALL.byte();
        program[255] = 1;
        let mut cpu = cpu_with(&program);
        assert_eq!(
            cpu.run(),
            Err(Fault::MemoryOutOfBounds {
                pc: 254,
                address: 256
            })
        );
        assert_eq!(cpu.pc(), 254);
        assert_eq!(cpu.registers().sp(), STACK_EMPTY);
    }

    #[test]
    fn bad_register_faults() {
        let mut cpu = cpu_with(&prog(&[(LDI, &[8, 1]), (HLT, &[])]));
        assert_eq!(
            cpu.run(),
            Err(Fault::RegisterOutOfBounds { pc: 0, register: 8 })
        );
    }

    #[test]
    fn running_off_memory_faults() {
        // Execution falls off the end after a jump to the last cell
        let mut program = prog(&[(LDI, &[0, 255]), (JMP, &[0])]);
        program.resize(256, 0);
        program[255] = PRN.byte();
        let mut cpu = cpu_with(&program);
        assert_eq!(
            cpu.run(),
            Err(Fault::MemoryOutOfBounds {
                pc: 255,
                address: 256
            })
        );
    }

    #[test]
    fn halt_in_last_cell() {
        let mut program = prog(&[(LDI, &[0, 255]), (JMP, &[0])]);
        program.resize(256, 0);
        program[255] = HLT.byte();
        let mut cpu = cpu_with(&program);
        assert_eq!(cpu.run(), Ok(()));
        assert_eq!(cpu.pc(), 255);
    }
}
