use crate::error::Fault;

/// LS-8 can address 256 bytes of memory.
pub const MEMORY_SIZE: usize = 0x100;
/// R0 to R7.
pub const REGISTER_COUNT: usize = 8;
/// R7 is reserved as the stack pointer.
pub const SP: u8 = 7;
/// Stack pointer value for an empty stack. Stack grows downward from here.
pub const STACK_EMPTY: u8 = 0xF4;

/// Flat byte-addressable RAM, zero-initialized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Memory {
    cells: [u8; MEMORY_SIZE],
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory {
    pub fn new() -> Self {
        Memory {
            cells: [0; MEMORY_SIZE],
        }
    }

    /// Read the byte at `address`.
    ///
    /// `pc` is only used to give context to a fault.
    pub fn read(&self, pc: usize, address: usize) -> Result<u8, Fault> {
        self.cells
            .get(address)
            .copied()
            .ok_or(Fault::MemoryOutOfBounds { pc, address })
    }

    pub fn write(&mut self, pc: usize, address: usize, value: u8) -> Result<(), Fault> {
        let cell = self
            .cells
            .get_mut(address)
            .ok_or(Fault::MemoryOutOfBounds { pc, address })?;
        *cell = value;
        Ok(())
    }

    /// Read without faulting, for observers such as the trace.
    pub fn peek(&self, address: usize) -> Option<u8> {
        self.cells.get(address).copied()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.cells
    }

    /// Copy `bytes` to the start of memory and zero the rest.
    pub(crate) fn fill_from(&mut self, bytes: &[u8]) {
        debug_assert!(bytes.len() <= MEMORY_SIZE);
        self.cells = [0; MEMORY_SIZE];
        self.cells[..bytes.len()].copy_from_slice(bytes);
    }
}

/// General purpose registers. R7 doubles as the stack pointer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registers {
    reg: [u8; REGISTER_COUNT],
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

impl Registers {
    pub fn new() -> Self {
        let mut reg = [0; REGISTER_COUNT];
        reg[SP as usize] = STACK_EMPTY;
        Registers { reg }
    }

    pub fn read(&self, pc: usize, register: u8) -> Result<u8, Fault> {
        self.reg
            .get(register as usize)
            .copied()
            .ok_or(Fault::RegisterOutOfBounds { pc, register })
    }

    pub fn write(&mut self, pc: usize, register: u8, value: u8) -> Result<(), Fault> {
        let slot = self
            .reg
            .get_mut(register as usize)
            .ok_or(Fault::RegisterOutOfBounds { pc, register })?;
        *slot = value;
        Ok(())
    }

    #[inline]
    pub fn sp(&self) -> u8 {
        self.reg[SP as usize]
    }

    #[inline]
    pub(crate) fn set_sp(&mut self, value: u8) {
        self.reg[SP as usize] = value;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.reg
    }
}
