//! Toshiba TLCS-900/H CPU core
//!
//! A table-driven interpreter for the 16-bit TLCS-900/H used by the
//! Neo Geo Pocket family. The core is generic over [`MemoryTlcs900h`], which
//! also carries the device hooks the CPU needs at instruction boundaries:
//! interrupt arbitration, micro-DMA requests and the firmware trap.
//!
//! Timing is counted in CPU states. [`CpuTlcs900h::execute`] runs until a
//! budget is met, and the final instruction's overshoot is charged against
//! the next call.

mod alu;
mod decode;
mod execute;
mod registers;

#[cfg(test)]
mod tests;

pub use alu::{AluOp, ShiftOp};
pub use decode::{
    Addr, DstOp, OpDesc, Primary, RegOp, SrcOp, DST_OPS, PRIMARY, REG_OPS, SRC_OPS, UNDEFINED_COST,
};
pub use registers::{
    DmaChannel, Registers, Width, FLAG_C, FLAG_H, FLAG_N, FLAG_S, FLAG_V, FLAG_Z, SR_RESET,
};

use serde::{Deserialize, Serialize};

/// Address space is 24 bits wide
pub const ADDRESS_MASK: u32 = 0x00FF_FFFF;

/// Base of the interrupt and SWI vector table
pub const VECTOR_BASE: u32 = 0x00FF_FF00;

/// States charged for accepting an interrupt
pub const INTERRUPT_COST: u32 = 18;

/// States charged for one micro-DMA transfer
pub const DMA_TRANSFER_COST: u32 = 8;

/// States that pass per step while halted
pub const HALT_IDLE_COST: u32 = 8;

/// A maskable interrupt offered by the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptRequest {
    /// Offset into the vector table at [`VECTOR_BASE`]
    pub vector: u8,
    /// Priority 1-7
    pub level: u8,
}

/// Memory and device interface for the TLCS-900/H
pub trait MemoryTlcs900h {
    /// Read a byte from the 24-bit address space
    fn read8(&mut self, addr: u32) -> u8;

    /// Write a byte to the 24-bit address space
    fn write8(&mut self, addr: u32, val: u8);

    fn read16(&mut self, addr: u32) -> u16 {
        let lo = self.read8(addr) as u16;
        let hi = self.read8(addr.wrapping_add(1) & ADDRESS_MASK) as u16;
        lo | (hi << 8)
    }

    fn read32(&mut self, addr: u32) -> u32 {
        let lo = self.read16(addr) as u32;
        let hi = self.read16(addr.wrapping_add(2) & ADDRESS_MASK) as u32;
        lo | (hi << 16)
    }

    fn write16(&mut self, addr: u32, val: u16) {
        self.write8(addr, val as u8);
        self.write8(addr.wrapping_add(1) & ADDRESS_MASK, (val >> 8) as u8);
    }

    fn write32(&mut self, addr: u32, val: u32) {
        self.write16(addr, val as u16);
        self.write16(addr.wrapping_add(2) & ADDRESS_MASK, (val >> 16) as u16);
    }

    /// Advance devices by the states just consumed
    fn tick(&mut self, cycles: u32) {
        let _ = cycles;
    }

    /// Forwarded from `execute` so the display can elide rendering
    fn set_render_skip(&mut self, skip: bool) {
        let _ = skip;
    }

    /// Highest-priority latched interrupt whose level is at least `mask`
    fn pending_interrupt(&mut self, mask: u8) -> Option<InterruptRequest> {
        let _ = mask;
        None
    }

    /// Clear the request latch for an interrupt being serviced
    fn acknowledge_interrupt(&mut self, vector: u8) {
        let _ = vector;
    }

    /// Next micro-DMA channel whose start interrupt fired
    fn take_dma_request(&mut self) -> Option<usize> {
        None
    }

    /// A micro-DMA channel's count reached zero
    fn raise_dma_end(&mut self, channel: usize) {
        let _ = channel;
    }

    /// Handle the firmware trap opcode. `regs.pc` points past the opcode.
    /// Returns the states consumed, or `None` to treat it as undefined.
    fn hle_trap(&mut self, regs: &mut Registers) -> Option<u32> {
        let _ = regs;
        None
    }
}

/// Serializable CPU state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuState {
    pub regs: Registers,
    pub halted: bool,
    pub overshoot: u32,
    pub cycles: u64,
}

/// TLCS-900/H CPU
#[derive(Debug)]
pub struct CpuTlcs900h<M: MemoryTlcs900h> {
    pub regs: Registers,
    /// Waiting for an interrupt after HALT
    pub halted: bool,
    /// States the last `execute` ran past its budget
    pub overshoot: u32,
    /// Total states executed
    pub cycles: u64,
    pub memory: M,
}

impl<M: MemoryTlcs900h> CpuTlcs900h<M> {
    pub fn new(memory: M) -> Self {
        Self {
            regs: Registers::new(),
            halted: false,
            overshoot: 0,
            cycles: 0,
            memory,
        }
    }

    /// Reset registers; the caller sets PC and XSP for the loaded program.
    pub fn reset(&mut self) {
        self.regs = Registers::new();
        self.halted = false;
        self.overshoot = 0;
        self.cycles = 0;
    }

    /// Run instructions until `budget` states have been consumed.
    ///
    /// Overshoot from the previous call is deducted first; if it already
    /// covers the whole budget nothing runs and 0 is returned. The return
    /// value is the number of states executed by this call.
    pub fn execute(&mut self, budget: u32, skip_render: bool) -> u32 {
        self.memory.set_render_skip(skip_render);

        if self.overshoot >= budget {
            self.overshoot -= budget;
            return 0;
        }

        let target = budget - self.overshoot;
        let mut consumed = 0;
        while consumed < target {
            consumed += self.step();
        }
        self.overshoot = consumed - target;
        consumed
    }

    /// Run one instruction boundary: pending DMA, then an interrupt or one
    /// instruction. Returns the states consumed.
    pub fn step(&mut self) -> u32 {
        let mut cycles = 0;

        while let Some(channel) = self.memory.take_dma_request() {
            cycles += self.dma_transfer(channel);
        }

        if let Some(request) = self.memory.pending_interrupt(self.regs.iff()) {
            self.halted = false;
            cycles += self.service_interrupt(request);
        } else if self.halted {
            cycles += HALT_IDLE_COST;
        } else {
            cycles += self.execute_instruction();
        }

        self.memory.tick(cycles);
        self.cycles += cycles as u64;
        cycles
    }

    /// Push PC and SR, raise the mask and jump through the vector table
    pub fn service_interrupt(&mut self, request: InterruptRequest) -> u32 {
        self.memory.acknowledge_interrupt(request.vector);
        let pc = self.regs.pc;
        self.push32(pc);
        let sr = self.regs.sr;
        self.push16(sr);
        self.regs.set_iff((request.level + 1).min(7));
        self.regs.int_nest = self.regs.int_nest.wrapping_add(1);
        self.regs.pc = self.memory.read32(VECTOR_BASE + request.vector as u32) & ADDRESS_MASK;
        INTERRUPT_COST
    }

    /// Perform one micro-DMA transfer on `channel`
    pub fn dma_transfer(&mut self, channel: usize) -> u32 {
        let channel = channel & 3;
        let dma = self.regs.dma[channel];
        let width = match dma.mode & 3 {
            0 => Width::Byte,
            1 => Width::Word,
            _ => Width::Long,
        };
        let step = width.bytes();
        let (mut source, mut dest) = (dma.source, dma.dest);

        match (dma.mode >> 2) & 7 {
            // Counter mode: source advances, nothing moves.
            5 => source = source.wrapping_add(1),
            mode => {
                let value = self.read_mem(source, width);
                self.write_mem(dest, width, value);
                match mode {
                    0 => dest = dest.wrapping_add(step),
                    1 => dest = dest.wrapping_sub(step),
                    2 => source = source.wrapping_add(step),
                    3 => source = source.wrapping_sub(step),
                    _ => {}
                }
            }
        }

        let count = dma.count.wrapping_sub(1);
        let regs = &mut self.regs.dma[channel];
        regs.source = source & ADDRESS_MASK;
        regs.dest = dest & ADDRESS_MASK;
        regs.count = count;
        if count == 0 {
            self.memory.raise_dma_end(channel);
        }
        DMA_TRANSFER_COST
    }

    pub fn save_state(&self) -> CpuState {
        CpuState {
            regs: self.regs.clone(),
            halted: self.halted,
            overshoot: self.overshoot,
            cycles: self.cycles,
        }
    }

    pub fn load_state(&mut self, state: &CpuState) {
        self.regs = state.regs.clone();
        self.halted = state.halted;
        self.overshoot = state.overshoot;
        self.cycles = state.cycles;
    }
}

impl<M: MemoryTlcs900h> crate::Cpu for CpuTlcs900h<M> {
    fn reset(&mut self) {
        CpuTlcs900h::reset(self)
    }

    fn step(&mut self) -> u32 {
        CpuTlcs900h::step(self)
    }
}
