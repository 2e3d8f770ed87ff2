//! NMOS 6502 CPU interpreter.
//!
//! Executes one whole instruction per `step()` and returns its cycle cost.
//! This is an instruction-level interpreter, not a per-cycle state machine:
//! callers that need frame timing sum the returned cycle counts.
//!
//! The documented instruction set is implemented with exact NMOS semantics
//! (wrapping 8-bit arithmetic, decimal mode, the JMP-indirect page bug,
//! page-crossing cycle penalties). The *stable* undocumented opcodes are
//! implemented too — LAX, SAX, DCP, ISC, SLO, SRE, RLA, RRA, ANC, ALR,
//! ARR, SBX and the NOP family — because C64 music drivers use them for
//! timing tricks. Opcodes with no deterministic behavior (JAM/KIL, XAA,
//! the SHA/SHX/SHY/TAS/LAS group) fail with [`CpuError::UnsupportedOpcode`].

mod cpu;
mod flags;
mod registers;

pub use cpu::{CpuError, Mos6502};
pub use flags::Status;
pub use registers::Registers;

/// Memory bus interface.
///
/// The CPU performs every memory access through this trait. The write path
/// doubles as the interception point for memory-mapped peripherals: a bus
/// implementation can observe writes without the CPU knowing anything about
/// what sits behind an address.
pub trait Bus {
    /// Read a byte from the given address.
    fn read(&mut self, address: u16) -> u8;

    /// Write a byte to the given address.
    fn write(&mut self, address: u16, value: u8);
}
