pub mod adapter;
pub mod bus;
pub mod color;
pub mod display;
pub mod dram;
pub mod fb;
pub mod font;
#[cfg(feature = "gui")]
pub mod gui;
pub mod irq;
pub mod keyboard;
pub mod regs;
pub mod render;
pub mod timing;

use thiserror::Error;

/// Architectural traps raised by bus accesses. The CPU simulator decides
/// what to do with them; the adapter itself never unwinds through one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Trap {
    #[error("Instruction address misaligned: {0:#x}")]
    InstructionAddressMisaligned(u64),
    #[error("Instruction access fault: {0:#x}")]
    InstructionAccessFault(u64),
    #[error("Load address misaligned: {0:#x}")]
    LoadAddressMisaligned(u64),
    #[error("Load access fault: {0:#x}")]
    LoadAccessFault(u64),
    #[error("Store address misaligned: {0:#x}")]
    StoreAddressMisaligned(u64),
    #[error("Store access fault: {0:#x}")]
    StoreAccessFault(u64),
    #[error("Fatal bus error: {0}")]
    Fatal(String),
}
