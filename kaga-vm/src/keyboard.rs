//! Keyboard input handler: turns host UI key events into receiver register
//! updates and keyboard interrupts.

use std::sync::Arc;

use crate::irq::CpuIntr;
use crate::regs::RegisterFile;

/// Virtual key code of the Shift key; a Shift press on its own never
/// reaches the receiver.
pub const VK_SHIFT: u16 = 0x10;

// Virtual key codes for the non-printable keys the demo window reports.
pub const VK_ESCAPE: u16 = 0x1b;
pub const VK_LEFT: u16 = 0x25;
pub const VK_UP: u16 = 0x26;
pub const VK_RIGHT: u16 = 0x27;
pub const VK_DOWN: u16 = 0x28;
pub const VK_DELETE: u16 = 0x7f;

/// A key event as delivered by the host UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    /// A typed printable character (layout-resolved).
    Char(char),
    /// A non-printable key, identified by its virtual key code.
    Special(u16),
}

/// Converts key events into atomic register-file updates plus interrupt
/// signalling. Shared between whatever UI thread produces the events.
pub struct Keyboard {
    regs: Arc<RegisterFile>,
    cpu: Arc<CpuIntr>,
}

impl Keyboard {
    pub fn new(regs: Arc<RegisterFile>, cpu: Arc<CpuIntr>) -> Self {
        Self { regs, cpu }
    }

    /// Deliver one key event: compute the data word, set the receiver ready
    /// bit (preserving interrupt-enable) and store the data in a single
    /// register-file update, then run the keyboard interrupt guard against
    /// the newly computed control value.
    pub fn key_event(&self, event: KeyEvent) {
        let data = match event {
            KeyEvent::Char(ch) => (ch as u32) & 0xff,
            KeyEvent::Special(VK_SHIFT) => return,
            KeyEvent::Special(code) => ((code as u32) & 0xff) << 8,
        };
        log::trace!("[KBD] {:?} -> receiver data {:#06x}", event, data);
        let control = self.regs.push_key(data);
        self.cpu.signal_keyboard(control);
    }
}
