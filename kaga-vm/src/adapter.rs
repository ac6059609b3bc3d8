//! The keyboard-and-graphics adapter proper: wires bus access notifications
//! into the command decoder, the delay simulator and the interrupt line.
//!
//! The adapter is purely reactive. It subscribes to four address ranges
//! (receiver-data, the adapter-data word, and both executable segments) and
//! everything else follows from the notifications the bus delivers.

use std::sync::{Arc, Mutex};

use crate::bus::{AccessKind, AccessNotice, BusWatcher, MemoryLayout, SystemBus};
use crate::display::DisplayState;
use crate::fb::FramebufferSink;
use crate::irq::CpuIntr;
use crate::regs::{RegisterFile, ADAPTER_DATA, ADAPTER_STATUS, RECEIVER_CONTROL, RECEIVER_DATA};
use crate::timing::TransmitDelay;

struct AdapterState {
    display: DisplayState,
    delay: TransmitDelay,
}

/// The display adapter core.
pub struct Adapter {
    regs: Arc<RegisterFile>,
    cpu: Arc<CpuIntr>,
    layout: MemoryLayout,
    state: Mutex<AdapterState>,
}

impl Adapter {
    pub fn new(
        regs: Arc<RegisterFile>,
        cpu: Arc<CpuIntr>,
        layout: MemoryLayout,
        fb: Box<dyn FramebufferSink>,
    ) -> Self {
        Self {
            regs,
            cpu,
            layout,
            state: Mutex::new(AdapterState {
                display: DisplayState::new(fb),
                delay: TransmitDelay::new(),
            }),
        }
    }

    /// Attach to the bus: subscribe the adapter's address ranges and assert
    /// the adapter ready bit, signalling that commands are accepted.
    pub fn connect(self: &Arc<Self>, bus: &mut SystemBus) {
        let base = self.layout.mmio_base;
        bus.subscribe(base + RECEIVER_DATA, base + RECEIVER_DATA, self.clone());
        bus.subscribe(base + ADAPTER_DATA, base + ADAPTER_DATA + 3, self.clone());
        bus.subscribe(
            self.layout.text_base,
            self.layout.text_base + self.layout.text_size - 1,
            self.clone(),
        );
        bus.subscribe(
            self.layout.kernel_text_base,
            self.layout.kernel_text_base + self.layout.kernel_text_size - 1,
            self.clone(),
        );
        self.regs.set_ready(ADAPTER_STATUS);
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().unwrap().delay.is_busy()
    }

    /// Host reset: force the timing simulator back to READY, rebuild the
    /// display state and re-assert the adapter ready bit. Safe to call from
    /// the UI thread regardless of any in-flight delay.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.delay.reset();
        state.display.reset();
        self.regs.set_ready(ADAPTER_STATUS);
        log::debug!("[KAGA] adapter reset");
    }

    fn handle_command_write(&self) {
        let mut state = self.state.lock().unwrap();
        // The gate is "must be READY to accept": both the architectural
        // ready bit and the delay simulator have to agree.
        if !self.regs.is_ready(ADAPTER_STATUS) || state.delay.is_busy() {
            log::trace!("[KAGA] command write ignored while busy");
            return;
        }
        let command = self.regs.read_word(ADAPTER_DATA);
        let result = state.display.process_command(command);
        state.delay.begin(result.delay());
        self.regs.write_word(ADAPTER_STATUS, result.status());
    }

    fn handle_fetch(&self) {
        let mut state = self.state.lock().unwrap();
        if state.delay.tick() {
            let updated = self.regs.set_ready(ADAPTER_STATUS);
            log::trace!("[KAGA] delay elapsed, status {:#010x}", updated);
            self.cpu.signal_display(updated);
        }
    }
}

impl BusWatcher for Adapter {
    fn on_access(&self, notice: AccessNotice) {
        let base = self.layout.mmio_base;
        if notice.addr == base + RECEIVER_DATA && notice.kind == AccessKind::Read {
            // The program consumed the keystroke; drop the ready bit.
            self.regs.clear_ready(RECEIVER_CONTROL);
            return;
        }
        let full_word = notice.addr == base + ADAPTER_DATA && notice.len == 4;
        let top_byte = notice.addr == base + ADAPTER_DATA + 3 && notice.len == 1;
        if (full_word || top_byte) && notice.kind == AccessKind::Write {
            self.handle_command_write();
            return;
        }
        if notice.kind == AccessKind::Read && self.layout.in_exec(notice.addr) {
            self.handle_fetch();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{KERNEL_TEXT_BASE, TEXT_BASE};
    use crate::display::{INVALID_CMD, READY};
    use crate::fb::PixelBuffer;
    use crate::irq::Device;
    use crate::regs::INTR_ENABLE;

    struct Rig {
        bus: SystemBus,
        adapter: Arc<Adapter>,
        regs: Arc<RegisterFile>,
        cpu: Arc<CpuIntr>,
        base: u64,
    }

    fn rig() -> Rig {
        let layout = MemoryLayout::default();
        let base = layout.mmio_base;
        let regs = Arc::new(RegisterFile::new());
        let cpu = Arc::new(CpuIntr::new());
        let mut bus = SystemBus::new(layout.clone(), regs.clone()).unwrap();
        let adapter = Arc::new(Adapter::new(
            regs.clone(),
            cpu.clone(),
            layout,
            Box::new(PixelBuffer::new(640, 480)),
        ));
        adapter.connect(&mut bus);
        Rig { bus, adapter, regs, cpu, base }
    }

    #[test]
    fn connect_asserts_adapter_ready() {
        let rig = rig();
        assert!(rig.regs.is_ready(ADAPTER_STATUS));
        assert!(!rig.adapter.is_busy());
    }

    #[test]
    fn command_write_processes_and_updates_status() {
        let mut rig = rig();
        rig.bus.write32(rig.base + ADAPTER_DATA, 0x0009_0000).unwrap();
        let status = rig.regs.read_word(ADAPTER_STATUS);
        assert_ne!(status & INVALID_CMD, 0);
        assert_ne!(status & READY, 0);
    }

    #[test]
    fn top_byte_write_triggers_a_command() {
        let mut rig = rig();
        // Assemble the word via the low bytes first, then poke b0: the
        // store of the character register is what fires the command.
        rig.bus.write8(rig.base + ADAPTER_DATA, 0xf0).unwrap();
        rig.bus.write8(rig.base + ADAPTER_DATA + 1, 0x05).unwrap();
        rig.bus.write8(rig.base + ADAPTER_DATA + 2, 0x02).unwrap();
        assert!(rig.regs.is_ready(ADAPTER_STATUS));
        rig.bus.write8(rig.base + ADAPTER_DATA + 3, 0x41).unwrap();
        // PUT 'A' at (2, 5) white-on-black completed instantly.
        let status = rig.regs.read_word(ADAPTER_STATUS);
        assert_eq!(status, READY);
    }

    #[test]
    fn busy_gating_until_exactly_n_fetches() {
        let mut rig = rig();
        // Scenario D: CLR incurs a 125-fetch delay.
        rig.bus.write32(rig.base + ADAPTER_DATA, 0x0001_2d0e).unwrap();
        assert!(rig.adapter.is_busy());
        assert!(!rig.regs.is_ready(ADAPTER_STATUS));

        // Writes during the busy period are ignored.
        rig.bus.write32(rig.base + ADAPTER_DATA, 0x0009_0000).unwrap();
        assert_eq!(rig.regs.read_word(ADAPTER_STATUS) & INVALID_CMD, 0);

        // Data-segment reads do not count as qualifying fetches.
        for _ in 0..200 {
            rig.bus.read32(crate::bus::DATA_BASE).unwrap();
        }
        assert!(rig.adapter.is_busy());

        for i in 0..125 {
            assert!(!rig.regs.is_ready(ADAPTER_STATUS), "ready after {} fetches", i);
            rig.bus.fetch_u32(TEXT_BASE + (i % 16) * 4).unwrap();
        }
        assert!(rig.regs.is_ready(ADAPTER_STATUS));
        assert!(!rig.adapter.is_busy());
    }

    #[test]
    fn kernel_text_fetches_also_count() {
        let mut rig = rig();
        rig.bus.write32(rig.base + ADAPTER_DATA, 0x0001_0000).unwrap();
        for _ in 0..125 {
            rig.bus.fetch_u32(KERNEL_TEXT_BASE).unwrap();
        }
        assert!(rig.regs.is_ready(ADAPTER_STATUS));
    }

    #[test]
    fn ready_reassertion_raises_display_interrupt_when_enabled() {
        let mut rig = rig();
        rig.bus.write32(rig.base + ADAPTER_DATA, 0x0001_2d0e).unwrap();
        // The program enables the adapter interrupt during the busy period.
        rig.bus.write32(rig.base + ADAPTER_STATUS, INTR_ENABLE).unwrap();
        for _ in 0..125 {
            rig.bus.fetch_u32(TEXT_BASE).unwrap();
        }
        assert_eq!(rig.cpu.take_pending(), Some(Device::Display));
        assert_eq!(rig.regs.read_word(ADAPTER_STATUS), READY | INTR_ENABLE);
    }

    #[test]
    fn no_interrupt_without_enable_bit() {
        let mut rig = rig();
        rig.bus.write32(rig.base + ADAPTER_DATA, 0x0001_2d0e).unwrap();
        for _ in 0..125 {
            rig.bus.fetch_u32(TEXT_BASE).unwrap();
        }
        assert_eq!(rig.cpu.take_pending(), None);
    }

    #[test]
    fn receiver_data_read_clears_keyboard_ready() {
        let mut rig = rig();
        rig.regs.push_key(0x61);
        assert!(rig.regs.is_ready(RECEIVER_CONTROL));
        let data = rig.bus.read32(rig.base + RECEIVER_DATA).unwrap();
        assert_eq!(data, 0x61);
        assert!(!rig.regs.is_ready(RECEIVER_CONTROL));
    }

    #[test]
    fn reset_cancels_in_flight_delay() {
        let mut rig = rig();
        rig.bus.write32(rig.base + ADAPTER_DATA, 0x0002_5028).unwrap();
        assert!(rig.adapter.is_busy());
        rig.adapter.reset();
        assert!(!rig.adapter.is_busy());
        assert!(rig.regs.is_ready(ADAPTER_STATUS));
        // A new command is accepted immediately after reset.
        rig.bus.write32(rig.base + ADAPTER_DATA, 0x0000_0000).unwrap();
        assert_eq!(rig.regs.read_word(ADAPTER_STATUS) & READY, READY);
    }

    #[test]
    fn enq_after_res_round_trips_through_the_bus() {
        let mut rig = rig();
        rig.bus.write32(rig.base + ADAPTER_DATA, 0x0002_5028).unwrap();
        for _ in 0..7500 {
            rig.bus.fetch_u32(TEXT_BASE).unwrap();
        }
        rig.bus.write32(rig.base + ADAPTER_DATA, 0x00ff_0000).unwrap();
        let status = rig.regs.read_word(ADAPTER_STATUS);
        assert_eq!((status >> 24) & 0xff, 0x28); // rows
        assert_eq!((status >> 16) & 0xff, 0x50); // cols
    }
}
