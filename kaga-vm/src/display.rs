//! Command decoder and display state machine.
//!
//! A 32-bit command word written to adapter-data is decomposed into four
//! unsigned bytes `b0..b3` (most- to least-significant) and dispatched:
//!
//! - `b0` outside {0x00, 0xFF}: PUT-CHARACTER, `b0` = character code,
//!   `b1`/`b2` = column/row, `b3` = packed color byte.
//! - otherwise `b1` selects a control operation: NOP, CLR, RES, FNT, or
//!   (for `b1 == 0xFF`) an ENQUIRE selected by `b2`.
//!
//! Every path returns a [`CommandResult`]; nothing here unwinds into the
//! caller. The READY bit is folded into the returned status only when the
//! delay is zero; a busy command leaves ready-assertion to the timing
//! simulator.

use crate::color::{self, Rgb};
use crate::fb::{Cell, FramebufferSink, Rect};
use crate::font::Font;

// Status word bits. Bits 16-31 carry the enquiry payload.
pub const READY: u32 = 1 << 0;
pub const OFFSCREEN_CHAR: u32 = 1 << 4;
pub const INVISIBLE_CHAR: u32 = 1 << 5;
pub const INVALID_CMD: u32 = 1 << 6;
pub const INVALID_ARGS: u32 = 1 << 7;

// Control sub-commands (dispatch value of b1).
const CTRL_NOP: u32 = 0;
const CTRL_CLR: u32 = 1;
const CTRL_RES: u32 = 2;
const CTRL_FNT: u32 = 3;
const CTRL_ENQ: u32 = 0xff;

// Processing latencies, in qualifying instruction fetches.
const CLEAR_DELAY: u32 = 125;
const RESIZE_DELAY: u32 = 7500;
const FONT_DELAY: u32 = 7500;

// Legal RES argument ranges, in character cells.
const MIN_COLS: u32 = 40;
const MAX_COLS: u32 = 255;
const MIN_ROWS: u32 = 25;
const MAX_ROWS: u32 = 128;

/// Surface dimensions assumed before the first RES runs.
pub const PREFERRED_WIDTH: u32 = 640;
pub const PREFERRED_HEIGHT: u32 = 480;

/// Per-command outcome: a status bit-mask and an instruction-count delay.
/// Created by the decoder, consumed immediately by the adapter, discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandResult {
    status: u32,
    delay: u32,
}

impl CommandResult {
    fn new(status: u32, delay: u32) -> Self {
        Self { status, delay }
    }

    fn set_enq_wide(&mut self, value: u32) {
        self.status = (self.status & 0x0000_ffff) | (value << 16);
    }

    fn set_enq_lo(&mut self, value: u32) {
        self.status = (self.status & 0xff00_ffff) | ((value & 0xff) << 16);
    }

    fn set_enq_hi(&mut self, value: u32) {
        self.status = (self.status & 0x00ff_ffff) | ((value & 0xff) << 24);
    }

    /// The status word to write back. READY is asserted here only for
    /// zero-delay commands.
    pub fn status(&self) -> u32 {
        if self.delay == 0 {
            self.status | READY
        } else {
            self.status
        }
    }

    pub fn delay(&self) -> u32 {
        self.delay
    }
}

/// Mutable display state: active font, surface size, remembered clear
/// color, and the framebuffer sink everything is painted into.
pub struct DisplayState {
    font: Font,
    surface_width: u32,
    surface_height: u32,
    /// False until the first RES/FNT establishes a logical size; ENQ falls
    /// back to the preferred surface dimensions while unset.
    sized: bool,
    /// Last CLR color as the packed 5-6-5 word; black before any CLR.
    clear_color: Option<u16>,
    fb: Box<dyn FramebufferSink>,
}

impl DisplayState {
    pub fn new(fb: Box<dyn FramebufferSink>) -> Self {
        let mut state = Self {
            font: Font::Ibm,
            surface_width: PREFERRED_WIDTH,
            surface_height: PREFERRED_HEIGHT,
            sized: false,
            clear_color: None,
            fb,
        };
        state.fb.resize(state.surface_width, state.surface_height);
        state
    }

    pub fn font(&self) -> Font {
        self.font
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.surface_width, self.surface_height)
    }

    /// Logical screen size in character cells, as ENQ reports it.
    pub fn logical_size(&self) -> (u32, u32) {
        if self.sized {
            (
                self.surface_width / self.font.cell_width(),
                self.surface_height / self.font.cell_height(),
            )
        } else {
            (
                PREFERRED_WIDTH / self.font.cell_width(),
                PREFERRED_HEIGHT / self.font.cell_height(),
            )
        }
    }

    /// Return to the power-on display state (IBM font, preferred surface,
    /// clear color forgotten).
    pub fn reset(&mut self) {
        self.font = Font::Ibm;
        self.surface_width = PREFERRED_WIDTH;
        self.surface_height = PREFERRED_HEIGHT;
        self.sized = false;
        self.clear_color = None;
        self.fb.resize(self.surface_width, self.surface_height);
    }

    /// Decode and execute one command word.
    pub fn process_command(&mut self, command: u32) -> CommandResult {
        let [b0, b1, b2, b3] = command.to_be_bytes().map(u32::from);

        let result = if b0 != 0x00 && b0 != 0xff {
            self.put_char(b0, b1, b2, b3)
        } else {
            match b1 {
                CTRL_NOP => CommandResult::new(0, 0),
                CTRL_CLR => self.clear(((b2 << 8) | b3) as u16),
                CTRL_RES => self.resize(b2, b3),
                CTRL_FNT => self.switch_font(b2),
                CTRL_ENQ => self.enquire(b2),
                _ => CommandResult::new(INVALID_CMD, 0),
            }
        };
        log::trace!(
            "[KAGA] command {:#010x} -> status {:#010x}, delay {}",
            command,
            result.status(),
            result.delay()
        );
        result
    }

    fn put_char(&mut self, code: u32, col: u32, row: u32, color_byte: u32) -> CommandResult {
        let w = self.font.cell_width();
        let h = self.font.cell_height();
        let x = col * w;
        let y = row * h;

        let mut status = 0;
        if x >= self.surface_width || y > self.surface_height {
            status |= OFFSCREEN_CHAR;
        }

        let fg = color::resolve_fg(color_byte);
        let bg = color::resolve_bg(color_byte);
        if fg == bg {
            status |= INVISIBLE_CHAR;
        }

        // Paint regardless of the off-screen flag; the sink clips.
        self.fb.fill(Rect { x, y, w, h }, bg);
        let ch = self.font.translate(code as u8);
        self.fb.draw_glyph(Cell { col, row }, ch, self.font, fg, bg);

        CommandResult::new(status, 0)
    }

    fn clear(&mut self, packed: u16) -> CommandResult {
        let color = color::decode_565(packed);
        self.fb.fill(
            Rect { x: 0, y: 0, w: self.surface_width, h: self.surface_height },
            color,
        );
        self.clear_color = Some(packed);
        CommandResult::new(0, CLEAR_DELAY)
    }

    fn resize(&mut self, cols: u32, rows: u32) -> CommandResult {
        if !(MIN_COLS..=MAX_COLS).contains(&cols) || !(MIN_ROWS..=MAX_ROWS).contains(&rows) {
            return CommandResult::new(INVALID_ARGS, 0);
        }
        self.surface_width = cols * self.font.cell_width();
        self.surface_height = rows * self.font.cell_height();
        self.sized = true;
        self.fb.resize(self.surface_width, self.surface_height);
        CommandResult::new(0, RESIZE_DELAY)
    }

    fn switch_font(&mut self, selector: u32) -> CommandResult {
        // Carry the logical cell counts across the switch: divide the old
        // pixel size by the old cell size, then reapply at the new one.
        let cols = self.surface_width / self.font.cell_width();
        let rows = self.surface_height / self.font.cell_height();

        self.font = if selector == 0 { Font::Ibm } else { Font::Apple };

        self.surface_width = cols * self.font.cell_width();
        self.surface_height = rows * self.font.cell_height();
        self.sized = true;
        self.fb.resize(self.surface_width, self.surface_height);
        CommandResult::new(0, FONT_DELAY)
    }

    fn enquire(&mut self, selector: u32) -> CommandResult {
        let mut result = CommandResult::new(0, 0);
        match selector {
            0 => {
                let (cols, rows) = self.logical_size();
                result.set_enq_hi(rows);
                result.set_enq_lo(cols);
            }
            1 => result.set_enq_wide(if self.font.is_unicode() { 1 } else { 0 }),
            2 => result.set_enq_wide(self.clear_color.unwrap_or(0) as u32),
            // Unknown enquiry selectors return the bare default result, a
            // deliberate asymmetry with the control dispatch above.
            _ => {}
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Fill(Rect, Rgb),
        Glyph(Cell, char, Font),
        Resize(u32, u32),
    }

    struct RecordingSink(Arc<Mutex<Vec<Op>>>);

    impl FramebufferSink for RecordingSink {
        fn fill(&mut self, rect: Rect, color: Rgb) {
            self.0.lock().unwrap().push(Op::Fill(rect, color));
        }
        fn draw_glyph(&mut self, cell: Cell, ch: char, font: Font, _fg: Rgb, _bg: Rgb) {
            self.0.lock().unwrap().push(Op::Glyph(cell, ch, font));
        }
        fn resize(&mut self, width: u32, height: u32) {
            self.0.lock().unwrap().push(Op::Resize(width, height));
        }
    }

    fn display() -> (DisplayState, Arc<Mutex<Vec<Op>>>) {
        let ops = Arc::new(Mutex::new(Vec::new()));
        let display = DisplayState::new(Box::new(RecordingSink(ops.clone())));
        ops.lock().unwrap().clear();
        (display, ops)
    }

    fn enq_payload(status: u32) -> u32 {
        status >> 16
    }

    #[test]
    fn enq_size_on_fresh_display_reports_preferred() {
        // Scenario A: 80x32 cells under the 8x15 font on a 640x480 surface.
        let (mut d, _) = display();
        let r = d.process_command(0x00ff_0000);
        assert_eq!(r.delay(), 0);
        assert_eq!((r.status() >> 24) & 0xff, 32); // rows
        assert_eq!((r.status() >> 16) & 0xff, 80); // cols
        assert_ne!(r.status() & READY, 0);
    }

    #[test]
    fn put_draws_and_completes_immediately() {
        // Scenario B: PUT 0xD1 at col 0x51, row 0x1F, white on black.
        let (mut d, ops) = display();
        let r = d.process_command(0xd151_1ff0);
        assert_eq!(r.delay(), 0);
        assert_ne!(r.status() & READY, 0);
        assert_eq!(r.status() & INVISIBLE_CHAR, 0);
        // col 0x51 * 8 = 648 >= 640: off the preferred surface.
        assert_ne!(r.status() & OFFSCREEN_CHAR, 0);

        let ops = ops.lock().unwrap();
        assert_eq!(
            ops[0],
            Op::Fill(Rect { x: 648, y: 465, w: 8, h: 15 }, Rgb::BLACK)
        );
        assert_eq!(ops[1], Op::Glyph(Cell { col: 0x51, row: 0x1f }, '\u{d1}', Font::Ibm));
    }

    #[test]
    fn put_with_equal_colors_is_invisible() {
        let (mut d, _) = display();
        // fg nibble == bg nibble == 0xF
        let r = d.process_command(0x4101_01ff);
        assert_ne!(r.status() & INVISIBLE_CHAR, 0);
        // On-screen cell, so only the invisible flag plus READY.
        assert_eq!(r.status() & OFFSCREEN_CHAR, 0);

        let r = d.process_command(0x4101_01f0);
        assert_eq!(r.status() & INVISIBLE_CHAR, 0);
    }

    #[test]
    fn font_switch_is_reported_by_enq() {
        // Scenario C: FNT b2=0xFF selects the Unicode glyph set.
        let (mut d, _) = display();
        let r = d.process_command(0x0003_ffff);
        assert_eq!(r.delay(), 7500);
        assert_eq!(d.font(), Font::Apple);

        let r = d.process_command(0x00ff_0100);
        assert_eq!(enq_payload(r.status()), 1);
    }

    #[test]
    fn clear_paints_and_incurs_delay() {
        // Scenario D: CLR 0x2D0E.
        let (mut d, ops) = display();
        let r = d.process_command(0x0001_2d0e);
        assert_eq!(r.delay(), 125);
        assert_eq!(r.status() & READY, 0);

        let expected = crate::color::decode_565(0x2d0e);
        assert_eq!(
            ops.lock().unwrap()[0],
            Op::Fill(Rect { x: 0, y: 0, w: 640, h: 480 }, expected)
        );

        let r = d.process_command(0x00ff_0200);
        assert_eq!(enq_payload(r.status()), 0x2d0e);
    }

    #[test]
    fn unknown_control_is_invalid_cmd() {
        // Scenario E.
        let (mut d, _) = display();
        let r = d.process_command(0x0009_0000);
        assert_ne!(r.status() & INVALID_CMD, 0);
        assert_eq!(r.delay(), 0);
    }

    #[test]
    fn unknown_enquiry_is_a_bare_default() {
        let (mut d, _) = display();
        let r = d.process_command(0x00ff_0700);
        assert_eq!(r.status(), READY);
        assert_eq!(r.delay(), 0);
    }

    #[test]
    fn resize_rejects_out_of_range_dimensions() {
        let (mut d, ops) = display();
        for cmd in [
            0x0002_2718u32, // cols 39
            0x0002_0019,    // cols 0
            0x0002_5018,    // rows 24
            0x0002_50ff,    // rows 255
        ] {
            let r = d.process_command(cmd);
            assert_ne!(r.status() & INVALID_ARGS, 0, "command {:#x}", cmd);
            assert_eq!(r.delay(), 0);
        }
        assert!(ops.lock().unwrap().is_empty());
        assert_eq!(d.surface_size(), (640, 480));
    }

    #[test]
    fn enq_size_round_trips_after_res() {
        let (mut d, ops) = display();
        let r = d.process_command(0x0002_5028); // RES cols=0x50, rows=0x28
        assert_eq!(r.delay(), 7500);
        assert_eq!(ops.lock().unwrap()[0], Op::Resize(80 * 8, 40 * 15));

        let r = d.process_command(0x00ff_0000);
        assert_eq!((r.status() >> 24) & 0xff, 40);
        assert_eq!((r.status() >> 16) & 0xff, 80);
    }

    #[test]
    fn font_switch_preserves_logical_size() {
        let (mut d, _) = display();
        d.process_command(0x0002_501e); // RES 80x30
        d.process_command(0x0003_0100); // FNT -> Apple 7x8
        assert_eq!(d.surface_size(), (80 * 7, 30 * 8));

        let r = d.process_command(0x00ff_0000);
        assert_eq!((r.status() >> 24) & 0xff, 30);
        assert_eq!((r.status() >> 16) & 0xff, 80);
    }

    #[test]
    fn nop_is_idempotent() {
        let (mut d, ops) = display();
        for _ in 0..5 {
            let r = d.process_command(0x0000_0000);
            assert_eq!(r.status(), READY);
            assert_eq!(r.delay(), 0);
        }
        assert!(ops.lock().unwrap().is_empty());
        assert_eq!(d.surface_size(), (640, 480));
        assert_eq!(d.font(), Font::Ibm);
    }

    #[test]
    fn reset_restores_power_on_state() {
        let (mut d, _) = display();
        d.process_command(0x0002_5028);
        d.process_command(0x0003_ff00);
        d.process_command(0x0001_2d0e);
        d.reset();
        assert_eq!(d.font(), Font::Ibm);
        assert_eq!(d.surface_size(), (640, 480));
        let r = d.process_command(0x00ff_0200);
        assert_eq!(enq_payload(r.status()), 0);
    }
}
