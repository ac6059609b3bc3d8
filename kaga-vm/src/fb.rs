//! Framebuffer sink contract and the headless in-memory surface.
//!
//! The protocol core only ever pushes pixels out through [`FramebufferSink`];
//! it never reads them back. Clipping of out-of-bounds paints is the sink's
//! responsibility.

use crate::color::Rgb;
use crate::font::Font;

/// A rectangle in surface pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// A character cell position (column, row) on the logical screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub col: u32,
    pub row: u32,
}

/// Rendering surface the display state machine writes into.
pub trait FramebufferSink: Send {
    /// Fill `rect` with a solid color, clipped to the surface.
    fn fill(&mut self, rect: Rect, color: Rgb);

    /// Draw one glyph at `cell` using the geometry of `font`. The cell
    /// background has already been filled when this is called.
    fn draw_glyph(&mut self, cell: Cell, ch: char, font: Font, fg: Rgb, bg: Rgb);

    /// Reallocate the surface to `width` x `height` pixels. Must not return
    /// until the new surface is in place (see the rendering-task handshake
    /// in `render.rs`).
    fn resize(&mut self, width: u32, height: u32);
}

/// Plain in-memory pixel surface in 0RGB layout (what `minifb` consumes).
///
/// Glyphs are drawn as placeholder tiles: the cell interior is filled with
/// the foreground color, inset by one pixel on each side so adjacent cells
/// stay distinguishable. Real glyph bitmaps are a presenter concern.
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u32>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u32] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x < self.width && y < self.height {
            Some(self.data[(y * self.width + x) as usize])
        } else {
            None
        }
    }
}

impl FramebufferSink for PixelBuffer {
    fn fill(&mut self, rect: Rect, color: Rgb) {
        let argb = color.to_argb();
        let x1 = rect.x.min(self.width);
        let y1 = rect.y.min(self.height);
        let x2 = rect.x.saturating_add(rect.w).min(self.width);
        let y2 = rect.y.saturating_add(rect.h).min(self.height);
        for y in y1..y2 {
            let row = (y * self.width) as usize;
            for x in x1..x2 {
                self.data[row + x as usize] = argb;
            }
        }
    }

    fn draw_glyph(&mut self, cell: Cell, ch: char, font: Font, fg: Rgb, _bg: Rgb) {
        let w = font.cell_width();
        let h = font.cell_height();
        // Whitespace leaves the background fill alone.
        if !ch.is_whitespace() && ch != '\0' {
            self.fill(
                Rect {
                    x: cell.col * w + 1,
                    y: cell.row * h + 1,
                    w: w.saturating_sub(2),
                    h: h.saturating_sub(2),
                },
                fg,
            );
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.data = vec![0; (width * height) as usize];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_clips_to_surface() {
        let mut fb = PixelBuffer::new(4, 4);
        let red = Rgb { r: 255, g: 0, b: 0 };
        fb.fill(Rect { x: 2, y: 2, w: 10, h: 10 }, red);
        assert_eq!(fb.pixel(3, 3), Some(red.to_argb()));
        assert_eq!(fb.pixel(1, 1), Some(0));
    }

    #[test]
    fn resize_reallocates_and_clears() {
        let mut fb = PixelBuffer::new(2, 2);
        fb.fill(Rect { x: 0, y: 0, w: 2, h: 2 }, Rgb { r: 1, g: 2, b: 3 });
        fb.resize(8, 8);
        assert_eq!(fb.width(), 8);
        assert_eq!(fb.data().len(), 64);
        assert!(fb.data().iter().all(|&p| p == 0));
    }
}
