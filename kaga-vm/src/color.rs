//! Color encodings used by the adapter command set.
//!
//! PUT commands carry a packed color byte (two 4-bit nibbles, foreground in
//! the high nibble). CLR and ENQ use a 16-bit 5-6-5 packed RGB word.

/// A resolved 8-bit-per-channel RGB color, the only pixel format the
/// framebuffer sink ever sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    /// Pack into the 0RGB layout window presenters expect.
    pub fn to_argb(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | (self.b as u32)
    }
}

/// Resolve a 4-bit color nibble.
///
/// Bit 3 is the intensity bit, bits 2/1/0 select the R/G/B channels.
/// An intense channel is 255, a normal one 127.
pub fn resolve_nibble(nibble: u32) -> Rgb {
    let nibble = nibble & 0xf;
    let intensity = ((nibble >> 3) * 128 + 127) as u8;
    Rgb {
        r: ((nibble >> 2) & 1) as u8 * intensity,
        g: ((nibble >> 1) & 1) as u8 * intensity,
        b: (nibble & 1) as u8 * intensity,
    }
}

/// Foreground color of a PUT color byte (high nibble).
pub fn resolve_fg(color_byte: u32) -> Rgb {
    resolve_nibble((color_byte >> 4) & 0xf)
}

/// Background color of a PUT color byte (low nibble).
pub fn resolve_bg(color_byte: u32) -> Rgb {
    resolve_nibble(color_byte & 0xf)
}

/// Decode a 16-bit 5-6-5 packed RGB word.
///
/// Channels are normalized to [0,1] and re-expanded to 8 bits with
/// round-to-nearest, so pure channel values land on 0 and 255 exactly.
pub fn decode_565(packed: u16) -> Rgb {
    let r = ((packed >> 11) & 0x1f) as f32 / 31.0;
    let g = ((packed >> 5) & 0x3f) as f32 / 63.0;
    let b = (packed & 0x1f) as f32 / 31.0;
    Rgb {
        r: (r * 255.0 + 0.5) as u8,
        g: (g * 255.0 + 0.5) as u8,
        b: (b * 255.0 + 0.5) as u8,
    }
}

/// Re-encode an [`Rgb`] as a 16-bit 5-6-5 word, rounding each channel to
/// its sub-range. Inverse of [`decode_565`] for every value it produces.
pub fn encode_565(color: Rgb) -> u16 {
    let r = (color.r as f32 / 255.0 * 31.0 + 0.5) as u16;
    let g = (color.g as f32 / 255.0 * 63.0 + 0.5) as u16;
    let b = (color.b as f32 / 255.0 * 31.0 + 0.5) as u16;
    (r << 11) | (g << 5) | b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nibble_white_and_black() {
        assert_eq!(resolve_fg(0xf0), Rgb { r: 255, g: 255, b: 255 });
        assert_eq!(resolve_bg(0xf0), Rgb::BLACK);
    }

    #[test]
    fn nibble_intensity_scaling() {
        // 0b0100 = dim red, 0b1100 = intense red
        assert_eq!(resolve_nibble(0b0100), Rgb { r: 127, g: 0, b: 0 });
        assert_eq!(resolve_nibble(0b1100), Rgb { r: 255, g: 0, b: 0 });
    }

    #[test]
    fn wide_color_round_trips() {
        for packed in [0x0000u16, 0xffff, 0x2d0e, 0xf800, 0x07e0, 0x001f] {
            assert_eq!(encode_565(decode_565(packed)), packed);
        }
    }
}
