//! The two fixed glyph sets the adapter can select between.
//!
//! The adapter only cares about cell geometry and how a command byte maps to
//! a character; actual glyph rasterisation belongs to the framebuffer sink.

/// Active glyph set. `Ibm` is the power-on default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    /// 8x15 cell, raw-byte character codes (no code page translation).
    Ibm,
    /// 7x8 cell, bytes translated through code page 437 to Unicode.
    Apple,
}

impl Font {
    pub fn cell_width(self) -> u32 {
        match self {
            Font::Ibm => 8,
            Font::Apple => 7,
        }
    }

    pub fn cell_height(self) -> u32 {
        match self {
            Font::Ibm => 15,
            Font::Apple => 8,
        }
    }

    pub fn is_unicode(self) -> bool {
        self == Font::Apple
    }

    /// Map a command byte to the character the sink should draw.
    pub fn translate(self, byte: u8) -> char {
        match self {
            Font::Ibm => byte as char,
            Font::Apple => cp437_to_char(byte),
        }
    }
}

/// Code page 437 to Unicode, as the standard IBM437 decoder maps it: the
/// low half passes through as C0 controls / ASCII, the high half is the
/// familiar box-drawing-and-accents block.
pub fn cp437_to_char(byte: u8) -> char {
    if byte < 0x80 {
        return byte as char;
    }
    CP437_HIGH[(byte - 0x80) as usize]
}

const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å',
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ',
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»',
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐',
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧',
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀',
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩',
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{a0}',
];
