use super::{Ink, LabelBitmap};

pub const GLYPH_WIDTH: i32 = 5;
pub const GLYPH_HEIGHT: i32 = 7;

/// One column of spacing after each glyph.
const ADVANCE: i32 = GLYPH_WIDTH + 1;

/// Something that can measure and draw a line of text onto a label.
///
/// `size` is the nominal glyph height in pixels.
pub trait Typeface {
    /// Horizontal extent of `text`.
    fn text_width(&mut self, text: &str, size: u32) -> i32;

    /// Draw `text` with its top left corner at (`x`, `y`).
    fn draw_text(
        &mut self,
        bitmap: &mut LabelBitmap,
        x: i32,
        y: i32,
        text: &str,
        size: u32,
        ink: Ink,
    );
}

// Column-major, bit 0 = top row.
static SPACE: [u8; 5] = [0x00, 0x00, 0x00, 0x00, 0x00];

static LETTERS: [[u8; 5]; 26] = [
    [0x7e, 0x11, 0x11, 0x11, 0x7e], // A
    [0x7f, 0x49, 0x49, 0x49, 0x36], // B
    [0x3e, 0x41, 0x41, 0x41, 0x22], // C
    [0x7f, 0x41, 0x41, 0x22, 0x1c], // D
    [0x7f, 0x49, 0x49, 0x49, 0x41], // E
    [0x7f, 0x09, 0x09, 0x01, 0x01], // F
    [0x3e, 0x41, 0x41, 0x51, 0x32], // G
    [0x7f, 0x08, 0x08, 0x08, 0x7f], // H
    [0x00, 0x41, 0x7f, 0x41, 0x00], // I
    [0x20, 0x40, 0x41, 0x3f, 0x01], // J
    [0x7f, 0x08, 0x14, 0x22, 0x41], // K
    [0x7f, 0x40, 0x40, 0x40, 0x40], // L
    [0x7f, 0x02, 0x04, 0x02, 0x7f], // M
    [0x7f, 0x04, 0x08, 0x10, 0x7f], // N
    [0x3e, 0x41, 0x41, 0x41, 0x3e], // O
    [0x7f, 0x09, 0x09, 0x09, 0x06], // P
    [0x3e, 0x41, 0x51, 0x21, 0x5e], // Q
    [0x7f, 0x09, 0x19, 0x29, 0x46], // R
    [0x46, 0x49, 0x49, 0x49, 0x31], // S
    [0x01, 0x01, 0x7f, 0x01, 0x01], // T
    [0x3f, 0x40, 0x40, 0x40, 0x3f], // U
    [0x1f, 0x20, 0x40, 0x20, 0x1f], // V
    [0x7f, 0x20, 0x18, 0x20, 0x7f], // W
    [0x63, 0x14, 0x08, 0x14, 0x63], // X
    [0x03, 0x04, 0x78, 0x04, 0x03], // Y
    [0x61, 0x51, 0x49, 0x45, 0x43], // Z
];

static DIGITS: [[u8; 5]; 10] = [
    [0x3e, 0x51, 0x49, 0x45, 0x3e],
    [0x00, 0x42, 0x7f, 0x40, 0x00],
    [0x42, 0x61, 0x51, 0x49, 0x46],
    [0x21, 0x41, 0x45, 0x4b, 0x31],
    [0x18, 0x14, 0x12, 0x7f, 0x10],
    [0x27, 0x45, 0x45, 0x45, 0x39],
    [0x3c, 0x4a, 0x49, 0x49, 0x30],
    [0x01, 0x71, 0x09, 0x05, 0x03],
    [0x36, 0x49, 0x49, 0x49, 0x36],
    [0x06, 0x49, 0x49, 0x29, 0x1e],
];

static PERCENT: [u8; 5] = [0x23, 0x13, 0x08, 0x64, 0x62];
static PERIOD: [u8; 5] = [0x00, 0x60, 0x60, 0x00, 0x00];
static SLASH: [u8; 5] = [0x60, 0x10, 0x08, 0x04, 0x03];
static SMALL_M: [u8; 5] = [0x7c, 0x04, 0x78, 0x04, 0x78];

/// Glyph for `c`. Lowercase letters render as capitals, except `m` (meters).
fn glyph(c: char) -> Option<&'static [u8; 5]> {
    match c {
        ' ' => Some(&SPACE),
        'm' => Some(&SMALL_M),
        'A'..='Z' => Some(&LETTERS[c as usize - 'A' as usize]),
        'a'..='z' => Some(&LETTERS[c as usize - 'a' as usize]),
        '0'..='9' => Some(&DIGITS[c as usize - '0' as usize]),
        '%' => Some(&PERCENT),
        '.' => Some(&PERIOD),
        '/' => Some(&SLASH),
        _ => None,
    }
}

/// The built-in 5x7 pixel font, scaled by integer factors.
#[derive(Debug, Default, Copy, Clone)]
pub struct BuiltinFont;

impl BuiltinFont {
    /// Integer scale that gets closest to `size` pixels of glyph height (at least 1).
    pub fn scale_for(size: u32) -> i32 {
        ((size as i32 + GLYPH_HEIGHT / 2) / GLYPH_HEIGHT).max(1)
    }

    /// Unknown characters are skipped but still advance the cursor.
    pub fn draw_scaled(bitmap: &mut LabelBitmap, x: i32, y: i32, text: &str, scale: i32, ink: Ink) {
        let mut cursor = x;

        for c in text.chars() {
            if let Some(columns) = glyph(c) {
                for (col, &bits) in (0..).zip(columns.iter()) {
                    for row in 0..GLYPH_HEIGHT {
                        if bits & (1 << row) == 0 {
                            continue;
                        }

                        for dy in 0..scale {
                            for dx in 0..scale {
                                bitmap.put(cursor + col * scale + dx, y + row * scale + dy, ink);
                            }
                        }
                    }
                }
            }

            cursor += ADVANCE * scale;
        }
    }

    pub fn width_scaled(text: &str, scale: i32) -> i32 {
        text.chars().count() as i32 * ADVANCE * scale
    }
}

impl Typeface for BuiltinFont {
    fn text_width(&mut self, text: &str, size: u32) -> i32 {
        Self::width_scaled(text, Self::scale_for(size))
    }

    fn draw_text(
        &mut self,
        bitmap: &mut LabelBitmap,
        x: i32,
        y: i32,
        text: &str,
        size: u32,
        ink: Ink,
    ) {
        Self::draw_scaled(bitmap, x, y, text, Self::scale_for(size), ink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glyph_lookup() {
        assert_eq!(glyph('a'), glyph('A'));
        assert_ne!(glyph('m'), glyph('M'));
        assert_eq!(glyph('0'), Some(&DIGITS[0]));
        assert_eq!(glyph('#'), None);
    }

    #[test]
    fn draws_an_i_at_scale_one() {
        let mut bitmap = LabelBitmap::new(8, 8);
        BuiltinFont::draw_scaled(&mut bitmap, 0, 0, "I", 1, Ink::Black);

        // Middle column is fully set, the outer columns only at top and bottom.
        assert!((0..7).all(|y| bitmap.is_black(2, y)));
        assert!(bitmap.is_black(1, 0) && bitmap.is_black(3, 6));
        assert!(!bitmap.is_black(1, 3));
        assert!(bitmap.is_row_blank(7));
    }

    #[test]
    fn scale_multiplies_pixels() {
        let mut bitmap = LabelBitmap::new(32, 16);
        BuiltinFont::draw_scaled(&mut bitmap, 0, 0, ".", 2, Ink::Black);

        // The period sits in columns 1..=2, rows 5..=6 of the glyph.
        assert!(bitmap.is_black(2, 10) && bitmap.is_black(5, 13));
        assert!(!bitmap.is_black(1, 10) && !bitmap.is_black(6, 13));
    }

    #[test]
    fn unknown_characters_still_advance() {
        assert_eq!(BuiltinFont::width_scaled("a#b", 2), 36);

        let mut bitmap = LabelBitmap::new(24, 8);
        BuiltinFont::draw_scaled(&mut bitmap, 0, 0, "#I", 1, Ink::Black);

        assert!(bitmap.is_black(ADVANCE + 2, 3));
        assert!((0..ADVANCE).all(|x| !bitmap.is_black(x, 3)));
    }

    #[test]
    fn white_ink_clears() {
        let mut bitmap = LabelBitmap::new(8, 8);
        bitmap.fill_rect(0, 0, 8, 8);

        BuiltinFont.draw_text(&mut bitmap, 0, 0, "I", 7, Ink::White);

        assert!(!bitmap.is_black(2, 3));
        assert!(bitmap.is_black(1, 3));
    }

    #[test]
    fn size_maps_to_scale() {
        assert_eq!(BuiltinFont::scale_for(1), 1);
        assert_eq!(BuiltinFont::scale_for(14), 2);
        assert_eq!(BuiltinFont::scale_for(28), 4);
        assert_eq!(BuiltinFont::scale_for(64), 9);
    }
}
