use crate::config::{LABEL_HEIGHT_MM, LABEL_WIDTH_MM, PRINTER_DPI};

const MM_PER_INCH: f32 = 25.4;

/// How the printer detects the end of a label.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum LabelType {
    /// Die-cut labels separated by gaps.
    WithGaps = 1,
    Continuous = 2,
}

/// Physical label stock.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LabelSize {
    pub width_mm: f32,
    pub height_mm: f32,
    pub dpi: f32,
}

impl Default for LabelSize {
    fn default() -> Self {
        Self {
            width_mm: LABEL_WIDTH_MM,
            height_mm: LABEL_HEIGHT_MM,
            dpi: PRINTER_DPI,
        }
    }
}

impl LabelSize {
    /// Printable dots (truncated).
    pub fn dots(&self) -> (u32, u32) {
        let to_dots = |mm: f32| (mm * self.dpi / MM_PER_INCH) as u32;
        (to_dots(self.width_mm), to_dots(self.height_mm))
    }

    /// Bitmap dimensions: the width is padded to whole bytes.
    pub fn bitmap_size(&self) -> (u32, u32) {
        let (width, height) = self.dots();
        (width.div_ceil(8) * 8, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stock_at_203_dpi() {
        let size = LabelSize::default();

        assert_eq!(size.dots(), (399, 239));
        assert_eq!(size.bitmap_size(), (400, 239));
    }
}
