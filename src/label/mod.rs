use crate::analyzer::GasReading;
use crate::dive::GasMix;
use crate::printer::{BuiltinFont, Ink, LabelBitmap, LabelSize, Typeface};

/// Outline fonts for the large label text
pub mod text;

pub use text::{Error as FontError, OutlineFont};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Right,
    Center,
}

impl Alignment {
    /// Left edge of a run of `width` pixels anchored at `anchor`.
    ///
    /// `Left` starts at the anchor, `Right` ends at it and `Center` is centred on it.
    pub fn start_x(self, anchor: i32, width: i32) -> i32 {
        match self {
            Alignment::Left => anchor,
            Alignment::Right => anchor - width,
            Alignment::Center => anchor - width / 2,
        }
    }
}

/// The strings that end up on a gas label, already formatted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasLabel {
    pub oxygen: String,
    pub helium: String,
    pub mod_m: String,
    pub name: String,
    pub date: String,
}

impl GasLabel {
    /// O2 and He with one decimal, MOD in whole meters. The MOD is worked out from the O2 value
    /// as printed.
    pub fn new(oxygen: f32, helium: f32, name: &str, date: &str) -> Self {
        let mix = GasMix::new((oxygen * 10.0).round() / 10.0, helium);

        Self {
            oxygen: format!("{oxygen:.1}"),
            helium: format!("{helium:.1}"),
            mod_m: format!("{:.0}", mix.mod_m()),
            name: String::from(name),
            date: String::from(date),
        }
    }

    /// Take the values of a reading. The date comes from the analyzer's timestamp if it has a
    /// usable one, otherwise `fallback_date` is kept.
    pub fn from_reading(reading: &GasReading, name: &str, fallback_date: &str) -> Self {
        let date = reading.label_date();

        Self::new(
            reading.oxygen,
            reading.helium,
            name,
            date.as_deref().unwrap_or(fallback_date),
        )
    }
}

/// Horizontal margin of the value block.
const MARGIN_X: i32 = 70;

const CAPTION_SIZE: u32 = 28;
const VALUE_SIZE: u32 = 64;
const PERCENT_SIZE: u32 = 46;
const FOOTER_SIZE: u32 = 14;
const MOD_SIZE: u32 = 36;

/// Lays out labels onto a bitmap of the configured stock.
pub struct LabelComposer<'f> {
    size: LabelSize,
    font: &'f mut dyn Typeface,
}

impl<'f> LabelComposer<'f> {
    pub fn new(size: LabelSize, font: &'f mut dyn Typeface) -> Self {
        Self { size, font }
    }

    fn blank(&self) -> LabelBitmap {
        let (width, height) = self.size.bitmap_size();
        LabelBitmap::new(width, height)
    }

    /// Draw `text` anchored at `anchor_x` with the given alignment. Returns the left edge.
    #[allow(clippy::too_many_arguments)]
    pub fn place(
        &mut self,
        bitmap: &mut LabelBitmap,
        text: &str,
        size: u32,
        anchor_x: i32,
        y: i32,
        alignment: Alignment,
        ink: Ink,
    ) -> i32 {
        let width = self.font.text_width(text, size);
        let x = alignment.start_x(anchor_x, width);

        self.font.draw_text(bitmap, x, y, text, size, ink);
        x
    }

    /// The gas label: O2 and He values with their units, name and date, and the MOD inverted
    /// in a black bar at the bottom.
    pub fn compose_gas(&mut self, label: &GasLabel) -> LabelBitmap {
        let mut bitmap = self.blank();
        let width = bitmap.width() as i32;
        let center = width / 2;

        // Both percent signs share one column at the right margin.
        let percent_width = self.font.text_width("%", PERCENT_SIZE);
        let percent_x = (width - MARGIN_X) - percent_width;

        // O2 line.
        self.place(&mut bitmap, "O2", CAPTION_SIZE, MARGIN_X, 25, Alignment::Left, Ink::Black);
        self.place(&mut bitmap, "%", PERCENT_SIZE, percent_x, 25, Alignment::Left, Ink::Black);
        self.place(&mut bitmap, &label.oxygen, VALUE_SIZE, percent_x, 15, Alignment::Right, Ink::Black);

        // He line.
        self.place(&mut bitmap, "He", CAPTION_SIZE, MARGIN_X, 95, Alignment::Left, Ink::Black);
        self.place(&mut bitmap, &label.helium, VALUE_SIZE, percent_x, 85, Alignment::Right, Ink::Black);
        self.place(&mut bitmap, "%", PERCENT_SIZE, percent_x, 95, Alignment::Left, Ink::Black);

        let footer = format!("{}  {}", label.name, label.date);
        self.place(&mut bitmap, &footer, FOOTER_SIZE, center, 150, Alignment::Center, Ink::Black);

        // MOD bar. It runs off the bottom edge and is clipped there.
        bitmap.fill_rect(MARGIN_X, 170, width - 2 * MARGIN_X, 80);

        let mod_text = format!("MOD {}m", label.mod_m);
        self.place(&mut bitmap, &mod_text, MOD_SIZE, center, 185, Alignment::Center, Ink::White);

        log::debug!("Composed gas label {label:?}.");

        bitmap
    }
}

/// The printer test card: a border, two lines of text, a filled block and a greeting.
pub fn compose_demo(size: LabelSize) -> LabelBitmap {
    let (width, height) = size.bitmap_size();
    let mut bitmap = LabelBitmap::new(width, height);
    let (width, height) = (width as i32, height as i32);

    bitmap.draw_rect(5, 5, width - 10, height - 10);

    BuiltinFont::draw_scaled(&mut bitmap, 20, 20, "NIIMBOT B1", 3, Ink::Black);
    BuiltinFont::draw_scaled(&mut bitmap, 20, 70, "BLE TEST", 2, Ink::Black);

    bitmap.fill_rect(20, 120, 100, 50);

    BuiltinFont::draw_scaled(&mut bitmap, 20, 190, "HELLO WORLD", 2, Ink::Black);

    bitmap
}
