use crate::printer::{Ink, LabelBitmap, Typeface};

use std::path::Path;

use cosmic_text::{Attrs, Buffer, Color, Family, FontSystem, Metrics, Shaping, SwashCache};
use image::{imageops::FilterType, GrayImage};

/// Line height = LINE_HEIGHT_FACTOR * font size
const LINE_HEIGHT_FACTOR: f32 = 1.3;

/// Glyphs are rasterised at most at this pixel size. Larger text is scaled up from it.
pub const MAX_RASTER_SIZE: u32 = 72;

/// Coverage above this counts as ink.
const INK_THRESHOLD: u8 = 127;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to load font file: {0}")]
    Load(#[from] std::io::Error),

    #[error("No usable font faces were found.")]
    NoFaces,
}

/// Scalable text through cosmic-text, thresholded onto the 1-bit label.
pub struct OutlineFont {
    font_system: FontSystem,
    raster_cache: SwashCache,

    /// The name of the font family (`None` picks the default sans-serif face)
    family: Option<String>,
}

impl OutlineFont {
    /// Use the fonts installed on the system.
    pub fn system(family: Option<String>) -> Result<Self, Error> {
        let font_system = FontSystem::new();

        if font_system.db().is_empty() {
            return Err(Error::NoFaces);
        }

        Ok(Self {
            font_system,
            raster_cache: SwashCache::new(),
            family,
        })
    }

    /// Load one font file on top of the system fonts. Without an explicit family, the file's
    /// own family is used.
    pub fn from_file(path: &Path, family: Option<String>) -> Result<Self, Error> {
        let mut font_system = FontSystem::new();
        let db = font_system.db_mut();
        let before = db.len();

        db.load_font_file(path)?;

        if db.len() == before {
            return Err(Error::NoFaces);
        }

        let family = family.or_else(|| {
            db.faces()
                .last()
                .and_then(|face| face.families.first())
                .map(|(name, _)| name.clone())
        });

        log::info!("Loaded font {} ({family:?}).", path.display());

        Ok(Self {
            font_system,
            raster_cache: SwashCache::new(),
            family,
        })
    }

    /// Lay out one line at `px` pixels. Returns the buffer and the line width.
    fn layout(&mut self, text: &str, px: u32) -> (Buffer, f32) {
        let size = px as f32;
        let mut buffer = Buffer::new(&mut self.font_system, Metrics::new(size, size * LINE_HEIGHT_FACTOR));

        let family = self.family.as_deref().map_or(Family::SansSerif, Family::Name);

        // No width: a label line never wraps.
        buffer.set_size(&mut self.font_system, None, None);
        buffer.set_text(
            &mut self.font_system,
            text,
            Attrs::new().family(family),
            Shaping::Advanced,
        );

        let width = buffer
            .layout_runs()
            .map(|run| run.line_w)
            .fold(0.0f32, f32::max);

        (buffer, width)
    }

    /// Render one line into a coverage image (0 = nothing, 255 = full ink).
    fn rasterize(&mut self, text: &str, px: u32) -> GrayImage {
        let (buffer, width) = self.layout(text, px);

        let image_width = (width.ceil() as u32).max(1);
        let image_height = ((px as f32) * LINE_HEIGHT_FACTOR).ceil() as u32;
        let mut image = GrayImage::new(image_width, image_height);

        buffer.draw(
            &mut self.font_system,
            &mut self.raster_cache,
            Color::rgb(0x00, 0x00, 0x00),
            |x, y, w, h, color| {
                let alpha = color.a();

                if alpha == 0 {
                    return;
                }

                for dy in 0..h as i32 {
                    for dx in 0..w as i32 {
                        let (Ok(ix), Ok(iy)) = (u32::try_from(x + dx), u32::try_from(y + dy)) else {
                            continue;
                        };

                        if ix < image_width && iy < image_height {
                            let pix = &mut image.get_pixel_mut(ix, iy).0;
                            pix[0] = pix[0].max(alpha);
                        }
                    }
                }
            },
        );

        image
    }
}

impl Typeface for OutlineFont {
    fn text_width(&mut self, text: &str, size: u32) -> i32 {
        if size == 0 {
            return 0;
        }

        let base = size.min(MAX_RASTER_SIZE);
        let (_, width) = self.layout(text, base);
        let scale = size as f32 / base as f32;

        (width * scale) as i32
    }

    fn draw_text(&mut self, bitmap: &mut LabelBitmap, x: i32, y: i32, text: &str, size: u32, ink: Ink) {
        if size == 0 || text.is_empty() {
            return;
        }

        let base = size.min(MAX_RASTER_SIZE);
        let mut coverage = self.rasterize(text, base);

        // Past the largest raster size the glyphs are blown up pixel by pixel.
        if size > base {
            let scale = size as f32 / base as f32;
            let width = ((coverage.width() as f32) * scale).round() as u32;
            let height = ((coverage.height() as f32) * scale).round() as u32;

            coverage = image::imageops::resize(&coverage, width, height, FilterType::Nearest);
        }

        for (px, py, pixel) in coverage.enumerate_pixels() {
            if pixel.0[0] > INK_THRESHOLD {
                bitmap.put(x + px as i32, y + py as i32, ink);
            }
        }
    }
}
