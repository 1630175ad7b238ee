use image::{GrayImage, Luma};

/// Which way a drawing primitive flips pixels.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Ink {
    Black,
    /// Draws white pixels, e.g. text on a filled box.
    White,
}

/// 1-bit label raster, row-major, MSB = leftmost pixel.
///
/// A set bit is white, a cleared bit is black. Drawing outside the label is silently clipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelBitmap {
    width: u32,
    height: u32,
    width_bytes: usize,
    data: Vec<u8>,
}

impl LabelBitmap {
    /// A blank (all white) bitmap.
    pub fn new(width: u32, height: u32) -> Self {
        let width_bytes = width.div_ceil(8) as usize;

        Self {
            width,
            height,
            width_bytes,
            data: vec![0xff; width_bytes * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width_bytes(&self) -> usize {
        self.width_bytes
    }

    pub fn clear(&mut self) {
        self.data.fill(0xff);
    }

    fn index(&self, x: i32, y: i32) -> Option<(usize, u8)> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }

        let idx = y as usize * self.width_bytes + x as usize / 8;
        let mask = 0x80 >> (x % 8);

        Some((idx, mask))
    }

    pub fn put(&mut self, x: i32, y: i32, ink: Ink) {
        if let Some((idx, mask)) = self.index(x, y) {
            match ink {
                Ink::Black => self.data[idx] &= !mask,
                Ink::White => self.data[idx] |= mask,
            }
        }
    }

    /// Paint a black pixel.
    pub fn set_pixel(&mut self, x: i32, y: i32) {
        self.put(x, y, Ink::Black);
    }

    /// Paint a white pixel.
    pub fn clear_pixel(&mut self, x: i32, y: i32) {
        self.put(x, y, Ink::White);
    }

    pub fn is_black(&self, x: i32, y: i32) -> bool {
        self.index(x, y)
            .is_some_and(|(idx, mask)| self.data[idx] & mask == 0)
    }

    /// Bresenham line, both end points included.
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32) {
        let (dx, dy) = ((x1 - x0).abs(), -(y1 - y0).abs());
        let (sx, sy) = (if x0 < x1 { 1 } else { -1 }, if y0 < y1 { 1 } else { -1 });

        let (mut x, mut y) = (x0, y0);
        let mut err = dx + dy;

        loop {
            self.set_pixel(x, y);

            if x == x1 && y == y1 {
                break;
            }

            let e2 = 2 * err;

            if e2 >= dy {
                err += dy;
                x += sx;
            }

            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// One pixel wide outline.
    pub fn draw_rect(&mut self, x: i32, y: i32, w: i32, h: i32) {
        if w <= 0 || h <= 0 {
            return;
        }

        let (right, bottom) = (x + w - 1, y + h - 1);

        self.draw_line(x, y, right, y);
        self.draw_line(x, bottom, right, bottom);
        self.draw_line(x, y, x, bottom);
        self.draw_line(right, y, right, bottom);
    }

    pub fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32) {
        for py in y..y.saturating_add(h) {
            for px in x..x.saturating_add(w) {
                self.set_pixel(px, py);
            }
        }
    }

    /// Packed bytes of row `y`.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.width_bytes;
        &self.data[start..start + self.width_bytes]
    }

    pub fn is_row_blank(&self, y: u32) -> bool {
        self.row(y).iter().all(|&byte| byte == 0xff)
    }

    /// Render as an 8-bit image (black = 0, white = 255), e.g. for a PNG preview.
    pub fn to_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            if self.is_black(x as i32, y as i32) {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }
}
