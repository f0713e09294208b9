//! Pixel-index to RGBA lookup table.

use crate::canvas::color_scale::ColorScale;
use crate::canvas::image::{Rgba, RgbaImage};

/// 256-entry palette for one color scale and rotation.
#[derive(Debug, Clone)]
pub struct ColorTable {
    lut: Vec<Rgba>,
}

impl ColorTable {
    pub fn build(scale: &ColorScale, rotation: u8) -> Self {
        let lut = (0..=255u8)
            .map(|p| Rgba::opaque(scale.color_for_pixel(p, rotation)))
            .collect();
        ColorTable { lut }
    }

    #[inline]
    pub fn apply(&self, pixel: u8) -> Rgba {
        self.lut[pixel as usize]
    }

    /// Convert the first `width` columns of a column-major index buffer
    /// (`columns[x][y]`) into an image of `height` rows.
    pub fn colorize(&self, columns: &[Vec<u8>], width: usize, height: usize) -> RgbaImage {
        let mut image = RgbaImage::new(width, height);
        for (x, column) in columns.iter().take(width).enumerate() {
            for (y, &p) in column.iter().take(height).enumerate() {
                image.set_pixel(x, y, self.apply(p));
            }
        }
        image
    }
}
