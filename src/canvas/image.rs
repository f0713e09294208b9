//! RGBA pixel buffers, rectangles and the drawing-surface seam.

/// Axis-aligned pixel rectangle. Empty when either side is `<= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// One past the last column.
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// One past the last row.
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return Rect::default();
        }
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 255);
    pub const WHITE: Rgba = Rgba::new(255, 255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(rgb: [u8; 3]) -> Self {
        Self::new(rgb[0], rgb[1], rgb[2], 255)
    }

    pub const fn with_alpha(self, a: u8) -> Self {
        Self::new(self.r, self.g, self.b, a)
    }

    /// Linear blend from `self` (t = 0) to `other` (t = 1), per channel.
    pub fn lerp(self, other: Rgba, t: f64) -> Rgba {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        Rgba::new(
            mix(self.r, other.r),
            mix(self.g, other.g),
            mix(self.b, other.b),
            mix(self.a, other.a),
        )
    }

    /// Source-over composite of `self` onto `dst`.
    pub fn over(self, dst: Rgba) -> Rgba {
        match self.a {
            255 => self,
            0 => dst,
            a => {
                let sa = a as u32;
                let da = dst.a as u32 * (255 - sa) / 255;
                let out_a = sa + da;
                let mix = |s: u8, d: u8| ((s as u32 * sa + d as u32 * da) / out_a.max(1)) as u8;
                Rgba::new(
                    mix(self.r, dst.r),
                    mix(self.g, dst.g),
                    mix(self.b, dst.b),
                    out_a as u8,
                )
            }
        }
    }
}

/// Row-major RGBA image, 4 bytes per pixel.
#[derive(Clone, PartialEq)]
pub struct RgbaImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl std::fmt::Debug for RgbaImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RgbaImage({}x{})", self.width, self.height)
    }
}

impl RgbaImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self::filled(width, height, Rgba::TRANSPARENT)
    }

    pub fn filled(width: usize, height: usize, color: Rgba) -> Self {
        let mut image = Self {
            width,
            height,
            pixels: vec![0; width * height * 4],
        };
        image.fill(color);
        image
    }

    pub fn rect(&self) -> Rect {
        Rect::new(0, 0, self.width as i32, self.height as i32)
    }

    pub fn fill(&mut self, color: Rgba) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&[color.r, color.g, color.b, color.a]);
        }
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> Rgba {
        let i = (y * self.width + x) * 4;
        let p = &self.pixels[i..i + 4];
        Rgba::new(p[0], p[1], p[2], p[3])
    }

    #[inline]
    pub fn set_pixel(&mut self, x: usize, y: usize, color: Rgba) {
        let i = (y * self.width + x) * 4;
        self.pixels[i..i + 4].copy_from_slice(&[color.r, color.g, color.b, color.a]);
    }

    /// Move `width` columns starting at `from` so they start at `to`, in every
    /// row. Columns uncovered by the move keep their old contents.
    pub fn shift_columns(&mut self, from: usize, to: usize, width: usize) {
        assert!(
            from + width <= self.width && to + width <= self.width,
            "column shift {from}->{to} x{width} outside image of width {}",
            self.width
        );
        let stride = self.width * 4;
        for row in self.pixels.chunks_exact_mut(stride) {
            row.copy_within(from * 4..(from + width) * 4, to * 4);
        }
    }

    /// Copy of the pixels inside `area`, which must lie within the image.
    pub fn crop(&self, area: Rect) -> RgbaImage {
        assert!(
            self.rect().contains(&area),
            "crop {area:?} outside image {}x{}",
            self.width,
            self.height
        );
        let mut out = RgbaImage::new(area.width.max(0) as usize, area.height.max(0) as usize);
        let row_bytes = out.width * 4;
        for y in 0..out.height {
            let src = ((area.y as usize + y) * self.width + area.x as usize) * 4;
            out.pixels[y * row_bytes..(y + 1) * row_bytes]
                .copy_from_slice(&self.pixels[src..src + row_bytes]);
        }
        out
    }
}

/// Where rendered pixels end up: an in-memory image, a browser canvas, etc.
pub trait RenderSurface {
    /// Copy `source` (a region of `image`) to `target`. Both rectangles have
    /// the same size and must lie inside their images; anything else is a
    /// caller bug and panics.
    fn draw_image(&mut self, target: Rect, image: &RgbaImage, source: Rect);

    /// Fill `rect` (clipped to the surface), compositing by `color.a`.
    fn fill_rect(&mut self, rect: Rect, color: Rgba);

    /// One-pixel-wide line covering rows `y0..y1`.
    fn draw_vertical_line(&mut self, x: i32, y0: i32, y1: i32, color: Rgba) {
        let (top, bottom) = if y0 <= y1 { (y0, y1) } else { (y1, y0) };
        self.fill_rect(Rect::new(x, top, 1, bottom - top), color);
    }
}

pub(crate) fn check_blit(target: Rect, target_bounds: Rect, image: &RgbaImage, source: Rect) {
    assert!(
        target.width == source.width && target.height == source.height,
        "blit size mismatch: target {target:?}, source {source:?}"
    );
    assert!(
        target_bounds.contains(&target),
        "blit target {target:?} outside surface {target_bounds:?}"
    );
    assert!(
        image.rect().contains(&source),
        "blit source {source:?} outside image {}x{}",
        image.width,
        image.height
    );
}

impl RenderSurface for RgbaImage {
    fn draw_image(&mut self, target: Rect, image: &RgbaImage, source: Rect) {
        check_blit(target, self.rect(), image, source);
        if target.is_empty() {
            return;
        }
        let row_bytes = target.width as usize * 4;
        for row in 0..target.height as usize {
            let src = ((source.y as usize + row) * image.width + source.x as usize) * 4;
            let dst = ((target.y as usize + row) * self.width + target.x as usize) * 4;
            self.pixels[dst..dst + row_bytes].copy_from_slice(&image.pixels[src..src + row_bytes]);
        }
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba) {
        let area = rect.intersect(&self.rect());
        for y in area.y..area.bottom() {
            for x in area.x..area.right() {
                let (x, y) = (x as usize, y as usize);
                let blended = color.over(self.pixel(x, y));
                self.set_pixel(x, y, blended);
            }
        }
    }
}
