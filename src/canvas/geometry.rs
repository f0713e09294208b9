//! Time and bin axes of a view.

use std::cmp::Ordering;

use crate::config::BinScale;

/// Horizontal zoom as an exact ratio of frames to pixels.
///
/// Ordered by frames per pixel, so "greater" means further zoomed out.
/// `FramesPerPixel(1)` and `PixelsPerFrame(1)` compare equal.
#[derive(Debug, Clone, Copy)]
pub enum ZoomLevel {
    FramesPerPixel(u32),
    PixelsPerFrame(u32),
}

impl ZoomLevel {
    /// `(frames, pixels)` with one side equal to 1.
    fn ratio(self) -> (u64, u64) {
        match self {
            ZoomLevel::FramesPerPixel(n) => (n as u64, 1),
            ZoomLevel::PixelsPerFrame(n) => (1, n.max(1) as u64),
        }
    }

    pub fn frames_per_pixel(self) -> f64 {
        let (f, p) = self.ratio();
        f as f64 / p as f64
    }

    /// Whole frames per pixel, rounded up; at least 1.
    pub fn frames_per_pixel_ceil(self) -> u64 {
        match self {
            ZoomLevel::FramesPerPixel(n) => (n as u64).max(1),
            ZoomLevel::PixelsPerFrame(_) => 1,
        }
    }
}

impl PartialEq for ZoomLevel {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ZoomLevel {}

impl PartialOrd for ZoomLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ZoomLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        let (af, ap) = self.ratio();
        let (bf, bp) = other.ratio();
        (af * bp).cmp(&(bf * ap))
    }
}

impl Default for ZoomLevel {
    fn default() -> Self {
        ZoomLevel::FramesPerPixel(1)
    }
}

/// Frame/pixel mapping of one view. Pixel 0 is at `start_frame`.
pub trait ViewGeometry {
    fn start_frame(&self) -> i64;
    fn zoom_level(&self) -> ZoomLevel;
    fn paint_width(&self) -> i32;
    fn paint_height(&self) -> i32;

    /// First frame covered by pixel column `x`.
    fn frame_for_x(&self, x: i32) -> i64 {
        let x = x as i64;
        match self.zoom_level() {
            ZoomLevel::FramesPerPixel(n) => self.start_frame() + x * n as i64,
            ZoomLevel::PixelsPerFrame(n) => self.start_frame() + x.div_euclid(n.max(1) as i64),
        }
    }

    /// Pixel column containing `frame`.
    fn x_for_frame(&self, frame: i64) -> i32 {
        let offset = frame - self.start_frame();
        let x = match self.zoom_level() {
            ZoomLevel::FramesPerPixel(n) => offset.div_euclid(n.max(1) as i64),
            ZoomLevel::PixelsPerFrame(n) => offset * n as i64,
        };
        x.clamp(i32::MIN as i64, i32::MAX as i64) as i32
    }

    /// One past the last frame on screen.
    fn end_frame(&self) -> i64 {
        self.frame_for_x(self.paint_width())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct View {
    pub start_frame: i64,
    pub zoom: ZoomLevel,
    pub width: i32,
    pub height: i32,
}

impl View {
    pub fn new(start_frame: i64, zoom: ZoomLevel, width: i32, height: i32) -> Self {
        Self {
            start_frame,
            zoom,
            width,
            height,
        }
    }

    /// Same view scrolled to start at `start_frame`.
    pub fn scrolled_to(self, start_frame: i64) -> Self {
        Self {
            start_frame,
            ..self
        }
    }
}

impl ViewGeometry for View {
    fn start_frame(&self) -> i64 {
        self.start_frame
    }

    fn zoom_level(&self) -> ZoomLevel {
        self.zoom
    }

    fn paint_width(&self) -> i32 {
        self.width
    }

    fn paint_height(&self) -> i32 {
        self.height
    }
}

/// Vertical mapping between (fractional) bins and pixel rows.
///
/// Displays bins `[min_bin, max_bin)` over `height` pixels; bin `b` occupies
/// the band between `y_for_bin(b)` and `y_for_bin(b + 1)`. Low bins are at
/// the bottom unless `inverted`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinAxis {
    pub min_bin: usize,
    pub max_bin: usize,
    pub height: i32,
    pub scale: BinScale,
    pub inverted: bool,
}

impl BinAxis {
    pub fn new(min_bin: usize, max_bin: usize, height: i32, scale: BinScale, inverted: bool) -> Self {
        Self {
            min_bin,
            max_bin: max_bin.max(min_bin + 1),
            height,
            scale,
            inverted,
        }
    }

    pub fn bin_count(&self) -> usize {
        self.max_bin - self.min_bin
    }

    fn warp(&self, bin: f64) -> f64 {
        match self.scale {
            BinScale::Linear => bin,
            BinScale::Log => (bin.max(0.0) + 1.0).log10(),
        }
    }

    fn unwarp(&self, v: f64) -> f64 {
        match self.scale {
            BinScale::Linear => v,
            BinScale::Log => 10f64.powf(v) - 1.0,
        }
    }

    /// Height above the bottom edge, in pixels, of the lower edge of `bin`.
    fn elevation(&self, bin: f64) -> f64 {
        let lo = self.warp(self.min_bin as f64);
        let hi = self.warp(self.max_bin as f64);
        (self.warp(bin) - lo) * self.height as f64 / (hi - lo)
    }

    fn bin_at_elevation(&self, e: f64) -> f64 {
        let lo = self.warp(self.min_bin as f64);
        let hi = self.warp(self.max_bin as f64);
        self.unwarp(lo + e * (hi - lo) / self.height.max(1) as f64)
    }

    /// Pixel y of the lower edge of `bin` (fractional bins allowed).
    pub fn y_for_bin(&self, bin: f64) -> f64 {
        let e = self.elevation(bin);
        if self.inverted {
            e
        } else {
            self.height as f64 - e
        }
    }

    /// Fractional bin at pixel `y`.
    pub fn bin_for_y(&self, y: f64) -> f64 {
        let e = if self.inverted {
            y
        } else {
            self.height as f64 - y
        };
        self.bin_at_elevation(e)
    }

    /// Bin at the lower edge of draw-buffer row `row`, counting rows up from
    /// the low-bin end regardless of inversion.
    pub fn bin_for_row(&self, row: usize) -> f64 {
        self.bin_at_elevation(row as f64)
    }

    /// Screen row for draw-buffer row `row`.
    pub fn y_for_row(&self, row: usize) -> usize {
        if self.inverted {
            row
        } else {
            (self.height.max(1) as usize - 1).saturating_sub(row)
        }
    }

    /// Lower-edge bins for every row of the draw buffer.
    pub fn bins_for_rows(&self) -> Vec<f64> {
        (0..self.height.max(0) as usize)
            .map(|row| self.bin_for_row(row))
            .collect()
    }
}
