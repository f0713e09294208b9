//! Per-pixel-column record of the magnitude range seen while rendering.

use crate::canvas::geometry::{ViewGeometry, ZoomLevel};

/// Observed `(min, max)` of some values; unset until the first sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MagnitudeRange {
    range: Option<(f32, f32)>,
}

impl MagnitudeRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self {
            range: Some((min.min(max), min.max(max))),
        }
    }

    pub fn is_set(&self) -> bool {
        self.range.is_some()
    }

    pub fn min(&self) -> f32 {
        self.range.map_or(0.0, |r| r.0)
    }

    pub fn max(&self) -> f32 {
        self.range.map_or(0.0, |r| r.1)
    }

    /// Widen to include `value`. NaN is ignored. Returns whether the range changed.
    pub fn sample(&mut self, value: f32) -> bool {
        if value.is_nan() {
            return false;
        }
        match self.range {
            None => {
                self.range = Some((value, value));
                true
            }
            Some((lo, hi)) if value < lo => {
                self.range = Some((value, hi));
                true
            }
            Some((lo, hi)) if value > hi => {
                self.range = Some((lo, value));
                true
            }
            Some(_) => false,
        }
    }

    pub fn sample_column(&mut self, column: &[f32]) -> bool {
        column.iter().fold(false, |changed, &v| self.sample(v) | changed)
    }

    pub fn sample_range(&mut self, other: &MagnitudeRange) -> bool {
        match other.range {
            Some((lo, hi)) => self.sample(lo) | self.sample(hi),
            None => false,
        }
    }
}

/// Magnitude ranges per pixel column of one view, kept in step with the
/// raster cache. Unlike the raster cache each column is set or unset on its
/// own.
#[derive(Debug, Clone, Default)]
pub struct ScrollableMagRangeCache {
    ranges: Vec<MagnitudeRange>,
    zoom: ZoomLevel,
    start_frame: i64,
}

impl ScrollableMagRangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn width(&self) -> usize {
        self.ranges.len()
    }

    pub fn zoom_level(&self) -> ZoomLevel {
        self.zoom
    }

    pub fn start_frame(&self) -> i64 {
        self.start_frame
    }

    pub fn resize(&mut self, width: usize) {
        if self.ranges.len() != width {
            self.ranges = vec![MagnitudeRange::default(); width];
        }
    }

    pub fn set_zoom_level(&mut self, zoom: ZoomLevel) {
        if self.zoom != zoom {
            self.zoom = zoom;
            self.invalidate();
        }
    }

    pub fn set_start_frame(&mut self, frame: i64) {
        if self.start_frame != frame {
            self.start_frame = frame;
            self.invalidate();
        }
    }

    pub fn invalidate(&mut self) {
        self.ranges.fill(MagnitudeRange::default());
    }

    /// Move to `new_start`, keeping the ranges of columns still on screen.
    /// `view` supplies the pixel mapping and must share this cache's zoom.
    pub fn scroll_to(&mut self, view: &dyn ViewGeometry, new_start: i64) {
        let dx = view.x_for_frame(self.start_frame) as i64 - view.x_for_frame(new_start) as i64;
        self.start_frame = new_start;
        if dx == 0 {
            return;
        }
        let w = self.ranges.len() as i64;
        if dx.abs() >= w {
            self.invalidate();
            return;
        }
        let shift = dx.unsigned_abs() as usize;
        if dx < 0 {
            // content moves left
            self.ranges.rotate_left(shift);
            let n = self.ranges.len();
            self.ranges[n - shift..].fill(MagnitudeRange::default());
        } else {
            self.ranges.rotate_right(shift);
            self.ranges[..shift].fill(MagnitudeRange::default());
        }
    }

    /// Merge `range` into column `x`. Panics if `x` is outside the cache.
    pub fn sample_column(&mut self, x: usize, range: &MagnitudeRange) {
        assert!(
            x < self.ranges.len(),
            "range cache column {x} outside width {}",
            self.ranges.len()
        );
        self.ranges[x].sample_range(range);
    }

    pub fn is_column_set(&self, x: usize) -> bool {
        self.ranges.get(x).is_some_and(MagnitudeRange::is_set)
    }

    /// Union of the ranges of columns `[x, x + count)` that exist.
    pub fn range(&self, x: i32, count: i32) -> MagnitudeRange {
        let mut out = MagnitudeRange::default();
        let start = x.max(0) as usize;
        let end = (x.saturating_add(count)).max(0) as usize;
        for r in self.ranges.iter().take(end).skip(start) {
            out.sample_range(r);
        }
        out
    }
}
