//! Raster cache for one view, valid over a single contiguous span of columns.

use crate::canvas::geometry::{ViewGeometry, ZoomLevel};
use crate::canvas::image::{Rect, RenderSurface, RgbaImage};

/// A view-sized image plus the span `[valid_left, valid_left + valid_width)`
/// of columns known to be correct for `(zoom, start_frame)`.
///
/// Resizing or changing the zoom or start frame through the setters throws
/// the whole span away; only `scroll_to` keeps (part of) it.
#[derive(Debug, Clone)]
pub struct ScrollableImageCache {
    image: RgbaImage,
    valid_left: i32,
    valid_width: i32,
    zoom: ZoomLevel,
    start_frame: i64,
}

impl Default for ScrollableImageCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrollableImageCache {
    pub fn new() -> Self {
        Self {
            image: RgbaImage::new(0, 0),
            valid_left: 0,
            valid_width: 0,
            zoom: ZoomLevel::default(),
            start_frame: 0,
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn size(&self) -> (usize, usize) {
        (self.image.width, self.image.height)
    }

    pub fn zoom_level(&self) -> ZoomLevel {
        self.zoom
    }

    pub fn start_frame(&self) -> i64 {
        self.start_frame
    }

    pub fn is_valid(&self) -> bool {
        self.valid_width > 0
    }

    pub fn valid_left(&self) -> i32 {
        self.valid_left
    }

    pub fn valid_width(&self) -> i32 {
        self.valid_width
    }

    pub fn valid_right(&self) -> i32 {
        self.valid_left + self.valid_width
    }

    pub fn valid_area(&self) -> Rect {
        if !self.is_valid() {
            return Rect::default();
        }
        Rect::new(self.valid_left, 0, self.valid_width, self.image.height as i32)
    }

    pub fn resize(&mut self, width: usize, height: usize) {
        if self.image.width != width || self.image.height != height {
            self.image = RgbaImage::new(width, height);
            self.invalidate();
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
        self.valid_left = 0;
        self.valid_width = 0;
    }

    /// Move to `new_start`, shifting the cached pixels by the matching pixel
    /// distance and cropping the valid span to what is still on the image.
    pub fn scroll_to(&mut self, view: &dyn ViewGeometry, new_start: i64) {
        let dx = view.x_for_frame(self.start_frame) as i64 - view.x_for_frame(new_start) as i64;
        self.start_frame = new_start;
        if !self.is_valid() || dx == 0 {
            return;
        }
        let w = self.image.width as i64;
        if dx.abs() >= w {
            self.invalidate();
            return;
        }
        let dx = dx as i32;
        let w = w as i32;
        if dx < 0 {
            // scrolled right: pixels move left
            let shift = -dx;
            self.image.shift_columns(shift as usize, 0, (w - shift) as usize);
            let left = self.valid_left - shift;
            let right = self.valid_right() - shift;
            self.set_valid_span(left.max(0), right);
        } else {
            self.image.shift_columns(0, dx as usize, (w - dx) as usize);
            let left = self.valid_left + dx;
            let right = (self.valid_right() + dx).min(w);
            self.set_valid_span(left, right);
        }
    }

    fn set_valid_span(&mut self, left: i32, right: i32) {
        if right <= left {
            self.invalidate();
        } else {
            self.valid_left = left;
            self.valid_width = right - left;
        }
    }

    /// Adjust `[left, left + width)` to touch the valid span so that filling
    /// it keeps the span contiguous. Returns the new `(left, width)` and
    /// whether the region lies to the left of the valid span (and so should
    /// be filled right to left). A region sticking out on both sides is cut
    /// to its right-hand part; the left part is left for a later call.
    pub fn adjust_to_touch_valid_area(&self, left: i32, width: i32) -> (i32, i32, bool) {
        if !self.is_valid() {
            return (left, width, false);
        }
        let (mut left, mut width) = (left, width);
        let mut is_left_of_valid = false;
        if left < self.valid_left && left + width <= self.valid_right() {
            is_left_of_valid = true;
            width = self.valid_left - left;
        } else if left + width > self.valid_right() {
            let right = left + width;
            left = self.valid_right();
            width = right - left;
        }
        (left, width, is_left_of_valid)
    }

    /// Copy columns `[image_left, image_left + image_width)` of `image` into
    /// the cache at `left` and extend the valid span over them.
    ///
    /// Panics if the heights differ, either region is outside its image, or
    /// the widths differ.
    pub fn draw_image(
        &mut self,
        left: i32,
        width: i32,
        image: &RgbaImage,
        image_left: i32,
        image_width: i32,
    ) {
        assert!(
            image.height == self.image.height,
            "image height {} does not match cache height {}",
            image.height,
            self.image.height
        );
        assert!(
            left >= 0 && width >= 0 && left + width <= self.image.width as i32,
            "draw span {left}+{width} outside cache width {}",
            self.image.width
        );
        assert!(
            image_left >= 0 && image_width >= 0 && image_left + image_width <= image.width as i32,
            "source span {image_left}+{image_width} outside image width {}",
            image.width
        );
        assert!(
            width == image_width,
            "draw width {width} does not match source width {image_width}"
        );
        if width == 0 {
            return;
        }

        let h = self.image.height as i32;
        self.image
            .draw_image(Rect::new(left, 0, width, h), image, Rect::new(image_left, 0, width, h));

        let right = left + width;
        if !self.is_valid() || right < self.valid_left || left > self.valid_right() {
            // nothing valid, or disjoint from it
            self.valid_left = left;
            self.valid_width = width;
        } else {
            let new_left = left.min(self.valid_left);
            let new_right = right.max(self.valid_right());
            self.valid_left = new_left;
            self.valid_width = new_right - new_left;
        }
    }
}
