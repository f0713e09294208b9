//! Incremental renderer from a dense grid to a view.
//!
//! Each `(renderer, view)` pairing owns a raster cache and a magnitude-range
//! cache. A render call either serves the request from the raster cache,
//! scrolls the cache and fills only the exposed columns, or repaints. Under a
//! time budget the fill can stop early; the caller asks
//! `largest_uncached_rect` and calls again later to continue.

use std::f64::consts::PI;
use std::rc::Rc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::canvas::color_scale::{ColorScale, ColorScaleParams, ColorScaleType};
use crate::canvas::color_table::ColorTable;
use crate::canvas::geometry::{BinAxis, ViewGeometry, ZoomLevel};
use crate::canvas::image::{Rect, RenderSurface, Rgba, RgbaImage};
use crate::canvas::image_cache::ScrollableImageCache;
use crate::canvas::range_cache::{MagnitudeRange, ScrollableMagRangeCache};
use crate::canvas::render_timer::{RenderTimer, RenderTimerKind};
use crate::config::{BinDisplay, RenderParams};
use crate::dsp::column_ops::{self, ColumnNormalization};
use crate::dsp::peak_cache::PeakPoolingCache;
use crate::dsp::spectral_source::{PeakPickType, SpectralColumnSource};
use crate::types::{fit_column, Column, DenseGrid};

/// Seed for the render-from-the-middle offset.
const START_OFFSET_SEED: u64 = 0x5eed_9a1d;
/// Forecast render time under which a time budget is not worth applying.
const FAST_RENDER_SECS: f64 = 0.2;
/// Alpha of translucent cells.
const CELL_ALPHA: u8 = 160;

// ── Sources ──────────────────────────────────────────────────────────────────

/// What a renderer draws from, resolved once at construction.
#[derive(Clone)]
pub struct RenderSources {
    pub grid: Rc<dyn DenseGrid>,
    /// Pooled views of `grid`, any pooling factors.
    pub peak_caches: Vec<Rc<PeakPoolingCache>>,
    /// Set when `grid` is a spectral source; enables phase and peak-frequency display.
    pub spectral: Option<Rc<SpectralColumnSource>>,
}

impl RenderSources {
    pub fn new(grid: Rc<dyn DenseGrid>) -> Self {
        Self {
            grid,
            peak_caches: Vec::new(),
            spectral: None,
        }
    }

    pub fn from_spectral(source: Rc<SpectralColumnSource>) -> Self {
        Self {
            grid: source.clone() as Rc<dyn DenseGrid>,
            peak_caches: Vec::new(),
            spectral: Some(source),
        }
    }

    pub fn with_peak_cache(mut self, cache: Rc<PeakPoolingCache>) -> Self {
        self.peak_caches.push(cache);
        self.peak_caches.sort_by_key(|c| c.columns_per_peak());
        self
    }
}

// ── Public result types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderType {
    /// Large sparse cells painted straight onto the surface; never cached.
    DirectTranslucent,
    /// Whole grid columns spread over the pixels they cover.
    DrawBufferBinResolution,
    /// One buffer column per view pixel.
    DrawBufferPixelResolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    NoCache,
    ColdCache,
    WarmCache,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderResult {
    /// Part of the requested rect actually painted.
    pub rendered: Rect,
    /// Magnitudes seen inside `rendered`.
    pub range: MagnitudeRange,
}

struct ColorState {
    scale: ColorScale,
    table: ColorTable,
    /// Visible range the scale was built from, unset if built from grid levels.
    visible: MagnitudeRange,
}

// ── Renderer ─────────────────────────────────────────────────────────────────

/// Renders one grid into one view. Not thread-safe; owned by the view.
pub struct GridRenderer {
    sources: RenderSources,
    params: RenderParams,
    image_cache: ScrollableImageCache,
    range_cache: ScrollableMagRangeCache,
    color: Option<Rc<ColorState>>,
    visible_range: MagnitudeRange,
    needs_repaint: bool,
    seconds_per_x: Option<f64>,
    rng: SmallRng,
}

impl GridRenderer {
    pub fn new(sources: RenderSources, params: RenderParams) -> Self {
        Self {
            sources,
            params,
            image_cache: ScrollableImageCache::new(),
            range_cache: ScrollableMagRangeCache::new(),
            color: None,
            visible_range: MagnitudeRange::default(),
            needs_repaint: false,
            seconds_per_x: None,
            rng: SmallRng::seed_from_u64(START_OFFSET_SEED),
        }
    }

    pub fn params(&self) -> &RenderParams {
        &self.params
    }

    pub fn sources(&self) -> &RenderSources {
        &self.sources
    }

    /// Replace the parameters; both caches and the color scale are dropped.
    pub fn set_params(&mut self, params: RenderParams) {
        self.params = params;
        self.color = None;
        self.visible_range = MagnitudeRange::default();
        self.invalidate();
    }

    pub fn invalidate(&mut self) {
        self.image_cache.invalidate();
        self.range_cache.invalidate();
    }

    /// Set after a render whose visible magnitude range no longer matches the
    /// color scale; the host should repaint the whole view.
    pub fn needs_repaint(&self) -> bool {
        self.needs_repaint
    }

    /// Bring the caches in line with the view's size and zoom, dropping them
    /// if either changed.
    pub fn geometry_changed(&mut self, view: &dyn ViewGeometry) {
        let (w, h) = (view.paint_width().max(0), view.paint_height().max(0));
        self.image_cache.resize(w as usize, h as usize);
        self.range_cache.resize(w as usize);
        self.image_cache.set_zoom_level(view.zoom_level());
        self.range_cache.set_zoom_level(view.zoom_level());
    }

    pub fn render_type(&self, view: &dyn ViewGeometry) -> RenderType {
        if self.params.bin_display == BinDisplay::PeakFrequencies {
            return RenderType::DrawBufferPixelResolution;
        }
        let res = self.sources.grid.resolution().max(1);
        let zoom = view.zoom_level();
        if !self.params.always_opaque && !self.params.interpolate {
            let pixels_per_column = res as f64 / zoom.frames_per_pixel();
            let (min_bin, max_bin) = self.displayed_bins();
            if pixels_per_column > 3.0 && ((max_bin - min_bin) as i64 * 3) < view.paint_height() as i64 {
                return RenderType::DirectTranslucent;
            }
        }
        if ZoomLevel::FramesPerPixel(res as u32) > zoom {
            RenderType::DrawBufferBinResolution
        } else {
            RenderType::DrawBufferPixelResolution
        }
    }

    pub fn cache_state(&self, view: &dyn ViewGeometry) -> CacheState {
        if self.render_type(view) == RenderType::DirectTranslucent {
            return CacheState::NoCache;
        }
        let size = (view.paint_width().max(0) as usize, view.paint_height().max(0) as usize);
        if self.color.is_none()
            || !self.image_cache.is_valid()
            || self.image_cache.size() != size
            || self.image_cache.zoom_level() != view.zoom_level()
        {
            CacheState::ColdCache
        } else {
            CacheState::WarmCache
        }
    }

    /// Widest strip of the view a further render call would still have to
    /// fill. Empty for strategies that always complete in one call.
    pub fn largest_uncached_rect(&self, view: &dyn ViewGeometry) -> Rect {
        if self.render_type(view) != RenderType::DrawBufferPixelResolution {
            return Rect::default();
        }
        let (w, h) = (view.paint_width().max(0), view.paint_height().max(0));
        if self.cache_state(view) == CacheState::ColdCache {
            return Rect::new(0, 0, w, h);
        }
        let offset = view.x_for_frame(self.image_cache.start_frame());
        let left = (self.image_cache.valid_left() + offset).clamp(0, w);
        let right = (self.image_cache.valid_right() + offset).clamp(0, w);
        if right <= left {
            return Rect::new(0, 0, w, h);
        }
        let before = Rect::new(0, 0, left, h);
        let after = Rect::new(right, 0, w - right, h);
        if after.width > before.width {
            after
        } else {
            before
        }
    }

    pub fn y_for_bin(&self, view: &dyn ViewGeometry, bin: f64) -> f64 {
        self.bin_axis(view).y_for_bin(bin)
    }

    pub fn bin_for_y(&self, view: &dyn ViewGeometry, y: f64) -> f64 {
        self.bin_axis(view).bin_for_y(y)
    }

    /// Render `rect` completely.
    pub fn render(
        &mut self,
        view: &dyn ViewGeometry,
        surface: &mut dyn RenderSurface,
        rect: Rect,
    ) -> RenderResult {
        self.render_inner(view, surface, rect, None)
    }

    /// Render as much of `rect` as fits an interactive time budget.
    pub fn render_time_constrained(
        &mut self,
        view: &dyn ViewGeometry,
        surface: &mut dyn RenderSurface,
        rect: Rect,
    ) -> RenderResult {
        self.render_inner(view, surface, rect, Some(RenderTimer::new(RenderTimerKind::FastRender)))
    }

    /// Render as much of `rect` as `timer` allows.
    pub fn render_with_budget(
        &mut self,
        view: &dyn ViewGeometry,
        surface: &mut dyn RenderSurface,
        rect: Rect,
        timer: RenderTimer,
    ) -> RenderResult {
        let budget = (timer.kind() != RenderTimerKind::NoTimeout).then_some(timer);
        self.render_inner(view, surface, rect, budget)
    }

    fn render_inner(
        &mut self,
        view: &dyn ViewGeometry,
        surface: &mut dyn RenderSurface,
        rect: Rect,
        mut budget: Option<RenderTimer>,
    ) -> RenderResult {
        self.needs_repaint = false;
        let grid = self.sources.grid.clone();
        if !grid.is_ok() || !grid.is_ready() || grid.width() == 0 || grid.height() == 0 {
            log::debug!("grid not ready, skipping render");
            return RenderResult::default();
        }

        let render_type = self.render_type(view);
        if render_type == RenderType::DirectTranslucent {
            return self.render_direct_translucent(view, surface, rect);
        }

        let (w, h) = (view.paint_width().max(0), view.paint_height().max(0));
        let rect = rect.intersect(&Rect::new(0, 0, w, h));
        if rect.is_empty() {
            return RenderResult::default();
        }

        self.ensure_color_state();
        self.geometry_changed(view);

        if budget.is_some() {
            if render_type != RenderType::DrawBufferPixelResolution {
                // bin-resolution fills are cheap and hard to resume
                budget = None;
            } else if let Some(secs) = self.seconds_per_x {
                if secs * (rect.width as f64) < FAST_RENDER_SECS {
                    budget = None;
                }
            }
        }
        let time_constrained = budget.is_some();

        // only whole-pixel moves keep cached columns on their frames
        let cache_start = self.image_cache.start_frame();
        let aligned = view.frame_for_x(view.x_for_frame(cache_start)) == cache_start;
        if self.image_cache.is_valid() && aligned {
            self.image_cache.scroll_to(view, view.start_frame());
            self.range_cache.scroll_to(view, view.start_frame());
        } else {
            if self.image_cache.is_valid() {
                log::debug!("start moved {cache_start} -> {} off the pixel grid", view.start_frame());
            }
            self.image_cache.set_start_frame(view.start_frame());
            self.range_cache.set_start_frame(view.start_frame());
        }

        let (req_x0, req_x1) = (rect.x, rect.right());
        let covered = |cache: &ScrollableImageCache| {
            cache.is_valid() && cache.valid_left() <= req_x0 && cache.valid_right() >= req_x1
        };

        if covered(&self.image_cache) {
            surface.draw_image(rect, self.image_cache.image(), rect);
            let range = self.range_cache.range(req_x0, req_x1 - req_x0);
            self.reconcile(&range);
            return RenderResult {
                rendered: rect,
                range,
            };
        }

        if time_constrained
            && self.image_cache.is_valid()
            && (self.image_cache.valid_right() < req_x0 || self.image_cache.valid_left() > req_x1)
        {
            self.image_cache.invalidate();
            self.range_cache.invalidate();
        }

        let mut x0 = req_x0;
        if time_constrained
            && !self.image_cache.is_valid()
            && req_x0 == 0
            && req_x1 == w
            && self.sources.peak_caches.is_empty()
        {
            // show the middle of the view first
            let r: f64 = self.rng.random();
            x0 = (req_x1 as f64 * 0.5 * r).floor() as i32;
        }

        // at most: the requested span, then the part of it on the other side
        // of the valid span
        for _ in 0..3 {
            let (left, width, right_to_left) = if self.image_cache.is_valid() {
                self.image_cache.adjust_to_touch_valid_area(req_x0, req_x1 - req_x0)
            } else {
                (x0, req_x1 - x0, false)
            };
            if width <= 0 {
                break;
            }
            let completed = match render_type {
                RenderType::DrawBufferBinResolution => self.render_bin_resolution(view, left, width),
                _ => self.render_pixel_resolution(view, left, width, right_to_left, budget.as_mut()),
            };
            if !completed || covered(&self.image_cache) {
                break;
            }
        }

        let painted = rect.intersect(&self.image_cache.valid_area());
        if !painted.is_empty() {
            surface.draw_image(painted, self.image_cache.image(), painted);
        }
        if !time_constrained && painted != rect {
            log::warn!("render did not cover the requested area: requested {rect:?}, painted {painted:?}");
        }

        let range = self.range_cache.range(painted.x, painted.width);
        if painted == rect {
            self.reconcile(&range);
        }
        RenderResult {
            rendered: painted,
            range,
        }
    }

    // ── Color scale ──────────────────────────────────────────────────────────

    fn ensure_color_state(&mut self) -> Rc<ColorState> {
        if let Some(state) = &self.color {
            return state.clone();
        }
        let (visible, (min, max)) = self.color_range();
        let params = ColorScaleParams {
            color_map: self.params.color_map,
            scale_type: self.params.scale_type,
            min,
            max,
            threshold: self.params.threshold,
            gain: self.params.gain,
            multiple: self.params.multiple,
        };
        let scale = ColorScale::new(params).unwrap_or_else(|e| {
            log::warn!("{e}, falling back to a linear unit scale");
            ColorScale::new(ColorScaleParams {
                color_map: self.params.color_map,
                ..ColorScaleParams::default()
            })
            .unwrap_or_default()
        });
        let table = ColorTable::build(&scale, self.params.color_rotation);
        let state = Rc::new(ColorState {
            scale,
            table,
            visible,
        });
        self.color = Some(state.clone());
        // pixels baked with the old scale are stale
        self.image_cache.invalidate();
        state
    }

    fn color_range(&self) -> (MagnitudeRange, (f64, f64)) {
        let grid = &self.sources.grid;
        let sf = self.params.scale_factor;
        let mut visible = MagnitudeRange::default();
        let (mut min, mut max) = if self.params.scale_type == ColorScaleType::Phase {
            (-PI, PI)
        } else if self.params.normalize_visible_area && self.visible_range.is_set() {
            visible = self.visible_range;
            (visible.min() as f64, visible.max() as f64)
        } else {
            match self.params.normalization {
                ColumnNormalization::None => {
                    (grid.minimum_level() as f64 * sf, grid.maximum_level() as f64 * sf)
                }
                ColumnNormalization::Hybrid => (0.0, (grid.maximum_level() as f64 * sf + 1.0).log10()),
                _ => (0.0, 1.0),
            }
        };
        if !min.is_finite() || !max.is_finite() {
            (min, max) = (0.0, 1.0);
        }
        if max <= min {
            let widened = min + (min.abs() * 1e-3).max(1e-6);
            log::debug!("degenerate color range {min}..{max}, widening to {min}..{widened}");
            max = widened;
        }
        (visible, (min, max))
    }

    /// After a complete paint: if the visible magnitudes no longer match the
    /// scale, drop the scale and ask for a repaint.
    fn reconcile(&mut self, observed: &MagnitudeRange) {
        if !self.params.normalize_visible_area || !observed.is_set() {
            return;
        }
        if let Some(state) = &self.color {
            if state.visible == *observed {
                return;
            }
        }
        self.visible_range = *observed;
        self.color = None;
        self.needs_repaint = true;
    }

    // ── Columns ──────────────────────────────────────────────────────────────

    /// Displayed bins as `[min, max)`.
    fn displayed_bins(&self) -> (usize, usize) {
        let h = self.sources.grid.height();
        let min = self.params.min_bin.unwrap_or(0).min(h.saturating_sub(1));
        let max = self.params.max_bin.map_or(h, |m| m.min(h)).max(min + 1);
        (min, max)
    }

    fn bin_axis(&self, view: &dyn ViewGeometry) -> BinAxis {
        let (min_bin, max_bin) = self.displayed_bins();
        BinAxis::new(
            min_bin,
            max_bin,
            view.paint_height().max(0),
            self.params.bin_scale,
            self.params.invert_vertical,
        )
    }

    /// Largest pooling cache no finer than the view, if pooling is allowed.
    fn choose_peak_cache(&self, view: &dyn ViewGeometry) -> Option<Rc<PeakPoolingCache>> {
        if self.params.show_derivative
            || self.params.scale_type == ColorScaleType::Phase
            || self.params.bin_display == BinDisplay::PeakFrequencies
        {
            return None;
        }
        let res = self.sources.grid.resolution().max(1);
        let zoom = view.zoom_level();
        self.sources
            .peak_caches
            .iter()
            .filter(|c| zoom >= ZoomLevel::FramesPerPixel((res * c.columns_per_peak()) as u32))
            .max_by_key(|c| c.columns_per_peak())
            .cloned()
    }

    /// Displayed bins of column `sx`, from the pooled cache if given.
    fn source_column(&self, peak_cache: Option<&PeakPoolingCache>, sx: usize) -> Column {
        let (min_bin, max_bin) = self.displayed_bins();
        let height = self.sources.grid.height();
        let full = match (peak_cache, &self.sources.spectral) {
            (Some(cache), _) => cache.column(sx),
            (None, Some(spectral)) if self.params.scale_type == ColorScaleType::Phase => {
                spectral.phases(sx)
            }
            _ => self.sources.grid.column(sx),
        };
        let full = fit_column(full, height);
        full[min_bin..max_bin].to_vec()
    }

    /// Column `sx` ready for distribution: derivative, then gain and
    /// normalization for magnitudes, then peak picking. Values seen are
    /// merged into `range`.
    fn prepare_column(
        &self,
        peak_cache: Option<&PeakPoolingCache>,
        sx: usize,
        range: &mut MagnitudeRange,
    ) -> Column {
        let mut column = self.source_column(peak_cache, sx);
        if self.params.show_derivative && sx > 0 {
            let previous = self.source_column(peak_cache, sx - 1);
            for (v, p) in column.iter_mut().zip(previous) {
                *v -= p;
            }
        }
        // phases are angles: scaling them would wrap the palette
        let column = if self.params.scale_type == ColorScaleType::Phase {
            column
        } else {
            let column = column_ops::apply_gain(&column, self.params.scale_factor);
            column_ops::normalize(&column, self.params.normalization)
        };
        range.sample_column(&column);
        if self.params.bin_display == BinDisplay::PeakBins {
            column_ops::peak_pick(&column)
        } else {
            column
        }
    }

    /// Pixel indices of one draw-buffer column, indexed by screen row.
    fn pixels_for_values(&self, values: &[f32], axis: &BinAxis, scale: &ColorScale) -> Vec<u8> {
        let h = axis.height.max(0) as usize;
        let mut pixels = vec![0u8; h];
        for (row, &v) in values.iter().enumerate().take(h) {
            pixels[axis.y_for_row(row)] = scale.pixel(v as f64);
        }
        pixels
    }

    /// Peaks of spectral column `sx` placed at their refined frequency.
    fn peak_frequency_pixels(
        &self,
        spectral: &SpectralColumnSource,
        sx: usize,
        axis: &BinAxis,
        scale: &ColorScale,
        range: &mut MagnitudeRange,
    ) -> Vec<u8> {
        let h = axis.height.max(0) as usize;
        let mut pixels = vec![0u8; h];
        let (min_bin, max_bin) = self.displayed_bins();
        let values = self.prepare_column(None, sx, range);
        let bins_per_hz = spectral.fft_size() as f64 / spectral.sample_rate() as f64;
        let peaks = spectral.peak_frequencies(PeakPickType::AllPeaks, sx, min_bin, max_bin - 1);
        for (bin, freq) in peaks {
            let Some(&value) = bin.checked_sub(min_bin).and_then(|i| values.get(i)) else {
                continue;
            };
            let y = axis.y_for_bin(freq * bins_per_hz + 0.5).floor();
            if y < 0.0 || y >= h as f64 {
                continue;
            }
            let y = y as usize;
            pixels[y] = pixels[y].max(scale.pixel(value as f64));
        }
        pixels
    }

    // ── Fill strategies ──────────────────────────────────────────────────────

    /// Fill cache columns `[x0, x0 + w)` one view pixel at a time. Returns
    /// false if the budget ran out first; whatever was done is still cached.
    fn render_pixel_resolution(
        &mut self,
        view: &dyn ViewGeometry,
        x0: i32,
        w: i32,
        right_to_left: bool,
        mut budget: Option<&mut RenderTimer>,
    ) -> bool {
        let color = self.ensure_color_state();
        let grid = self.sources.grid.clone();
        let res = grid.resolution().max(1) as i64;
        let start = grid.start_frame();
        let axis = self.bin_axis(view);
        let h = axis.height as usize;
        let w = w.max(0) as usize;
        let bin_for_row = axis.bins_for_rows();

        let peak_cache = self.choose_peak_cache(view);
        let divisor = peak_cache.as_ref().map_or(1, |c| c.columns_per_peak()) as i64;
        let source_width = match &peak_cache {
            Some(c) => c.width(),
            None => grid.width(),
        } as i64;

        let spectral = match (&self.sources.spectral, self.params.bin_display) {
            (Some(s), BinDisplay::PeakFrequencies) => Some(s.clone()),
            (None, BinDisplay::PeakFrequencies) => {
                log::warn!("peak frequency display needs a spectral source, drawing all bins");
                None
            }
            _ => None,
        };

        // grid column at the left edge of each pixel, plus the right edge
        let column_for_x: Vec<i64> = (0..=w)
            .map(|i| (view.frame_for_x(x0 + i as i32) - start).div_euclid(res))
            .collect();

        let mut buffer = vec![vec![0u8; h]; w];
        let mut ranges = vec![MagnitudeRange::default(); w];
        let mut last: Option<(i64, Column, MagnitudeRange)> = None;
        let stopwatch = RenderTimer::new(RenderTimerKind::NoTimeout);
        let mut count = 0;

        for i in 0..w {
            let x = if right_to_left { w - 1 - i } else { i };
            let sx0 = column_for_x[x].div_euclid(divisor);
            let sx1 = column_for_x[x + 1].div_euclid(divisor).max(sx0 + 1);
            let first = sx0.max(0);
            let end = sx1.min(source_width);

            if let Some(spectral) = &spectral {
                for sx in first..end {
                    let pixels = self.peak_frequency_pixels(
                        spectral,
                        sx as usize,
                        &axis,
                        &color.scale,
                        &mut ranges[x],
                    );
                    for (p, q) in buffer[x].iter_mut().zip(pixels) {
                        *p = (*p).max(q);
                    }
                }
            } else {
                let mut peak: Option<Column> = None;
                for sx in first..end {
                    let cached = matches!(&last, Some((psx, _, _)) if *psx == sx);
                    if !cached {
                        let mut range = MagnitudeRange::default();
                        let prepared = self.prepare_column(peak_cache.as_deref(), sx as usize, &mut range);
                        let distributed = column_ops::distribute(
                            &prepared,
                            h,
                            &bin_for_row,
                            axis.min_bin,
                            self.params.interpolate,
                        );
                        last = Some((sx, distributed, range));
                    }
                    if let Some((_, distributed, range)) = &last {
                        ranges[x].sample_range(range);
                        match &mut peak {
                            None => peak = Some(distributed.clone()),
                            Some(p) => p
                                .iter_mut()
                                .zip(distributed)
                                .for_each(|(a, &b)| *a = a.max(b)),
                        }
                    }
                }
                if let Some(values) = peak {
                    buffer[x] = self.pixels_for_values(&values, &axis, &color.scale);
                }
            }

            count += 1;
            if let Some(timer) = budget.as_mut() {
                if timer.out_of_time(count as f64 / w as f64) {
                    break;
                }
            }
        }

        self.update_timings(&stopwatch, count);

        let attained = count;
        let buffer_left = if right_to_left { w - attained } else { 0 };
        let painted_left = x0 + buffer_left as i32;
        let image = color.table.colorize(&buffer[buffer_left..], attained, h);
        self.image_cache
            .draw_image(painted_left, attained as i32, &image, 0, attained as i32);
        for i in 0..attained {
            self.range_cache
                .sample_column(painted_left as usize + i, &ranges[buffer_left + i]);
        }
        attained == w
    }

    /// Fill cache columns `[x0, x0 + w)` from whole grid columns. Each column
    /// covers exactly the pixels from `x_for_frame` of its first frame to
    /// that of the next column, so a fill depends only on absolute frames.
    /// With interpolation, pixels blend the two columns nearest their centre.
    fn render_bin_resolution(&mut self, view: &dyn ViewGeometry, x0: i32, w: i32) -> bool {
        let color = self.ensure_color_state();
        let grid = self.sources.grid.clone();
        let res = grid.resolution().max(1) as i64;
        let start = grid.start_frame();
        let axis = self.bin_axis(view);
        let h = axis.height as usize;
        let bin_for_row = axis.bins_for_rows();
        let grid_width = grid.width() as i64;

        let cache_width = self.image_cache.size().0 as i32;
        let left = x0.max(0);
        let right = (x0 + w).min(cache_width);
        if right <= left || grid_width == 0 {
            return true;
        }
        let target_width = (right - left) as usize;

        let frame0 = view.frame_for_x(left) - start;
        let frame1 = view.frame_for_x(right) - start;
        let col0 = frame0.div_euclid(res) - 1;
        let col1 = (frame1 + res - 1).div_euclid(res) + 1;

        let mut colors: Vec<Option<Vec<Rgba>>> = Vec::new();
        let mut ranges = Vec::new();
        for sx in col0..=col1 {
            let mut range = MagnitudeRange::default();
            let column = (0..grid_width).contains(&sx).then(|| {
                let prepared = self.prepare_column(None, sx as usize, &mut range);
                let distributed = column_ops::distribute(
                    &prepared,
                    h,
                    &bin_for_row,
                    axis.min_bin,
                    self.params.interpolate,
                );
                self.pixels_for_values(&distributed, &axis, &color.scale)
                    .into_iter()
                    .map(|p| color.table.apply(p))
                    .collect()
            });
            colors.push(column);
            ranges.push(range);
        }
        let blank = color.table.apply(0);
        let index = |sx: i64| (sx - col0) as usize;

        let mut image = RgbaImage::new(target_width, h);
        let mut pixel_columns = vec![None; target_width];
        if self.params.interpolate {
            // pixel centres in grid columns, as exact fractions u_num / u_den
            let (num0, step, den) = match view.zoom_level() {
                ZoomLevel::FramesPerPixel(n) => {
                    let n = n.max(1) as i64;
                    (2 * view.start_frame() + n, 2 * n, 2)
                }
                ZoomLevel::PixelsPerFrame(n) => {
                    let n = n.max(1) as i64;
                    (2 * n * view.start_frame() + 1, 2, 2 * n)
                }
            };
            let u_den = 2 * den * res;
            for i in 0..target_width {
                let x = (left as i64) + i as i64;
                let centre = num0 + x * step - den * start;
                let u_num = 2 * centre - den * res;
                let own = centre.div_euclid(den * res);
                if !(0..grid_width).contains(&own) {
                    for y in 0..h {
                        image.set_pixel(i, y, blank);
                    }
                    continue;
                }
                let c = u_num.div_euclid(u_den);
                let t = u_num.rem_euclid(u_den) as f64 / u_den as f64;
                let a = c.clamp(0, grid_width - 1).clamp(col0, col1);
                let b = (c + 1).clamp(0, grid_width - 1).clamp(col0, col1);
                let (Some(ca), Some(cb)) = (&colors[index(a)], &colors[index(b)]) else {
                    continue;
                };
                for y in 0..h {
                    image.set_pixel(i, y, ca[y].lerp(cb[y], t));
                }
                pixel_columns[i] = Some(own.clamp(col0, col1));
            }
        } else {
            for sx in col0..col1 {
                let a = view.x_for_frame(sx * res + start).max(left);
                let b = view.x_for_frame((sx + 1) * res + start).min(right);
                for x in a..b {
                    let i = (x - left) as usize;
                    for y in 0..h {
                        let c = colors[index(sx)].as_ref().map_or(blank, |c| c[y]);
                        image.set_pixel(i, y, c);
                    }
                    pixel_columns[i] = Some(sx);
                }
            }
        }

        self.image_cache
            .draw_image(left, target_width as i32, &image, 0, target_width as i32);
        for (i, sx) in pixel_columns.into_iter().enumerate() {
            if let Some(sx) = sx {
                self.range_cache
                    .sample_column(left as usize + i, &ranges[index(sx)]);
            }
        }
        true
    }

    /// Paint grid cells as rectangles directly onto the surface.
    fn render_direct_translucent(
        &mut self,
        view: &dyn ViewGeometry,
        surface: &mut dyn RenderSurface,
        rect: Rect,
    ) -> RenderResult {
        let (w, h) = (view.paint_width().max(0), view.paint_height().max(0));
        let rect = rect.intersect(&Rect::new(0, 0, w, h));
        if rect.is_empty() {
            return RenderResult::default();
        }
        let color = self.ensure_color_state();
        let grid = self.sources.grid.clone();
        let res = grid.resolution().max(1) as i64;
        let start = grid.start_frame();
        let axis = self.bin_axis(view);
        let (min_bin, _) = self.displayed_bins();

        let frame0 = view.frame_for_x(rect.x) - start;
        let frame1 = view.frame_for_x(rect.right()) - start;
        let sx0 = frame0.div_euclid(res).max(0);
        let sx1 = frame1.div_euclid(res).min(grid.width() as i64 - 1);

        let mut range = MagnitudeRange::default();
        for sx in sx0..=sx1 {
            let rx0 = view.x_for_frame(sx * res + start);
            let rx1 = view.x_for_frame((sx + 1) * res + start);
            let rw = (rx1 - rx0).max(1);
            let column = self.prepare_column(None, sx as usize, &mut range);
            for (i, &value) in column.iter().enumerate() {
                let bin = (min_bin + i) as f64;
                let ya = axis.y_for_bin(bin).round() as i32;
                let yb = axis.y_for_bin(bin + 1.0).round() as i32;
                let (top, bottom) = (ya.min(yb), ya.max(yb));
                let rh = (bottom - top).max(1);
                let cell = color.table.apply(color.scale.pixel(value as f64));
                if rw == 1 {
                    surface.draw_vertical_line(rx0, top, top + rh, cell);
                    continue;
                }
                let cell = if rw > 3 && rh > 3 {
                    cell.with_alpha(CELL_ALPHA)
                } else {
                    cell
                };
                surface.fill_rect(Rect::new(rx0, top, rw, rh), cell);
            }
        }

        self.reconcile(&range);
        RenderResult {
            rendered: rect,
            range,
        }
    }

    fn update_timings(&mut self, stopwatch: &RenderTimer, x_count: usize) {
        let secs = stopwatch.seconds_per_item(x_count);
        if x_count > 20 || secs > 0.01 {
            self.seconds_per_x = Some(secs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::geometry::View;
    use crate::types::{AudioData, GridData, SampleProvider};
    use crate::config::SpectralConfig;

    fn value(col: usize, bin: usize) -> f32 {
        ((col * 7 + bin * 3) % 11) as f32 / 10.0
    }

    fn grid(width: usize, height: usize, res: usize) -> Rc<GridData> {
        let columns = (0..width)
            .map(|c| (0..height).map(|b| value(c, b)).collect())
            .collect();
        Rc::new(GridData::from_columns(columns, res, 1000))
    }

    fn renderer(grid: Rc<GridData>, params: RenderParams) -> GridRenderer {
        GridRenderer::new(RenderSources::new(grid), params)
    }

    fn full(view: &View) -> Rect {
        Rect::new(0, 0, view.width, view.height)
    }

    fn paint(r: &mut GridRenderer, view: &View) -> (RgbaImage, RenderResult) {
        let mut surface = RgbaImage::new(view.width as usize, view.height as usize);
        let result = r.render(view, &mut surface, full(view));
        (surface, result)
    }

    fn unit_scale() -> ColorScale {
        ColorScale::new(ColorScaleParams::default()).unwrap()
    }

    #[test]
    fn test_pixel_resolution_colors() {
        let view = View::new(0, ZoomLevel::FramesPerPixel(4), 32, 16);
        let mut r = renderer(grid(64, 16, 4), RenderParams::default());
        assert_eq!(r.render_type(&view), RenderType::DrawBufferPixelResolution);
        assert_eq!(r.cache_state(&view), CacheState::ColdCache);

        let (surface, result) = paint(&mut r, &view);
        assert_eq!(result.rendered, full(&view));
        assert_eq!((result.range.min(), result.range.max()), (0.0, 1.0));

        let scale = unit_scale();
        for x in [0usize, 5, 31] {
            for bin in [0usize, 7, 15] {
                let expected = Rgba::opaque(scale.color(value(x, bin) as f64, 0));
                assert_eq!(surface.pixel(x, 15 - bin), expected, "x {x} bin {bin}");
            }
        }
    }

    #[test]
    fn test_second_render_is_a_cache_hit() {
        let view = View::new(0, ZoomLevel::FramesPerPixel(4), 32, 16);
        let mut r = renderer(grid(64, 16, 4), RenderParams::default());
        let (first, _) = paint(&mut r, &view);
        assert_eq!(r.cache_state(&view), CacheState::WarmCache);
        assert!(r.largest_uncached_rect(&view).is_empty());
        let (second, result) = paint(&mut r, &view);
        assert_eq!(first, second);
        assert_eq!(result.rendered, full(&view));
    }

    #[test]
    fn test_scrolled_render_matches_fresh_render() {
        for (zoom, shift) in [(4u32, 40i64), (8, 16), (4, -12)] {
            let g = grid(128, 16, 4);
            let view = View::new(64, ZoomLevel::FramesPerPixel(zoom), 32, 16);
            let moved = view.scrolled_to(64 + shift);

            let mut scrolled = renderer(g.clone(), RenderParams::default());
            paint(&mut scrolled, &view);
            let (after_scroll, r1) = paint(&mut scrolled, &moved);

            let mut fresh = renderer(g, RenderParams::default());
            let (expected, r2) = paint(&mut fresh, &moved);
            assert_eq!(after_scroll, expected, "zoom {zoom} shift {shift}");
            assert_eq!(r1, r2);
        }
    }

    #[test]
    fn test_zero_budget_render_resumes_to_completion() {
        let g = grid(64, 16, 4);
        let view = View::new(0, ZoomLevel::FramesPerPixel(4), 32, 16);
        let mut r = renderer(g.clone(), RenderParams::default());
        let mut surface = RgbaImage::new(32, 16);

        let first = r.render_with_budget(&view, &mut surface, full(&view), RenderTimer::with_limits(0.0, 0.0, 0.0));
        assert!(first.rendered.width < 32);
        assert!(!r.largest_uncached_rect(&view).is_empty());

        let mut calls = 1;
        while !r.largest_uncached_rect(&view).is_empty() && calls < 200 {
            r.render_with_budget(&view, &mut surface, full(&view), RenderTimer::with_limits(0.0, 0.0, 0.0));
            calls += 1;
        }
        assert!(r.largest_uncached_rect(&view).is_empty());
        let last = r.render_with_budget(&view, &mut surface, full(&view), RenderTimer::with_limits(0.0, 0.0, 0.0));
        assert_eq!(last.rendered, full(&view));

        let mut fresh = renderer(g, RenderParams::default());
        let (expected, _) = paint(&mut fresh, &view);
        assert_eq!(surface, expected);
    }

    #[test]
    fn test_bin_resolution_repeats_columns() {
        let params = RenderParams {
            always_opaque: true,
            ..RenderParams::default()
        };
        let view = View::new(0, ZoomLevel::FramesPerPixel(1), 32, 8);
        let mut r = renderer(grid(16, 8, 4), params);
        assert_eq!(r.render_type(&view), RenderType::DrawBufferBinResolution);
        let (surface, result) = paint(&mut r, &view);
        assert_eq!(result.rendered, full(&view));
        assert_eq!(r.cache_state(&view), CacheState::WarmCache);
        assert!(r.largest_uncached_rect(&view).is_empty());

        let scale = unit_scale();
        for x in 0..32usize {
            let expected = Rgba::opaque(scale.color(value(x / 4, 2) as f64, 0));
            assert_eq!(surface.pixel(x, 5), expected, "x {x}");
        }
    }

    #[test]
    fn test_bin_resolution_snaps_columns_to_frame_boundaries() {
        let params = RenderParams {
            always_opaque: true,
            ..RenderParams::default()
        };
        // three frames per pixel against four per column: spans of 1 or 2 pixels
        let view = View::new(0, ZoomLevel::FramesPerPixel(3), 32, 8);
        let mut r = renderer(grid(32, 8, 4), params);
        assert_eq!(r.render_type(&view), RenderType::DrawBufferBinResolution);
        let (surface, _) = paint(&mut r, &view);

        let scale = unit_scale();
        for x in 0..32i32 {
            let sx = (0..32usize)
                .rev()
                .find(|&sx| view.x_for_frame(sx as i64 * 4) <= x)
                .unwrap();
            let expected = Rgba::opaque(scale.color(value(sx, 2) as f64, 0));
            assert_eq!(surface.pixel(x as usize, 5), expected, "x {x}");
        }
    }

    #[test]
    fn test_direct_translucent_cells() {
        let view = View::new(0, ZoomLevel::PixelsPerFrame(2), 40, 40);
        let mut r = renderer(grid(8, 4, 4), RenderParams::default());
        assert_eq!(r.render_type(&view), RenderType::DirectTranslucent);
        assert_eq!(r.cache_state(&view), CacheState::NoCache);

        let mut surface = RgbaImage::filled(40, 40, Rgba::BLACK);
        let result = r.render(&view, &mut surface, full(&view));
        assert_eq!(result.rendered, full(&view));
        assert!(r.largest_uncached_rect(&view).is_empty());

        // column 1 spans x 8..16, bin 1 spans y 20..30
        let cell = Rgba::opaque(unit_scale().color(value(1, 1) as f64, 0));
        assert_eq!(surface.pixel(12, 25), cell.with_alpha(CELL_ALPHA).over(Rgba::BLACK));
        assert_eq!(r.cache_state(&view), CacheState::NoCache);
    }

    #[test]
    fn test_direct_translucent_clips_to_view() {
        let view = View::new(0, ZoomLevel::PixelsPerFrame(2), 40, 40);
        let mut r = renderer(grid(8, 4, 4), RenderParams::default());
        let mut surface = RgbaImage::filled(40, 40, Rgba::BLACK);

        let result = r.render(&view, &mut surface, Rect::new(-10, -10, 100, 100));
        assert_eq!(result.rendered, full(&view));

        let outside = r.render(&view, &mut surface, Rect::new(50, 0, 10, 10));
        assert!(outside.rendered.is_empty());
        assert!(!outside.range.is_set());
    }

    #[test]
    fn test_sub_pixel_move_repaints_instead_of_scrolling() {
        let g = grid(256, 16, 1);
        let view = View::new(0, ZoomLevel::FramesPerPixel(4), 32, 16);
        let moved = view.scrolled_to(2);

        let mut r = renderer(g.clone(), RenderParams::default());
        paint(&mut r, &view);
        let (after_move, _) = paint(&mut r, &moved);
        assert_eq!(r.image_cache.start_frame(), 2);
        assert_eq!(r.cache_state(&moved), CacheState::WarmCache);

        let mut fresh = renderer(g, RenderParams::default());
        let (expected, _) = paint(&mut fresh, &moved);
        assert_eq!(after_move, expected);
    }

    #[test]
    fn test_phase_columns_keep_their_angles() {
        let rate = 8000;
        let samples: Vec<f32> = (0..4096)
            .map(|i| (std::f64::consts::TAU * 500.0 * i as f64 / rate as f64).sin() as f32)
            .collect();
        let audio: Rc<dyn SampleProvider> = Rc::new(AudioData::mono(samples, rate));
        let config = SpectralConfig {
            window_size: 256,
            hop: 64,
            fft_size: 256,
            ..SpectralConfig::default()
        };
        let source = SpectralColumnSource::new(audio, config).unwrap();
        let params = RenderParams {
            scale_type: ColorScaleType::Phase,
            scale_factor: 2.0 / 256.0,
            ..RenderParams::default()
        };
        let view = View::new(0, ZoomLevel::FramesPerPixel(64), 20, 129);
        let mut r = GridRenderer::new(RenderSources::from_spectral(source.clone()), params);
        assert_eq!(r.render_type(&view), RenderType::DrawBufferPixelResolution);
        let (surface, result) = paint(&mut r, &view);

        let (lo, hi) = (result.range.min() as f64, result.range.max() as f64);
        assert!(hi > 2.0 && hi <= PI + 1e-4, "max {hi}");
        assert!(lo < -2.0 && lo >= -PI - 1e-4, "min {lo}");

        let phase_scale = ColorScale::new(ColorScaleParams {
            scale_type: ColorScaleType::Phase,
            min: -PI,
            max: PI,
            ..ColorScaleParams::default()
        })
        .unwrap();
        for x in [3usize, 10] {
            let phases = source.phases(x);
            for bin in [0usize, 16, 40] {
                let expected = Rgba::opaque(phase_scale.color(phases[bin] as f64, 0));
                assert_eq!(surface.pixel(x, 128 - bin), expected, "x {x} bin {bin}");
            }
        }
    }

    #[test]
    fn test_peak_frequencies_pool_every_column_under_a_pixel() {
        let rate = 8000;
        // 1000 Hz is bin 8 of a 64-point FFT; only column 1's window hears it
        let samples: Vec<f32> = (0..1024)
            .map(|i| {
                if (32..96).contains(&i) {
                    (std::f64::consts::TAU * 1000.0 * i as f64 / rate as f64).sin() as f32
                } else {
                    0.0
                }
            })
            .collect();
        let audio: Rc<dyn SampleProvider> = Rc::new(AudioData::mono(samples, rate));
        let config = SpectralConfig {
            window_size: 64,
            hop: 64,
            fft_size: 64,
            ..SpectralConfig::default()
        };
        let source = SpectralColumnSource::new(audio, config).unwrap();
        let params = RenderParams {
            bin_display: BinDisplay::PeakFrequencies,
            ..RenderParams::default()
        };
        // four columns per pixel
        let view = View::new(0, ZoomLevel::FramesPerPixel(256), 4, 33);
        let mut r = GridRenderer::new(RenderSources::from_spectral(source), params);
        let (surface, result) = paint(&mut r, &view);

        assert!(result.range.max() as f64 > 10.0, "{:?}", result.range);
        assert!((0..33).any(|y| surface.pixel(0, y) != Rgba::BLACK));
    }

    #[test]
    fn test_visible_area_normalization_settles() {
        let params = RenderParams {
            normalize_visible_area: true,
            ..RenderParams::default()
        };
        let view = View::new(0, ZoomLevel::FramesPerPixel(4), 32, 16);
        let mut r = renderer(grid(64, 16, 4), params);
        paint(&mut r, &view);
        assert!(r.needs_repaint());
        assert_eq!(r.cache_state(&view), CacheState::ColdCache);
        paint(&mut r, &view);
        assert!(!r.needs_repaint());
        assert_eq!(r.cache_state(&view), CacheState::WarmCache);
    }

    #[test]
    fn test_peak_cache_matches_direct_columns() {
        let g = grid(256, 16, 1);
        let view = View::new(0, ZoomLevel::FramesPerPixel(8), 32, 16);

        let mut plain = renderer(g.clone(), RenderParams::default());
        let (expected, r1) = paint(&mut plain, &view);

        let pooled = PeakPoolingCache::new(g.clone(), 4).unwrap();
        let sources = RenderSources::new(g).with_peak_cache(pooled.clone());
        let mut r = GridRenderer::new(sources, RenderParams::default());
        let (actual, r2) = paint(&mut r, &view);
        assert_eq!(actual, expected);
        // pooled columns hide the quietest values but keep the loudest
        assert_eq!(r1.range.max(), r2.range.max());
        assert_eq!(r1.rendered, r2.rendered);
        assert!(pooled.is_populated(0));
    }

    #[test]
    fn test_not_ready_source_renders_nothing() {
        let audio = Rc::new(AudioData::mono(vec![0.5; 4096], 8000));
        let provider: Rc<dyn SampleProvider> = audio.clone();
        let source = SpectralColumnSource::new(provider, SpectralConfig::with_size(256)).unwrap();
        audio.set_ready(false);

        let view = View::new(0, ZoomLevel::FramesPerPixel(64), 16, 32);
        let mut r = GridRenderer::new(RenderSources::from_spectral(source), RenderParams::default());
        let mut surface = RgbaImage::new(16, 32);
        let result = r.render(&view, &mut surface, full(&view));
        assert!(result.rendered.is_empty());
        assert!(!result.range.is_set());
    }

    #[test]
    fn test_set_params_drops_caches() {
        let view = View::new(0, ZoomLevel::FramesPerPixel(4), 32, 16);
        let mut r = renderer(grid(64, 16, 4), RenderParams::default());
        paint(&mut r, &view);
        assert_eq!(r.cache_state(&view), CacheState::WarmCache);
        r.set_params(RenderParams {
            color_rotation: 10,
            ..RenderParams::default()
        });
        assert_eq!(r.cache_state(&view), CacheState::ColdCache);
        assert_eq!(r.largest_uncached_rect(&view), full(&view));
        assert_eq!(r.params().color_rotation, 10);
    }

    #[test]
    fn test_axis_helpers_follow_bin_range() {
        let params = RenderParams {
            min_bin: Some(4),
            max_bin: Some(12),
            ..RenderParams::default()
        };
        let view = View::new(0, ZoomLevel::FramesPerPixel(4), 32, 16);
        let r = renderer(grid(64, 16, 4), params);
        assert_eq!(r.y_for_bin(&view, 4.0), 16.0);
        assert_eq!(r.y_for_bin(&view, 12.0), 0.0);
        assert_eq!(r.bin_for_y(&view, 8.0), 8.0);
    }
}
