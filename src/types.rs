//! Shared data contracts: columns, dense grid sources, raw sample providers
//! and the change-notification plumbing that ties them together.
//!
//! Everything here is single-threaded by contract. Sources hand out columns
//! through `&self` while mutating small internal caches, so they are built on
//! `Rc`/`RefCell` and are deliberately neither `Send` nor `Sync`.

use std::cell::{Cell, RefCell};
use std::rc::Weak;

/// One time-slice of per-bin values.
pub type Column = Vec<f32>;

/// Receives a synchronous callback when the grid or samples it depends on
/// have changed.
pub trait GridObserver {
    fn grid_changed(&self);
}

/// Weak observer list owned by a source.
#[derive(Default)]
pub struct ChangeNotifier {
    observers: RefCell<Vec<Weak<dyn GridObserver>>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Weak<dyn GridObserver>) {
        self.observers.borrow_mut().push(observer);
    }

    /// Call every live observer, pruning dropped ones.
    pub fn notify(&self) {
        // Collect first so an observer may subscribe or notify re-entrantly.
        let live: Vec<_> = {
            let mut observers = self.observers.borrow_mut();
            observers.retain(|o| o.strong_count() > 0);
            observers.iter().filter_map(|o| o.upgrade()).collect()
        };
        for observer in live {
            observer.grid_changed();
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .borrow()
            .iter()
            .filter(|o| o.strong_count() > 0)
            .count()
    }
}

// ── Dense grid capability ────────────────────────────────────────────────────

/// A read-only 2-D grid of scalar values addressed by (column, bin).
///
/// `column` must always return exactly `height()` values. An index past the
/// end yields a zero-filled column, never a panic.
pub trait DenseGrid {
    /// Number of columns.
    fn width(&self) -> usize;
    /// Bins per column.
    fn height(&self) -> usize;
    /// Source sample frames per column.
    fn resolution(&self) -> usize;
    fn sample_rate(&self) -> u32;
    /// Sample frame at which column 0 starts.
    fn start_frame(&self) -> i64 {
        0
    }
    fn column(&self, index: usize) -> Column;
    fn value_at(&self, index: usize, bin: usize) -> f32 {
        self.column(index).get(bin).copied().unwrap_or(0.0)
    }
    fn minimum_level(&self) -> f32;
    fn maximum_level(&self) -> f32;
    /// Whether a logarithmic value scale is advisable for display.
    fn should_use_log_value_scale(&self) -> bool {
        false
    }
    /// False when the backing data is unavailable altogether.
    fn is_ok(&self) -> bool {
        true
    }
    /// False while the backing data is still being produced.
    fn is_ready(&self) -> bool {
        true
    }
    /// Register for change notifications. Grids that never change ignore this.
    fn subscribe(&self, _observer: Weak<dyn GridObserver>) {}
}

/// Zero column of the given height; the out-of-range answer for every grid.
pub fn empty_column(height: usize) -> Column {
    vec![0.0; height]
}

/// Pad with zeros or truncate so the column is exactly `height` long.
pub fn fit_column(mut column: Column, height: usize) -> Column {
    column.resize(height, 0.0);
    column
}

// ── Raw sample providers ─────────────────────────────────────────────────────

/// Source of raw audio for spectral analysis.
pub trait SampleProvider {
    fn sample_rate(&self) -> u32;
    fn channel_count(&self) -> usize;
    fn start_frame(&self) -> i64 {
        0
    }
    /// One past the last readable frame.
    fn end_frame(&self) -> i64;
    fn is_ok(&self) -> bool {
        true
    }
    fn is_ready(&self) -> bool {
        true
    }
    /// Percentage (0–100) of the data that is available.
    fn completion(&self) -> u8 {
        100
    }
    /// Read up to `count` frames of one channel starting at `start`.
    /// Short reads are allowed; the caller zero-pads.
    fn read(&self, channel: usize, start: i64, count: usize) -> Vec<f32>;
    fn subscribe(&self, _observer: Weak<dyn GridObserver>) {}
}

/// In-memory interleaved audio that can be appended to while it is being
/// displayed (live recording).
pub struct AudioData {
    samples: RefCell<Vec<f32>>,
    sample_rate: u32,
    channels: usize,
    ready: Cell<bool>,
    notifier: ChangeNotifier,
}

impl AudioData {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: usize) -> Self {
        Self {
            samples: RefCell::new(samples),
            sample_rate,
            channels: channels.max(1),
            ready: Cell::new(true),
            notifier: ChangeNotifier::new(),
        }
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, sample_rate, 1)
    }

    pub fn frames(&self) -> usize {
        self.samples.borrow().len() / self.channels
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Append interleaved samples and notify observers.
    pub fn append(&self, interleaved: &[f32]) {
        self.samples.borrow_mut().extend_from_slice(interleaved);
        self.notifier.notify();
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.set(ready);
        self.notifier.notify();
    }
}

impl SampleProvider for AudioData {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channel_count(&self) -> usize {
        self.channels
    }

    fn end_frame(&self) -> i64 {
        self.frames() as i64
    }

    fn is_ready(&self) -> bool {
        self.ready.get()
    }

    fn read(&self, channel: usize, start: i64, count: usize) -> Vec<f32> {
        if channel >= self.channels || start < 0 {
            return Vec::new();
        }
        let samples = self.samples.borrow();
        let frames = samples.len() / self.channels;
        let start = start as usize;
        if start >= frames {
            return Vec::new();
        }
        let end = (start + count).min(frames);
        (start..end)
            .map(|f| samples[f * self.channels + channel])
            .collect()
    }

    fn subscribe(&self, observer: Weak<dyn GridObserver>) {
        self.notifier.subscribe(observer);
    }
}

// ── In-memory grid ───────────────────────────────────────────────────────────

/// A dense grid held entirely in memory, growable column by column.
pub struct GridData {
    columns: RefCell<Vec<Column>>,
    height: usize,
    resolution: usize,
    sample_rate: u32,
    min_level: f32,
    max_level: f32,
    notifier: ChangeNotifier,
}

impl GridData {
    pub fn new(height: usize, resolution: usize, sample_rate: u32) -> Self {
        Self {
            columns: RefCell::new(Vec::new()),
            height,
            resolution: resolution.max(1),
            sample_rate,
            min_level: 0.0,
            max_level: 1.0,
            notifier: ChangeNotifier::new(),
        }
    }

    pub fn from_columns(columns: Vec<Column>, resolution: usize, sample_rate: u32) -> Self {
        let height = columns.first().map(|c| c.len()).unwrap_or(0);
        let grid = Self::new(height, resolution, sample_rate);
        let (min, max) = level_extents(&columns);
        *grid.columns.borrow_mut() = columns
            .into_iter()
            .map(|c| fit_column(c, height))
            .collect();
        grid.with_levels(min, max)
    }

    pub fn with_levels(mut self, min: f32, max: f32) -> Self {
        self.min_level = min;
        self.max_level = max;
        self
    }

    pub fn push_column(&self, column: Column) {
        self.columns
            .borrow_mut()
            .push(fit_column(column, self.height));
        self.notifier.notify();
    }
}

fn level_extents(columns: &[Column]) -> (f32, f32) {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &v in columns.iter().flatten() {
        min = min.min(v);
        max = max.max(v);
    }
    if min > max {
        (0.0, 1.0)
    } else {
        (min, max)
    }
}

impl DenseGrid for GridData {
    fn width(&self) -> usize {
        self.columns.borrow().len()
    }

    fn height(&self) -> usize {
        self.height
    }

    fn resolution(&self) -> usize {
        self.resolution
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn column(&self, index: usize) -> Column {
        self.columns
            .borrow()
            .get(index)
            .cloned()
            .unwrap_or_else(|| empty_column(self.height))
    }

    fn value_at(&self, index: usize, bin: usize) -> f32 {
        self.columns
            .borrow()
            .get(index)
            .and_then(|c| c.get(bin).copied())
            .unwrap_or(0.0)
    }

    fn minimum_level(&self) -> f32 {
        self.min_level
    }

    fn maximum_level(&self) -> f32 {
        self.max_level
    }

    fn subscribe(&self, observer: Weak<dyn GridObserver>) {
        self.notifier.subscribe(observer);
    }
}
