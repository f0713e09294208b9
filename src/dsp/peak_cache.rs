//! Column-pooled view of a dense grid.
//!
//! Output column `i` is the bin-wise maximum of source columns
//! `i*k .. i*k + k`. Entries are computed on first request and kept until
//! the source changes. Only the rightmost entry can go stale (it may have
//! been built from a partial group while the source was still growing).

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::error::{GridError, Result};
use crate::types::{empty_column, fit_column, ChangeNotifier, Column, DenseGrid, GridObserver};

pub struct PeakPoolingCache {
    source: Rc<dyn DenseGrid>,
    columns_per_peak: usize,
    entries: RefCell<Vec<Option<Column>>>,
    /// Entry built from fewer than `columns_per_peak` source columns.
    incomplete_column: Cell<Option<usize>>,
    notifier: ChangeNotifier,
}

impl PeakPoolingCache {
    pub fn new(source: Rc<dyn DenseGrid>, columns_per_peak: usize) -> Result<Rc<Self>> {
        if columns_per_peak == 0 {
            return Err(GridError::InvalidColumnsPerPeak);
        }
        let cache = Rc::new(Self {
            source,
            columns_per_peak,
            entries: RefCell::new(Vec::new()),
            incomplete_column: Cell::new(None),
            notifier: ChangeNotifier::new(),
        });
        let observer: Weak<dyn GridObserver> = Rc::downgrade(&cache) as Weak<dyn GridObserver>;
        cache.source.subscribe(observer);
        Ok(cache)
    }

    pub fn columns_per_peak(&self) -> usize {
        self.columns_per_peak
    }

    pub fn source(&self) -> &Rc<dyn DenseGrid> {
        &self.source
    }

    pub fn is_populated(&self, index: usize) -> bool {
        matches!(self.entries.borrow().get(index), Some(Some(_)))
    }

    fn fill(&self, index: usize) -> Column {
        let height = self.source.height();
        let first = index * self.columns_per_peak;
        let count = self
            .source
            .width()
            .saturating_sub(first)
            .min(self.columns_per_peak);

        let mut pooled: Option<Column> = None;
        for x in first..first + count {
            let column = fit_column(self.source.column(x), height);
            match pooled.as_mut() {
                None => pooled = Some(column),
                Some(peak) => {
                    for (p, v) in peak.iter_mut().zip(column) {
                        if v > *p {
                            *p = v;
                        }
                    }
                }
            }
        }
        if count < self.columns_per_peak {
            self.incomplete_column.set(Some(index));
        }
        pooled.unwrap_or_else(|| empty_column(height))
    }
}

impl DenseGrid for PeakPoolingCache {
    fn width(&self) -> usize {
        self.source.width().div_ceil(self.columns_per_peak)
    }

    fn height(&self) -> usize {
        self.source.height()
    }

    fn resolution(&self) -> usize {
        self.source.resolution() * self.columns_per_peak
    }

    fn sample_rate(&self) -> u32 {
        self.source.sample_rate()
    }

    fn start_frame(&self) -> i64 {
        self.source.start_frame()
    }

    fn column(&self, index: usize) -> Column {
        if index >= self.width() {
            return empty_column(self.height());
        }
        if let Some(Some(column)) = self.entries.borrow().get(index) {
            return column.clone();
        }
        let column = self.fill(index);
        let mut entries = self.entries.borrow_mut();
        if entries.len() <= index {
            entries.resize(index + 1, None);
        }
        entries[index] = Some(column.clone());
        column
    }

    fn minimum_level(&self) -> f32 {
        self.source.minimum_level()
    }

    fn maximum_level(&self) -> f32 {
        self.source.maximum_level()
    }

    fn should_use_log_value_scale(&self) -> bool {
        self.source.should_use_log_value_scale()
    }

    fn is_ok(&self) -> bool {
        self.source.is_ok()
    }

    fn is_ready(&self) -> bool {
        self.source.is_ready()
    }

    fn subscribe(&self, observer: Weak<dyn GridObserver>) {
        self.notifier.subscribe(observer);
    }
}

impl GridObserver for PeakPoolingCache {
    fn grid_changed(&self) {
        if let Some(index) = self.incomplete_column.take() {
            if let Some(entry) = self.entries.borrow_mut().get_mut(index) {
                *entry = None;
            }
        }
        self.notifier.notify();
    }
}
