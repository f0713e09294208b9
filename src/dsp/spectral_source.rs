//! Short-time spectra computed on demand from a sample provider.
//!
//! Column `n` is the FFT of a window centred on frame `start + n * hop`. When
//! the FFT is larger than the window, the window sits in the middle of the
//! frame and the frame is rotated so its centre is at index 0 before the
//! transform; phases are then relative to the column's centre frame, which
//! is what the stable-frequency estimate needs.
//!
//! Two small caches sit behind `&self`: a ring of recent complex columns
//! (callers often ask for `n` and `n + 1` in turn) and the last raw sample
//! span read from the provider (consecutive overlapping columns only fetch
//! the new hop of samples).

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::TAU;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use realfft::num_complex::Complex32;
use realfft::RealToComplex;

use crate::config::SpectralConfig;
use crate::dsp::fft::{self, fft_shift, princarg};
use crate::dsp::percentile::PercentileFilter;
use crate::dsp::window::WindowKind;
use crate::error::{GridError, Result};
use crate::types::{ChangeNotifier, Column, DenseGrid, GridObserver, SampleProvider};

/// How peak bins are chosen within a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeakPickType {
    /// Every bin louder than both neighbours.
    #[default]
    AllPeaks,
    /// Loudest bin of each run above a sliding median of 10 bins.
    MajorPeaks,
    /// As `MajorPeaks`, with the median window widening with frequency to
    /// roughly a major third.
    MajorPitchAdaptivePeaks,
}

struct ColumnRing {
    entries: Vec<(usize, Vec<Complex32>)>,
    write_index: usize,
    capacity: usize,
}

impl ColumnRing {
    fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            write_index: 0,
            capacity: capacity.max(1),
        }
    }

    fn get(&self, n: usize) -> Option<Vec<Complex32>> {
        self.entries
            .iter()
            .find(|(index, _)| *index == n)
            .map(|(_, column)| column.clone())
    }

    fn insert(&mut self, n: usize, column: Vec<Complex32>) {
        if self.entries.len() < self.capacity {
            self.entries.push((n, column));
        } else {
            self.entries[self.write_index] = (n, column);
            self.write_index = (self.write_index + 1) % self.capacity;
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.write_index = 0;
    }
}

struct SavedSamples {
    start: i64,
    data: Vec<f32>,
}

impl SavedSamples {
    fn end(&self) -> i64 {
        self.start + self.data.len() as i64
    }
}

pub struct SpectralColumnSource {
    provider: Rc<dyn SampleProvider>,
    window: WindowKind,
    window_size: usize,
    hop: usize,
    fft_size: usize,
    channel: Option<usize>,
    height: usize,
    fft: Arc<dyn RealToComplex<f32>>,
    ring: RefCell<ColumnRing>,
    saved: RefCell<Option<SavedSamples>>,
    notifier: ChangeNotifier,
}

impl SpectralColumnSource {
    /// Build a source over `provider` and subscribe it to provider changes.
    pub fn new(provider: Rc<dyn SampleProvider>, config: SpectralConfig) -> Result<Rc<Self>> {
        let SpectralConfig {
            window,
            window_size,
            hop,
            fft_size,
            channel,
            max_frequency,
            cache_size,
        } = config;

        if fft_size < 2 || fft_size % 2 != 0 {
            return Err(GridError::InvalidFftSize(fft_size));
        }
        if window_size == 0 {
            return Err(GridError::Config("window size must be non-zero".into()));
        }
        if window_size > fft_size {
            return Err(GridError::WindowLargerThanFft {
                window: window_size,
                fft: fft_size,
            });
        }
        if hop == 0 {
            return Err(GridError::InvalidHop);
        }

        let full = fft_size / 2 + 1;
        let height = match max_frequency {
            Some(max) if max > 0.0 => {
                let rate = provider.sample_rate().max(1) as f64;
                let bins = (max * fft_size as f64 / rate).floor() as usize + 1;
                bins.min(full)
            }
            _ => full,
        };

        let source = Rc::new(Self {
            provider,
            window,
            window_size,
            hop,
            fft_size,
            channel,
            height,
            fft: fft::plan_forward(fft_size),
            ring: RefCell::new(ColumnRing::new(cache_size)),
            saved: RefCell::new(None),
            notifier: ChangeNotifier::new(),
        });
        let observer: Weak<dyn GridObserver> = Rc::downgrade(&source) as Weak<dyn GridObserver>;
        source.provider.subscribe(observer);
        log::debug!(
            "spectral source: {:?} window {} hop {} fft {} -> {} bins",
            window,
            window_size,
            hop,
            fft_size,
            height
        );
        Ok(source)
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    pub fn window_kind(&self) -> WindowKind {
        self.window
    }

    /// Nominal centre frequency of `bin` in Hz.
    pub fn bin_frequency(&self, bin: usize) -> f64 {
        bin as f64 * self.provider.sample_rate() as f64 / self.fft_size as f64
    }

    pub fn completion(&self) -> u8 {
        self.provider.completion()
    }

    /// Frames covered by the analysis window of column `n`.
    pub fn source_sample_range(&self, n: usize) -> (i64, i64) {
        let centre = self.provider.start_frame() + (n * self.hop) as i64;
        let start = centre - (self.window_size / 2) as i64;
        (start, start + self.window_size as i64)
    }

    /// Frames read for column `n`: the window range padded out to the FFT size.
    fn source_data_range(&self, n: usize) -> (i64, i64) {
        let (start, _) = self.source_sample_range(n);
        let start = start - ((self.fft_size - self.window_size) / 2) as i64;
        (start, start + self.fft_size as i64)
    }

    fn source_data(&self, start: i64, end: i64) -> Vec<f32> {
        let mut saved = self.saved.borrow_mut();
        if let Some(s) = saved.as_ref() {
            if s.start == start && s.end() == end {
                return s.data.clone();
            }
            if start >= s.start && start < s.end() && end > s.end() {
                let mut joined = s.data[(start - s.start) as usize..].to_vec();
                joined.extend(self.read_uncached(s.end(), end));
                *saved = Some(SavedSamples {
                    start,
                    data: joined.clone(),
                });
                return joined;
            }
        }
        let data = self.read_uncached(start, end);
        *saved = Some(SavedSamples {
            start,
            data: data.clone(),
        });
        data
    }

    /// Read `[start, end)` from the provider, zero-filling anything it
    /// cannot supply.
    fn read_uncached(&self, start: i64, end: i64) -> Vec<f32> {
        let len = (end - start).max(0) as usize;
        let mut out = vec![0.0f32; len];
        let first = start.max(self.provider.start_frame());
        if first >= end {
            return out;
        }
        let offset = (first - start) as usize;
        let count = (end - first) as usize;
        let target = &mut out[offset..];

        match self.channel {
            Some(channel) => {
                let got = self.provider.read(channel, first, count);
                for (o, v) in target.iter_mut().zip(got) {
                    *o = v;
                }
            }
            None => {
                let channels = self.provider.channel_count().max(1);
                for channel in 0..channels {
                    let got = self.provider.read(channel, first, count);
                    for (o, v) in target.iter_mut().zip(got) {
                        *o += v;
                    }
                }
                if channels > 1 {
                    let scale = 1.0 / channels as f32;
                    target.iter_mut().for_each(|o| *o *= scale);
                }
            }
        }
        out
    }

    fn zero_spectrum(&self) -> Vec<Complex32> {
        vec![Complex32::new(0.0, 0.0); self.height]
    }

    /// The authoritative column: `height()` complex bins for column `n`.
    pub fn complex_column(&self, n: usize) -> Vec<Complex32> {
        if !self.is_ok() || n >= self.width() {
            return self.zero_spectrum();
        }
        if let Some(column) = self.ring.borrow().get(n) {
            return column;
        }
        let column = self.compute_column(n);
        self.ring.borrow_mut().insert(n, column.clone());
        column
    }

    fn compute_column(&self, n: usize) -> Vec<Complex32> {
        let (start, end) = self.source_data_range(n);
        let mut frame = self.source_data(start, end);
        let pad = (self.fft_size - self.window_size) / 2;
        self.window.cut(&mut frame[pad..pad + self.window_size]);
        fft_shift(&mut frame);

        let mut spectrum = self.fft.make_output_vec();
        fft::forward(self.fft.as_ref(), &mut frame, &mut spectrum);
        spectrum.truncate(self.height);
        spectrum
    }

    pub fn phases(&self, n: usize) -> Column {
        self.complex_column(n).iter().map(|c| c.arg()).collect()
    }

    /// Real and imaginary parts of `count` bins from `min_bin`, zero past the top.
    pub fn values_at(&self, n: usize, min_bin: usize, count: usize) -> (Vec<f32>, Vec<f32>) {
        let column = self.complex_column(n);
        (0..count)
            .map(|i| {
                column
                    .get(min_bin + i)
                    .map(|c| (c.re, c.im))
                    .unwrap_or((0.0, 0.0))
            })
            .unzip()
    }

    pub fn magnitudes_at(&self, n: usize, min_bin: usize, count: usize) -> Vec<f32> {
        let column = self.complex_column(n);
        (0..count)
            .map(|i| column.get(min_bin + i).map(|c| c.norm()).unwrap_or(0.0))
            .collect()
    }

    pub fn phases_at(&self, n: usize, min_bin: usize, count: usize) -> Vec<f32> {
        let column = self.complex_column(n);
        (0..count)
            .map(|i| column.get(min_bin + i).map(|c| c.arg()).unwrap_or(0.0))
            .collect()
    }

    pub fn magnitude_at(&self, n: usize, bin: usize) -> f32 {
        self.complex_column(n)
            .get(bin)
            .map(|c| c.norm())
            .unwrap_or(0.0)
    }

    pub fn phase_at(&self, n: usize, bin: usize) -> f32 {
        self.complex_column(n)
            .get(bin)
            .map(|c| c.arg())
            .unwrap_or(0.0)
    }

    pub fn maximum_magnitude_at(&self, n: usize) -> f32 {
        self.column(n).into_iter().fold(0.0, f32::max)
    }

    /// Phase-vocoder estimate of the frequency present in `bin`, from the
    /// phase advance between columns `n` and `n + 1`. `None` at the last column.
    pub fn estimate_stable_frequency(&self, n: usize, bin: usize) -> Option<f64> {
        if n + 1 >= self.width() {
            return None;
        }
        let old_phase = self.phase_at(n, bin) as f64;
        let new_phase = self.phase_at(n + 1, bin) as f64;
        Some(self.refine_frequency(bin, old_phase, new_phase))
    }

    fn refine_frequency(&self, bin: usize, old_phase: f64, new_phase: f64) -> f64 {
        let hop = self.hop as f64;
        let expected = old_phase + TAU * bin as f64 * hop / self.fft_size as f64;
        let error = princarg(new_phase - expected);
        self.provider.sample_rate() as f64 * (expected + error - old_phase) / (TAU * hop)
    }

    /// Window length and percentile of the sliding median used around `bin`.
    fn peak_pick_window(&self, kind: PeakPickType, bin: usize) -> (usize, f32) {
        if kind != PeakPickType::MajorPitchAdaptivePeaks {
            return (10, 50.0);
        }
        if bin == 0 {
            return (3, 50.0);
        }
        let rate = self.provider.sample_rate().max(1) as f64;
        let fft_size = self.fft_size as f64;
        // Snapped so the filter only changes size at a few frequencies.
        let low = snap_frequency(self.bin_frequency(bin));
        let high = low * 2f64.powf(4.0 / 12.0);
        let span = (high * fft_size / rate).round() - (low * fft_size / rate).round();
        let size = span.max(3.0) as usize;
        let percentile = (99.0 - 49.0 * 3.0 / size as f32).clamp(50.0, 99.0);
        (size, percentile)
    }

    /// Peak bins of column `n` within `[ymin, ymax]`. `ymax == 0` means the
    /// top bin.
    pub fn peaks(&self, kind: PeakPickType, n: usize, ymin: usize, ymax: usize) -> BTreeSet<usize> {
        let mut peaks = BTreeSet::new();
        let height = self.height;
        if height == 0 || !self.is_ok() {
            return peaks;
        }
        let ymax = if ymax == 0 || ymax >= height {
            height - 1
        } else {
            ymax
        };
        if ymin > ymax {
            return peaks;
        }
        let values = self.column(n);

        if kind == PeakPickType::AllPeaks {
            for bin in ymin..=ymax {
                let v = values[bin];
                let over_left = bin == 0 || v > values[bin - 1];
                let over_right = bin + 1 == height || v > values[bin + 1];
                if over_left && over_right {
                    peaks.insert(bin);
                }
            }
            return peaks;
        }

        let (size, percentile) = self.peak_pick_window(kind, ymin);
        let mut filter = PercentileFilter::with_percentile(size, percentile);
        let bin_min = ymin.saturating_sub(size / 2);
        let bin_max = (ymax + self.peak_pick_window(kind, ymax).0 / 2).min(height - 1);

        // Each centre bin is judged against the median of the window that
        // ends half a window after it.
        let mut centre = bin_min;
        let mut run: Option<usize> = None;
        for bin in bin_min..=bin_max {
            filter.push(values[bin]);
            if kind == PeakPickType::MajorPitchAdaptivePeaks {
                let (size, percentile) = self.peak_pick_window(kind, bin);
                filter.resize(size);
                filter.set_percentile(percentile);
            }
            let median = filter.get();
            let last_centre = if bin == bin_max {
                bin_max
            } else {
                bin.saturating_sub(filter.size() / 2)
            };
            while centre <= last_centre && centre <= bin {
                let v = values[centre];
                if v > median {
                    if run.map_or(true, |best| v > values[best]) {
                        run = Some(centre);
                    }
                } else {
                    close_run(&mut run, ymin, ymax, &mut peaks);
                }
                centre += 1;
            }
        }
        close_run(&mut run, ymin, ymax, &mut peaks);
        peaks
    }

    /// Peak bins mapped to their phase-refined frequency in Hz. At the last
    /// column the nominal bin frequency is used.
    pub fn peak_frequencies(
        &self,
        kind: PeakPickType,
        n: usize,
        ymin: usize,
        ymax: usize,
    ) -> BTreeMap<usize, f64> {
        let peaks = self.peaks(kind, n, ymin, ymax);
        if peaks.is_empty() {
            return BTreeMap::new();
        }
        if n + 1 >= self.width() {
            return peaks
                .into_iter()
                .map(|bin| (bin, self.bin_frequency(bin)))
                .collect();
        }
        let old = self.phases(n);
        let new = self.phases(n + 1);
        peaks
            .into_iter()
            .map(|bin| {
                (
                    bin,
                    self.refine_frequency(bin, old[bin] as f64, new[bin] as f64),
                )
            })
            .collect()
    }

    /// Drop both caches and tell observers. Called when the provider changes.
    pub fn source_changed(&self) {
        self.ring.borrow_mut().clear();
        *self.saved.borrow_mut() = None;
        self.notifier.notify();
    }
}

fn close_run(run: &mut Option<usize>, ymin: usize, ymax: usize, peaks: &mut BTreeSet<usize>) {
    if let Some(best) = run.take() {
        if (ymin..=ymax).contains(&best) {
            peaks.insert(best);
        }
    }
}

/// Round to 10 Hz below 200, 100 Hz below 2k, 1 kHz below 20k; cap at 20k.
fn snap_frequency(freq: f64) -> f64 {
    if freq < 200.0 {
        (freq / 10.0).round() * 10.0
    } else if freq < 2000.0 {
        (freq / 100.0).round() * 100.0
    } else if freq < 20000.0 {
        (freq / 1000.0).round() * 1000.0
    } else {
        20000.0
    }
}

impl DenseGrid for SpectralColumnSource {
    fn width(&self) -> usize {
        let length = self.provider.end_frame() - self.provider.start_frame();
        if !self.is_ok() || length <= 0 {
            return 0;
        }
        length as usize / self.hop + 1
    }

    fn height(&self) -> usize {
        self.height
    }

    fn resolution(&self) -> usize {
        self.hop
    }

    fn sample_rate(&self) -> u32 {
        self.provider.sample_rate()
    }

    fn start_frame(&self) -> i64 {
        self.provider.start_frame()
    }

    /// Magnitudes of column `n`.
    fn column(&self, n: usize) -> Column {
        self.complex_column(n).iter().map(|c| c.norm()).collect()
    }

    fn value_at(&self, n: usize, bin: usize) -> f32 {
        self.magnitude_at(n, bin)
    }

    fn minimum_level(&self) -> f32 {
        0.0
    }

    fn maximum_level(&self) -> f32 {
        (self.fft_size / 2) as f32
    }

    fn should_use_log_value_scale(&self) -> bool {
        true
    }

    fn is_ok(&self) -> bool {
        self.provider.is_ok()
    }

    fn is_ready(&self) -> bool {
        self.provider.is_ok() && self.provider.is_ready()
    }

    fn subscribe(&self, observer: Weak<dyn GridObserver>) {
        self.notifier.subscribe(observer);
    }
}

impl GridObserver for SpectralColumnSource {
    fn grid_changed(&self) {
        self.source_changed();
    }
}
