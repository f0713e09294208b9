//! Sliding-window percentile tracker.
//!
//! Keeps the last `size` pushed values in arrival order alongside a sorted
//! copy. Lookup is a single index into the sorted copy; each push is a
//! binary search plus a shift on both buffers.

use std::cmp::Ordering;
use std::fmt::Debug;

#[derive(Clone, Debug)]
pub struct PercentileFilter<T> {
    /// Raw window, oldest first.
    frame: Vec<T>,
    sorted: Vec<T>,
    percentile: f32,
    index: usize,
}

fn cmp<T: PartialOrd>(a: &T, b: &T) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}

impl<T> PercentileFilter<T>
where
    T: Copy + PartialOrd + Default + Debug,
{
    /// Median filter over `size` values.
    pub fn new(size: usize) -> Self {
        Self::with_percentile(size, 50.0)
    }

    pub fn with_percentile(size: usize, percentile: f32) -> Self {
        let size = size.max(1);
        let mut filter = Self {
            frame: vec![T::default(); size],
            sorted: vec![T::default(); size],
            percentile,
            index: 0,
        };
        filter.calculate_index();
        filter
    }

    pub fn size(&self) -> usize {
        self.frame.len()
    }

    pub fn percentile(&self) -> f32 {
        self.percentile
    }

    pub fn set_percentile(&mut self, percentile: f32) {
        self.percentile = percentile;
        self.calculate_index();
    }

    /// Push a value, evicting the oldest. NaN is replaced by the zero value.
    pub fn push(&mut self, value: T) {
        #[allow(clippy::eq_op)]
        let value = if value != value {
            log::warn!("PercentileFilter: NaN pushed, substituting {:?}", T::default());
            T::default()
        } else {
            value
        };
        let oldest = self.frame.remove(0);
        self.drop_sorted(oldest);
        self.frame.push(value);
        self.put_sorted(value);
    }

    /// The current percentile value.
    pub fn get(&self) -> T {
        self.sorted[self.index]
    }

    /// Fill the window with zero values again.
    pub fn reset(&mut self) {
        let size = self.size();
        self.frame = vec![T::default(); size];
        self.sorted = vec![T::default(); size];
    }

    /// Change the window length.
    ///
    /// Growing pads the oldest end with the current percentile value so the
    /// reported value does not jump. Shrinking drops the oldest values.
    pub fn resize(&mut self, new_size: usize) {
        let new_size = new_size.max(1);
        let old_size = self.size();
        if new_size == old_size {
            return;
        }
        if new_size > old_size {
            let pad = self.get();
            let diff = new_size - old_size;
            let mut frame = Vec::with_capacity(new_size);
            frame.resize(diff, pad);
            frame.extend_from_slice(&self.frame);
            self.frame = frame;
            for _ in 0..diff {
                self.put_sorted(pad);
            }
        } else {
            let diff = old_size - new_size;
            let dropped: Vec<T> = self.frame.drain(..diff).collect();
            for value in dropped {
                self.drop_sorted(value);
            }
        }
        self.calculate_index();
    }

    /// Sorted buffer is non-decreasing and holds exactly the raw window's
    /// values (as a multiset).
    pub fn check_integrity(&self) -> bool {
        if self.frame.len() != self.sorted.len() {
            return false;
        }
        if self.sorted.windows(2).any(|w| cmp(&w[0], &w[1]) == Ordering::Greater) {
            return false;
        }
        let mut raw = self.frame.clone();
        raw.sort_by(cmp);
        raw.iter()
            .zip(self.sorted.iter())
            .all(|(a, b)| cmp(a, b) == Ordering::Equal)
    }

    fn calculate_index(&mut self) {
        let size = self.size();
        let idx = ((size as f32 * self.percentile) / 100.0).floor();
        self.index = if idx < 0.0 {
            0
        } else {
            (idx as usize).min(size - 1)
        };
    }

    fn put_sorted(&mut self, value: T) {
        let at = self
            .sorted
            .partition_point(|v| cmp(v, &value) == Ordering::Less);
        self.sorted.insert(at, value);
    }

    fn drop_sorted(&mut self, value: T) {
        let at = self
            .sorted
            .partition_point(|v| cmp(v, &value) == Ordering::Less);
        if at < self.sorted.len() && cmp(&self.sorted[at], &value) == Ordering::Equal {
            self.sorted.remove(at);
        } else {
            // Only reachable if the buffers have diverged.
            log::error!("PercentileFilter: value {:?} missing from sorted buffer", value);
            self.sorted.remove(at.min(self.sorted.len() - 1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_of_window() {
        let mut f = PercentileFilter::<f32>::new(3);
        for v in [5.0, 1.0, 3.0] {
            f.push(v);
            assert!(f.check_integrity());
        }
        assert_eq!(f.get(), 3.0);
        f.push(10.0); // window now 1, 3, 10
        assert_eq!(f.get(), 3.0);
        f.push(0.0); // 3, 10, 0
        assert_eq!(f.get(), 3.0);
        f.push(11.0); // 10, 0, 11
        assert_eq!(f.get(), 10.0);
    }

    #[test]
    fn test_percentile_index_is_clamped() {
        let mut f = PercentileFilter::<f32>::with_percentile(4, 100.0);
        for v in [4.0, 1.0, 3.0, 2.0] {
            f.push(v);
        }
        assert_eq!(f.get(), 4.0);
        f.set_percentile(0.0);
        assert_eq!(f.get(), 1.0);
        f.set_percentile(-20.0);
        assert_eq!(f.get(), 1.0);
    }

    #[test]
    fn test_nan_becomes_zero() {
        let mut f = PercentileFilter::<f32>::new(3);
        f.push(2.0);
        f.push(f32::NAN);
        f.push(4.0);
        assert!(f.check_integrity());
        assert_eq!(f.get(), 2.0);
        f.set_percentile(0.0);
        assert_eq!(f.get(), 0.0);
    }

    #[test]
    fn test_grow_pads_with_current_value() {
        let mut f = PercentileFilter::<f32>::new(3);
        for v in [1.0, 2.0, 9.0] {
            f.push(v);
        }
        let before = f.get();
        f.resize(7);
        assert_eq!(f.size(), 7);
        assert!(f.check_integrity());
        assert_eq!(f.get(), before);
    }

    #[test]
    fn test_shrink_drops_oldest() {
        let mut f = PercentileFilter::<f32>::new(5);
        for v in [100.0, 90.0, 1.0, 2.0, 3.0] {
            f.push(v);
        }
        f.resize(3);
        assert!(f.check_integrity());
        assert_eq!(f.get(), 2.0);
        f.set_percentile(100.0);
        assert_eq!(f.get(), 3.0);
    }

    #[test]
    fn test_integrity_holds_across_mixed_mutations() {
        let mut f = PercentileFilter::<f32>::with_percentile(4, 75.0);
        let mut x = 0.37f32;
        for step in 0..300 {
            // cheap deterministic sequence with repeats
            x = (x * 7.13 + 0.31).fract();
            let value = (x * 8.0).floor();
            f.push(value);
            assert!(f.check_integrity(), "after push at step {step}");
            if step % 17 == 0 {
                f.resize(1 + (step / 17) % 9);
                assert!(f.check_integrity(), "after resize at step {step}");
            }
        }
    }

    #[test]
    fn test_integrity_detects_divergence() {
        let mut f = PercentileFilter::<i32>::new(3);
        f.push(1);
        f.push(2);
        f.push(3);
        assert!(f.check_integrity());
        f.sorted[0] = 7;
        assert!(!f.check_integrity());
    }
}
