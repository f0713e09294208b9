use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

thread_local! {
    static WINDOW_CACHE: RefCell<HashMap<(WindowKind, usize), Arc<[f32]>>> =
        RefCell::new(HashMap::new());
}

/// Analysis window shapes. All are the periodic form (period = `len`), which
/// is what an FFT frame of the same length expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WindowKind {
    Rectangular,
    #[default]
    Hann,
    Hamming,
    Blackman,
}

impl WindowKind {
    fn compute(self, len: usize) -> Vec<f32> {
        let phase = |n: usize| (n as f64) * std::f64::consts::TAU / (len as f64);
        match self {
            WindowKind::Rectangular => vec![1.0; len],
            WindowKind::Hann => (0..len)
                .map(|n| (0.5 - 0.5 * phase(n).cos()) as f32)
                .collect(),
            WindowKind::Hamming => (0..len)
                .map(|n| (0.54 - 0.46 * phase(n).cos()) as f32)
                .collect(),
            WindowKind::Blackman => (0..len)
                .map(|n| {
                    let p = phase(n);
                    (0.42 - 0.5 * p.cos() + 0.08 * (2.0 * p).cos()) as f32
                })
                .collect(),
        }
    }

    /// Cached coefficients for a window of `len` samples.
    pub fn coefficients(self, len: usize) -> Arc<[f32]> {
        WINDOW_CACHE.with(|cache| {
            cache
                .borrow_mut()
                .entry((self, len))
                .or_insert_with(|| self.compute(len).into())
                .clone()
        })
    }

    /// Multiply `frame` in place by this window.
    pub fn cut(self, frame: &mut [f32]) {
        let w = self.coefficients(frame.len());
        for (s, &c) in frame.iter_mut().zip(w.iter()) {
            *s *= c;
        }
    }
}
