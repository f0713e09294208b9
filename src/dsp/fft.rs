use realfft::num_complex::Complex32;
use realfft::{RealFftPlanner, RealToComplex};
use std::cell::RefCell;
use std::f64::consts::PI;
use std::sync::Arc;

thread_local! {
    static FFT_PLANNER: RefCell<RealFftPlanner<f32>> = RefCell::new(RealFftPlanner::new());
}

/// Forward real-to-complex plan of `size` points, shared per thread.
pub fn plan_forward(size: usize) -> Arc<dyn RealToComplex<f32>> {
    FFT_PLANNER.with(|p| p.borrow_mut().plan_fft_forward(size))
}

/// Forward transform of `input` (consumed as scratch) into `size/2 + 1` bins.
///
/// On a transform failure (buffer length mismatch) the output is zeroed and
/// the error logged; callers never see a partial spectrum.
pub fn forward(fft: &dyn RealToComplex<f32>, input: &mut [f32], output: &mut [Complex32]) {
    if let Err(e) = fft.process(input, output) {
        log::error!("FFT of {} points failed: {e}", fft.len());
        output.fill(Complex32::new(0.0, 0.0));
    }
}

/// Swap the two halves of a buffer so that the frame centre lands at index 0.
pub fn fft_shift(buffer: &mut [f32]) {
    let half = buffer.len() / 2;
    buffer.rotate_left(half);
}

/// Wrap a phase into `(-π, π]`.
pub fn princarg(a: f64) -> f64 {
    PI - (PI - a).rem_euclid(2.0 * PI)
}
