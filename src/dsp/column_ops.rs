//! Stateless operations on a single column of bin values.

use serde::{Deserialize, Serialize};

/// Per-column normalization applied before display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColumnNormalization {
    #[default]
    None,
    /// Affine map so the column spans exactly `[0, 1]`.
    Range01,
    /// Divide by the sum of absolute values.
    Sum1,
    /// Divide by the largest absolute value.
    Max1,
    /// `Max1`, then multiply by `log10(max + 1)`.
    Hybrid,
}

pub fn apply_gain(column: &[f32], gain: f64) -> Vec<f32> {
    if gain == 1.0 {
        return column.to_vec();
    }
    column.iter().map(|&v| (v as f64 * gain) as f32).collect()
}

pub fn apply_shift(column: &[f32], shift: f32) -> Vec<f32> {
    if shift == 0.0 {
        return column.to_vec();
    }
    column.iter().map(|&v| v + shift).collect()
}

/// Scale raw FFT magnitudes so a full-scale sinusoid reads close to 1.
pub fn fft_scale(column: &[f32], fft_size: usize) -> Vec<f32> {
    apply_gain(column, 2.0 / fft_size as f64)
}

/// A peak is the leftmost element of a rise whose plateau then falls (or
/// runs off the end of the column).
pub fn is_peak(column: &[f32], ix: usize) -> bool {
    let Some(&value) = column.get(ix) else {
        return false;
    };
    if ix > 0 && column[ix - 1] >= value {
        return false;
    }
    for &next in &column[ix + 1..] {
        if next > value {
            return false;
        }
        if next < value {
            return true;
        }
    }
    true
}

/// Zero every non-peak position.
pub fn peak_pick(column: &[f32]) -> Vec<f32> {
    (0..column.len())
        .map(|i| if is_peak(column, i) { column[i] } else { 0.0 })
        .collect()
}

pub fn normalize(column: &[f32], mode: ColumnNormalization) -> Vec<f32> {
    if mode == ColumnNormalization::None || column.is_empty() {
        return column.to_vec();
    }

    if mode == ColumnNormalization::Range01 {
        let (min, max) = column
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let range = max - min;
        if range <= 0.0 {
            // flat column: shift to 0 but don't stretch
            return vec![0.0; column.len()];
        }
        return column.iter().map(|&v| (v - min) / range).collect();
    }

    let scale = if mode == ColumnNormalization::Sum1 {
        column.iter().map(|v| v.abs() as f64).sum::<f64>()
    } else {
        column.iter().fold(0.0f64, |m, v| m.max(v.abs() as f64))
    };
    if scale == 0.0 {
        return column.to_vec();
    }

    let mut out: Vec<f32> = column.iter().map(|&v| (v as f64 / scale) as f32).collect();
    if mode == ColumnNormalization::Hybrid {
        let gain = (scale + 1.0).log10();
        out.iter_mut().for_each(|v| *v = (*v as f64 * gain) as f32);
    }
    out
}

/// Resample a column of source bins into `height` display rows.
///
/// `bin_for_row[y]` is the (fractional) source bin at the lower edge of row
/// `y`, rows ordered from the low-bin end. Without interpolation each row
/// takes the maximum over its span of source bins, so narrow peaks survive
/// downsampling. With interpolation each row blends the two nearest bins,
/// offset by half a bin so a bin's value centres in its rows; that is
/// skipped when rows are already coarser than bins at both ends of the
/// mapping.
pub fn distribute(
    column: &[f32],
    height: usize,
    bin_for_row: &[f64],
    min_bin: usize,
    interpolate: bool,
) -> Vec<f32> {
    let mut out = vec![0.0f32; height];
    let bins = column.len();
    if bins == 0 || height == 0 || bin_for_row.len() < height {
        return out;
    }
    let min_bin = min_bin as f64;
    let last = bins as i64 - 1;

    let mut interpolate = interpolate;
    if interpolate && height > 1 {
        let space_at_bottom = bin_for_row[1] - bin_for_row[0];
        let space_at_top = bin_for_row[height - 1] - bin_for_row[height - 2];
        if space_at_bottom > 1.0 && space_at_top > 1.0 {
            interpolate = false;
        }
    }

    for y in 0..height {
        if interpolate {
            let sy = bin_for_row[y] - min_bin - 0.5;
            let syf = sy.floor();
            let main = syf as i64;
            let other = if sy > syf {
                main + 1
            } else if sy < syf {
                main - 1
            } else {
                main
            };
            let prop = 1.0 - (sy - syf).abs();
            let v0 = column[main.clamp(0, last) as usize] as f64;
            let v1 = column[other.clamp(0, last) as usize] as f64;
            out[y] = (prop * v0 + (1.0 - prop) * v1) as f32;
        } else {
            let sy0 = bin_for_row[y] - min_bin;
            let sy1 = if y + 1 < height {
                bin_for_row[y + 1] - min_bin
            } else {
                bins as f64
            };
            let by0 = ((sy0 + 0.0001).floor() as i64).clamp(0, last);
            let by1 = ((sy1 + 0.0001).floor() as i64).clamp(0, bins as i64);
            let mut peak = column[by0 as usize];
            for bin in (by0 + 1)..by1 {
                peak = peak.max(column[bin as usize]);
            }
            out[y] = peak;
        }
    }
    out
}
