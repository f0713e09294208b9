//! Value to pixel-index mapping.
//!
//! Pixel 0 is the background; values map to 1..=255, which index into the
//! palette after rotation.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::canvas::colors::ColorMapId;
use crate::error::{GridError, Result};

pub const MAX_PIXEL: u8 = 255;

/// Floor of the log mapping, in log10 units.
const LOG_THRESHOLD: f64 = -10.0;
/// Widest mapped span of a log scale, in log10 units.
const LOG_MAX_SPAN: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorScaleType {
    #[default]
    Linear,
    /// Level-meter curve (IEC 268-18 deflection).
    Meter,
    Log,
    /// Values are phases in `[-π, π]`.
    Phase,
    /// Values clamped to `[-1, 1]`.
    PlusMinusOne,
    Absolute,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorScaleParams {
    pub color_map: ColorMapId,
    pub scale_type: ColorScaleType,
    pub min: f64,
    pub max: f64,
    pub threshold: f64,
    pub gain: f64,
    pub multiple: f64,
}

impl Default for ColorScaleParams {
    fn default() -> Self {
        Self {
            color_map: ColorMapId::default(),
            scale_type: ColorScaleType::Linear,
            min: 0.0,
            max: 1.0,
            threshold: 0.0,
            gain: 1.0,
            multiple: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorScale {
    params: ColorScaleParams,
    mapped_min: f64,
    mapped_max: f64,
}

/// `log10(|v|)`, floored at the threshold.
fn log_map(value: f64) -> f64 {
    let v = value.abs();
    if v < 10f64.powf(LOG_THRESHOLD) {
        LOG_THRESHOLD
    } else {
        v.log10()
    }
}

/// Log-map a value range. A range straddling zero maps from the threshold
/// to the larger magnitude.
fn log_map_range(min: f64, max: f64) -> (f64, f64) {
    let (lo, hi) = if min < 0.0 && max > 0.0 {
        (0.0, (-min).max(max))
    } else {
        let (a, b) = (min.abs(), max.abs());
        (a.min(b), a.max(b))
    };
    (log_map(lo), log_map(hi))
}

/// IEC 268-18 meter deflection of `db` as a fraction of full scale.
fn iec_deflection(db: f64) -> f64 {
    let percent = if db < -70.0 {
        0.0
    } else if db < -60.0 {
        (db + 70.0) * 0.25
    } else if db < -50.0 {
        (db + 60.0) * 0.5 + 2.5
    } else if db < -40.0 {
        (db + 50.0) * 0.75 + 7.5
    } else if db < -30.0 {
        (db + 40.0) * 1.5 + 15.0
    } else if db < -20.0 {
        (db + 30.0) * 2.0 + 30.0
    } else {
        (db + 20.0) * 2.5 + 50.0
    };
    (percent / 100.0).clamp(0.0, 1.0)
}

impl ColorScale {
    pub fn new(params: ColorScaleParams) -> Result<Self> {
        let invalid = |min: f64, max: f64| GridError::InvalidColorRange { min, max };
        if !(params.max > params.min) {
            return Err(invalid(params.min, params.max));
        }

        let (mut mapped_min, mut mapped_max) = (params.min, params.max);
        match params.scale_type {
            ColorScaleType::Linear | ColorScaleType::Meter => {
                mapped_min = mapped_min.max(params.threshold);
            }
            ColorScaleType::Log => {
                (mapped_min, mapped_max) = log_map_range(mapped_min, mapped_max);
                if mapped_min < mapped_max - LOG_MAX_SPAN {
                    mapped_min = mapped_max - LOG_MAX_SPAN;
                }
            }
            ColorScaleType::PlusMinusOne => {
                mapped_min = -1.0;
                mapped_max = 1.0;
            }
            ColorScaleType::Absolute => {
                mapped_min = mapped_min.abs();
                mapped_max = mapped_max.abs();
                if mapped_min > mapped_max {
                    std::mem::swap(&mut mapped_min, &mut mapped_max);
                }
            }
            ColorScaleType::Phase => {}
        }

        if !(mapped_max > mapped_min) {
            return Err(invalid(mapped_min, mapped_max));
        }
        Ok(Self {
            params,
            mapped_min,
            mapped_max,
        })
    }

    pub fn params(&self) -> &ColorScaleParams {
        &self.params
    }

    pub fn scale_type(&self) -> ColorScaleType {
        self.params.scale_type
    }

    pub fn mapped_range(&self) -> (f64, f64) {
        (self.mapped_min, self.mapped_max)
    }

    /// Pixel index for `value`: 0 below threshold, else 1..=255.
    pub fn pixel(&self, value: f64) -> u8 {
        let max = MAX_PIXEL as f64;
        if self.params.scale_type == ColorScaleType::Phase {
            let half = (max - 1.0) / 2.0;
            let pixel = 1.0 + ((value * half) / PI + half).floor();
            return pixel.clamp(1.0, max) as u8;
        }

        let value = value * self.params.gain;
        let level = match self.params.scale_type {
            ColorScaleType::PlusMinusOne | ColorScaleType::Absolute => value.abs(),
            _ => value,
        };
        if level < self.params.threshold {
            return 0;
        }

        let mut mapped = match self.params.scale_type {
            ColorScaleType::Log => log_map(value),
            ColorScaleType::PlusMinusOne => value.clamp(-1.0, 1.0),
            ColorScaleType::Absolute => value.abs(),
            _ => value,
        };
        mapped *= self.params.multiple;
        mapped = mapped.clamp(self.mapped_min, self.mapped_max);

        let proportion = (mapped - self.mapped_min) / (self.mapped_max - self.mapped_min);
        let span = if self.params.scale_type == ColorScaleType::Meter {
            iec_deflection(20.0 * proportion.max(1e-12).log10()) * (max - 1.0)
        } else {
            proportion * (max - 1.0)
        };
        (1.0 + span.floor()).clamp(1.0, max) as u8
    }

    /// Background for pixel 0, otherwise the palette color of the rotated index.
    pub fn color_for_pixel(&self, pixel: u8, rotation: u8) -> [u8; 3] {
        let map = self.params.color_map;
        if pixel == 0 {
            return if map.has_light_background() {
                [255, 255, 255]
            } else {
                [0, 0, 0]
            };
        }
        let steps = MAX_PIXEL as u32;
        let index = (pixel as u32 - 1 + rotation as u32) % steps;
        map.map(index as f64 / (steps - 1) as f64)
    }

    pub fn color(&self, value: f64, rotation: u8) -> [u8; 3] {
        self.color_for_pixel(self.pixel(value), rotation)
    }
}

impl Default for ColorScale {
    /// Linear over `[0, 1]` on the default palette.
    fn default() -> Self {
        Self {
            params: ColorScaleParams::default(),
            mapped_min: 0.0,
            mapped_max: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scale(scale_type: ColorScaleType, min: f64, max: f64) -> ColorScale {
        ColorScale::new(ColorScaleParams {
            scale_type,
            min,
            max,
            ..ColorScaleParams::default()
        })
        .unwrap()
    }

    #[test]
    fn test_linear_endpoints_and_monotonicity() {
        let s = scale(ColorScaleType::Linear, 0.0, 2.0);
        assert_eq!(s.pixel(0.0), 1);
        assert_eq!(s.pixel(2.0), 255);
        assert_eq!(s.pixel(1.0), 128);
        let mut last = 0;
        for i in 0..=400 {
            let p = s.pixel(i as f64 / 200.0);
            assert!(p >= last);
            last = p;
        }
    }

    #[test]
    fn test_threshold_gives_background() {
        let s = ColorScale::new(ColorScaleParams {
            threshold: 0.25,
            ..ColorScaleParams::default()
        })
        .unwrap();
        assert_eq!(s.pixel(0.2), 0);
        assert_eq!(s.pixel(0.25), 1);
        assert_eq!(s.mapped_range(), (0.25, 1.0));
    }

    #[test]
    fn test_log_range_from_zero() {
        let s = scale(ColorScaleType::Log, 0.0, 1.0);
        assert_eq!(s.mapped_range(), (-10.0, 0.0));
        let big = scale(ColorScaleType::Log, 0.0, 1000.0);
        let (lo, hi) = big.mapped_range();
        assert!((lo + 7.0).abs() < 1e-9 && (hi - 3.0).abs() < 1e-9);
        assert_eq!(s.pixel(1.0), 255);
        assert!(s.pixel(1e-5) < s.pixel(1e-3));
    }

    #[test]
    fn test_phase_spans_full_palette() {
        let s = scale(ColorScaleType::Phase, -PI, PI);
        assert_eq!(s.pixel(-3.2), 1);
        assert_eq!(s.pixel(0.0), 128);
        assert_eq!(s.pixel(3.2), 255);
        assert!(s.pixel(-PI / 2.0) < s.pixel(PI / 2.0));
    }

    #[test]
    fn test_plus_minus_one_and_absolute() {
        let pm = scale(ColorScaleType::PlusMinusOne, 0.0, 5.0);
        assert_eq!(pm.mapped_range(), (-1.0, 1.0));
        assert_eq!(pm.pixel(-3.0), 1);
        assert_eq!(pm.pixel(3.0), 255);

        let abs = scale(ColorScaleType::Absolute, -4.0, 2.0);
        assert_eq!(abs.mapped_range(), (2.0, 4.0));
    }

    #[test]
    fn test_meter_curve_is_monotonic_and_full_scale() {
        let s = scale(ColorScaleType::Meter, 0.0, 1.0);
        assert_eq!(s.pixel(1.0), 255);
        assert_eq!(s.pixel(0.0), 1);
        assert!(s.pixel(0.1) < s.pixel(0.5));
    }

    #[test]
    fn test_invalid_ranges_are_rejected() {
        let bad = |min, max, scale_type| {
            ColorScale::new(ColorScaleParams {
                min,
                max,
                scale_type,
                ..ColorScaleParams::default()
            })
        };
        assert!(matches!(
            bad(1.0, 1.0, ColorScaleType::Linear),
            Err(GridError::InvalidColorRange { .. })
        ));
        assert!(bad(2.0, 1.0, ColorScaleType::Linear).is_err());
        // both ends under the log floor
        assert!(bad(0.0, 1e-12, ColorScaleType::Log).is_err());
        // threshold above max
        assert!(ColorScale::new(ColorScaleParams {
            threshold: 3.0,
            ..ColorScaleParams::default()
        })
        .is_err());
    }

    #[test]
    fn test_background_and_rotation() {
        let dark = scale(ColorScaleType::Linear, 0.0, 1.0);
        assert_eq!(dark.color_for_pixel(0, 40), [0, 0, 0]);
        let light = ColorScale::new(ColorScaleParams {
            color_map: ColorMapId::BlackOnWhite,
            ..ColorScaleParams::default()
        })
        .unwrap();
        assert_eq!(light.color_for_pixel(0, 0), [255, 255, 255]);

        // rotation wraps within 1..=255
        assert_eq!(dark.color_for_pixel(255, 1), dark.color_for_pixel(1, 0));
        assert_eq!(dark.color_for_pixel(10, 5), dark.color_for_pixel(15, 0));
    }
}
