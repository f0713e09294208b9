//! Host-facing settings for spectral analysis and grid rendering.
//!
//! Both structs deserialize with every field optional, so a host can store
//! only what the user changed.

use serde::{Deserialize, Serialize};

use crate::canvas::color_scale::ColorScaleType;
use crate::canvas::colors::ColorMapId;
use crate::dsp::column_ops::ColumnNormalization;
use crate::dsp::window::WindowKind;
use crate::error::Result;

/// Which bins of a column are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BinDisplay {
    #[default]
    AllBins,
    /// Only local peaks, everything else background.
    PeakBins,
    /// Peaks placed at their phase-refined frequency (spectral sources only).
    PeakFrequencies,
}

/// Vertical spacing of bins on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BinScale {
    #[default]
    Linear,
    Log,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderParams {
    pub color_map: ColorMapId,
    pub scale_type: ColorScaleType,
    pub normalization: ColumnNormalization,
    /// Color range follows the magnitudes seen in the visible area.
    pub normalize_visible_area: bool,
    pub bin_display: BinDisplay,
    pub bin_scale: BinScale,
    pub always_opaque: bool,
    pub interpolate: bool,
    pub invert_vertical: bool,
    /// Display the frame-to-frame difference of each column.
    pub show_derivative: bool,
    pub gain: f64,
    pub threshold: f64,
    pub multiple: f64,
    /// Column gain applied before normalization (`2 / fft_size` for spectra).
    pub scale_factor: f64,
    pub color_rotation: u8,
    pub min_bin: Option<usize>,
    pub max_bin: Option<usize>,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            color_map: ColorMapId::default(),
            scale_type: ColorScaleType::default(),
            normalization: ColumnNormalization::None,
            normalize_visible_area: false,
            bin_display: BinDisplay::AllBins,
            bin_scale: BinScale::Linear,
            always_opaque: false,
            interpolate: false,
            invert_vertical: false,
            show_derivative: false,
            gain: 1.0,
            threshold: 0.0,
            multiple: 1.0,
            scale_factor: 1.0,
            color_rotation: 0,
            min_bin: None,
            max_bin: None,
        }
    }
}

impl RenderParams {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    pub window: WindowKind,
    pub window_size: usize,
    pub hop: usize,
    pub fft_size: usize,
    /// `None` mixes all channels down to their mean.
    pub channel: Option<usize>,
    /// Truncate columns at the bin containing this frequency (Hz).
    pub max_frequency: Option<f64>,
    /// Complex columns kept in the recent-column ring.
    pub cache_size: usize,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            window: WindowKind::Hann,
            window_size: 1024,
            hop: 256,
            fft_size: 1024,
            channel: None,
            max_frequency: None,
            cache_size: 3,
        }
    }
}

impl SpectralConfig {
    /// Window and FFT of `size` with 75% overlap.
    pub fn with_size(size: usize) -> Self {
        Self {
            window_size: size,
            fft_size: size,
            hop: (size / 4).max(1),
            ..Self::default()
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
