//! Incremental time-frequency rendering.
//!
//! `dsp` turns audio into dense grids of column values (on-demand spectra,
//! peak pooling). `canvas` turns grids into pixels: value-to-color scales,
//! scrollable raster and magnitude-range caches, and a renderer that fills
//! them within a time budget.
//!
//! All types are single-threaded. Sources and caches mutate internal state
//! behind `&self` and must not be shared across threads.

pub mod canvas;
pub mod config;
pub mod dsp;
pub mod error;
pub mod types;

pub use error::{GridError, Result};
