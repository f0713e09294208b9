pub mod column_ops;
pub mod fft;
pub mod peak_cache;
pub mod percentile;
pub mod spectral_source;
pub mod window;
