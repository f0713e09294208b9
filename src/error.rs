use std::fmt;

/// Errors returned when a source, scale or configuration cannot be built.
///
/// Runtime unavailability (source not ready, empty columns, NaN input) is
/// never reported through this type; those paths fall back to zeroed
/// results and log instead.
#[derive(Debug, Clone, PartialEq)]
pub enum GridError {
    /// Analysis window does not fit in the FFT frame.
    WindowLargerThanFft { window: usize, fft: usize },
    /// Hop between columns must be at least one frame.
    InvalidHop,
    /// FFT frame must be even and at least two samples.
    InvalidFftSize(usize),
    /// Color scale range is empty or inverted (before or after mapping).
    InvalidColorRange { min: f64, max: f64 },
    /// Peak pooling needs at least one source column per output column.
    InvalidColumnsPerPeak,
    /// Configuration could not be parsed or serialized.
    Config(String),
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridError::WindowLargerThanFft { window, fft } => {
                write!(f, "window size {} exceeds FFT size {}", window, fft)
            }
            GridError::InvalidHop => write!(f, "hop size must be non-zero"),
            GridError::InvalidFftSize(n) => write!(f, "invalid FFT size {}", n),
            GridError::InvalidColorRange { min, max } => {
                write!(f, "color scale max {} must exceed min {}", max, min)
            }
            GridError::InvalidColumnsPerPeak => write!(f, "columns per peak must be non-zero"),
            GridError::Config(msg) => write!(f, "config error: {}", msg),
        }
    }
}

impl std::error::Error for GridError {}

impl From<serde_json::Error> for GridError {
    fn from(e: serde_json::Error) -> Self {
        GridError::Config(e.to_string())
    }
}

/// Convenience alias so callers can write `Result<T>` instead of `Result<T, GridError>`.
pub type Result<T> = std::result::Result<T, GridError>;
