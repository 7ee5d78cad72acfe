//! DSP Error Types

use thiserror::Error;

/// Errors that can occur while validating parameters or designing filters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DspError {
    #[error("Sample rate must be positive, got {0}")]
    InvalidSampleRate(f64),

    #[error("Frequency {frequency}Hz out of range at sample rate {sample_rate}Hz")]
    InvalidFrequency { frequency: f64, sample_rate: f64 },

    #[error("Bandwidth must be positive, got {0} octaves")]
    InvalidBandwidth(f64),

    #[error("Non-finite value in {0}")]
    NonFinite(&'static str),

    #[error("Invalid Chebyshev order {0} (must be an even number 2-8)")]
    InvalidOrder(usize),

    #[error("Chebyshev ripple {0}% out of range (must be 0-29)")]
    RippleOutOfRange(f64),

    #[error("Cutoff {cutoff}Hz exceeds half the sample rate {sample_rate}Hz")]
    CutoffOutOfRange { cutoff: f64, sample_rate: f64 },

    #[error("Too many stages: {requested} requested, memory for {capacity}")]
    CapacityExceeded { requested: usize, capacity: usize },

    #[error("Buffer size mismatch: expected {expected}, got {got}")]
    BufferSizeMismatch { expected: usize, got: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DspError::InvalidOrder(3);
        assert!(err.to_string().contains('3'));

        let err = DspError::CapacityExceeded {
            requested: 12,
            capacity: 10,
        };
        assert!(err.to_string().contains("12"));
        assert!(err.to_string().contains("10"));

        let err = DspError::CutoffOutOfRange {
            cutoff: 30000.0,
            sample_rate: 44100.0,
        };
        assert!(err.to_string().contains("30000"));
    }
}
