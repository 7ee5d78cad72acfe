//! Engine Error Types

use thiserror::Error;

/// Errors that can occur in the equalizer engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Engine configuration error: {0}")]
    ConfigError(String),

    #[error("DSP error: {0}")]
    DspError(#[from] heron_dsp::DspError),

    #[error("Epoch rotation broken: slot {slot} returned while still published")]
    RotationBroken { slot: u8 },

    #[error("Control handle is stale: the engine was reallocated")]
    StaleHandle,
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::ConfigError("Invalid channel count: 0".into());
        assert!(err.to_string().contains("Invalid channel count"));

        let err = EngineError::RotationBroken { slot: 2 };
        assert!(err.to_string().contains("slot 2"));

        assert!(EngineError::StaleHandle.to_string().contains("reallocated"));
    }

    #[test]
    fn test_error_from_dsp() {
        let dsp_err = heron_dsp::DspError::InvalidOrder(3);
        let engine_err: EngineError = dsp_err.into();
        assert!(matches!(engine_err, EngineError::DspError(_)));
        assert!(engine_err.to_string().contains('3'));
    }
}
