//! Engine Configuration

use serde::{Deserialize, Serialize};

use heron_dsp::InterpolationMode;

/// Largest accepted stage capacity
pub const MAX_STAGE_LIMIT: usize = 1024;

/// Largest accepted channel count
pub const MAX_CHANNELS: usize = 64;

/// Overall engine configuration
///
/// Everything here sizes buffers, so a change means reallocation and is
/// never applied on the render path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of biquad stages, shelf slot included
    pub max_stages: usize,

    /// Number of audio channels rendered per block
    pub channels: usize,

    /// Sample rate in Hz used for filter design
    pub sample_rate: f64,

    /// How coefficient changes are applied
    pub interpolation: InterpolationMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_stages: 10,
            channels: 1,
            sample_rate: 44100.0,
            interpolation: InterpolationMode::Interpolated,
        }
    }
}

impl EngineConfig {
    /// Two channels at 48kHz
    pub fn stereo() -> Self {
        Self {
            channels: 2,
            sample_rate: 48000.0,
            ..Default::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_stages == 0 || self.max_stages > MAX_STAGE_LIMIT {
            return Err(format!("Invalid stage capacity: {}", self.max_stages));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(format!("Invalid channel count: {}", self.channels));
        }
        if !(8000.0..=384000.0).contains(&self.sample_rate) {
            return Err(format!("Invalid sample rate: {}", self.sample_rate));
        }
        Ok(())
    }
}
