//! Cascade Render Engine
//!
//! Runs a [`CoefficientSet`] over planar audio blocks, one history record per
//! stage per channel. Loop order is stage-major, channel-minor, so history is
//! indexed `[stage * channels + channel]`.
//!
//! # Modes
//!
//! - **Steady**: plain direct-form-I recursion with the block's coefficients.
//! - **Interpolated**: when the coefficients changed since the last block, each
//!   coefficient ramps linearly from the previous set to the new one. The ramp
//!   advances once per group of [`RAMP_GROUP`] samples and the final group
//!   always runs on the exact new values.
//!
//! # Real-time Safety
//! No allocations after construction. O(stages * channels * block_len).

use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::coefficients::{CoefficientSet, Stage};
use crate::error::DspError;

/// Samples per interpolation step
pub const RAMP_GROUP: usize = 4;

/// History values smaller than this are stored as exact zero
pub const FLUSH_THRESHOLD: f64 = 1e-20;

/// How coefficient changes are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InterpolationMode {
    /// Switch to new coefficients at the block boundary
    Steady,
    /// Ramp to new coefficients across one block
    #[default]
    Interpolated,
}

impl InterpolationMode {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            InterpolationMode::Steady => 0,
            InterpolationMode::Interpolated => 1,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => InterpolationMode::Steady,
            _ => InterpolationMode::Interpolated,
        }
    }
}

/// Lock-free storage helper for an [`InterpolationMode`]
#[derive(Debug)]
pub struct AtomicInterpolationMode(AtomicU8);

impl AtomicInterpolationMode {
    pub fn new(mode: InterpolationMode) -> Self {
        Self(AtomicU8::new(mode.to_u8()))
    }

    pub fn load(&self) -> InterpolationMode {
        InterpolationMode::from_u8(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, mode: InterpolationMode) {
        self.0.store(mode.to_u8(), Ordering::Relaxed);
    }
}

#[inline]
fn flush_to_zero(v: f64) -> f64 {
    if v.abs() < FLUSH_THRESHOLD {
        0.0
    } else {
        v
    }
}

/// Delay-line state of one stage on one channel
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct History {
    pub xm1: f64,
    pub xm2: f64,
    pub ym1: f64,
    pub ym2: f64,
}

impl History {
    fn flushed(self) -> Self {
        Self {
            xm1: flush_to_zero(self.xm1),
            xm2: flush_to_zero(self.xm2),
            ym1: flush_to_zero(self.ym1),
            ym2: flush_to_zero(self.ym2),
        }
    }

    #[inline(always)]
    fn tick(&mut self, s: &Stage, xn: f64) -> f64 {
        let yn = s.a0 * xn + s.a1 * self.xm1 + s.a2 * self.xm2 - s.b1 * self.ym1 - s.b2 * self.ym2;
        self.xm2 = self.xm1;
        self.xm1 = xn;
        self.ym2 = self.ym1;
        self.ym1 = yn;
        yn
    }
}

/// Per-stage, per-channel history owned by the render side
#[derive(Debug, Clone)]
pub struct RenderState {
    history: Vec<History>,
    channels: usize,
    max_stages: usize,
}

impl RenderState {
    pub fn new(max_stages: usize, channels: usize) -> Self {
        let max_stages = max_stages.max(1);
        let channels = channels.max(1);
        Self {
            history: vec![History::default(); max_stages * channels],
            channels,
            max_stages,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn max_stages(&self) -> usize {
        self.max_stages
    }

    /// History of `stage` on `channel`
    pub fn history(&self, stage: usize, channel: usize) -> History {
        self.history[stage * self.channels + channel]
    }

    /// Zero every delay line
    pub fn clear(&mut self) {
        self.history.fill(History::default());
    }

    pub fn is_clear(&self) -> bool {
        self.history.iter().all(|h| *h == History::default())
    }
}

/// Multichannel biquad cascade with optional coefficient interpolation
pub struct Cascade {
    state: RenderState,
    // Coefficients the last block ended on; the ramp starts here
    previous: CoefficientSet,
}

impl Cascade {
    pub fn new(max_stages: usize, channels: usize) -> Self {
        let state = RenderState::new(max_stages, channels);
        let previous = CoefficientSet::with_capacity(state.max_stages());
        Self { state, previous }
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn channels(&self) -> usize {
        self.state.channels()
    }

    pub fn max_stages(&self) -> usize {
        self.state.max_stages()
    }

    /// Coefficients used at the end of the last block
    pub fn previous(&self) -> &CoefficientSet {
        &self.previous
    }

    /// Zero all history (the interpolation start point is kept)
    pub fn clear(&mut self) {
        self.state.clear();
    }

    /// Zero all history and restart interpolation from a passthrough
    pub fn reset(&mut self) {
        self.state.clear();
        self.previous.clear();
    }

    /// Check planar buffers against the channel count without touching state
    pub fn check_block(&self, channels: &[&mut [f64]]) -> Result<(), DspError> {
        if channels.len() != self.state.channels {
            return Err(DspError::BufferSizeMismatch {
                expected: self.state.channels,
                got: channels.len(),
            });
        }
        let block_len = channels.first().map_or(0, |c| c.len());
        if let Some(bad) = channels.iter().find(|c| c.len() != block_len) {
            return Err(DspError::BufferSizeMismatch {
                expected: block_len,
                got: bad.len(),
            });
        }
        Ok(())
    }

    /// Like [`Cascade::check_block`], also pairing every input with its output
    pub fn check_block_from(&self, inputs: &[&[f64]], outputs: &[&mut [f64]]) -> Result<(), DspError> {
        if inputs.len() != outputs.len() {
            return Err(DspError::BufferSizeMismatch {
                expected: outputs.len(),
                got: inputs.len(),
            });
        }
        if let Some((input, output)) = inputs.iter().zip(outputs).find(|(i, o)| i.len() != o.len()) {
            return Err(DspError::BufferSizeMismatch {
                expected: output.len(),
                got: input.len(),
            });
        }
        self.check_block(outputs)
    }

    /// Copy `inputs` into `outputs`, then filter `outputs` in place
    pub fn process_from(
        &mut self,
        inputs: &[&[f64]],
        outputs: &mut [&mut [f64]],
        coeffs: &CoefficientSet,
        changed: bool,
        mode: InterpolationMode,
    ) -> Result<(), DspError> {
        self.check_block_from(inputs, outputs)?;
        for (input, output) in inputs.iter().zip(outputs.iter_mut()) {
            output.copy_from_slice(input);
        }
        self.process(outputs, coeffs, changed, mode)
    }

    /// Filter planar channel buffers in place
    ///
    /// `changed` tells whether `coeffs` differ from the previous block's set.
    /// Interpolation only happens when both `changed` and `mode` ask for it.
    pub fn process(
        &mut self,
        channels: &mut [&mut [f64]],
        coeffs: &CoefficientSet,
        changed: bool,
        mode: InterpolationMode,
    ) -> Result<(), DspError> {
        self.check_shape(channels, coeffs)?;

        match (changed, mode) {
            (true, InterpolationMode::Interpolated) => self.run_interpolated(channels, coeffs),
            _ => self.run_steady(channels, coeffs),
        }

        if changed {
            self.previous.copy_from(coeffs);
        }
        Ok(())
    }

    fn check_shape(&self, channels: &[&mut [f64]], coeffs: &CoefficientSet) -> Result<(), DspError> {
        self.check_block(channels)?;
        if coeffs.len() > self.state.max_stages {
            return Err(DspError::CapacityExceeded {
                requested: coeffs.len(),
                capacity: self.state.max_stages,
            });
        }
        Ok(())
    }

    fn run_steady(&mut self, channels: &mut [&mut [f64]], coeffs: &CoefficientSet) {
        let n_ch = self.state.channels;
        for (s, stage) in coeffs.stages().iter().enumerate() {
            for (c, buf) in channels.iter_mut().enumerate() {
                let h = &mut self.state.history[s * n_ch + c];
                *h = filter_steady(stage, *h, buf);
            }
        }
    }

    fn run_interpolated(&mut self, channels: &mut [&mut [f64]], coeffs: &CoefficientSet) {
        let n_ch = self.state.channels;
        let block_len = channels.first().map_or(0, |c| c.len());
        let groups = (block_len + RAMP_GROUP - 1) / RAMP_GROUP;
        let stage_count = coeffs.len().max(self.previous.len());

        for s in 0..stage_count {
            let from = self.previous.stage(s);
            let to = coeffs.stage(s);
            for (c, buf) in channels.iter_mut().enumerate() {
                let h = &mut self.state.history[s * n_ch + c];
                *h = filter_ramped(&from, &to, groups, *h, buf);
            }
        }
    }
}

fn filter_steady(stage: &Stage, mut h: History, buf: &mut [f64]) -> History {
    let s = *stage;
    for sample in buf.iter_mut() {
        *sample = h.tick(&s, *sample);
    }
    h.flushed()
}

fn filter_ramped(from: &Stage, to: &Stage, groups: usize, mut h: History, buf: &mut [f64]) -> History {
    let step = 1.0 / groups.max(1) as f64;
    for (g, group) in buf.chunks_mut(RAMP_GROUP).enumerate() {
        let s = if g + 1 >= groups {
            *to
        } else {
            Stage::lerp(from, to, (g + 1) as f64 * step)
        };

        match group {
            [x0, x1, x2, x3] => {
                *x0 = h.tick(&s, *x0);
                *x1 = h.tick(&s, *x1);
                *x2 = h.tick(&s, *x2);
                *x3 = h.tick(&s, *x3);
            }
            tail => {
                for sample in tail.iter_mut() {
                    *sample = h.tick(&s, *sample);
                }
            }
        }
    }
    h.flushed()
}
