//! Biquad Stages and Coefficient Sets
//!
//! A stage is one second-order section in direct form I:
//!
//! ```text
//! y[n] = a0*x[n] + a1*x[n-1] + a2*x[n-2] - b1*y[n-1] - b2*y[n-2]
//! ```
//!
//! A [`CoefficientSet`] is a fixed-capacity cascade of stages. Its storage is
//! allocated once; every later update copies into the same memory.

use biquad::Coefficients;

use crate::error::DspError;

/// Number of coefficients stored per stage
pub const COEFFS_PER_STAGE: usize = 5;

/// One second-order section
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stage {
    pub a0: f64,
    pub a1: f64,
    pub a2: f64,
    pub b1: f64,
    pub b2: f64,
}

impl Stage {
    /// Passthrough stage: y[n] = x[n]
    pub const IDENTITY: Stage = Stage {
        a0: 1.0,
        a1: 0.0,
        a2: 0.0,
        b1: 0.0,
        b2: 0.0,
    };

    pub const fn new(a0: f64, a1: f64, a2: f64, b1: f64, b2: f64) -> Self {
        Self { a0, a1, a2, b1, b2 }
    }

    pub const fn from_array(c: [f64; COEFFS_PER_STAGE]) -> Self {
        Self::new(c[0], c[1], c[2], c[3], c[4])
    }

    pub const fn to_array(self) -> [f64; COEFFS_PER_STAGE] {
        [self.a0, self.a1, self.a2, self.b1, self.b2]
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|c| c.is_finite())
    }

    /// Both poles strictly inside the unit circle (stability triangle test)
    pub fn is_stable(&self) -> bool {
        self.b2.abs() < 1.0 && self.b1.abs() < 1.0 + self.b2
    }

    /// Gain at 0 Hz
    pub fn dc_gain(&self) -> f64 {
        (self.a0 + self.a1 + self.a2) / (1.0 + self.b1 + self.b2)
    }

    /// Gain at half the sample rate
    pub fn nyquist_gain(&self) -> f64 {
        (self.a0 - self.a1 + self.a2) / (1.0 - self.b1 + self.b2)
    }

    /// Linear blend between two stages, `t` in [0, 1]
    #[inline]
    pub fn lerp(from: &Stage, to: &Stage, t: f64) -> Stage {
        Stage {
            a0: from.a0 + (to.a0 - from.a0) * t,
            a1: from.a1 + (to.a1 - from.a1) * t,
            a2: from.a2 + (to.a2 - from.a2) * t,
            b1: from.b1 + (to.b1 - from.b1) * t,
            b2: from.b2 + (to.b2 - from.b2) * t,
        }
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// The biquad crate names feedforward terms b* and feedback terms a*,
// the opposite of this crate.
impl From<Stage> for Coefficients<f64> {
    fn from(stage: Stage) -> Self {
        Coefficients {
            a1: stage.b1,
            a2: stage.b2,
            b0: stage.a0,
            b1: stage.a1,
            b2: stage.a2,
        }
    }
}

impl From<Coefficients<f64>> for Stage {
    fn from(c: Coefficients<f64>) -> Self {
        Stage::new(c.b0, c.b1, c.b2, c.a1, c.a2)
    }
}

/// Fixed-capacity cascade of biquad stages
///
/// Stage 0 is the shelf slot in parametric mode. Slots past `len()` always
/// hold identity coefficients, so a shorter cascade can be interpolated
/// against a longer one without special cases.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientSet {
    stages: Vec<Stage>,
    len: usize,
}

impl CoefficientSet {
    /// Allocate a passthrough set with room for `capacity` stages
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            stages: vec![Stage::IDENTITY; capacity],
            len: 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.stages.len()
    }

    /// Number of active stages (always at least 1)
    pub fn len(&self) -> usize {
        self.len
    }

    /// A set is never empty; stage 0 always exists
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Active stages in cascade order
    pub fn stages(&self) -> &[Stage] {
        &self.stages[..self.len]
    }

    /// Stage at `index`, identity for inactive slots
    #[inline]
    pub fn stage(&self, index: usize) -> Stage {
        if index < self.len {
            self.stages[index]
        } else {
            Stage::IDENTITY
        }
    }

    /// Reset to a single identity stage
    pub fn clear(&mut self) {
        self.stages.fill(Stage::IDENTITY);
        self.len = 1;
    }

    /// Replace the active cascade
    ///
    /// Rejects the whole update if it does not fit; `self` is untouched on error.
    /// An empty slice yields a single identity stage.
    pub fn set_stages(&mut self, stages: &[Stage]) -> Result<(), DspError> {
        if stages.len() > self.capacity() {
            return Err(DspError::CapacityExceeded {
                requested: stages.len(),
                capacity: self.capacity(),
            });
        }
        self.stages[..stages.len()].copy_from_slice(stages);
        self.stages[stages.len()..].fill(Stage::IDENTITY);
        self.len = stages.len().max(1);
        Ok(())
    }

    /// Write a single slot, growing the active length to cover it
    pub fn set_stage(&mut self, index: usize, stage: Stage) -> Result<(), DspError> {
        if index >= self.capacity() {
            return Err(DspError::CapacityExceeded {
                requested: index + 1,
                capacity: self.capacity(),
            });
        }
        self.stages[index] = stage;
        self.len = self.len.max(index + 1);
        Ok(())
    }

    /// Copy another set of the same capacity without allocating
    pub fn copy_from(&mut self, other: &CoefficientSet) {
        debug_assert_eq!(self.capacity(), other.capacity(), "Capacity mismatch");
        let n = self.capacity().min(other.capacity());
        self.stages[..n].copy_from_slice(&other.stages[..n]);
        self.stages[n..].fill(Stage::IDENTITY);
        self.len = other.len.min(self.capacity());
    }

    /// Flatten active stages as `[a0, a1, a2, b1, b2]` rows
    pub fn to_rows(&self) -> Vec<[f64; COEFFS_PER_STAGE]> {
        self.stages().iter().map(|s| s.to_array()).collect()
    }

    /// Product of the `a0` terms, i.e. the first output sample for a unit impulse
    pub fn impulse_head(&self) -> f64 {
        self.stages().iter().map(|s| s.a0).product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biquad::{Biquad, DirectForm1};

    #[test]
    fn test_identity_is_passthrough() {
        assert_eq!(Stage::IDENTITY.dc_gain(), 1.0);
        assert_eq!(Stage::IDENTITY.nyquist_gain(), 1.0);
        assert!(Stage::IDENTITY.is_stable());
    }

    #[test]
    fn test_stability_triangle() {
        // Poles at 0.5 +/- 0.5j: |p| ~ 0.707
        assert!(Stage::new(1.0, 0.0, 0.0, -1.0, 0.5).is_stable());
        // Pole on the unit circle
        assert!(!Stage::new(1.0, 0.0, 0.0, 0.0, 1.0).is_stable());
        // Real pole at z = 1.2
        assert!(!Stage::new(1.0, 0.0, 0.0, -1.2, 0.0).is_stable());
    }

    #[test]
    fn test_lerp_endpoints() {
        let a = Stage::new(1.0, 2.0, 3.0, 0.1, 0.2);
        let b = Stage::new(2.0, 0.0, -1.0, -0.1, 0.4);
        assert_eq!(Stage::lerp(&a, &b, 0.0), a);
        assert_eq!(Stage::lerp(&a, &b, 1.0), b);
        let mid = Stage::lerp(&a, &b, 0.5);
        assert!((mid.a0 - 1.5).abs() < 1e-15);
        assert!((mid.b2 - 0.3).abs() < 1e-15);
    }

    #[test]
    fn test_new_set_is_single_identity() {
        let set = CoefficientSet::with_capacity(10);
        assert_eq!(set.capacity(), 10);
        assert_eq!(set.len(), 1);
        assert_eq!(set.stages(), &[Stage::IDENTITY]);
    }

    #[test]
    fn test_set_stages_rejects_overflow_without_mutation() {
        let mut set = CoefficientSet::with_capacity(2);
        let s = Stage::new(0.5, 0.0, 0.0, 0.0, 0.0);
        set.set_stages(&[s, s]).unwrap();

        let err = set.set_stages(&[Stage::IDENTITY; 3]).unwrap_err();
        assert_eq!(
            err,
            DspError::CapacityExceeded {
                requested: 3,
                capacity: 2
            }
        );
        assert_eq!(set.stages(), &[s, s]);
    }

    #[test]
    fn test_shrinking_restores_identity_tail() {
        let mut set = CoefficientSet::with_capacity(4);
        let s = Stage::new(0.5, 0.1, 0.0, 0.2, 0.0);
        set.set_stages(&[s, s, s]).unwrap();
        set.set_stages(&[s]).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.stage(2), Stage::IDENTITY);
    }

    #[test]
    fn test_empty_update_is_passthrough() {
        let mut set = CoefficientSet::with_capacity(4);
        set.set_stages(&[]).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.stage(0), Stage::IDENTITY);
    }

    #[test]
    fn test_copy_from() {
        let mut a = CoefficientSet::with_capacity(3);
        let mut b = CoefficientSet::with_capacity(3);
        b.set_stages(&[Stage::new(2.0, 0.0, 0.0, 0.0, 0.0); 2]).unwrap();
        a.copy_from(&b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_impulse_head() {
        let mut set = CoefficientSet::with_capacity(3);
        set.set_stages(&[
            Stage::new(2.0, 0.0, 0.0, 0.0, 0.0),
            Stage::new(0.25, 1.0, 0.0, 0.0, 0.0),
        ])
        .unwrap();
        assert_eq!(set.impulse_head(), 0.5);
    }

    #[test]
    fn test_biquad_crate_interop() {
        // y[n] = 0.5 x[n] + 0.5 y[n-1]
        let stage = Stage::new(0.5, 0.0, 0.0, -0.5, 0.0);
        let mut reference = DirectForm1::<f64>::new(stage.into());

        assert_eq!(reference.run(1.0), 0.5);
        assert_eq!(reference.run(0.0), 0.25);

        let back: Stage = Coefficients::<f64>::from(stage).into();
        assert_eq!(back, stage);
    }
}
