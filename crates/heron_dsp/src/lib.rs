//! Heron DSP - Digital Signal Processing Module
//!
//! This crate provides the signal processing half of the Heron equalizer:
//! - Biquad stage and fixed-capacity coefficient-set types
//! - Filter design: three-band shelf, parametric peak, Chebyshev cascade
//! - Multichannel cascade renderer with per-block coefficient interpolation
//! - Zero-allocation processing path
//!
//! # Architecture
//!
//! Design functions run on the control path and may allocate. The
//! [`Cascade`] renderer runs on the audio thread and never allocates after
//! construction; it is fed one immutable [`CoefficientSet`] per block.

mod cascade;
mod coefficients;
mod design;
mod error;

pub use cascade::{
    AtomicInterpolationMode, Cascade, History, InterpolationMode, RenderState, FLUSH_THRESHOLD,
    RAMP_GROUP,
};
pub use coefficients::{CoefficientSet, Stage, COEFFS_PER_STAGE};
pub use design::{
    compute_chebyshev_cascade, compute_peak, compute_shelf, db_to_linear, ChebyshevParams,
    FilterKind, PeakParams, ShelfParams, EPSILON, MAX_CHEBYSHEV_ORDER, MAX_RIPPLE_PERCENT,
};
pub use error::DspError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        // Verify all public types are accessible
        let _set = CoefficientSet::with_capacity(10);
        let _cascade = Cascade::new(10, 2);
        let _mode = InterpolationMode::default();
    }
}
