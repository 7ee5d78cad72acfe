//! Filter Design
//!
//! Pure functions that turn human-meaningful EQ parameters into biquad stages.
//! Everything here runs in `f64` on the control path; nothing is real-time
//! constrained.
//!
//! - Shelf: low and high first-order shelving sections combined into one
//!   biquad through the bilinear transform.
//! - Peak: parametric EQ matching three control points (DC gain, center gain,
//!   band-edge gain), with the analog prototype matched at Nyquist.
//! - Chebyshev: classical pole placement on an ellipse, bilinear transform per
//!   conjugate pair, then a lowpass-to-lowpass or lowpass-to-highpass warp.

use std::f64::consts::{LN_2, PI};

use serde::{Deserialize, Serialize};

use crate::coefficients::Stage;
use crate::error::DspError;

/// Replaces zero frequencies and breaks gain ties
pub const EPSILON: f64 = 0.000_001;

/// Maximum even order of a Chebyshev cascade
pub const MAX_CHEBYSHEV_ORDER: usize = 8;

/// Maximum passband ripple in percent
pub const MAX_RIPPLE_PERCENT: f64 = 29.0;

/// Convert dB gain to linear amplitude
/// Formula: amplitude = 10^(dB/20)
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

fn check_frequency(frequency: f64, sample_rate: f64) -> Result<(), DspError> {
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(DspError::InvalidSampleRate(sample_rate));
    }
    if !(frequency.is_finite() && frequency > 0.0 && frequency < sample_rate * 0.5) {
        return Err(DspError::InvalidFrequency {
            frequency,
            sample_rate,
        });
    }
    Ok(())
}

/// Three-band shelving EQ parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShelfParams {
    pub low_gain_db: f64,
    pub mid_gain_db: f64,
    pub high_gain_db: f64,
    pub low_freq_hz: f64,
    pub high_freq_hz: f64,
}

impl ShelfParams {
    /// Build from `[low, mid, high]` gains and `[low, high]` transition frequencies
    ///
    /// A zero frequency becomes [`EPSILON`] so the bilinear transform stays finite.
    pub fn new(gains_db: [f64; 3], freqs_hz: [f64; 2]) -> Self {
        let nonzero = |f: f64| if f == 0.0 { EPSILON } else { f };
        Self {
            low_gain_db: gains_db[0],
            mid_gain_db: gains_db[1],
            high_gain_db: gains_db[2],
            low_freq_hz: nonzero(freqs_hz[0]),
            high_freq_hz: nonzero(freqs_hz[1]),
        }
    }

    /// All-zero gains: the shelf is a flat passthrough
    pub fn flat(low_freq_hz: f64, high_freq_hz: f64) -> Self {
        Self::new([0.0; 3], [low_freq_hz, high_freq_hz])
    }

    /// Re-apply the coercions of [`ShelfParams::new`] (idempotent)
    pub fn normalized(&self) -> Self {
        Self::new(
            [self.low_gain_db, self.mid_gain_db, self.high_gain_db],
            [self.low_freq_hz, self.high_freq_hz],
        )
    }

    pub fn validate(&self, sample_rate: f64) -> Result<(), DspError> {
        let gains = [self.low_gain_db, self.mid_gain_db, self.high_gain_db];
        if gains.iter().any(|g| !g.is_finite()) {
            return Err(DspError::NonFinite("shelf gain"));
        }
        check_frequency(self.low_freq_hz, sample_rate)?;
        check_frequency(self.high_freq_hz, sample_rate)
    }
}

/// One parametric (peaking) band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakParams {
    pub center_hz: f64,
    pub bandwidth_octaves: f64,
    pub dc_gain_db: f64,
    pub center_gain_db: f64,
    pub edge_gain_db: f64,
}

impl PeakParams {
    /// Build a band, normalizing the gain control points
    ///
    /// - a zero center frequency becomes [`EPSILON`]
    /// - DC gain equal to center gain is split by `±EPSILON` and the edge gain
    ///   keeps its requested value (otherwise the solution has infinite Q)
    /// - an edge gain not strictly between DC and center gain is moved to
    ///   their midpoint
    pub fn new(
        center_hz: f64,
        bandwidth_octaves: f64,
        dc_gain_db: f64,
        center_gain_db: f64,
        edge_gain_db: f64,
    ) -> Self {
        let center_hz = if center_hz == 0.0 { EPSILON } else { center_hz };
        let (mut g0, mut g, mut gb) = (dc_gain_db, center_gain_db, edge_gain_db);

        if g0 == g {
            gb = g0;
            g = g0 + EPSILON;
            g0 -= EPSILON;
        } else if !((g0 < gb && gb < g) || (g0 > gb && gb > g)) {
            gb = (g0 + g) * 0.5;
        }

        Self {
            center_hz,
            bandwidth_octaves,
            dc_gain_db: g0,
            center_gain_db: g,
            edge_gain_db: gb,
        }
    }

    /// Re-apply the coercions of [`PeakParams::new`] (idempotent)
    pub fn normalized(&self) -> Self {
        Self::new(
            self.center_hz,
            self.bandwidth_octaves,
            self.dc_gain_db,
            self.center_gain_db,
            self.edge_gain_db,
        )
    }

    pub fn validate(&self, sample_rate: f64) -> Result<(), DspError> {
        let gains = [self.dc_gain_db, self.center_gain_db, self.edge_gain_db];
        if gains.iter().any(|g| !g.is_finite()) {
            return Err(DspError::NonFinite("peak gain"));
        }
        if !(self.bandwidth_octaves.is_finite() && self.bandwidth_octaves > 0.0) {
            return Err(DspError::InvalidBandwidth(self.bandwidth_octaves));
        }
        check_frequency(self.center_hz, sample_rate)
    }
}

/// Chebyshev response type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterKind {
    Lowpass,
    Highpass,
}

/// Chebyshev cascade request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChebyshevParams {
    pub cutoff_hz: f64,
    pub order: usize,
    pub ripple_percent: f64,
    pub kind: FilterKind,
}

impl ChebyshevParams {
    pub const DEFAULT_ORDER: usize = 8;
    pub const DEFAULT_RIPPLE_PERCENT: f64 = 0.8;

    pub fn new(cutoff_hz: f64, order: usize, ripple_percent: f64, kind: FilterKind) -> Self {
        Self {
            cutoff_hz,
            order,
            ripple_percent,
            kind,
        }
    }

    /// Eighth order with 0.8% ripple
    pub fn with_defaults(cutoff_hz: f64, kind: FilterKind) -> Self {
        Self::new(
            cutoff_hz,
            Self::DEFAULT_ORDER,
            Self::DEFAULT_RIPPLE_PERCENT,
            kind,
        )
    }

    /// Number of biquad stages the design produces
    pub fn stage_count(&self) -> usize {
        self.order / 2
    }

    pub fn validate(&self, sample_rate: f64) -> Result<(), DspError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }
        if self.order < 2 || self.order > MAX_CHEBYSHEV_ORDER || self.order % 2 != 0 {
            return Err(DspError::InvalidOrder(self.order));
        }
        if !(0.0..=MAX_RIPPLE_PERCENT).contains(&self.ripple_percent) {
            return Err(DspError::RippleOutOfRange(self.ripple_percent));
        }
        if !(self.cutoff_hz.is_finite() && self.cutoff_hz > 0.0)
            || self.cutoff_hz / sample_rate > 0.5
        {
            return Err(DspError::CutoffOutOfRange {
                cutoff: self.cutoff_hz,
                sample_rate,
            });
        }
        Ok(())
    }
}

/// Design the three-band shelf as a single biquad
pub fn compute_shelf(params: &ShelfParams, sample_rate: f64) -> Stage {
    let g1 = db_to_linear(params.low_gain_db - params.mid_gain_db);
    let g2 = db_to_linear(params.mid_gain_db - params.high_gain_db);
    let gh = db_to_linear(params.high_gain_db);

    // Low shelf section
    let x = (params.low_freq_hz * PI / sample_rate).tan() / g1.sqrt();
    let l1 = (x - 1.0) / (x + 1.0);
    let l2 = (g1 * x - 1.0) / (g1 * x + 1.0);
    let l3 = (g1 * x + 1.0) / (x + 1.0);

    // High shelf section
    let y = (params.high_freq_hz * PI / sample_rate).tan() / g2.sqrt();
    let h1 = (y - 1.0) / (y + 1.0);
    let h2 = (g2 * y - 1.0) / (g2 * y + 1.0);
    let h3 = (g2 * y + 1.0) / (y + 1.0);

    let c0 = l3 * h3 * gh;

    Stage {
        a0: c0,
        a1: c0 * (l2 + h2),
        a2: c0 * l2 * h2,
        b1: l1 + h1,
        b2: l1 * h1,
    }
}

/// Design one parametric band
///
/// Gains are expected to be normalized by [`PeakParams::new`]; they are not
/// re-checked here.
pub fn compute_peak(params: &PeakParams, sample_rate: f64) -> Stage {
    let g0 = db_to_linear(params.dc_gain_db);
    let g = db_to_linear(params.center_gain_db);
    let gb = db_to_linear(params.edge_gain_db);

    let w0 = 2.0 * PI * params.center_hz / sample_rate;
    let g02 = g0 * g0;
    let gb2 = gb * gb;
    let g2 = g * g;
    let w02 = w0 * w0;
    let pi2 = PI * PI;

    let inv_g_gb = 1.0 / (g2 - gb2).abs();
    let g_g0 = (g2 - g02).abs();
    let gb_g0 = (gb2 - g02).abs();
    let nyq = (w02 - pi2) * (w02 - pi2);

    // Bandwidth in radians from octaves
    let dw = 2.0 * w0 * (0.5 * LN_2 * params.bandwidth_octaves).sinh();
    let band_term = gb_g0 * pi2 * dw * dw;
    let num = g02 * nyq + g2 * band_term * inv_g_gb;
    let den = nyq + band_term * inv_g_gb;

    // Analog prototype gain at Nyquist
    let g1 = (num / den).sqrt();
    let g12 = g1 * g1;

    let g0g1 = g0 * g1;
    let g_g0g1 = (g2 - g0g1).abs();
    let g_g1 = (g2 - g12).abs();
    let gb_g0g1 = (gb2 - g0g1).abs();
    let gb_g1 = (gb2 - g12).abs();
    let ratio = ((gb_g0 * g_g1) / (gb_g1 * g_g0)).sqrt();

    let tan0 = (w0 * 0.5).tan();
    let w1 = w0 * 2.0_f64.powf(params.bandwidth_octaves * -0.5);
    let tan1 = (w1 * 0.5).tan();
    let tan2 = ratio * tan0 * tan0 / tan1;

    let w2 = (g_g1 / g_g0).sqrt() * tan0 * tan0;
    let dw_warped = tan2 - tan1;

    let c = gb_g1 * dw_warped * dw_warped - 2.0 * w2 * (gb_g0g1 - (gb_g0 * gb_g1).sqrt());
    let d = 2.0 * w2 * (g_g0g1 - (g_g0 * g_g1).sqrt());
    let a = ((c + d) * inv_g_gb).sqrt();
    let b = ((g2 * c + gb2 * d) * inv_g_gb).sqrt();

    let norm = 1.0 / (1.0 + w2 + a);

    Stage {
        a0: (g1 + g0 * w2 + b) * norm,
        a1: -2.0 * (g1 - g0 * w2) * norm,
        a2: (g1 - b + g0 * w2) * norm,
        b1: -2.0 * (1.0 - w2) * norm,
        b2: (1.0 + w2 - a) * norm,
    }
}

/// Design a Chebyshev lowpass or highpass cascade of `order / 2` stages
///
/// Each stage is normalized to unity gain at DC (lowpass) or Nyquist
/// (highpass). Ripple 0 gives a Butterworth response.
pub fn compute_chebyshev_cascade(
    params: &ChebyshevParams,
    sample_rate: f64,
) -> Result<Vec<Stage>, DspError> {
    params.validate(sample_rate)?;

    let np = params.order as f64;
    let pr = params.ripple_percent;
    let fc = params.cutoff_hz / sample_rate;

    let mut stages = Vec::with_capacity(params.stage_count());
    for p in 0..params.stage_count() {
        // Pole location on the unit circle
        let angle = PI / (np * 2.0) + p as f64 * PI / np;
        let mut rp = -angle.cos();
        let mut ip = angle.sin();

        // Warp from a circle to an ellipse
        if pr != 0.0 {
            let r = 100.0 / (100.0 - pr);
            let es = (r * r - 1.0).sqrt();
            let vx = (1.0 / np) * ((1.0 / es) + ((1.0 / (es * es)) + 1.0).sqrt()).ln();
            let kx = (1.0 / np) * ((1.0 / es) + ((1.0 / (es * es)) - 1.0).sqrt()).ln();
            let kx = kx.cosh();
            rp *= vx.sinh() / kx;
            ip *= vx.cosh() / kx;
        }

        // s-domain to z-domain
        let t = 2.0 * 0.5_f64.tan();
        let w = 2.0 * PI * fc;
        let m = rp * rp + ip * ip;
        let d = 4.0 - 4.0 * rp * t + m * t * t;
        let x0 = t * t / d;
        let x1 = 2.0 * t * t / d;
        let x2 = t * t / d;
        let y1 = (8.0 - 2.0 * m * t * t) / d;
        let y2 = (-4.0 - 4.0 * rp * t - m * t * t) / d;

        // Lowpass-to-lowpass or lowpass-to-highpass transform
        let k = match params.kind {
            FilterKind::Highpass => -(w / 2.0 + 0.5).cos() / (w / 2.0 - 0.5).cos(),
            FilterKind::Lowpass => (0.5 - w / 2.0).sin() / (0.5 + w / 2.0).sin(),
        };

        let d = 1.0 + y1 * k - y2 * k * k;
        let a0 = (x0 - x1 * k + x2 * k * k) / d;
        let mut a1 = (-2.0 * x0 * k + x1 + x1 * k * k - 2.0 * x2 * k) / d;
        let a2 = (x0 * k * k - x1 * k + x2) / d;
        let mut b1 = (2.0 * k + y1 + y1 * k * k - 2.0 * y2 * k) / d;
        let b2 = (-(k * k) - y1 * k + y2) / d;
        let gain = (1.0 - (b1 + b2)) / (a0 + a1 + a2);

        if params.kind == FilterKind::Highpass {
            a1 = -a1;
            b1 = -b1;
        }

        // Recursion coefficients are stored with the opposite sign
        stages.push(Stage {
            a0: a0 * gain,
            a1: a1 * gain,
            a2: a2 * gain,
            b1: -b1,
            b2: -b2,
        });
    }

    Ok(stages)
}
