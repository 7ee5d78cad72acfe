//! Control-Path Coordinator
//!
//! Serializes parameter requests into at most one design pass at a time.
//!
//! ```text
//!            submit() ──CAS Idle→Computing──▶ design ─▶ publish ─▶ Idle
//!               │                               ▲
//!               └─ CAS failed: set `recompute` ─┘ (pass restarts with
//!                  and return Coalesced            the latest request)
//! ```
//!
//! Requests are validated and merged into the desired design state before
//! anything else happens, so a rejected request never changes what is
//! published. Callers never wait for another caller's design pass.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use heron_dsp::{
    compute_chebyshev_cascade, compute_peak, compute_shelf, ChebyshevParams, CoefficientSet,
    DspError, PeakParams, ShelfParams, Stage,
};

use crate::epoch::{EpochWriter, Publication};
use crate::error::{EngineError, EngineResult};
use crate::message::{Event, EventQueue, Request};

const IDLE: u8 = 0;
const COMPUTING: u8 = 1;

/// Where the published cascade comes from
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DesignSource {
    /// Shelf in stage 0 followed by the peaks
    #[default]
    Parametric,
    /// Raw stages supplied by the caller
    Biquads(Vec<Stage>),
    /// Analytic Chebyshev cascade
    Chebyshev(ChebyshevParams),
}

/// Everything needed to run a design pass
///
/// Shelf and peaks are remembered even while another source is active, so a
/// later parametric request picks them up again.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesignState {
    pub shelf: Option<ShelfParams>,
    pub peaks: Vec<PeakParams>,
    pub source: DesignSource,
}

impl DesignState {
    /// Validate `request` and return the state it leads to
    fn apply(&self, request: &Request, capacity: usize, sample_rate: f64) -> Result<Self, DspError> {
        let check_capacity = |requested: usize| {
            if requested > capacity {
                Err(DspError::CapacityExceeded {
                    requested,
                    capacity,
                })
            } else {
                Ok(())
            }
        };

        let mut next = self.clone();
        match request {
            Request::Shelf(params) => {
                let params = params.normalized();
                params.validate(sample_rate)?;
                next.shelf = Some(params);
                next.source = DesignSource::Parametric;
            }
            Request::ShelfOff => {
                next.shelf = None;
                next.source = DesignSource::Parametric;
            }
            Request::Peaks(peaks) => {
                check_capacity(peaks.len() + 1)?;
                let peaks: Vec<PeakParams> = peaks.iter().map(PeakParams::normalized).collect();
                for peak in &peaks {
                    peak.validate(sample_rate)?;
                }
                next.peaks = peaks;
                next.source = DesignSource::Parametric;
            }
            Request::Biquads(stages) => {
                check_capacity(stages.len())?;
                if !stages.iter().all(Stage::is_finite) {
                    return Err(DspError::NonFinite("biquad coefficients"));
                }
                if let Some(index) = stages.iter().position(|s| !s.is_stable()) {
                    warn!(stage = index, "Biquad stage has poles outside the unit circle");
                }
                next.source = DesignSource::Biquads(stages.clone());
            }
            Request::Chebyshev(params) => {
                params.validate(sample_rate)?;
                check_capacity(params.stage_count())?;
                next.source = DesignSource::Chebyshev(*params);
            }
            Request::Reset => next = DesignState::default(),
        }
        Ok(next)
    }

    /// Write the cascade for this state into `set`
    fn design_into(&self, sample_rate: f64, set: &mut CoefficientSet) -> Result<(), DspError> {
        match &self.source {
            DesignSource::Parametric => {
                let shelf = self
                    .shelf
                    .as_ref()
                    .map_or(Stage::IDENTITY, |p| compute_shelf(p, sample_rate));
                let mut stages = Vec::with_capacity(self.peaks.len() + 1);
                stages.push(shelf);
                stages.extend(self.peaks.iter().map(|p| compute_peak(p, sample_rate)));
                set.set_stages(&stages)
            }
            DesignSource::Biquads(stages) => set.set_stages(stages),
            DesignSource::Chebyshev(params) => {
                set.set_stages(&compute_chebyshev_cascade(params, sample_rate)?)
            }
        }
    }
}

/// Outcome of an accepted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// This call ran the design pass and published the result
    Published,
    /// Another caller's pass is running and will pick this request up
    Coalesced,
}

/// Two-state coordinator driving design passes into the epoch store
pub struct Coordinator {
    sample_rate: f64,
    capacity: usize,
    state: AtomicU8,
    recompute: AtomicBool,
    desired: Mutex<DesignState>,
    writer: Mutex<EpochWriter>,
    last_published: Mutex<CoefficientSet>,
    passes: AtomicU64,
    publications: AtomicU64,
    // Set when the engine reallocates and this coordinator's store is orphaned
    retired: AtomicBool,
    events: EventQueue,
}

impl Coordinator {
    pub fn new(writer: EpochWriter, sample_rate: f64, events: EventQueue) -> Self {
        let capacity = writer.capacity();
        let last_published = writer.staging().clone();
        Self {
            sample_rate,
            capacity,
            state: AtomicU8::new(IDLE),
            recompute: AtomicBool::new(false),
            desired: Mutex::new(DesignState::default()),
            writer: Mutex::new(writer),
            last_published: Mutex::new(last_published),
            passes: AtomicU64::new(0),
            publications: AtomicU64::new(0),
            retired: AtomicBool::new(false),
            events,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// True while some caller is running a design pass
    pub fn is_computing(&self) -> bool {
        self.state.load(Ordering::SeqCst) == COMPUTING
    }

    /// Parameters the next design pass will use
    pub fn desired(&self) -> DesignState {
        self.desired.lock().clone()
    }

    /// Copy of the most recently published coefficients
    pub fn current_coefficients(&self) -> CoefficientSet {
        self.last_published.lock().clone()
    }

    /// Design passes started, restarts included
    pub fn design_passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Epochs published
    pub fn publications(&self) -> u64 {
        self.publications.load(Ordering::Relaxed)
    }

    /// Refuse every later request
    pub fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    /// Validate a request, then either run the design pass or hand it to the
    /// pass already running
    pub fn submit(&self, request: Request) -> EngineResult<Submission> {
        if self.is_retired() {
            warn!(request = request.kind(), "Request sent to a stale control handle");
            return Err(EngineError::StaleHandle);
        }

        {
            let mut desired = self.desired.lock();
            match desired.apply(&request, self.capacity, self.sample_rate) {
                Ok(next) => *desired = next,
                Err(e) => {
                    warn!(request = request.kind(), "Rejected request: {}", e);
                    self.events.push(Event::rejected(&e));
                    return Err(e.into());
                }
            }
        }

        if matches!(request, Request::Reset) {
            info!("Parameters reset");
            self.events.push(Event::Reset);
        }

        // Raise the flag before trying to take over, so a pass that is about
        // to go idle still sees it
        self.recompute.store(true, Ordering::SeqCst);
        if self
            .state
            .compare_exchange(IDLE, COMPUTING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(request = request.kind(), "Design pass running, request coalesced");
            return Ok(Submission::Coalesced);
        }

        self.drive()?;
        Ok(Submission::Published)
    }

    /// Run passes until no request is left behind; caller holds COMPUTING
    fn drive(&self) -> EngineResult<()> {
        loop {
            let result = self.design_until_settled();
            self.state.store(IDLE, Ordering::SeqCst);
            result?;

            if !self.recompute.load(Ordering::SeqCst) {
                return Ok(());
            }
            if self
                .state
                .compare_exchange(IDLE, COMPUTING, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                // Another caller took over and will see the flag
                return Ok(());
            }
            debug!("Request arrived while going idle, designing again");
        }
    }

    fn design_until_settled(&self) -> EngineResult<()> {
        let mut writer = self.writer.lock();
        loop {
            self.recompute.store(false, Ordering::SeqCst);
            let desired = self.desired.lock().clone();
            self.passes.fetch_add(1, Ordering::Relaxed);
            desired.design_into(self.sample_rate, writer.staging_mut())?;

            if !self.recompute.load(Ordering::SeqCst) {
                break;
            }
            debug!("Newer request arrived during design, restarting");
        }

        let stages = writer.staging().to_rows();
        self.last_published.lock().copy_from(writer.staging());
        let publication = writer.publish()?;
        self.publications.fetch_add(1, Ordering::Relaxed);

        debug!(
            stages = stages.len(),
            superseded = publication == Publication::Superseded,
            "Published coefficient epoch"
        );
        self.events.push(Event::CoefficientsPublished { stages });
        Ok(())
    }
}
