//! Equalizer Engine - Main Entry Point
//!
//! The EqEngine owns both sides of the equalizer and is the place where
//! buffers get (re)allocated. For real-time use it splits into a control
//! handle and a render handle:
//!
//! ```text
//!   control threads                           audio thread
//!   EqController ──submit──▶ Coordinator      EqRenderer
//!        │                       │ design         │ snapshot (once per block)
//!        │                       ▼                ▼
//!        │                  EpochWriter ══▶ epoch store ══▶ EpochReader ─▶ Cascade
//!        │
//!        └── SharedState (mode, clear flag, stats) ◀── atomics only ──┘
//! ```
//!
//! The render side never blocks, allocates or logs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use heron_dsp::{
    AtomicInterpolationMode, Cascade, ChebyshevParams, CoefficientSet, FilterKind,
    InterpolationMode, PeakParams, RenderState, ShelfParams, Stage,
};

use crate::config::{EngineConfig, MAX_STAGE_LIMIT};
use crate::coordinator::{Coordinator, DesignState, Submission};
use crate::epoch::{epoch_store, EpochReader};
use crate::error::{EngineError, EngineResult};
use crate::message::{Event, EventQueue, Request};

/// Smallest capacity accepted by [`EqEngine::set_max_stages`]
pub const MIN_RUNTIME_STAGES: usize = 2;

/// Shared state between render side and control side
pub struct SharedState {
    /// Interpolation mode read once per block
    mode: AtomicInterpolationMode,

    /// Set by a reset, consumed by the next rendered block
    clear_requested: AtomicBool,

    /// Blocks rendered
    blocks: AtomicU64,

    /// Blocks that adopted a new epoch
    epochs: AtomicU64,
}

impl SharedState {
    pub fn new(mode: InterpolationMode) -> Self {
        Self {
            mode: AtomicInterpolationMode::new(mode),
            clear_requested: AtomicBool::new(false),
            blocks: AtomicU64::new(0),
            epochs: AtomicU64::new(0),
        }
    }

    pub fn interpolation_mode(&self) -> InterpolationMode {
        self.mode.load()
    }

    pub fn set_interpolation_mode(&self, mode: InterpolationMode) {
        self.mode.store(mode);
    }

    pub fn blocks_rendered(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    pub fn epochs_adopted(&self) -> u64 {
        self.epochs.load(Ordering::Relaxed)
    }
}

/// Render-side handle, owned by the audio thread
pub struct EqRenderer {
    reader: EpochReader,
    cascade: Cascade,
    shared: Arc<SharedState>,
}

impl EqRenderer {
    pub fn channels(&self) -> usize {
        self.cascade.channels()
    }

    pub fn max_stages(&self) -> usize {
        self.cascade.max_stages()
    }

    /// Per-stage history of the cascade
    pub fn render_state(&self) -> &RenderState {
        self.cascade.state()
    }

    /// Filter one block of planar channel buffers in place
    ///
    /// A badly shaped block is rejected before any epoch is adopted.
    ///
    /// # Real-time Safety
    /// - No allocations
    /// - No locks
    /// - One epoch snapshot per call
    pub fn render(&mut self, channels: &mut [&mut [f64]]) -> EngineResult<()> {
        self.cascade.check_block(channels)?;
        self.consume_clear_request();
        let mode = self.shared.mode.load();
        let (coeffs, changed) = self.reader.snapshot_for_render();
        let result = self.cascade.process(channels, coeffs, changed, mode);
        self.count_block(changed);
        result.map_err(EngineError::from)
    }

    /// Filter `inputs` into distinct `outputs`
    pub fn render_from(&mut self, inputs: &[&[f64]], outputs: &mut [&mut [f64]]) -> EngineResult<()> {
        self.cascade.check_block_from(inputs, outputs)?;
        self.consume_clear_request();
        let mode = self.shared.mode.load();
        let (coeffs, changed) = self.reader.snapshot_for_render();
        let result = self
            .cascade
            .process_from(inputs, outputs, coeffs, changed, mode);
        self.count_block(changed);
        result.map_err(EngineError::from)
    }

    fn count_block(&self, changed: bool) {
        self.shared.blocks.fetch_add(1, Ordering::Relaxed);
        if changed {
            self.shared.epochs.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn consume_clear_request(&mut self) {
        if self.shared.clear_requested.swap(false, Ordering::AcqRel) {
            self.cascade.reset();
        }
    }

    fn clear_history(&mut self) {
        self.shared.clear_requested.store(false, Ordering::Release);
        self.cascade.reset();
    }
}

/// Control-side handle; clones share one coordinator
#[derive(Clone)]
pub struct EqController {
    coordinator: Arc<Coordinator>,
    shared: Arc<SharedState>,
    events: EventQueue,
}

impl EqController {
    /// Submit any request
    pub fn submit(&self, request: Request) -> EngineResult<Submission> {
        self.coordinator.submit(request)
    }

    /// Set the three shelf gains (dB) and two transition frequencies (Hz)
    pub fn request_shelf_update(&self, gains_db: [f64; 3], freqs_hz: [f64; 2]) -> EngineResult<Submission> {
        self.submit(Request::Shelf(ShelfParams::new(gains_db, freqs_hz)))
    }

    /// Turn the shelf stage into a passthrough
    pub fn request_shelf_off(&self) -> EngineResult<Submission> {
        self.submit(Request::ShelfOff)
    }

    /// Replace the peak list
    pub fn request_peak_update(&self, peaks: Vec<PeakParams>) -> EngineResult<Submission> {
        self.submit(Request::Peaks(peaks))
    }

    /// Replace the whole cascade with raw stages
    pub fn request_biquads_update(&self, stages: Vec<Stage>) -> EngineResult<Submission> {
        self.submit(Request::Biquads(stages))
    }

    /// Replace the whole cascade with a Chebyshev design
    ///
    /// `order` defaults to 8 and `ripple_percent` to 0.8.
    pub fn request_chebyshev_update(
        &self,
        cutoff_hz: f64,
        order: Option<usize>,
        ripple_percent: Option<f64>,
        kind: FilterKind,
    ) -> EngineResult<Submission> {
        let params = ChebyshevParams::new(
            cutoff_hz,
            order.unwrap_or(ChebyshevParams::DEFAULT_ORDER),
            ripple_percent.unwrap_or(ChebyshevParams::DEFAULT_RIPPLE_PERCENT),
            kind,
        );
        self.submit(Request::Chebyshev(params))
    }

    /// Forget all parameters and ask the renderer to clear its history
    pub fn reset(&self) -> EngineResult<Submission> {
        self.shared.clear_requested.store(true, Ordering::Release);
        self.submit(Request::Reset)
    }

    pub fn set_interpolation_mode(&self, mode: InterpolationMode) {
        self.shared.set_interpolation_mode(mode);
    }

    pub fn interpolation_mode(&self) -> InterpolationMode {
        self.shared.interpolation_mode()
    }

    /// Coefficients of the latest published epoch
    pub fn current_coefficients(&self) -> CoefficientSet {
        self.coordinator.current_coefficients()
    }

    /// Parameters behind the latest accepted request
    pub fn design_state(&self) -> DesignState {
        self.coordinator.desired()
    }

    pub fn max_stages(&self) -> usize {
        self.coordinator.capacity()
    }

    pub fn sample_rate(&self) -> f64 {
        self.coordinator.sample_rate()
    }

    /// Render statistics
    pub fn stats(&self) -> &SharedState {
        &self.shared
    }

    /// Epochs published so far
    pub fn publications(&self) -> u64 {
        self.coordinator.publications()
    }

    /// False once the engine has reallocated behind this handle
    pub fn is_current(&self) -> bool {
        !self.coordinator.is_retired()
    }

    /// Get next event (non-blocking)
    pub fn poll_event(&self) -> Option<Event> {
        self.events.try_pop()
    }

    /// Get next event (blocking)
    pub fn wait_event(&self) -> Option<Event> {
        self.events.pop()
    }
}

/// Allocate a store, coordinator and cascade of the given shape
fn build(
    max_stages: usize,
    channels: usize,
    sample_rate: f64,
    mode: InterpolationMode,
    events: &EventQueue,
) -> (EqController, EqRenderer) {
    let (writer, reader) = epoch_store(&CoefficientSet::with_capacity(max_stages));
    let shared = Arc::new(SharedState::new(mode));

    let controller = EqController {
        coordinator: Arc::new(Coordinator::new(writer, sample_rate, events.clone())),
        shared: Arc::clone(&shared),
        events: events.clone(),
    };
    let renderer = EqRenderer {
        reader,
        cascade: Cascade::new(max_stages, channels),
        shared,
    };
    (controller, renderer)
}

/// Single-owner equalizer engine
///
/// Every method that reallocates takes `&mut self`. Call [`EqEngine::split`]
/// to hand the render side to an audio thread.
pub struct EqEngine {
    /// Configuration as last passed to `configure`
    config: EngineConfig,

    controller: EqController,

    renderer: EqRenderer,

    /// Kept so events survive reallocation
    events: EventQueue,
}

impl EqEngine {
    /// Create a new engine with default configuration
    pub fn new() -> EngineResult<Self> {
        Self::with_config(EngineConfig::default())
    }

    /// Create a new engine with custom configuration
    pub fn with_config(config: EngineConfig) -> EngineResult<Self> {
        config.validate().map_err(EngineError::ConfigError)?;
        let events = EventQueue::default();
        let (controller, renderer) = build(
            config.max_stages,
            config.channels,
            config.sample_rate,
            config.interpolation,
            &events,
        );

        info!(
            max_stages = config.max_stages,
            channels = config.channels,
            sample_rate = config.sample_rate,
            "Equalizer engine configured"
        );

        Ok(Self {
            config,
            controller,
            renderer,
            events,
        })
    }

    /// (Re)allocate every buffer for a new configuration
    ///
    /// Parameters, coefficients and history start over. Not real-time safe.
    pub fn configure(&mut self, config: EngineConfig) -> EngineResult<()> {
        config.validate().map_err(EngineError::ConfigError)?;
        self.config = config;
        self.reallocate(self.config.max_stages, self.config.interpolation);
        info!(
            max_stages = self.config.max_stages,
            channels = self.config.channels,
            sample_rate = self.config.sample_rate,
            "Equalizer engine reconfigured"
        );
        Ok(())
    }

    fn reallocate(&mut self, max_stages: usize, mode: InterpolationMode) {
        // Handles cloned from the old controller must not keep publishing
        // into a store nobody renders from
        self.controller.coordinator.retire();
        let (controller, renderer) = build(
            max_stages,
            self.config.channels,
            self.config.sample_rate,
            mode,
            &self.events,
        );
        self.controller = controller;
        self.renderer = renderer;
    }

    /// Configuration as last passed to `configure`
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current stage capacity (may differ from the configured one)
    pub fn max_stages(&self) -> usize {
        self.controller.max_stages()
    }

    /// Change the stage capacity at runtime
    ///
    /// `max_stages` is raised to at least [`MIN_RUNTIME_STAGES`]. Parameters,
    /// coefficients and history are cleared.
    pub fn set_max_stages(&mut self, max_stages: usize) -> EngineResult<()> {
        let max_stages = max_stages.max(MIN_RUNTIME_STAGES);
        if max_stages > MAX_STAGE_LIMIT {
            return Err(EngineError::ConfigError(format!(
                "Invalid stage capacity: {}",
                max_stages
            )));
        }

        self.reallocate(max_stages, self.controller.interpolation_mode());
        info!(max_stages, "Stage capacity changed");
        self.events.push(Event::CapacityChanged { max_stages });
        Ok(())
    }

    /// Zero all parameters, coefficients and history
    ///
    /// Restores the configured capacity, reallocating only if it changed.
    /// Calling it twice leaves the same state as calling it once.
    pub fn reset(&mut self) -> EngineResult<()> {
        if self.max_stages() != self.config.max_stages {
            debug!(
                from = self.max_stages(),
                to = self.config.max_stages,
                "Restoring configured capacity"
            );
            self.reallocate(self.config.max_stages, self.controller.interpolation_mode());
        }
        self.controller.reset()?;
        self.renderer.clear_history();
        Ok(())
    }

    pub fn request_shelf_update(&self, gains_db: [f64; 3], freqs_hz: [f64; 2]) -> EngineResult<Submission> {
        self.controller.request_shelf_update(gains_db, freqs_hz)
    }

    pub fn request_shelf_off(&self) -> EngineResult<Submission> {
        self.controller.request_shelf_off()
    }

    pub fn request_peak_update(&self, peaks: Vec<PeakParams>) -> EngineResult<Submission> {
        self.controller.request_peak_update(peaks)
    }

    pub fn request_biquads_update(&self, stages: Vec<Stage>) -> EngineResult<Submission> {
        self.controller.request_biquads_update(stages)
    }

    pub fn request_chebyshev_update(
        &self,
        cutoff_hz: f64,
        order: Option<usize>,
        ripple_percent: Option<f64>,
        kind: FilterKind,
    ) -> EngineResult<Submission> {
        self.controller
            .request_chebyshev_update(cutoff_hz, order, ripple_percent, kind)
    }

    pub fn set_interpolation_mode(&self, mode: InterpolationMode) {
        self.controller.set_interpolation_mode(mode);
    }

    pub fn interpolation_mode(&self) -> InterpolationMode {
        self.controller.interpolation_mode()
    }

    /// Render one block in place
    pub fn render(&mut self, channels: &mut [&mut [f64]]) -> EngineResult<()> {
        self.renderer.render(channels)
    }

    /// Render `inputs` into `outputs`
    pub fn render_from(&mut self, inputs: &[&[f64]], outputs: &mut [&mut [f64]]) -> EngineResult<()> {
        self.renderer.render_from(inputs, outputs)
    }

    pub fn current_coefficients(&self) -> CoefficientSet {
        self.controller.current_coefficients()
    }

    pub fn design_state(&self) -> DesignState {
        self.controller.design_state()
    }

    pub fn render_state(&self) -> &RenderState {
        self.renderer.render_state()
    }

    pub fn stats(&self) -> &SharedState {
        self.controller.stats()
    }

    /// A control handle sharing this engine's coordinator
    ///
    /// Handles taken before a reallocation are stale and refuse requests
    /// with [`EngineError::StaleHandle`].
    pub fn controller(&self) -> EqController {
        self.controller.clone()
    }

    /// Hand out the two halves; capacity is fixed from here on
    pub fn split(self) -> (EqController, EqRenderer) {
        debug!("Equalizer engine split into control and render handles");
        (self.controller, self.renderer)
    }

    /// Get next event (non-blocking)
    pub fn poll_event(&self) -> Option<Event> {
        self.events.try_pop()
    }

    /// Get next event (blocking)
    pub fn wait_event(&self) -> Option<Event> {
        self.events.pop()
    }

    /// Drain all pending events
    pub fn drain_events(&self) -> Vec<Event> {
        self.events.drain()
    }
}
