//! Heron Core - Equalizer Engine
//!
//! This crate connects the pure DSP in `heron_dsp` to two execution contexts:
//! - A lock-free coefficient epoch store (triple buffer with role rotation)
//! - A control-path coordinator that coalesces parameter requests
//! - An engine facade that owns allocation and splits into control and
//!   render handles
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Control Context                         │
//! │  Request ──▶ Coordinator ──design──▶ EpochWriter ──events──▶ │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ atomic slot rotation
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Render Context                         │
//! │      EpochReader ──one snapshot per block──▶ Cascade        │
//! │            (No allocation, locks or logging here)           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod coordinator;
mod engine;
mod epoch;
mod error;
mod message;

pub use config::{EngineConfig, MAX_CHANNELS, MAX_STAGE_LIMIT};
pub use coordinator::{Coordinator, DesignSource, DesignState, Submission};
pub use engine::{EqController, EqEngine, EqRenderer, SharedState, MIN_RUNTIME_STAGES};
pub use epoch::{epoch_store, EpochReader, EpochWriter, Publication};
pub use error::{EngineError, EngineResult};
pub use message::{Event, EventQueue, Request, EVENT_QUEUE_CAPACITY};

// Re-export DSP types for convenience
pub use heron_dsp::{
    ChebyshevParams, CoefficientSet, FilterKind, InterpolationMode, PeakParams, ShelfParams, Stage,
};
