//! Coefficient Epoch Store
//!
//! Lock-free hand-off of [`CoefficientSet`]s from the control path to the
//! render path. Three slots are allocated once and only their roles rotate:
//!
//! ```text
//!   EpochWriter            back (AtomicU8)            EpochReader
//!   staging slot  ──publish──▶ slot | FRESH ──snapshot──▶ front slot
//!        ▲                        │  ▲                        │
//!        └────── retired slot ────┘  └────── previous front ──┘
//! ```
//!
//! Each side swaps the index it owns with `back`. A slot index is held by
//! exactly one of the writer, the reader or `back` at any time, so a slot is
//! never written while the other side can read it, and no data is copied.
//!
//! # Real-time Safety
//! [`EpochReader::snapshot_for_render`] is one relaxed load plus at most one atomic swap.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::error;

use heron_dsp::CoefficientSet;

use crate::error::{EngineError, EngineResult};

const SLOTS: usize = 3;
const SLOT_MASK: u8 = 0b011;
// Set by publish, cleared by snapshot
const FRESH: u8 = 0b100;

struct Shared {
    slots: [UnsafeCell<CoefficientSet>; SLOTS],
    back: AtomicU8,
}

// SAFETY: the writer only dereferences its staging slot and the reader only
// its front slot. Slot ownership changes hands exclusively through AcqRel
// swaps on `back`, which also orders the slot contents.
unsafe impl Sync for Shared {}

impl Shared {
    fn slot(&self, index: u8) -> *mut CoefficientSet {
        self.slots[index as usize].get()
    }
}

/// Result of a successful publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publication {
    /// The previous epoch had already been adopted by the reader
    Fresh,
    /// The previous epoch was never read and went straight back to the pool
    Superseded,
}

/// Create a store whose three slots all start as copies of `initial`
///
/// Returns the control-side writer and the render-side reader.
pub fn epoch_store(initial: &CoefficientSet) -> (EpochWriter, EpochReader) {
    let shared = Arc::new(Shared {
        slots: [
            UnsafeCell::new(initial.clone()),
            UnsafeCell::new(initial.clone()),
            UnsafeCell::new(initial.clone()),
        ],
        back: AtomicU8::new(1),
    });

    let writer = EpochWriter {
        shared: Arc::clone(&shared),
        staging: 2,
    };
    let reader = EpochReader { shared, front: 0 };
    (writer, reader)
}

/// Control-side handle: fills the staging slot and publishes it
pub struct EpochWriter {
    shared: Arc<Shared>,
    staging: u8,
}

impl EpochWriter {
    /// The slot the next publish will hand over
    pub fn staging(&self) -> &CoefficientSet {
        // SAFETY: the staging slot is owned by the writer until publish
        unsafe { &*self.shared.slot(self.staging) }
    }

    /// Mutable access to the staging slot for a design pass
    pub fn staging_mut(&mut self) -> &mut CoefficientSet {
        // SAFETY: as above; &mut self keeps the borrow unique
        unsafe { &mut *self.shared.slot(self.staging) }
    }

    pub fn capacity(&self) -> usize {
        self.staging().capacity()
    }

    /// Make the staging slot the newest epoch and take back a retired slot
    ///
    /// The returned slot holds stale data; callers overwrite it completely
    /// before the next publish.
    pub fn publish(&mut self) -> EngineResult<Publication> {
        let published = self.staging;
        let previous = self.shared.back.swap(published | FRESH, Ordering::AcqRel);
        let retired = previous & SLOT_MASK;

        if retired == published || retired as usize >= SLOTS {
            error!(
                slot = retired,
                published, "Epoch store rotation broken, no retired slot available"
            );
            return Err(EngineError::RotationBroken { slot: retired });
        }

        self.staging = retired;
        if previous & FRESH != 0 {
            Ok(Publication::Superseded)
        } else {
            Ok(Publication::Fresh)
        }
    }
}

/// Render-side handle: adopts the newest epoch once per block
pub struct EpochReader {
    shared: Arc<Shared>,
    front: u8,
}

impl EpochReader {
    /// True if an epoch has been published since the last snapshot
    pub fn has_fresh(&self) -> bool {
        self.shared.back.load(Ordering::Acquire) & FRESH != 0
    }

    /// Adopt the newest epoch, if any, and return it
    ///
    /// `changed` is true when the returned set is a different epoch from the
    /// one returned by the previous call.
    pub fn snapshot_for_render(&mut self) -> (&CoefficientSet, bool) {
        let changed = self.shared.back.load(Ordering::Relaxed) & FRESH != 0;
        if changed {
            // Only the reader clears FRESH, so the swap still sees it set
            let previous = self.shared.back.swap(self.front, Ordering::AcqRel);
            self.front = previous & SLOT_MASK;
        }
        (self.current(), changed)
    }

    /// The epoch adopted by the last snapshot
    pub fn current(&self) -> &CoefficientSet {
        // SAFETY: the front slot is owned by the reader until its next swap,
        // which needs &mut self
        unsafe { &*self.shared.slot(self.front) }
    }
}
