//! Message Types for Thread Communication
//!
//! Requests flow from control callers -> Coordinator
//! Events flow from Coordinator -> whoever reports coefficients

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use heron_dsp::{ChebyshevParams, PeakParams, ShelfParams, Stage, COEFFS_PER_STAGE};

/// Parameter updates accepted by the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Enable the shelf stage with new parameters (peaks are kept)
    Shelf(ShelfParams),

    /// Return stage 0 to identity (peaks are kept)
    ShelfOff,

    /// Replace the peak list (shelf is kept)
    Peaks(Vec<PeakParams>),

    /// Replace the whole cascade with raw stages; the first one takes the shelf slot
    Biquads(Vec<Stage>),

    /// Replace the whole cascade with a Chebyshev design
    Chebyshev(ChebyshevParams),

    /// Forget all parameters and publish a passthrough cascade
    Reset,
}

impl Request {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Shelf(_) => "shelf",
            Request::ShelfOff => "shelf-off",
            Request::Peaks(_) => "peaks",
            Request::Biquads(_) => "biquads",
            Request::Chebyshev(_) => "chebyshev",
            Request::Reset => "reset",
        }
    }
}

/// Events emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// A new coefficient epoch was published
    /// Rows are `[a0, a1, a2, b1, b2]`, stage 0 first
    CoefficientsPublished {
        stages: Vec<[f64; COEFFS_PER_STAGE]>,
    },

    /// A request failed validation; nothing changed
    RequestRejected { message: String },

    /// Parameters, coefficients and history were cleared
    Reset,

    /// Stage capacity was reallocated
    CapacityChanged { max_stages: usize },
}

impl Event {
    /// Create a rejection event from any error type
    pub fn rejected<E: std::fmt::Display>(err: E) -> Self {
        Event::RequestRejected {
            message: err.to_string(),
        }
    }
}

/// Events kept for a consumer that falls behind
pub const EVENT_QUEUE_CAPACITY: usize = 64;

/// Bounded event queue that never blocks the sender
///
/// When the queue is full the oldest event is dropped, so a consumer that
/// polls late still sees the most recent reports.
#[derive(Clone)]
pub struct EventQueue {
    sender: Sender<Event>,
    receiver: Receiver<Event>,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self { sender, receiver }
    }

    /// Queue an event, evicting the oldest ones if needed
    pub fn push(&self, event: Event) {
        let mut event = event;
        loop {
            match self.sender.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    let _ = self.receiver.try_recv();
                    event = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// Get next event (non-blocking)
    pub fn try_pop(&self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }

    /// Get next event (blocking)
    pub fn pop(&self) -> Option<Event> {
        self.receiver.recv().ok()
    }

    /// Drain all pending events
    pub fn drain(&self) -> Vec<Event> {
        self.receiver.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.receiver.capacity().unwrap_or(EVENT_QUEUE_CAPACITY)
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(EVENT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = Event::CoefficientsPublished {
            stages: vec![[1.0, 0.0, 0.0, 0.0, 0.0], [0.5, 0.1, 0.2, -0.3, 0.4]],
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("CoefficientsPublished"));

        let deserialized: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[test]
    fn test_unit_event_serialization() {
        let json = serde_json::to_string(&Event::Reset).unwrap();
        assert_eq!(json, r#"{"type":"Reset"}"#);
        let deserialized: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, Event::Reset);
    }

    #[test]
    fn test_rejected_event() {
        let event = Event::rejected(heron_dsp::DspError::InvalidOrder(3));
        if let Event::RequestRejected { message } = event {
            assert!(message.contains('3'));
        } else {
            panic!("Should be RequestRejected variant");
        }
    }

    #[test]
    fn test_request_kind() {
        assert_eq!(Request::ShelfOff.kind(), "shelf-off");
        assert_eq!(Request::Peaks(vec![]).kind(), "peaks");
    }

    #[test]
    fn test_event_queue_drops_oldest_when_full() {
        let queue = EventQueue::new(3);
        for max_stages in 1..=10 {
            queue.push(Event::CapacityChanged { max_stages });
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(
            queue.drain(),
            vec![
                Event::CapacityChanged { max_stages: 8 },
                Event::CapacityChanged { max_stages: 9 },
                Event::CapacityChanged { max_stages: 10 },
            ]
        );
        assert!(queue.is_empty());
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn test_event_queue_clones_share_storage() {
        let queue = EventQueue::default();
        let other = queue.clone();
        other.push(Event::Reset);
        assert_eq!(queue.capacity(), EVENT_QUEUE_CAPACITY);
        assert_eq!(queue.try_pop(), Some(Event::Reset));
        assert!(other.is_empty());
    }
}
