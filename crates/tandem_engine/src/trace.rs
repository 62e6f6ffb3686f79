//! # Handshake Trace
//!
//! An ordered stream of state entries and semaphore operations from both
//! threads. Each event is sent while the sending thread still holds the
//! causal position it describes, so channel order respects happens-before
//! across the handshake.
//!
//! Tracing is opt-in; an engine built without a trace pays nothing.

use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::handshake::Signal;

/// Which of the two loops produced an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Machine {
    /// The application (simulation) loop.
    Application,
    /// The renderer loop.
    Renderer,
}

/// What happened to a semaphore.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignalAction {
    /// A permit is about to be released.
    Released,
    /// A permit was acquired.
    Acquired,
}

/// One recorded event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceEvent {
    /// A machine entered a state.
    Entered {
        /// Producer.
        machine: Machine,
        /// Display name of the state.
        state: &'static str,
    },
    /// A handshake semaphore was released or acquired.
    Signal {
        /// Which semaphore.
        kind: Signal,
        /// Release or acquire.
        action: SignalAction,
    },
}

/// Sending side, cloned into both threads.
#[derive(Clone, Debug)]
pub struct FrameTrace {
    sender: Sender<TraceEvent>,
}

impl FrameTrace {
    /// Creates a trace and the receiver that observes it.
    #[must_use]
    pub fn channel() -> (FrameTrace, TraceReceiver) {
        let (sender, receiver) = unbounded();
        (FrameTrace { sender }, TraceReceiver { receiver })
    }

    /// Records an event. A dropped receiver silently discards it.
    pub fn record(&self, event: TraceEvent) {
        let _ = self.sender.send(event);
    }

    /// Records a state entry.
    pub fn entered(&self, machine: Machine, state: &'static str) {
        self.record(TraceEvent::Entered { machine, state });
    }
}

/// Receiving side, held by the observer.
#[derive(Debug)]
pub struct TraceReceiver {
    receiver: Receiver<TraceEvent>,
}

impl TraceReceiver {
    /// Takes every event recorded so far.
    #[must_use]
    pub fn drain(&self) -> Vec<TraceEvent> {
        self.receiver.try_iter().collect()
    }

    /// Waits for the next event.
    #[must_use]
    pub fn next_timeout(&self, timeout: Duration) -> Option<TraceEvent> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Filters a trace down to the states one machine entered, in order.
#[must_use]
pub fn states_of(events: &[TraceEvent], machine: Machine) -> Vec<&'static str> {
    events
        .iter()
        .filter_map(|event| match *event {
            TraceEvent::Entered { machine: m, state } if m == machine => Some(state),
            _ => None,
        })
        .collect()
}

/// Filters a trace down to the releases of the per-frame signals.
#[must_use]
pub fn frame_releases(events: &[TraceEvent]) -> Vec<Signal> {
    events
        .iter()
        .filter_map(|event| match *event {
            TraceEvent::Signal {
                kind: kind @ (Signal::RenderBegin | Signal::RenderComplete),
                action: SignalAction::Released,
            } => Some(kind),
            _ => None,
        })
        .collect()
}
