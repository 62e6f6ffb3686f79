//! # Core Error Types
//!
//! Failures raised by the rendezvous primitives and the state machine
//! runtime. Engine crates wrap these in their own error enums.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by blocking synchronization primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The primitive was closed while (or before) waiting and no permit remained.
    #[error("semaphore `{name}` closed")]
    Closed {
        /// Name of the semaphore.
        name: &'static str,
    },

    /// The wait deadline passed without a permit becoming available.
    #[error("semaphore `{name}` timed out after {waited:?}")]
    TimedOut {
        /// Name of the semaphore.
        name: &'static str,
        /// How long the caller actually waited.
        waited: Duration,
    },
}

/// Errors raised by [`StateMachine`](crate::StateMachine) while pumping a graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MachineError {
    /// A state asked for a successor twice during one `update()`.
    #[error("state {state} requested a second transition ({first} then {second})")]
    TransitionAlreadyRequested {
        /// The state whose update misbehaved.
        state: &'static str,
        /// The successor requested first.
        first: &'static str,
        /// The successor requested second.
        second: &'static str,
    },

    /// A state named a successor its graph does not declare.
    #[error("illegal transition {from} -> {to} in machine {machine}")]
    IllegalTransition {
        /// Machine name.
        machine: &'static str,
        /// Source state.
        from: &'static str,
        /// Requested successor.
        to: &'static str,
    },

    /// `update()` was called after the machine was finished.
    #[error("machine {machine} already finished in state {state}")]
    Finished {
        /// Machine name.
        machine: &'static str,
        /// State the machine finished in.
        state: &'static str,
    },
}

/// Result type for machine operations.
pub type MachineResult<T> = Result<T, MachineError>;
