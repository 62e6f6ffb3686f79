//! # TANDEM Core
//!
//! Engine-agnostic building blocks for running two state machines on two
//! threads in lock-step:
//!
//! - [`Semaphore`]: counting permits with close and deadline support
//! - [`SnapshotBuffer`]: double-buffered hand-off of immutable snapshots
//! - [`StateMachine`] / [`StateLoop`]: tagged-union state graphs and the
//!   loop that pumps them until a terminal state stops it
//!
//! ## Example
//!
//! ```rust,ignore
//! use tandem_core::{LoopHandle, StateLoop};
//!
//! let handle = LoopHandle::new();
//! let mut state_loop = StateLoop::with_handle(MyGraph::new(handle.clone()), handle);
//! let summary = state_loop.run()?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod machine;
pub mod sync;

pub use error::{MachineError, MachineResult, SyncError};
pub use machine::{
    LoopHandle, LoopOutcome, LoopSummary, LoopThread, StateGraph, StateId, StateLoop, StateMachine,
    Step, Transition,
};
pub use sync::{Semaphore, SnapshotBuffer, SnapshotClaim};
