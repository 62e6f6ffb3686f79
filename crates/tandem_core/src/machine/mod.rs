//! # State Machines
//!
//! A machine is a closed set of states (an `enum` implementing [`StateId`])
//! plus a [`StateGraph`] holding whatever those states operate on.
//!
//! ```text
//!   StateLoop ──pumps──► StateMachine ──calls──► StateGraph::{enter, update, exit}
//!       ▲                                              │
//!       └──────────── LoopHandle::stop() ◄─────────────┘  (terminal state)
//! ```
//!
//! Successors are declared per state, so an undeclared transition is an
//! error instead of a silent jump.

mod graph;
mod state_loop;
mod state_machine;

pub use graph::{StateGraph, StateId, Step, Transition};
pub use state_loop::{LoopHandle, LoopOutcome, LoopSummary, LoopThread, StateLoop};
pub use state_machine::StateMachine;
