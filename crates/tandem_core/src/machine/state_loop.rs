//! Thread entry point for a state machine.
//!
//! ```text
//!   run():  while !stop_requested { machine.update()? }
//!           machine.finish()          ← terminal state's exit()
//! ```
//!
//! `stop()` only raises a flag. A loop parked inside a blocking state is
//! woken by whatever that state waits on, never by the loop itself.

use std::any::Any;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::graph::{StateGraph, StateId};
use super::state_machine::StateMachine;

#[derive(Debug, Default)]
struct LoopFlags {
    stop: AtomicBool,
    running: AtomicBool,
    finished: AtomicBool,
}

/// Cloneable remote control for a [`StateLoop`].
#[derive(Clone, Debug, Default)]
pub struct LoopHandle {
    flags: Arc<LoopFlags>,
}

impl LoopHandle {
    /// Creates a handle that is not yet attached to a running loop.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the loop to stop after its current pump. Idempotent, any thread.
    pub fn stop(&self) {
        if !self.flags.stop.swap(true, Ordering::AcqRel) {
            tracing::debug!("loop stop requested");
        }
    }

    /// Returns true once [`stop`](Self::stop) has been called.
    #[inline]
    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.flags.stop.load(Ordering::Acquire)
    }

    /// Returns true while `run()` is executing.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.flags.running.load(Ordering::Acquire)
    }

    /// Returns true once `run()` has returned, successfully or not.
    #[inline]
    #[must_use]
    pub fn has_finished(&self) -> bool {
        self.flags.finished.load(Ordering::Acquire)
    }
}

/// What a loop did before it returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopSummary<S> {
    /// Number of pumps performed.
    pub pumps: u64,
    /// Number of transitions applied.
    pub transitions: u64,
    /// State the machine was in when the loop stopped.
    pub final_state: S,
}

/// Pumps a [`StateMachine`] until told to stop.
#[derive(Debug)]
pub struct StateLoop<G: StateGraph> {
    machine: StateMachine<G>,
    handle: LoopHandle,
}

impl<G: StateGraph> StateLoop<G> {
    /// Creates a loop with a fresh handle.
    #[must_use]
    pub fn new(graph: G) -> Self {
        Self::with_handle(graph, LoopHandle::new())
    }

    /// Creates a loop controlled by an existing handle.
    ///
    /// Used when the graph itself needs the handle to stop its own loop.
    #[must_use]
    pub fn with_handle(graph: G, handle: LoopHandle) -> Self {
        Self {
            machine: StateMachine::new(graph),
            handle,
        }
    }

    /// Remote control for this loop.
    #[must_use]
    pub fn handle(&self) -> &LoopHandle {
        &self.handle
    }

    /// The machine being pumped.
    #[must_use]
    pub fn machine(&self) -> &StateMachine<G> {
        &self.machine
    }

    /// Exclusive access to the machine, for inspection after `run()`.
    pub fn machine_mut(&mut self) -> &mut StateMachine<G> {
        &mut self.machine
    }

    /// Runs the machine until [`LoopHandle::stop`] is called.
    ///
    /// The current state's `exit()` runs before this returns.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a state; the loop is marked
    /// finished and the failing state is not exited.
    pub fn run(&mut self) -> Result<LoopSummary<G::State>, G::Error> {
        let flags = Arc::clone(&self.handle.flags);
        flags.running.store(true, Ordering::Release);
        tracing::debug!(machine = G::NAME, "loop started");

        let result = self.pump_until_stopped();

        flags.running.store(false, Ordering::Release);
        flags.finished.store(true, Ordering::Release);
        match &result {
            Ok(summary) => tracing::debug!(
                machine = G::NAME,
                pumps = summary.pumps,
                state = summary.final_state.name(),
                "loop finished"
            ),
            Err(_) => tracing::error!(
                machine = G::NAME,
                state = self.machine.state().name(),
                "loop aborted by state failure"
            ),
        }
        result
    }

    fn pump_until_stopped(&mut self) -> Result<LoopSummary<G::State>, G::Error> {
        while !self.handle.is_stop_requested() {
            self.machine.update()?;
        }
        self.machine.finish()?;
        Ok(LoopSummary {
            pumps: self.machine.pumps(),
            transitions: self.machine.transitions(),
            final_state: self.machine.state(),
        })
    }
}

impl<G> StateLoop<G>
where
    G: StateGraph + Send + 'static,
    G::State: Send,
    G::Error: Send + 'static,
{
    /// Runs the loop on a new named OS thread.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the thread could not be spawned.
    pub fn spawn(mut self, name: &str) -> io::Result<LoopThread<G>> {
        let handle = self.handle.clone();
        let join = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || self.run())?;
        Ok(LoopThread { handle, join })
    }
}

/// Result of joining a [`LoopThread`].
pub type LoopOutcome<G> = Result<
    Result<LoopSummary<<G as StateGraph>::State>, <G as StateGraph>::Error>,
    Box<dyn Any + Send + 'static>,
>;

/// A [`StateLoop`] running on its own thread.
#[derive(Debug)]
pub struct LoopThread<G: StateGraph> {
    handle: LoopHandle,
    join: JoinHandle<Result<LoopSummary<G::State>, G::Error>>,
}

impl<G: StateGraph> LoopThread<G> {
    /// Remote control for the running loop.
    #[must_use]
    pub fn handle(&self) -> &LoopHandle {
        &self.handle
    }

    /// Returns true once the thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Blocks until the loop thread exits.
    ///
    /// The outer `Err` carries a panic payload; the inner result is the
    /// loop's own.
    pub fn join(self) -> LoopOutcome<G> {
        self.join.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MachineError;
    use crate::machine::Transition;
    use std::time::Duration;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Phase {
        Spin,
        Done,
    }

    impl StateId for Phase {
        const ALL: &'static [Self] = &[Phase::Spin, Phase::Done];

        fn name(self) -> &'static str {
            match self {
                Phase::Spin => "Spin",
                Phase::Done => "Done",
            }
        }

        fn successors(self) -> &'static [Self] {
            match self {
                Phase::Spin => &[Phase::Spin, Phase::Done],
                Phase::Done => &[],
            }
        }
    }

    /// Spins `limit` times, then enters `Done` which stops its own loop.
    struct Countdown {
        limit: u32,
        spins: u32,
        exited_done: bool,
        handle: LoopHandle,
    }

    impl StateGraph for Countdown {
        type State = Phase;
        type Error = MachineError;
        const NAME: &'static str = "countdown";

        fn initial(&self) -> Phase {
            Phase::Spin
        }

        fn update(&mut self, state: Phase, next: &mut Transition<Phase>) -> Result<(), MachineError> {
            match state {
                Phase::Spin if self.spins < self.limit => {
                    self.spins += 1;
                    next.set_next_state(Phase::Spin)
                }
                Phase::Spin => next.set_next_state(Phase::Done),
                Phase::Done => {
                    self.handle.stop();
                    Ok(())
                }
            }
        }

        fn exit(&mut self, state: Phase) -> Result<(), MachineError> {
            if state == Phase::Done {
                self.exited_done = true;
            }
            Ok(())
        }
    }

    fn countdown(limit: u32) -> StateLoop<Countdown> {
        let handle = LoopHandle::new();
        StateLoop::with_handle(
            Countdown {
                limit,
                spins: 0,
                exited_done: false,
                handle: handle.clone(),
            },
            handle,
        )
    }

    #[test]
    fn test_terminal_state_stops_loop() {
        let mut state_loop = countdown(3);
        let summary = state_loop.run().unwrap();

        assert_eq!(summary.final_state, Phase::Done);
        assert_eq!(summary.transitions, 4);
        assert_eq!(summary.pumps, 5);
        assert!(state_loop.machine().graph().exited_done);
        assert!(state_loop.handle().has_finished());
        assert!(!state_loop.handle().is_running());
    }

    #[test]
    fn test_stop_before_run_only_finishes() {
        let mut state_loop = countdown(3);
        state_loop.handle().stop();
        state_loop.handle().stop();

        let summary = state_loop.run().unwrap();
        assert_eq!(summary.pumps, 0);
        assert_eq!(summary.final_state, Phase::Spin);
    }

    #[test]
    fn test_stop_from_another_thread() {
        let state_loop = countdown(u32::MAX);
        let thread = state_loop.spawn("countdown").unwrap();

        while !thread.handle().is_running() {
            std::thread::sleep(Duration::from_millis(1));
        }
        thread.handle().stop();

        let summary = thread.join().unwrap().unwrap();
        assert_eq!(summary.final_state, Phase::Spin);
        assert!(summary.pumps > 0);
    }

    #[test]
    fn test_spawned_loop_runs_to_terminal() {
        let thread = countdown(10).spawn("countdown").unwrap();
        let handle = thread.handle().clone();

        let summary = thread.join().unwrap().unwrap();
        assert_eq!(summary.final_state, Phase::Done);
        assert!(handle.has_finished());
        assert!(handle.is_stop_requested());
    }
}
