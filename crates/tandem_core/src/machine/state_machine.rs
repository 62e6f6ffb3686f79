//! Transition-by-replacement over a [`StateGraph`].

use crate::error::MachineError;

use super::graph::{StateGraph, StateId, Step, Transition};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Created,
    Active,
    Finished,
}

/// Owns exactly one live state of a graph at a time.
///
/// ```text
/// update():
///   current.update(next)
///   if next requested:
///       current.exit()  →  next.enter()  →  current = next
/// ```
#[derive(Debug)]
pub struct StateMachine<G: StateGraph> {
    graph: G,
    current: G::State,
    phase: Phase,
    pumps: u64,
    transitions: u64,
}

impl<G: StateGraph> StateMachine<G> {
    /// Creates a machine positioned at the graph's initial state.
    ///
    /// The initial state is entered on the first [`update`](Self::update).
    #[must_use]
    pub fn new(graph: G) -> Self {
        let current = graph.initial();
        Self {
            graph,
            current,
            phase: Phase::Created,
            pumps: 0,
            transitions: 0,
        }
    }

    /// The current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> G::State {
        self.current
    }

    /// Number of `update()` calls performed.
    #[inline]
    #[must_use]
    pub fn pumps(&self) -> u64 {
        self.pumps
    }

    /// Number of transitions applied.
    #[inline]
    #[must_use]
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Returns true once [`finish`](Self::finish) has run.
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    /// Shared access to the graph.
    #[must_use]
    pub fn graph(&self) -> &G {
        &self.graph
    }

    /// Exclusive access to the graph.
    pub fn graph_mut(&mut self) -> &mut G {
        &mut self.graph
    }

    /// Consumes the machine, returning its graph.
    #[must_use]
    pub fn into_graph(self) -> G {
        self.graph
    }

    /// Runs one pump of the current state and applies any requested transition.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the state hooks, or a [`MachineError`]
    /// when the successor is not declared by the graph or the machine is
    /// already finished.
    pub fn update(&mut self) -> Result<Step<G::State>, G::Error> {
        match self.phase {
            Phase::Finished => {
                return Err(MachineError::Finished {
                    machine: G::NAME,
                    state: self.current.name(),
                }
                .into())
            }
            Phase::Created => {
                tracing::trace!(machine = G::NAME, state = self.current.name(), "enter initial");
                self.graph.enter(self.current)?;
                self.phase = Phase::Active;
            }
            Phase::Active => {}
        }

        self.pumps += 1;
        let from = self.current;
        let mut next = Transition::new(from);
        self.graph.update(from, &mut next)?;

        let Some(to) = next.take() else {
            return Ok(Step::Stayed(from));
        };

        if !from.successors().contains(&to) {
            return Err(MachineError::IllegalTransition {
                machine: G::NAME,
                from: from.name(),
                to: to.name(),
            }
            .into());
        }

        tracing::trace!(machine = G::NAME, from = from.name(), to = to.name(), "transition");
        self.graph.exit(from)?;
        self.graph.enter(to)?;
        self.current = to;
        self.transitions += 1;
        Ok(Step::Moved { from, to })
    }

    /// Exits the current state. Idempotent.
    ///
    /// A machine that was never pumped has nothing to exit.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the state's `exit` hook.
    pub fn finish(&mut self) -> Result<(), G::Error> {
        let was_active = self.phase == Phase::Active;
        self.phase = Phase::Finished;
        if was_active {
            tracing::trace!(machine = G::NAME, state = self.current.name(), "finish");
            self.graph.exit(self.current)?;
        }
        Ok(())
    }
}
