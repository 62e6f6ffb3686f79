//! State identifiers, graphs and the per-pump transition slot.

use std::fmt::Debug;

use crate::error::MachineError;

/// A closed set of states known to one machine.
///
/// Implemented by plain `enum`s. The whole graph is declared statically
/// through [`ALL`](StateId::ALL) and [`successors`](StateId::successors),
/// which is what makes graphs enumerable in tests.
pub trait StateId: Copy + Eq + Debug + Send + Sync + 'static {
    /// Every state of the graph, in declaration order.
    const ALL: &'static [Self];

    /// Human-readable name for logs and errors.
    fn name(self) -> &'static str;

    /// States this state may hand control to.
    fn successors(self) -> &'static [Self];

    /// A terminal state has no successors; its loop stops there.
    fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }
}

/// Behavior attached to a [`StateId`] set.
///
/// A graph owns whatever its states operate on (contexts, collaborators).
/// The machine calls `enter` once when a state becomes current, `update`
/// on every pump, and `exit` once before the state is replaced.
pub trait StateGraph {
    /// The state identifiers of this graph.
    type State: StateId;

    /// Failure type for state hooks.
    type Error: From<MachineError>;

    /// Machine name for logs.
    const NAME: &'static str;

    /// State the machine starts in.
    fn initial(&self) -> Self::State;

    /// Called once when `state` becomes current.
    ///
    /// # Errors
    ///
    /// Propagated out of the pump that performed the transition.
    fn enter(&mut self, _state: Self::State) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Runs one pump of `state`. May request a successor through `next`.
    ///
    /// # Errors
    ///
    /// Propagated out of [`StateMachine::update`](crate::StateMachine::update).
    fn update(
        &mut self,
        state: Self::State,
        next: &mut Transition<Self::State>,
    ) -> Result<(), Self::Error>;

    /// Called once before `state` is replaced or the machine finishes.
    ///
    /// # Errors
    ///
    /// Propagated out of the pump that performed the transition.
    fn exit(&mut self, _state: Self::State) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Pending-next-state slot handed to [`StateGraph::update`].
///
/// At most one successor may be requested per pump.
#[derive(Debug)]
pub struct Transition<S: StateId> {
    current: S,
    next: Option<S>,
}

impl<S: StateId> Transition<S> {
    pub(crate) fn new(current: S) -> Self {
        Self {
            current,
            next: None,
        }
    }

    /// Requests `state` as successor once the current `update()` returns.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::TransitionAlreadyRequested`] if a successor
    /// was already requested during this pump. The first request stands.
    pub fn set_next_state(&mut self, state: S) -> Result<(), MachineError> {
        if let Some(first) = self.next {
            return Err(MachineError::TransitionAlreadyRequested {
                state: self.current.name(),
                first: first.name(),
                second: state.name(),
            });
        }
        self.next = Some(state);
        Ok(())
    }

    pub(crate) fn take(&mut self) -> Option<S> {
        self.next.take()
    }
}

/// Outcome of one [`StateMachine::update`](crate::StateMachine::update).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step<S> {
    /// No successor was requested; the state stays current.
    Stayed(S),
    /// The machine moved from one state to another.
    Moved {
        /// State that was exited.
        from: S,
        /// State that was entered.
        to: S,
    },
}

impl<S: Copy> Step<S> {
    /// State that is current after the step.
    #[must_use]
    pub fn current(self) -> S {
        match self {
            Step::Stayed(state) | Step::Moved { to: state, .. } => state,
        }
    }
}
