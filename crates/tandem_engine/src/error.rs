//! # Engine Error Types
//!
//! All errors that can occur while bootstrapping or running the two loops.

use std::io;
use std::time::Duration;

use tandem_core::MachineError;
use thiserror::Error;

use crate::context::ContextKind;
use crate::handshake::Signal;

/// Failures reported by external collaborators (renderer, window manager).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The render device could not be created.
    #[error("device creation failed: {0}")]
    DeviceCreation(String),

    /// The present target could not be created or was lost.
    #[error("present target unavailable: {0}")]
    SurfaceLost(String),

    /// The window manager refused to create a window.
    #[error("window creation failed: {0}")]
    WindowCreation(String),

    /// Submitting or presenting a frame failed.
    #[error("frame submission failed: {0}")]
    Submission(String),
}

/// Failures of a handshake wait.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// The handshake was closed; the peer has shut down or died.
    #[error("handshake closed while waiting for {signal}")]
    Closed {
        /// Signal that was being waited on.
        signal: Signal,
    },

    /// The peer did not signal within the configured timeout.
    #[error("peer stalled: no {signal} after {waited:?}")]
    Stalled {
        /// Signal that was being waited on.
        signal: Signal,
        /// How long the wait lasted.
        waited: Duration,
    },
}

/// Errors that can occur in the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A context of this kind is already alive.
    #[error("invalid state: {0} context already exists")]
    ContextExists(ContextKind),

    /// The configuration is malformed or out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The state machine runtime rejected a transition.
    #[error(transparent)]
    Machine(#[from] MachineError),

    /// A handshake wait failed.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// A collaborator call failed.
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// The renderer could not be created; the engine shut down cleanly.
    #[error("renderer failed to start: {0}")]
    RendererStartup(#[source] CollaboratorError),

    /// The renderer loop aborted with an error.
    #[error("renderer loop failed: {0}")]
    RendererFailed(#[source] Box<EngineError>),

    /// The renderer thread panicked.
    #[error("renderer thread panicked: {0}")]
    RendererPanicked(String),

    /// The application thread started by `Engine::spawn` panicked.
    #[error("application thread panicked: {0}")]
    ApplicationPanicked(String),

    /// A loop thread could not be spawned.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] io::Error),

    /// A state needed a collaborator that does not exist yet.
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),
}

impl EngineError {
    /// Returns true if this error reports a peer that stopped responding.
    #[must_use]
    pub fn is_stall(&self) -> bool {
        matches!(self, EngineError::Handshake(HandshakeError::Stalled { .. }))
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
