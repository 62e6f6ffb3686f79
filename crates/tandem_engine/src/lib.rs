//! # TANDEM Engine
//!
//! Frame synchronization between an application loop and a renderer loop.
//!
//! ```text
//!   ┌──────────────────────┐   render_begin    ┌──────────────────────┐
//!   │  APPLICATION THREAD  │ ────────────────► │    RENDER THREAD     │
//!   │  ApplicationGraph    │                   │    RendererGraph     │
//!   │  - window manager    │ ◄──────────────── │    - renderer        │
//!   │  - scene provider    │  render_complete  │    - present target  │
//!   └──────────┬───────────┘                   └──────────┬───────────┘
//!              │           ┌──────────────────┐           │
//!              └─────────► │  RenderContext   │ ◄─────────┘
//!                          │  FrameHandshake  │
//!                          │  SnapshotBuffer  │
//!                          └──────────────────┘
//! ```
//!
//! One frame is a strict ping-pong: the application publishes a scene
//! snapshot and releases `render_begin`; the renderer claims the snapshot,
//! renders, presents and releases `render_complete`. Frame N+1 never begins
//! before frame N completes.
//!
//! Shutdown is cooperative. Either side that sees the main window closing
//! goes `Stop → Destroy`; `Stop` closes the handshake so the peer is never
//! left blocked, and the application joins the render thread before it
//! reaches `Destroy`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod collaborators;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod handshake;
pub mod headless;
pub mod states;
pub mod stats;
pub mod trace;

pub use collaborators::{
    Camera, FrameInput, PresentTarget, Renderer, RendererFactory, Scene, SceneProvider, Window,
    WindowManager,
};
pub use config::{
    EngineConfig, HandshakeConfig, PacingConfig, RenderConfig, RendererKind, WindowConfig,
};
pub use context::{AppContext, ContextKind, ContextRegistry, ContextToken, RenderContext};
pub use engine::{Collaborators, Engine, EngineBuilder, EngineReport, EngineThread, ShutdownHandle};
pub use error::{CollaboratorError, EngineError, EngineResult, HandshakeError};
pub use handshake::{FrameHandshake, Signal};
pub use states::{ApplicationGraph, ApplicationState, RendererGraph, RendererState};
pub use stats::{FrameStats, FrameStatsAccumulator};
pub use tandem_core::{LoopHandle, LoopSummary, StateId};
pub use trace::{FrameTrace, Machine, SignalAction, TraceEvent, TraceReceiver};
