//! # Renderer Graph
//!
//! ```text
//!   Initialize ─► Start ─► Ready ─► WaitFrameBegin ◄─────────────────────────────┐
//!       │                                 │                                      │
//!       │                                 ▼                                      │
//!       │                          ValidatePipeline ──(invalid)─► DestroyPipeline │
//!       │                                 │ (valid)                    ▼          │
//!       │                                 │                  DestroyRenderTarget │
//!       │                                 │                            ▼          │
//!       │                                 │                   CreateRenderTarget │
//!       │                                 │                            ▼          │
//!       │                                 ▼                     CreatePipeline   │
//!       │                              WaitECS ◄───────────────────────┘          │
//!       │                                 ▼                                      │
//!       │                             BlockECS ─► PerformPipeline ─► ReleaseECS   │
//!       │                                                                ▼       │
//!       │                                                            FrameEnd    │
//!       │                                                                ▼       │
//!       │ (failed)            WaitFrameBegin (closed)               SignalHandle ─┘
//!       ▼                              │                                 │ (closing)
//!     Stop ◄───────────────────────────┴─────────────────────────────────┘
//!       ▼
//!    Destroy
//! ```
//!
//! Runs on the render thread. The renderer and present target are only
//! touched here.

use std::sync::Arc;

use tandem_core::{LoopHandle, SnapshotClaim, StateGraph, StateId, Transition};

use crate::collaborators::{FrameInput, RendererFactory, Scene};
use crate::context::{AppContext, RenderContext};
use crate::error::{EngineError, EngineResult, HandshakeError};
use crate::trace::{FrameTrace, Machine};

/// States of the renderer loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RendererState {
    /// Create the renderer and signal readiness.
    Initialize,
    /// Renderer created.
    Start,
    /// About to enter the frame cycle.
    Ready,
    /// Block until the application begins a frame.
    WaitFrameBegin,
    /// Check the present target.
    ValidatePipeline,
    /// Tear down the pipeline before a rebuild.
    DestroyPipeline,
    /// Drop the present target before a rebuild.
    DestroyRenderTarget,
    /// Create a new present target.
    CreateRenderTarget,
    /// Build the pipeline for the new target.
    CreatePipeline,
    /// About to claim the scene.
    WaitEcs,
    /// Claim this frame's scene snapshot.
    BlockEcs,
    /// Render and present the claimed scene.
    PerformPipeline,
    /// Release the scene snapshot.
    ReleaseEcs,
    /// Signal the application that the frame is done.
    FrameEnd,
    /// Check for shutdown.
    SignalHandle,
    /// Close the handshake.
    Stop,
    /// Release the device and stop this loop.
    Destroy,
}

impl StateId for RendererState {
    const ALL: &'static [Self] = &[
        Self::Initialize,
        Self::Start,
        Self::Ready,
        Self::WaitFrameBegin,
        Self::ValidatePipeline,
        Self::DestroyPipeline,
        Self::DestroyRenderTarget,
        Self::CreateRenderTarget,
        Self::CreatePipeline,
        Self::WaitEcs,
        Self::BlockEcs,
        Self::PerformPipeline,
        Self::ReleaseEcs,
        Self::FrameEnd,
        Self::SignalHandle,
        Self::Stop,
        Self::Destroy,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Initialize => "Initialize",
            Self::Start => "Start",
            Self::Ready => "Ready",
            Self::WaitFrameBegin => "WaitFrameBegin",
            Self::ValidatePipeline => "ValidatePipeline",
            Self::DestroyPipeline => "DestroyPipeline",
            Self::DestroyRenderTarget => "DestroyRenderTarget",
            Self::CreateRenderTarget => "CreateRenderTarget",
            Self::CreatePipeline => "CreatePipeline",
            Self::WaitEcs => "WaitECS",
            Self::BlockEcs => "BlockECS",
            Self::PerformPipeline => "PerformPipeline",
            Self::ReleaseEcs => "ReleaseECS",
            Self::FrameEnd => "FrameEnd",
            Self::SignalHandle => "SignalHandle",
            Self::Stop => "Stop",
            Self::Destroy => "Destroy",
        }
    }

    fn successors(self) -> &'static [Self] {
        match self {
            Self::Initialize => &[Self::Start, Self::Stop],
            Self::Start => &[Self::Ready],
            Self::Ready => &[Self::WaitFrameBegin],
            Self::WaitFrameBegin => &[Self::ValidatePipeline, Self::Stop],
            Self::ValidatePipeline => &[Self::DestroyPipeline, Self::WaitEcs],
            Self::DestroyPipeline => &[Self::DestroyRenderTarget],
            Self::DestroyRenderTarget => &[Self::CreateRenderTarget],
            Self::CreateRenderTarget => &[Self::CreatePipeline],
            Self::CreatePipeline => &[Self::WaitEcs],
            Self::WaitEcs => &[Self::BlockEcs],
            Self::BlockEcs => &[Self::PerformPipeline],
            Self::PerformPipeline => &[Self::ReleaseEcs],
            Self::ReleaseEcs => &[Self::FrameEnd],
            Self::FrameEnd => &[Self::SignalHandle],
            Self::SignalHandle => &[Self::Stop, Self::WaitFrameBegin],
            Self::Stop => &[Self::Destroy],
            Self::Destroy => &[],
        }
    }
}

/// Behavior of the renderer loop.
///
/// Dropping the graph closes the handshake, so the application never waits
/// on a render thread that has exited, whether it returned, failed or
/// panicked.
pub struct RendererGraph {
    render: Arc<RenderContext>,
    app: Arc<AppContext>,
    factory: Arc<dyn RendererFactory>,
    handle: LoopHandle,
    trace: Option<FrameTrace>,
    claim: Option<SnapshotClaim<Scene>>,
}

impl RendererGraph {
    /// Wires the renderer loop to both contexts and the renderer factory.
    #[must_use]
    pub fn new(
        render: Arc<RenderContext>,
        app: Arc<AppContext>,
        factory: Arc<dyn RendererFactory>,
        handle: LoopHandle,
        trace: Option<FrameTrace>,
    ) -> Self {
        Self {
            render,
            app,
            factory,
            handle,
            trace,
            claim: None,
        }
    }

    fn initialize(&mut self, next: &mut Transition<RendererState>) -> EngineResult<()> {
        let config = self.render.config();
        match self.factory.create(config.kind, config) {
            Ok(renderer) => {
                self.render.install_renderer(renderer);
                tracing::info!(kind = ?config.kind, "renderer created");
                self.render.handshake().signal_renderer_ready();
                next.set_next_state(RendererState::Start)?;
            }
            Err(error) => {
                tracing::error!(%error, "renderer creation failed");
                // The payload must be visible before the application wakes.
                self.render.record_startup_failure(error);
                self.render.handshake().signal_renderer_ready();
                next.set_next_state(RendererState::Stop)?;
            }
        }
        Ok(())
    }

    fn perform_pipeline(&mut self) -> EngineResult<()> {
        let claim = self.claim.as_ref();
        let input = FrameInput {
            frame: self.render.frames_rendered() + 1,
            scene: claim.and_then(SnapshotClaim::get),
            scene_generation: claim.map_or(0, SnapshotClaim::generation),
        };
        self.render.with_renderer(|renderer| renderer.render(&input))??;
        self.render.present()?;
        self.render.record_frame_rendered();
        Ok(())
    }

    /// Drops the present target, then cleans up and drops the renderer.
    fn release_device(&mut self) {
        self.claim = None;
        drop(self.render.take_present_target());
        if let Some(mut renderer) = self.render.take_renderer() {
            renderer.cleanup();
            tracing::info!(frames = self.render.frames_rendered(), "renderer released");
        }
    }
}

impl StateGraph for RendererGraph {
    type State = RendererState;
    type Error = EngineError;
    const NAME: &'static str = "renderer";

    fn initial(&self) -> RendererState {
        RendererState::Initialize
    }

    fn enter(&mut self, state: RendererState) -> EngineResult<()> {
        if let Some(trace) = &self.trace {
            trace.entered(Machine::Renderer, state.name());
        }
        if state == RendererState::Destroy {
            self.release_device();
            self.render.retire();
        }
        Ok(())
    }

    fn update(
        &mut self,
        state: RendererState,
        next: &mut Transition<RendererState>,
    ) -> EngineResult<()> {
        match state {
            RendererState::Initialize => self.initialize(next)?,
            RendererState::Start => next.set_next_state(RendererState::Ready)?,
            RendererState::Ready => next.set_next_state(RendererState::WaitFrameBegin)?,
            RendererState::WaitFrameBegin => match self.render.handshake().wait_frame_begin() {
                Ok(()) => next.set_next_state(RendererState::ValidatePipeline)?,
                Err(HandshakeError::Closed { .. }) => {
                    tracing::debug!("application closed the handshake");
                    next.set_next_state(RendererState::Stop)?;
                }
                Err(stall) => return Err(stall.into()),
            },
            RendererState::ValidatePipeline => {
                if self.render.is_present_target_valid() {
                    next.set_next_state(RendererState::WaitEcs)?;
                } else {
                    tracing::debug!("present target missing or invalid, rebuilding pipeline");
                    next.set_next_state(RendererState::DestroyPipeline)?;
                }
            }
            RendererState::DestroyPipeline => {
                self.render.with_renderer(|renderer| renderer.destroy_pipeline())?;
                next.set_next_state(RendererState::DestroyRenderTarget)?;
            }
            RendererState::DestroyRenderTarget => {
                drop(self.render.take_present_target());
                next.set_next_state(RendererState::CreateRenderTarget)?;
            }
            RendererState::CreateRenderTarget => {
                let target = self
                    .render
                    .with_renderer(|renderer| renderer.create_present_target())??;
                self.render.install_present_target(target);
                next.set_next_state(RendererState::CreatePipeline)?;
            }
            RendererState::CreatePipeline => {
                self.render.build_pipeline()?;
                tracing::debug!(builds = self.render.pipeline_builds(), "pipeline built");
                next.set_next_state(RendererState::WaitEcs)?;
            }
            RendererState::WaitEcs => next.set_next_state(RendererState::BlockEcs)?,
            RendererState::BlockEcs => {
                self.claim = Some(self.render.scene().claim());
                next.set_next_state(RendererState::PerformPipeline)?;
            }
            RendererState::PerformPipeline => {
                self.perform_pipeline()?;
                next.set_next_state(RendererState::ReleaseEcs)?;
            }
            RendererState::ReleaseEcs => {
                self.claim = None;
                next.set_next_state(RendererState::FrameEnd)?;
            }
            RendererState::FrameEnd => {
                self.render.handshake().signal_frame_complete();
                next.set_next_state(RendererState::SignalHandle)?;
            }
            RendererState::SignalHandle => {
                if self.app.is_main_window_closing() {
                    tracing::info!("main window closing, renderer stopping");
                    next.set_next_state(RendererState::Stop)?;
                } else {
                    next.set_next_state(RendererState::WaitFrameBegin)?;
                }
            }
            RendererState::Stop => {
                // Wake an application parked in WaitRenderer.
                self.render.handshake().close();
                next.set_next_state(RendererState::Destroy)?;
            }
            RendererState::Destroy => self.handle.stop(),
        }
        Ok(())
    }
}

impl Drop for RendererGraph {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            self.release_device();
        }
        self.render.handshake().close();
    }
}
