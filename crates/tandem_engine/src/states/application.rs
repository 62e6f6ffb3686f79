//! # Application Graph
//!
//! ```text
//!   Initialize ─► Start ─► Ready ─► Resume ─► FrameBegin ─► WaitRenderer ─► FrameEnd ─► SignalHandle
//!                   │                 ▲                          │                        │    │
//!                   │                 └───────── Pause ◄─────────┼────────────────────────┘    │
//!                   │ (failed)                                   │ (closed)         (closing)  │
//!                   ▼                                            ▼                             │
//!                 Stop ◄─────────────────────────────────────────┴─────────────────────────────┘
//!                   │
//!                   ▼
//!                Destroy
//! ```
//!
//! Owns the window manager and the scene provider. Spawns the renderer loop
//! in `Start` and joins it in `Stop`.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tandem_core::{LoopHandle, LoopSummary, LoopThread, StateGraph, StateId, StateLoop, Transition};

use crate::collaborators::{SceneProvider, WindowManager};
use crate::config::EngineConfig;
use crate::context::{AppContext, RenderContext};
use crate::error::{EngineError, EngineResult, HandshakeError};
use crate::states::renderer::{RendererGraph, RendererState};
use crate::stats::{FrameStats, FrameStatsAccumulator, DEFAULT_FRAME_BUDGET};
use crate::trace::{FrameTrace, Machine};

/// Name of the thread the renderer loop runs on.
pub const RENDER_THREAD_NAME: &str = "tandem-render";

/// States of the application loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ApplicationState {
    /// Create the main window.
    Initialize,
    /// Spawn the renderer loop and wait until it is ready.
    Start,
    /// Show the main window.
    Ready,
    /// Top of the per-frame cycle.
    Resume,
    /// Publish the scene and hand the frame to the renderer.
    FrameBegin,
    /// Block until the renderer completes the frame.
    WaitRenderer,
    /// Record frame timing.
    FrameEnd,
    /// Check for shutdown and pump window events.
    SignalHandle,
    /// Minimized backoff and frame pacing.
    Pause,
    /// Close the handshake and join the renderer thread.
    Stop,
    /// Retire the context and stop this loop.
    Destroy,
}

impl StateId for ApplicationState {
    const ALL: &'static [Self] = &[
        Self::Initialize,
        Self::Start,
        Self::Ready,
        Self::Resume,
        Self::FrameBegin,
        Self::WaitRenderer,
        Self::FrameEnd,
        Self::SignalHandle,
        Self::Pause,
        Self::Stop,
        Self::Destroy,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Initialize => "Initialize",
            Self::Start => "Start",
            Self::Ready => "Ready",
            Self::Resume => "Resume",
            Self::FrameBegin => "FrameBegin",
            Self::WaitRenderer => "WaitRenderer",
            Self::FrameEnd => "FrameEnd",
            Self::SignalHandle => "SignalHandle",
            Self::Pause => "Pause",
            Self::Stop => "Stop",
            Self::Destroy => "Destroy",
        }
    }

    fn successors(self) -> &'static [Self] {
        match self {
            Self::Initialize => &[Self::Start],
            Self::Start => &[Self::Ready, Self::Stop],
            Self::Ready => &[Self::Resume],
            Self::Resume => &[Self::FrameBegin],
            Self::FrameBegin => &[Self::WaitRenderer],
            Self::WaitRenderer => &[Self::FrameEnd, Self::Stop],
            Self::FrameEnd => &[Self::SignalHandle],
            Self::SignalHandle => &[Self::Stop, Self::Pause],
            Self::Pause => &[Self::Resume],
            Self::Stop => &[Self::Destroy],
            Self::Destroy => &[],
        }
    }
}

/// Behavior of the application loop.
pub struct ApplicationGraph {
    app: Arc<AppContext>,
    render: Arc<RenderContext>,
    window_manager: Box<dyn WindowManager>,
    scene: Arc<dyn SceneProvider>,
    config: EngineConfig,
    handle: LoopHandle,
    trace: Option<FrameTrace>,

    renderer_loop: Option<StateLoop<RendererGraph>>,
    renderer_thread: Option<LoopThread<RendererGraph>>,
    renderer_summary: Option<LoopSummary<RendererState>>,
    failure: Option<EngineError>,

    stats: FrameStatsAccumulator,
    frame_started: Option<Instant>,
    wait_us: u64,
}

impl ApplicationGraph {
    /// Wires the application loop to its contexts and collaborators.
    ///
    /// `renderer_loop` is spawned on its own thread when `Start` runs.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        app: Arc<AppContext>,
        render: Arc<RenderContext>,
        window_manager: Box<dyn WindowManager>,
        scene: Arc<dyn SceneProvider>,
        config: EngineConfig,
        handle: LoopHandle,
        renderer_loop: StateLoop<RendererGraph>,
        trace: Option<FrameTrace>,
    ) -> Self {
        let budget = config.pacing.frame_budget().unwrap_or(DEFAULT_FRAME_BUDGET);
        Self {
            app,
            render,
            window_manager,
            scene,
            config,
            handle,
            trace,
            renderer_loop: Some(renderer_loop),
            renderer_thread: None,
            renderer_summary: None,
            failure: None,
            stats: FrameStatsAccumulator::new(budget),
            frame_started: None,
            wait_us: 0,
        }
    }

    /// Frame timing gathered so far.
    #[must_use]
    pub fn stats(&self) -> &FrameStatsAccumulator {
        &self.stats
    }

    /// Summary of the renderer loop, once it has been joined.
    #[must_use]
    pub fn renderer_summary(&self) -> Option<LoopSummary<RendererState>> {
        self.renderer_summary
    }

    /// Takes the first failure recorded during a graceful shutdown.
    pub fn take_failure(&mut self) -> Option<EngineError> {
        self.failure.take()
    }

    /// Tears the renderer down after the application loop aborted.
    ///
    /// A stalled renderer is detached; anything else is joined.
    pub(crate) fn abandon(&mut self, cause: &EngineError) {
        self.render.handshake().close();
        let Some(thread) = self.renderer_thread.take() else {
            return;
        };
        thread.handle().stop();
        if cause.is_stall() && !thread.is_finished() {
            tracing::warn!("detaching stalled renderer thread");
            drop(thread);
        } else {
            self.join_renderer(thread);
        }
    }

    fn record_failure(&mut self, error: EngineError) {
        if self.failure.is_none() {
            self.failure = Some(error);
        } else {
            tracing::warn!(%error, "additional failure during shutdown");
        }
    }

    fn join_renderer(&mut self, thread: LoopThread<RendererGraph>) {
        match thread.join() {
            Ok(Ok(summary)) => {
                tracing::info!(
                    frames = self.render.frames_rendered(),
                    state = summary.final_state.name(),
                    "renderer joined"
                );
                self.renderer_summary = Some(summary);
            }
            Ok(Err(error)) => {
                tracing::error!(%error, "renderer loop failed");
                self.record_failure(EngineError::RendererFailed(Box::new(error)));
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(%message, "renderer thread panicked");
                self.record_failure(EngineError::RendererPanicked(message));
            }
        }
    }

    fn start(&mut self, next: &mut Transition<ApplicationState>) -> EngineResult<()> {
        if let Some(renderer_loop) = self.renderer_loop.take() {
            self.renderer_thread = Some(renderer_loop.spawn(RENDER_THREAD_NAME)?);
        }

        match self.render.handshake().wait_renderer_ready() {
            Ok(()) => {}
            Err(HandshakeError::Closed { .. }) => {
                tracing::warn!("renderer exited before signaling ready");
                next.set_next_state(ApplicationState::Stop)?;
                return Ok(());
            }
            Err(stall) => return Err(stall.into()),
        }

        if let Some(error) = self.render.take_startup_failure() {
            tracing::error!(%error, "renderer failed to start");
            self.record_failure(EngineError::RendererStartup(error));
            next.set_next_state(ApplicationState::Stop)?;
        } else {
            next.set_next_state(ApplicationState::Ready)?;
        }
        Ok(())
    }

    fn pause(&mut self) {
        let minimized = self
            .app
            .main_window()
            .is_some_and(|window| window.is_minimized());
        if minimized && self.config.pacing.minimized_backoff {
            tracing::trace!("main window minimized, waiting for events");
            let handshake = self.render.handshake();
            handshake.set_application_idle(true);
            self.window_manager.wait_events();
            handshake.set_application_idle(false);
            return;
        }

        if let (Some(budget), Some(started)) =
            (self.config.pacing.frame_budget(), self.frame_started)
        {
            let elapsed = started.elapsed();
            if elapsed < budget {
                thread::sleep(budget - elapsed);
            }
        }
    }

    /// Closes the handshake and joins the renderer thread, if one is running.
    ///
    /// Also used after an external stop left the renderer mid-cycle.
    pub(crate) fn close_and_join(&mut self) {
        // Wake a renderer parked in WaitFrameBegin before joining it.
        self.render.handshake().close();
        if let Some(thread) = self.renderer_thread.take() {
            self.join_renderer(thread);
        }
    }
}

impl StateGraph for ApplicationGraph {
    type State = ApplicationState;
    type Error = EngineError;
    const NAME: &'static str = "application";

    fn initial(&self) -> ApplicationState {
        ApplicationState::Initialize
    }

    fn enter(&mut self, state: ApplicationState) -> EngineResult<()> {
        if let Some(trace) = &self.trace {
            trace.entered(Machine::Application, state.name());
        }
        if state == ApplicationState::Destroy {
            self.app.retire();
        }
        Ok(())
    }

    fn update(
        &mut self,
        state: ApplicationState,
        next: &mut Transition<ApplicationState>,
    ) -> EngineResult<()> {
        match state {
            ApplicationState::Initialize => {
                let window = &self.config.window;
                let main_window =
                    self.window_manager
                        .create_window(window.width, window.height, &window.title)?;
                self.app.set_main_window(main_window);
                tracing::info!(
                    width = window.width,
                    height = window.height,
                    title = %window.title,
                    "main window created"
                );
                next.set_next_state(ApplicationState::Start)?;
            }
            ApplicationState::Start => self.start(next)?,
            ApplicationState::Ready => {
                let window = self
                    .app
                    .main_window()
                    .ok_or(EngineError::MissingCollaborator("main window"))?;
                window.show();
                tracing::info!("application ready");
                next.set_next_state(ApplicationState::Resume)?;
            }
            ApplicationState::Resume => next.set_next_state(ApplicationState::FrameBegin)?,
            ApplicationState::FrameBegin => {
                self.frame_started = Some(Instant::now());
                let generation = self.render.scene().publish(self.scene.current_scene());
                tracing::trace!(generation, "scene published");
                self.render.handshake().signal_frame_begin();
                next.set_next_state(ApplicationState::WaitRenderer)?;
            }
            ApplicationState::WaitRenderer => {
                let waiting = Instant::now();
                match self.render.handshake().wait_frame_complete() {
                    Ok(()) => {
                        self.wait_us = micros(waiting.elapsed());
                        next.set_next_state(ApplicationState::FrameEnd)?;
                    }
                    Err(HandshakeError::Closed { .. }) => {
                        tracing::debug!("renderer closed the handshake");
                        next.set_next_state(ApplicationState::Stop)?;
                    }
                    Err(stall) => return Err(stall.into()),
                }
            }
            ApplicationState::FrameEnd => {
                let frame = self.app.record_frame();
                let total_us = self.frame_started.map_or(0, |started| micros(started.elapsed()));
                self.stats.record(FrameStats {
                    frame,
                    total_us,
                    wait_us: self.wait_us,
                });
                if total_us > micros(self.stats.budget()) {
                    tracing::debug!(frame, total_us, "frame exceeded budget");
                }
                next.set_next_state(ApplicationState::SignalHandle)?;
            }
            ApplicationState::SignalHandle => {
                if self.window_manager.windows().is_empty() || self.app.is_main_window_closing() {
                    tracing::info!(frames = self.app.frames(), "main window closing");
                    next.set_next_state(ApplicationState::Stop)?;
                } else {
                    self.window_manager.poll_events();
                    next.set_next_state(ApplicationState::Pause)?;
                }
            }
            ApplicationState::Pause => {
                self.pause();
                next.set_next_state(ApplicationState::Resume)?;
            }
            ApplicationState::Stop => {
                self.close_and_join();
                next.set_next_state(ApplicationState::Destroy)?;
            }
            ApplicationState::Destroy => self.handle.stop(),
        }
        Ok(())
    }
}

impl Drop for ApplicationGraph {
    fn drop(&mut self) {
        // An application loop that unwound never reached Stop.
        self.render.handshake().close();
        if let Some(thread) = self.renderer_thread.take() {
            thread.handle().stop();
            tracing::warn!("application graph dropped with the renderer running, detaching it");
        }
    }
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("unknown panic payload")
    }
}
