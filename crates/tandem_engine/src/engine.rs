//! # Engine Bootstrap
//!
//! Builds both contexts and both loops, and runs the application loop.
//!
//! ```rust,ignore
//! let engine = Engine::builder(config).build(Collaborators {
//!     window_manager: Box::new(HeadlessWindowManager::new().close_after_polls(600)),
//!     renderer_factory: Arc::new(HeadlessRendererFactory::new()),
//!     scene_provider: Arc::new(StaticSceneProvider::new(scene)),
//! })?;
//! let report = engine.run()?;
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tandem_core::{LoopHandle, LoopSummary, StateLoop};

use crate::collaborators::{RendererFactory, SceneProvider, WindowManager};
use crate::config::EngineConfig;
use crate::context::{AppContext, ContextRegistry, RenderContext};
use crate::error::{EngineError, EngineResult};
use crate::states::application::panic_message;
use crate::states::{ApplicationGraph, ApplicationState, RendererGraph, RendererState};
use crate::stats::FrameStatsAccumulator;
use crate::trace::FrameTrace;

/// Name of the thread [`Engine::spawn`] runs the application loop on.
pub const APP_THREAD_NAME: &str = "tandem-app";

/// The external collaborators an engine drives.
pub struct Collaborators {
    /// Windowing, used from the application thread only.
    pub window_manager: Box<dyn WindowManager>,
    /// Builds the renderer on the render thread.
    pub renderer_factory: Arc<dyn RendererFactory>,
    /// Source of the per-frame scene snapshot.
    pub scene_provider: Arc<dyn SceneProvider>,
}

/// Configures an [`Engine`].
#[derive(Debug)]
pub struct EngineBuilder {
    config: EngineConfig,
    registry: Option<Arc<ContextRegistry>>,
    trace: Option<FrameTrace>,
}

impl EngineBuilder {
    /// Starts from `config` and the process-wide registry.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: None,
            trace: None,
        }
    }

    /// Claims contexts from `registry` instead of the process-wide one.
    #[must_use]
    pub fn registry(mut self, registry: Arc<ContextRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Records state entries and handshake signals into `trace`.
    #[must_use]
    pub fn trace(mut self, trace: FrameTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Creates both contexts and both loops. Nothing runs yet.
    ///
    /// # Errors
    ///
    /// [`EngineError::Config`] for an invalid configuration, or
    /// [`EngineError::ContextExists`] while another engine holds the registry.
    pub fn build(self, collaborators: Collaborators) -> EngineResult<Engine> {
        self.config.validate()?;
        let registry = self.registry.unwrap_or_else(ContextRegistry::global);

        let app = Arc::new(AppContext::new(&registry)?);
        let render = Arc::new(RenderContext::new(
            &registry,
            &self.config,
            self.trace.clone(),
        )?);

        let render_handle = LoopHandle::new();
        let renderer_loop = StateLoop::with_handle(
            RendererGraph::new(
                Arc::clone(&render),
                Arc::clone(&app),
                collaborators.renderer_factory,
                render_handle.clone(),
                self.trace.clone(),
            ),
            render_handle.clone(),
        );

        let main_handle = LoopHandle::new();
        let app_loop = StateLoop::with_handle(
            ApplicationGraph::new(
                Arc::clone(&app),
                Arc::clone(&render),
                collaborators.window_manager,
                collaborators.scene_provider,
                self.config,
                main_handle.clone(),
                renderer_loop,
                self.trace,
            ),
            main_handle,
        );

        tracing::info!("engine built");
        Ok(Engine {
            app_loop,
            app,
            render,
            render_handle,
        })
    }
}

/// What a completed run produced.
#[derive(Clone, Debug)]
pub struct EngineReport {
    /// Frames the application completed.
    pub frames: u64,
    /// Frames the renderer rendered and presented.
    pub renderer_frames: u64,
    /// Pipelines built, first build included.
    pub pipeline_builds: u64,
    /// Application frame timing.
    pub stats: FrameStatsAccumulator,
    /// How the application loop ended.
    pub application: LoopSummary<ApplicationState>,
    /// How the renderer loop ended, if it was started and joined.
    pub renderer: Option<LoopSummary<RendererState>>,
}

/// Two loops, two contexts, one handshake.
pub struct Engine {
    app_loop: StateLoop<ApplicationGraph>,
    app: Arc<AppContext>,
    render: Arc<RenderContext>,
    render_handle: LoopHandle,
}

impl Engine {
    /// Starts configuring an engine.
    #[must_use]
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Handle of the application loop.
    #[must_use]
    pub fn main_loop(&self) -> &LoopHandle {
        self.app_loop.handle()
    }

    /// Handle of the renderer loop.
    #[must_use]
    pub fn render_loop(&self) -> &LoopHandle {
        &self.render_handle
    }

    /// The application context.
    #[must_use]
    pub fn app_context(&self) -> &Arc<AppContext> {
        &self.app
    }

    /// The render context.
    #[must_use]
    pub fn render_context(&self) -> &Arc<RenderContext> {
        &self.render
    }

    /// A handle that can stop this engine from any thread.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            main: self.main_loop().clone(),
            render: self.render_handle.clone(),
            context: Arc::clone(&self.render),
        }
    }

    /// Stops both loops and closes the handshake.
    pub fn shutdown(&self) {
        self.shutdown_handle().request();
    }

    /// Runs the application loop on the calling thread until it stops.
    ///
    /// # Errors
    ///
    /// The first failure of either loop. A renderer that could not start is
    /// reported as [`EngineError::RendererStartup`] after a clean shutdown.
    pub fn run(mut self) -> EngineResult<EngineReport> {
        tracing::info!("engine running");
        let outcome = self.app_loop.run();
        let graph = self.app_loop.machine_mut().graph_mut();

        let application = match outcome {
            Ok(summary) => summary,
            Err(error) => {
                graph.abandon(&error);
                return Err(error);
            }
        };
        graph.close_and_join();
        if let Some(error) = graph.take_failure() {
            return Err(error);
        }

        let report = EngineReport {
            frames: self.app.frames(),
            renderer_frames: self.render.frames_rendered(),
            pipeline_builds: self.render.pipeline_builds(),
            stats: graph.stats().clone(),
            application,
            renderer: graph.renderer_summary(),
        };
        tracing::info!(
            frames = report.frames,
            renderer_frames = report.renderer_frames,
            "engine stopped"
        );
        Ok(report)
    }

    /// Runs the application loop on its own named thread.
    ///
    /// # Errors
    ///
    /// [`EngineError::Spawn`] if the thread could not be created.
    pub fn spawn(self) -> EngineResult<EngineThread> {
        let shutdown = self.shutdown_handle();
        let join = thread::Builder::new()
            .name(APP_THREAD_NAME.to_owned())
            .spawn(move || self.run())?;
        Ok(EngineThread { shutdown, join })
    }
}

/// Stops an engine from outside its threads.
#[derive(Clone)]
pub struct ShutdownHandle {
    main: LoopHandle,
    render: LoopHandle,
    context: Arc<RenderContext>,
}

impl ShutdownHandle {
    /// Stops both loops and wakes anything blocked in the handshake.
    pub fn request(&self) {
        tracing::info!("shutdown requested");
        self.main.stop();
        self.render.stop();
        self.context.handshake().close();
    }
}

/// An engine running on its own thread.
pub struct EngineThread {
    shutdown: ShutdownHandle,
    join: JoinHandle<EngineResult<EngineReport>>,
}

impl EngineThread {
    /// Stops the engine.
    pub fn shutdown(&self) {
        self.shutdown.request();
    }

    /// Returns true once the application thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the engine to stop.
    ///
    /// # Errors
    ///
    /// The engine's own error, or [`EngineError::ApplicationPanicked`].
    pub fn join(self) -> EngineResult<EngineReport> {
        self.join
            .join()
            .map_err(|payload| EngineError::ApplicationPanicked(panic_message(payload.as_ref())))?
    }
}
