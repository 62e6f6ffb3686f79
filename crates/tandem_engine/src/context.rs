//! # Engine Contexts
//!
//! The two long-lived rendezvous objects shared by both loops.
//!
//! At most one [`AppContext`] and one [`RenderContext`] may be alive per
//! [`ContextRegistry`]. Construction claims a [`ContextToken`]; dropping the
//! context drops the token and frees the slot for the next engine.
//!
//! ```text
//!   AppContext                     RenderContext
//!   ├── main window  ◄── read ──   ├── FrameHandshake
//!   ├── frame counter              ├── renderer        (render thread only)
//!   └── alive                      ├── present target  (render thread only)
//!                                  ├── scene snapshots
//!                                  ├── startup failure
//!                                  └── alive
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use tandem_core::SnapshotBuffer;

use crate::collaborators::{PresentTarget, Renderer, Scene, Window};
use crate::config::{EngineConfig, RenderConfig};
use crate::error::{CollaboratorError, EngineError, EngineResult};
use crate::handshake::FrameHandshake;
use crate::trace::FrameTrace;

// ============================================================================
// REGISTRY
// ============================================================================

/// The two context kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContextKind {
    /// [`AppContext`].
    Application,
    /// [`RenderContext`].
    Render,
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextKind::Application => f.write_str("application"),
            ContextKind::Render => f.write_str("render"),
        }
    }
}

/// Tracks which context kinds are alive.
#[derive(Debug, Default)]
pub struct ContextRegistry {
    application: AtomicBool,
    render: AtomicBool,
}

impl ContextRegistry {
    /// Creates an isolated registry.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The process-wide registry.
    #[must_use]
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<ContextRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(ContextRegistry::new))
    }

    /// Claims the slot for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ContextExists`] while another token of the
    /// same kind is alive.
    pub fn claim(self: &Arc<Self>, kind: ContextKind) -> EngineResult<ContextToken> {
        if self
            .slot(kind)
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::ContextExists(kind));
        }
        Ok(ContextToken {
            registry: Arc::clone(self),
            kind,
        })
    }

    /// Returns true while a token of `kind` is alive.
    #[must_use]
    pub fn is_claimed(&self, kind: ContextKind) -> bool {
        self.slot(kind).load(Ordering::Acquire)
    }

    fn slot(&self, kind: ContextKind) -> &AtomicBool {
        match kind {
            ContextKind::Application => &self.application,
            ContextKind::Render => &self.render,
        }
    }
}

/// Proof of ownership of a registry slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct ContextToken {
    registry: Arc<ContextRegistry>,
    kind: ContextKind,
}

impl ContextToken {
    /// The kind this token was claimed for.
    #[must_use]
    pub fn kind(&self) -> ContextKind {
        self.kind
    }
}

impl Drop for ContextToken {
    fn drop(&mut self) {
        self.registry.slot(self.kind).store(false, Ordering::Release);
    }
}

// ============================================================================
// APPLICATION CONTEXT
// ============================================================================

/// State the application loop shares with the renderer loop.
pub struct AppContext {
    token: ContextToken,
    alive: AtomicBool,
    main_window: RwLock<Option<Arc<dyn Window>>>,
    frames: AtomicU64,
}

impl AppContext {
    /// Claims the application slot in `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ContextExists`] if one is already alive.
    pub fn new(registry: &Arc<ContextRegistry>) -> EngineResult<Self> {
        Ok(Self {
            token: registry.claim(ContextKind::Application)?,
            alive: AtomicBool::new(true),
            main_window: RwLock::new(None),
            frames: AtomicU64::new(0),
        })
    }

    /// False once the application loop reached `Destroy`.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Marks the context as no longer usable.
    pub fn retire(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Installs the main window.
    pub fn set_main_window(&self, window: Arc<dyn Window>) {
        *self.main_window.write() = Some(window);
    }

    /// The main window, once `Initialize` created it.
    #[must_use]
    pub fn main_window(&self) -> Option<Arc<dyn Window>> {
        self.main_window.read().clone()
    }

    /// True if the main window is closing, or there is none.
    #[must_use]
    pub fn is_main_window_closing(&self) -> bool {
        self.main_window
            .read()
            .as_ref()
            .map_or(true, |window| window.is_closing())
    }

    /// Counts a finished frame and returns its 1-based index.
    pub fn record_frame(&self) -> u64 {
        self.frames.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Frames the application has completed.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// The registry token this context holds.
    #[must_use]
    pub fn token(&self) -> &ContextToken {
        &self.token
    }
}

impl fmt::Debug for AppContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppContext")
            .field("alive", &self.is_alive())
            .field("has_main_window", &self.main_window.read().is_some())
            .field("frames", &self.frames())
            .finish()
    }
}

// ============================================================================
// RENDER CONTEXT
// ============================================================================

/// State owned by the renderer loop and the handshake both loops share.
///
/// The renderer and present target are only touched from the render thread;
/// the locks make that safe to express, not contended.
pub struct RenderContext {
    token: ContextToken,
    alive: AtomicBool,
    config: RenderConfig,
    handshake: FrameHandshake,
    renderer: Mutex<Option<Box<dyn Renderer>>>,
    present_target: Mutex<Option<Box<dyn PresentTarget>>>,
    scene: SnapshotBuffer<Scene>,
    startup_failure: Mutex<Option<CollaboratorError>>,
    frames_rendered: AtomicU64,
    pipeline_builds: AtomicU64,
}

impl RenderContext {
    /// Claims the render slot in `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ContextExists`] if one is already alive.
    pub fn new(
        registry: &Arc<ContextRegistry>,
        config: &EngineConfig,
        trace: Option<FrameTrace>,
    ) -> EngineResult<Self> {
        Ok(Self {
            token: registry.claim(ContextKind::Render)?,
            alive: AtomicBool::new(true),
            config: config.render.clone(),
            handshake: FrameHandshake::new(config.handshake.timeout(), trace)
                .with_frame_budget(config.pacing.frame_budget()),
            renderer: Mutex::new(None),
            present_target: Mutex::new(None),
            scene: SnapshotBuffer::new(),
            startup_failure: Mutex::new(None),
            frames_rendered: AtomicU64::new(0),
            pipeline_builds: AtomicU64::new(0),
        })
    }

    /// False once the renderer loop reached `Destroy`.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Marks the context as no longer usable.
    pub fn retire(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Configuration the renderer is created with.
    #[must_use]
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// The frame handshake.
    #[must_use]
    pub fn handshake(&self) -> &FrameHandshake {
        &self.handshake
    }

    /// Scene snapshots published by the application at `FrameBegin`.
    #[must_use]
    pub fn scene(&self) -> &SnapshotBuffer<Scene> {
        &self.scene
    }

    /// The registry token this context holds.
    #[must_use]
    pub fn token(&self) -> &ContextToken {
        &self.token
    }

    // --- renderer slot ---

    /// Installs the renderer created by `Initialize`.
    pub fn install_renderer(&self, renderer: Box<dyn Renderer>) {
        *self.renderer.lock() = Some(renderer);
    }

    /// Returns true once a renderer is installed.
    #[must_use]
    pub fn has_renderer(&self) -> bool {
        self.renderer.lock().is_some()
    }

    /// Runs `f` against the installed renderer.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MissingCollaborator`] if there is none.
    pub fn with_renderer<R>(&self, f: impl FnOnce(&mut dyn Renderer) -> R) -> EngineResult<R> {
        let mut slot = self.renderer.lock();
        let renderer = slot
            .as_deref_mut()
            .ok_or(EngineError::MissingCollaborator("renderer"))?;
        Ok(f(renderer))
    }

    /// Removes the renderer from its slot.
    pub fn take_renderer(&self) -> Option<Box<dyn Renderer>> {
        self.renderer.lock().take()
    }

    // --- present target slot ---

    /// Returns true if a present target exists and is still valid.
    #[must_use]
    pub fn is_present_target_valid(&self) -> bool {
        self.present_target
            .lock()
            .as_ref()
            .is_some_and(|target| target.is_validated())
    }

    /// Returns true if a present target exists.
    #[must_use]
    pub fn has_present_target(&self) -> bool {
        self.present_target.lock().is_some()
    }

    /// Installs a freshly created present target.
    pub fn install_present_target(&self, target: Box<dyn PresentTarget>) {
        *self.present_target.lock() = Some(target);
    }

    /// Removes the present target from its slot.
    pub fn take_present_target(&self) -> Option<Box<dyn PresentTarget>> {
        self.present_target.lock().take()
    }

    /// Presents through the installed target.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MissingCollaborator`] if there is no target,
    /// or the target's own error.
    pub fn present(&self) -> EngineResult<()> {
        let mut slot = self.present_target.lock();
        let target = slot
            .as_deref_mut()
            .ok_or(EngineError::MissingCollaborator("present target"))?;
        target.present()?;
        Ok(())
    }

    /// Builds the renderer's pipeline against the installed target.
    ///
    /// Locks the renderer before the target; nothing locks them in the
    /// other order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MissingCollaborator`] if either slot is empty,
    /// or the renderer's own error.
    pub fn build_pipeline(&self) -> EngineResult<()> {
        let mut renderer_slot = self.renderer.lock();
        let renderer = renderer_slot
            .as_deref_mut()
            .ok_or(EngineError::MissingCollaborator("renderer"))?;
        let target_slot = self.present_target.lock();
        let target = target_slot
            .as_deref()
            .ok_or(EngineError::MissingCollaborator("present target"))?;
        renderer.create_pipeline(target)?;
        self.pipeline_builds.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    // --- startup failure payload ---

    /// Stores why the renderer could not be created.
    pub fn record_startup_failure(&self, error: CollaboratorError) {
        *self.startup_failure.lock() = Some(error);
    }

    /// Takes the stored startup failure, if any.
    pub fn take_startup_failure(&self) -> Option<CollaboratorError> {
        self.startup_failure.lock().take()
    }

    // --- counters ---

    /// Counts a rendered frame and returns its 1-based index.
    pub fn record_frame_rendered(&self) -> u64 {
        self.frames_rendered.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Frames rendered and presented so far.
    #[must_use]
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Acquire)
    }

    /// Pipelines built so far, first build included.
    #[must_use]
    pub fn pipeline_builds(&self) -> u64 {
        self.pipeline_builds.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("alive", &self.is_alive())
            .field("config", &self.config)
            .field("handshake", &self.handshake)
            .field("has_renderer", &self.has_renderer())
            .field("has_present_target", &self.has_present_target())
            .field("frames_rendered", &self.frames_rendered())
            .finish_non_exhaustive()
    }
}
