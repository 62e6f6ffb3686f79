//! # Headless Collaborators
//!
//! Window manager, renderer and scene provider implementations that touch
//! no OS or GPU resources. They record what the engine asked of them, so
//! the driver binary, the tests and the benchmarks can run both loops for
//! real and inspect the outcome.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::collaborators::{
    FrameInput, PresentTarget, Renderer, RendererFactory, Scene, SceneProvider, Window,
    WindowManager,
};
use crate::config::{RenderConfig, RendererKind};
use crate::error::CollaboratorError;

// ============================================================================
// WINDOWS
// ============================================================================

/// A window that exists only as flags.
#[derive(Debug)]
pub struct HeadlessWindow {
    title: String,
    size: (u32, u32),
    closing: AtomicBool,
    visible: AtomicBool,
    minimized: AtomicBool,
}

impl HeadlessWindow {
    /// Creates a hidden, open window.
    #[must_use]
    pub fn new(width: u32, height: u32, title: &str) -> Self {
        Self {
            title: title.to_owned(),
            size: (width, height),
            closing: AtomicBool::new(false),
            visible: AtomicBool::new(false),
            minimized: AtomicBool::new(false),
        }
    }

    /// Simulates the user closing the window.
    pub fn request_close(&self) {
        self.closing.store(true, Ordering::Release);
    }

    /// Simulates minimizing or restoring the window.
    pub fn set_minimized(&self, minimized: bool) {
        self.minimized.store(minimized, Ordering::Release);
    }

    /// Returns true once [`Window::show`] was called.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }

    /// Window title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Width and height in pixels.
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        self.size
    }
}

impl Window for HeadlessWindow {
    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    fn show(&self) {
        self.visible.store(true, Ordering::Release);
    }

    fn is_minimized(&self) -> bool {
        self.minimized.load(Ordering::Acquire)
    }
}

#[derive(Debug, Default)]
struct WindowShared {
    windows: Mutex<Vec<Arc<HeadlessWindow>>>,
    polls: AtomicU64,
    waits: AtomicU64,
}

/// Window manager whose event pump can close the main window on a schedule.
#[derive(Debug, Default)]
pub struct HeadlessWindowManager {
    shared: Arc<WindowShared>,
    close_after_polls: Option<u64>,
    panic_on_poll: Option<u64>,
    fail_creation: bool,
}

impl HeadlessWindowManager {
    /// Windows stay open until closed through a [`WindowWatch`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes the main window during the `polls`-th event poll.
    #[must_use]
    pub fn close_after_polls(mut self, polls: u64) -> Self {
        self.close_after_polls = Some(polls);
        self
    }

    /// Panics during the `poll`-th event poll.
    #[must_use]
    pub fn panic_on_poll(mut self, poll: u64) -> Self {
        self.panic_on_poll = Some(poll);
        self
    }

    /// Makes `create_window` fail.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail_creation = true;
        self
    }

    /// Observer that stays valid after the manager moves into an engine.
    #[must_use]
    pub fn watch(&self) -> WindowWatch {
        WindowWatch {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl WindowManager for HeadlessWindowManager {
    fn poll_events(&mut self) {
        let polls = self.shared.polls.fetch_add(1, Ordering::AcqRel) + 1;
        assert!(
            self.panic_on_poll != Some(polls),
            "headless window manager crashed on poll {polls}"
        );
        if self.close_after_polls.is_some_and(|limit| polls >= limit) {
            if let Some(main) = self.shared.windows.lock().first() {
                main.request_close();
            }
        }
    }

    fn wait_events(&mut self) {
        self.shared.waits.fetch_add(1, Ordering::AcqRel);
        // The event that ends the wait is a restore.
        for window in self.shared.windows.lock().iter() {
            window.set_minimized(false);
        }
    }

    fn windows(&self) -> Vec<Arc<dyn Window>> {
        self.shared
            .windows
            .lock()
            .iter()
            .map(|window| Arc::clone(window) as Arc<dyn Window>)
            .collect()
    }

    fn create_window(
        &mut self,
        width: u32,
        height: u32,
        title: &str,
    ) -> Result<Arc<dyn Window>, CollaboratorError> {
        if self.fail_creation {
            return Err(CollaboratorError::WindowCreation(format!(
                "headless window manager refused `{title}`"
            )));
        }
        let window = Arc::new(HeadlessWindow::new(width, height, title));
        self.shared.windows.lock().push(Arc::clone(&window));
        Ok(window)
    }
}

/// Read side of a [`HeadlessWindowManager`].
#[derive(Clone, Debug)]
pub struct WindowWatch {
    shared: Arc<WindowShared>,
}

impl WindowWatch {
    /// The first window created, if any.
    #[must_use]
    pub fn main_window(&self) -> Option<Arc<HeadlessWindow>> {
        self.shared.windows.lock().first().cloned()
    }

    /// Closes the main window, if it exists.
    pub fn request_close(&self) {
        if let Some(main) = self.main_window() {
            main.request_close();
        }
    }

    /// Number of `poll_events` calls.
    #[must_use]
    pub fn polls(&self) -> u64 {
        self.shared.polls.load(Ordering::Acquire)
    }

    /// Number of `wait_events` calls.
    #[must_use]
    pub fn waits(&self) -> u64 {
        self.shared.waits.load(Ordering::Acquire)
    }
}

// ============================================================================
// RENDERER
// ============================================================================

/// Everything the headless renderer was asked to do.
#[derive(Debug, Default)]
pub struct HeadlessRenderLog {
    renderers_created: AtomicU64,
    frames: AtomicU64,
    presents: AtomicU64,
    targets_created: AtomicU64,
    pipelines_created: AtomicU64,
    pipelines_destroyed: AtomicU64,
    cleanups: AtomicU64,
    last_generation: AtomicU64,
    last_revision: AtomicU64,
    empty_frames: AtomicU64,
    submissions: AtomicU64,
    kind: Mutex<Option<RendererKind>>,
    config: Mutex<Option<RenderConfig>>,
}

impl HeadlessRenderLog {
    /// Renderers built by the factory.
    #[must_use]
    pub fn renderers_created(&self) -> u64 {
        self.renderers_created.load(Ordering::Acquire)
    }

    /// `render` calls.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// `present` calls.
    #[must_use]
    pub fn presents(&self) -> u64 {
        self.presents.load(Ordering::Acquire)
    }

    /// `create_present_target` calls.
    #[must_use]
    pub fn targets_created(&self) -> u64 {
        self.targets_created.load(Ordering::Acquire)
    }

    /// `create_pipeline` calls.
    #[must_use]
    pub fn pipelines_created(&self) -> u64 {
        self.pipelines_created.load(Ordering::Acquire)
    }

    /// `destroy_pipeline` calls that tore down an existing pipeline.
    #[must_use]
    pub fn pipelines_destroyed(&self) -> u64 {
        self.pipelines_destroyed.load(Ordering::Acquire)
    }

    /// `cleanup` calls.
    #[must_use]
    pub fn cleanups(&self) -> u64 {
        self.cleanups.load(Ordering::Acquire)
    }

    /// Snapshot generation of the last rendered frame.
    #[must_use]
    pub fn last_generation(&self) -> u64 {
        self.last_generation.load(Ordering::Acquire)
    }

    /// Scene revision of the last rendered frame (0 if it had no scene).
    #[must_use]
    pub fn last_revision(&self) -> u64 {
        self.last_revision.load(Ordering::Acquire)
    }

    /// Frames rendered without a scene.
    #[must_use]
    pub fn empty_frames(&self) -> u64 {
        self.empty_frames.load(Ordering::Acquire)
    }

    /// Frames that submitted work. A [`RendererKind::Null`] renderer submits none.
    #[must_use]
    pub fn submissions(&self) -> u64 {
        self.submissions.load(Ordering::Acquire)
    }

    /// Renderer type the factory was asked for.
    #[must_use]
    pub fn kind(&self) -> Option<RendererKind> {
        *self.kind.lock()
    }

    /// Configuration the last renderer was bound to.
    #[must_use]
    pub fn config(&self) -> Option<RenderConfig> {
        self.config.lock().clone()
    }
}

/// Builds [`HeadlessRenderer`]s, optionally misbehaving on purpose.
#[derive(Debug, Default)]
pub struct HeadlessRendererFactory {
    log: Arc<HeadlessRenderLog>,
    failure: Option<CollaboratorError>,
    invalidate_every: Option<u64>,
    render_delay: Option<Duration>,
    panic_on_frame: Option<u64>,
    fail_on_frame: Option<(u64, CollaboratorError)>,
}

impl HeadlessRendererFactory {
    /// A factory whose renderers always succeed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `create` call fails with `error`.
    #[must_use]
    pub fn failing(mut self, error: CollaboratorError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Present targets go out of date after every `presents` presents.
    #[must_use]
    pub fn invalidate_every(mut self, presents: u64) -> Self {
        self.invalidate_every = Some(presents).filter(|n| *n > 0);
        self
    }

    /// Each `render` call sleeps for `delay`.
    #[must_use]
    pub fn render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = Some(delay);
        self
    }

    /// The renderer panics while rendering frame `frame`.
    #[must_use]
    pub fn panic_on_frame(mut self, frame: u64) -> Self {
        self.panic_on_frame = Some(frame);
        self
    }

    /// The renderer returns `error` while rendering frame `frame`.
    #[must_use]
    pub fn fail_on_frame(mut self, frame: u64, error: CollaboratorError) -> Self {
        self.fail_on_frame = Some((frame, error));
        self
    }

    /// Shared record of what renderers from this factory did.
    #[must_use]
    pub fn log(&self) -> Arc<HeadlessRenderLog> {
        Arc::clone(&self.log)
    }
}

impl RendererFactory for HeadlessRendererFactory {
    fn create(
        &self,
        kind: RendererKind,
        config: &RenderConfig,
    ) -> Result<Box<dyn Renderer>, CollaboratorError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        self.log.renderers_created.fetch_add(1, Ordering::AcqRel);
        *self.log.kind.lock() = Some(kind);
        *self.log.config.lock() = Some(config.clone());
        Ok(Box::new(HeadlessRenderer {
            log: Arc::clone(&self.log),
            kind,
            invalidate_every: self.invalidate_every,
            render_delay: self.render_delay,
            panic_on_frame: self.panic_on_frame,
            fail_on_frame: self.fail_on_frame.clone(),
            has_pipeline: false,
        }))
    }
}

/// Renderer that records calls instead of submitting work.
#[derive(Debug)]
pub struct HeadlessRenderer {
    log: Arc<HeadlessRenderLog>,
    kind: RendererKind,
    invalidate_every: Option<u64>,
    render_delay: Option<Duration>,
    panic_on_frame: Option<u64>,
    fail_on_frame: Option<(u64, CollaboratorError)>,
    has_pipeline: bool,
}

impl Renderer for HeadlessRenderer {
    fn render(&mut self, frame: &FrameInput<'_>) -> Result<(), CollaboratorError> {
        if !self.has_pipeline {
            return Err(CollaboratorError::Submission("no pipeline".into()));
        }
        assert!(
            self.panic_on_frame != Some(frame.frame),
            "headless renderer crashed on frame {}",
            frame.frame
        );
        if let Some((_, error)) = self
            .fail_on_frame
            .as_ref()
            .filter(|(failing, _)| *failing == frame.frame)
        {
            return Err(error.clone());
        }
        if let Some(delay) = self.render_delay {
            std::thread::sleep(delay);
        }
        self.log.frames.fetch_add(1, Ordering::AcqRel);
        if self.kind != RendererKind::Null {
            self.log.submissions.fetch_add(1, Ordering::AcqRel);
        }
        self.log
            .last_generation
            .store(frame.scene_generation, Ordering::Release);
        match frame.scene {
            Some(scene) => self.log.last_revision.store(scene.revision, Ordering::Release),
            None => {
                self.log.last_revision.store(0, Ordering::Release);
                self.log.empty_frames.fetch_add(1, Ordering::AcqRel);
            }
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        self.has_pipeline = false;
        self.log.cleanups.fetch_add(1, Ordering::AcqRel);
    }

    fn create_present_target(&mut self) -> Result<Box<dyn PresentTarget>, CollaboratorError> {
        self.log.targets_created.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(HeadlessPresentTarget {
            log: Arc::clone(&self.log),
            presents: 0,
            invalidate_every: self.invalidate_every,
            validated: true,
        }))
    }

    fn create_pipeline(&mut self, target: &dyn PresentTarget) -> Result<(), CollaboratorError> {
        if !target.is_validated() {
            return Err(CollaboratorError::SurfaceLost(
                "pipeline target is out of date".into(),
            ));
        }
        self.has_pipeline = true;
        self.log.pipelines_created.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn destroy_pipeline(&mut self) {
        if self.has_pipeline {
            self.has_pipeline = false;
            self.log.pipelines_destroyed.fetch_add(1, Ordering::AcqRel);
        }
    }
}

/// Present target that can go out of date on a schedule.
#[derive(Debug)]
pub struct HeadlessPresentTarget {
    log: Arc<HeadlessRenderLog>,
    presents: u64,
    invalidate_every: Option<u64>,
    validated: bool,
}

impl PresentTarget for HeadlessPresentTarget {
    fn present(&mut self) -> Result<(), CollaboratorError> {
        if !self.validated {
            return Err(CollaboratorError::SurfaceLost("present on stale target".into()));
        }
        self.presents += 1;
        self.log.presents.fetch_add(1, Ordering::AcqRel);
        if self
            .invalidate_every
            .is_some_and(|every| self.presents % every == 0)
        {
            self.validated = false;
        }
        Ok(())
    }

    fn is_validated(&self) -> bool {
        self.validated
    }
}

// ============================================================================
// SCENE
// ============================================================================

/// Serves the same scene every frame with an increasing revision.
#[derive(Debug, Default)]
pub struct StaticSceneProvider {
    scene: Option<Scene>,
    revision: AtomicU64,
}

impl StaticSceneProvider {
    /// Serves `scene`.
    #[must_use]
    pub fn new(scene: Scene) -> Self {
        Self {
            scene: Some(scene),
            revision: AtomicU64::new(0),
        }
    }

    /// Serves no scene at all.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Scenes handed out so far.
    #[must_use]
    pub fn revisions(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }
}

impl SceneProvider for StaticSceneProvider {
    fn current_scene(&self) -> Option<Scene> {
        let scene = self.scene.as_ref()?;
        let revision = self.revision.fetch_add(1, Ordering::AcqRel) + 1;
        Some(Scene {
            revision,
            ..scene.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_closes_on_scheduled_poll() {
        let mut manager = HeadlessWindowManager::new().close_after_polls(2);
        let watch = manager.watch();
        let window = manager.create_window(640, 480, "test").unwrap();

        manager.poll_events();
        assert!(!window.is_closing());
        manager.poll_events();
        assert!(window.is_closing());
        assert_eq!(watch.polls(), 2);
        assert_eq!(watch.main_window().unwrap().size(), (640, 480));
    }

    #[test]
    fn test_wait_events_restores_minimized() {
        let mut manager = HeadlessWindowManager::new();
        let watch = manager.watch();
        let window = manager.create_window(1, 1, "min").unwrap();
        watch.main_window().unwrap().set_minimized(true);
        assert!(window.is_minimized());

        manager.wait_events();
        assert!(!window.is_minimized());
        assert_eq!(watch.waits(), 1);
    }

    #[test]
    fn test_failing_window_manager() {
        let mut manager = HeadlessWindowManager::new().failing();
        assert!(matches!(
            manager.create_window(1, 1, "x"),
            Err(CollaboratorError::WindowCreation(_))
        ));
        assert!(manager.windows().is_empty());
    }

    #[test]
    fn test_target_invalidates_on_schedule() {
        let factory = HeadlessRendererFactory::new().invalidate_every(2);
        let mut renderer = factory
            .create(RendererKind::Forward, &RenderConfig::default())
            .unwrap();
        let mut target = renderer.create_present_target().unwrap();

        target.present().unwrap();
        assert!(target.is_validated());
        target.present().unwrap();
        assert!(!target.is_validated());
        assert!(target.present().is_err());
    }

    #[test]
    fn test_render_requires_pipeline() {
        let factory = HeadlessRendererFactory::new();
        let log = factory.log();
        let mut renderer = factory
            .create(RendererKind::Deferred, &RenderConfig::default())
            .unwrap();
        let input = FrameInput {
            frame: 1,
            scene: None,
            scene_generation: 1,
        };
        assert!(renderer.render(&input).is_err());

        let target = renderer.create_present_target().unwrap();
        renderer.create_pipeline(target.as_ref()).unwrap();
        renderer.render(&input).unwrap();

        assert_eq!(log.frames(), 1);
        assert_eq!(log.empty_frames(), 1);
        assert_eq!(log.kind(), Some(RendererKind::Deferred));

        renderer.destroy_pipeline();
        renderer.destroy_pipeline();
        assert_eq!(log.pipelines_destroyed(), 1);
    }

    #[test]
    fn test_renderer_records_config_and_null_submits_nothing() {
        let factory = HeadlessRendererFactory::new();
        let log = factory.log();
        let config = RenderConfig {
            kind: RendererKind::Null,
            vsync: false,
            clear_color: [0.1, 0.2, 0.3, 1.0],
        };
        let mut renderer = factory.create(config.kind, &config).unwrap();
        let target = renderer.create_present_target().unwrap();
        renderer.create_pipeline(target.as_ref()).unwrap();
        renderer
            .render(&FrameInput {
                frame: 1,
                scene: None,
                scene_generation: 1,
            })
            .unwrap();

        assert_eq!(log.config(), Some(config));
        assert_eq!(log.frames(), 1);
        assert_eq!(log.submissions(), 0);
    }

    #[test]
    fn test_renderer_fails_on_scheduled_frame() {
        let factory = HeadlessRendererFactory::new()
            .fail_on_frame(2, CollaboratorError::Submission("queue lost".into()));
        let log = factory.log();
        let mut renderer = factory
            .create(RendererKind::Forward, &RenderConfig::default())
            .unwrap();
        let target = renderer.create_present_target().unwrap();
        renderer.create_pipeline(target.as_ref()).unwrap();

        let input = |frame| FrameInput {
            frame,
            scene: None,
            scene_generation: frame,
        };
        renderer.render(&input(1)).unwrap();
        assert_eq!(
            renderer.render(&input(2)),
            Err(CollaboratorError::Submission("queue lost".into()))
        );
        assert_eq!(log.frames(), 1);
        assert_eq!(log.submissions(), 1);
    }

    #[test]
    #[should_panic(expected = "crashed on poll 2")]
    fn test_window_manager_panics_on_scheduled_poll() {
        let mut manager = HeadlessWindowManager::new().panic_on_poll(2);
        manager.poll_events();
        manager.poll_events();
    }

    #[test]
    fn test_failing_factory() {
        let factory = HeadlessRendererFactory::new()
            .failing(CollaboratorError::DeviceCreation("no adapter".into()));
        assert!(factory
            .create(RendererKind::Forward, &RenderConfig::default())
            .is_err());
        assert_eq!(factory.log().renderers_created(), 0);
    }

    #[test]
    fn test_static_scene_revisions() {
        let provider = StaticSceneProvider::new(Scene {
            name: "arena".into(),
            entity_count: 12,
            ..Scene::default()
        });
        assert_eq!(provider.current_scene().unwrap().revision, 1);
        let second = provider.current_scene().unwrap();
        assert_eq!(second.revision, 2);
        assert_eq!(second.name, "arena");
        assert!(StaticSceneProvider::empty().current_scene().is_none());
    }
}
