//! # Collaborators
//!
//! The narrow interfaces the two loops drive. Device work, windowing and
//! scene management live behind these traits; the engine only decides
//! *when* each call happens and on which thread.
//!
//! Thread affinity:
//!
//! | Trait             | Called from            |
//! |-------------------|------------------------|
//! | [`WindowManager`] | application thread     |
//! | [`Window`]        | both (queries only)    |
//! | [`SceneProvider`] | application thread     |
//! | [`Renderer`]      | renderer thread        |
//! | [`PresentTarget`] | renderer thread        |

use std::sync::Arc;

use crate::config::{RenderConfig, RendererKind};
use crate::error::CollaboratorError;

/// Submits frames to a render device.
pub trait Renderer: Send {
    /// Renders one frame.
    ///
    /// # Errors
    ///
    /// Returns a [`CollaboratorError`] if submission fails.
    fn render(&mut self, frame: &FrameInput<'_>) -> Result<(), CollaboratorError>;

    /// Releases device resources. Called once, before the renderer is dropped.
    fn cleanup(&mut self);

    /// Creates the surface frames are presented to.
    ///
    /// # Errors
    ///
    /// Returns a [`CollaboratorError`] if the surface cannot be created.
    fn create_present_target(&mut self) -> Result<Box<dyn PresentTarget>, CollaboratorError>;

    /// Builds the render pipeline for `target`.
    ///
    /// # Errors
    ///
    /// Returns a [`CollaboratorError`] if the pipeline cannot be built.
    fn create_pipeline(&mut self, target: &dyn PresentTarget) -> Result<(), CollaboratorError>;

    /// Tears the pipeline down. A no-op when none exists.
    fn destroy_pipeline(&mut self);
}

/// Builds renderers from a type selector and configuration.
pub trait RendererFactory: Send + Sync {
    /// Creates a renderer bound to `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError::DeviceCreation`] (or similar) on failure.
    fn create(
        &self,
        kind: RendererKind,
        config: &RenderConfig,
    ) -> Result<Box<dyn Renderer>, CollaboratorError>;
}

/// The surface a finished frame is shown on.
pub trait PresentTarget: Send {
    /// Presents the last rendered frame.
    ///
    /// # Errors
    ///
    /// Returns a [`CollaboratorError`] if presentation fails.
    fn present(&mut self) -> Result<(), CollaboratorError>;

    /// Returns false once the surface is out of date (resize, loss).
    fn is_validated(&self) -> bool;
}

/// A window owned by the window manager.
pub trait Window: Send + Sync {
    /// Returns true once the user asked to close the window.
    fn is_closing(&self) -> bool;

    /// Makes the window visible.
    fn show(&self);

    /// Returns true while the window is minimized.
    fn is_minimized(&self) -> bool {
        false
    }
}

/// Windowing system access. Application thread only.
pub trait WindowManager: Send {
    /// Processes pending events without blocking.
    fn poll_events(&mut self);

    /// Blocks until at least one event arrives, then processes it.
    fn wait_events(&mut self);

    /// Every window still open.
    fn windows(&self) -> Vec<Arc<dyn Window>>;

    /// Opens a new window.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError::WindowCreation`] on failure.
    fn create_window(
        &mut self,
        width: u32,
        height: u32,
        title: &str,
    ) -> Result<Arc<dyn Window>, CollaboratorError>;
}

/// Exposes the scene the application is currently simulating.
pub trait SceneProvider: Send + Sync {
    /// The current scene, if one is loaded.
    fn current_scene(&self) -> Option<Scene>;
}

/// Camera state captured with a scene.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    /// World-space position.
    pub position: [f32; 3],
    /// Column-major view-projection matrix.
    pub view_proj: [[f32; 4]; 4],
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            view_proj: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }
}

/// Immutable per-frame view of the scene handed to the renderer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scene {
    /// Scene name.
    pub name: String,
    /// Active camera.
    pub camera: Camera,
    /// Number of renderable entities.
    pub entity_count: u32,
    /// Monotonic revision assigned by the provider.
    pub revision: u64,
}

/// Everything the renderer needs for one frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameInput<'a> {
    /// 1-based index of the frame being rendered.
    pub frame: u64,
    /// The snapshot published at `FrameBegin`, if any.
    pub scene: Option<&'a Scene>,
    /// Snapshot generation (0 before the first publish).
    pub scene_generation: u64,
}
