//! # Engine Configuration
//!
//! Loaded once at startup from TOML. Every field has a default, so an empty
//! file is a valid configuration.
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//! title = "TANDEM"
//!
//! [render]
//! kind = "forward"
//! vsync = true
//!
//! [handshake]
//! timeout_ms = 2000
//!
//! [pacing]
//! target_fps = 60
//! minimized_backoff = true
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Top-level engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Main window settings.
    pub window: WindowConfig,
    /// Renderer selection and settings.
    pub render: RenderConfig,
    /// Handshake wait policy.
    pub handshake: HandshakeConfig,
    /// Frame pacing applied in the application's `Pause` state.
    pub pacing: PacingConfig,
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] on malformed TOML or invalid values.
    pub fn from_toml_str(source: &str) -> EngineResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] naming the first invalid field.
    pub fn validate(&self) -> EngineResult<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(EngineError::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if self.handshake.timeout_ms == Some(0) {
            return Err(EngineError::Config("handshake.timeout_ms must be non-zero".into()));
        }
        if self.pacing.target_fps == Some(0) {
            return Err(EngineError::Config("pacing.target_fps must be non-zero".into()));
        }
        Ok(())
    }
}

/// Main window settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Window title.
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: String::from("TANDEM"),
        }
    }
}

/// Renderer type selector handed to the renderer factory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    /// Single-pass forward renderer.
    #[default]
    Forward,
    /// G-buffer based deferred renderer.
    Deferred,
    /// Renderer that submits nothing.
    Null,
}

/// Render configuration the renderer is bound to at creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Which renderer the factory should build.
    pub kind: RendererKind,
    /// Present with vertical sync.
    pub vsync: bool,
    /// Clear color (linear RGBA).
    pub clear_color: [f32; 4],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            kind: RendererKind::default(),
            vsync: true,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Handshake wait policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Maximum time to wait for the peer thread. `None` waits forever.
    pub timeout_ms: Option<u64>,
}

impl HandshakeConfig {
    /// The wait timeout, if one is configured.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Frame pacing policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Cap the application frame rate. `None` runs as fast as the handshake allows.
    pub target_fps: Option<u32>,
    /// Block on window events instead of spinning while the main window is minimized.
    pub minimized_backoff: bool,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            target_fps: None,
            minimized_backoff: true,
        }
    }
}

impl PacingConfig {
    /// Target duration of one frame, if pacing is enabled.
    #[must_use]
    pub fn frame_budget(&self) -> Option<Duration> {
        self.target_fps
            .filter(|fps| *fps > 0)
            .map(|fps| Duration::from_micros(1_000_000 / u64::from(fps)))
    }
}
