//! # Synchronization Primitives for Two-Thread Frames
//!
//! ## The Problem
//!
//! ```text
//! Thread 1 (Application):  owns the scene, decides when a frame starts
//! Thread 2 (Renderer):     owns the device, decides when a frame is done
//!
//! Without a handshake:  frames overlap → TORN READS
//! With a global lock:   neither side can tell whose turn it is
//! ```
//!
//! ## The Solution
//!
//! - [`Semaphore`]: counting permits with close/timeout; three of them make
//!   the frame handshake.
//! - [`SnapshotBuffer`]: the application publishes an immutable scene
//!   snapshot, the renderer claims it. Nobody reads data the other side
//!   is still writing.

mod semaphore;
mod snapshot;

pub use semaphore::Semaphore;
pub use snapshot::{SnapshotBuffer, SnapshotClaim};
