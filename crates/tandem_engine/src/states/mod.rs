//! # State Graphs
//!
//! The two concrete machines. Each is a closed `enum` of states plus a
//! graph struct that owns what those states operate on.
//!
//! | Machine       | Thread          | Blocks in                          |
//! |---------------|-----------------|------------------------------------|
//! | `application` | caller / engine | `Start`, `WaitRenderer`, `Stop`    |
//! | `renderer`    | `tandem-render` | `WaitFrameBegin`                   |

pub mod application;
pub mod renderer;

pub use application::{ApplicationGraph, ApplicationState, RENDER_THREAD_NAME};
pub use renderer::{RendererGraph, RendererState};
