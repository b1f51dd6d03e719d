//! Canvas display state: reconciles sync events into an ordered display set.
//!
//! Removed surfaces linger briefly as `exiting` ghosts so the presentation
//! layer can animate them out before they disappear.

pub mod reconciler;
pub mod registry;
pub mod session;

pub use reconciler::{DisplaySet, DisplaySurface, Reconciler};
pub use registry::{KindInfo, KindRegistry, Resolved};
pub use session::CanvasSession;
