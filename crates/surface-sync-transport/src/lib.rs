//! Transport Manager: keeps a feed of surface sync events flowing.
//!
//! A live WebSocket channel is preferred. After repeated failures the
//! manager falls back to periodic snapshot pulls for the rest of its
//! lifetime. Every network failure becomes a state transition; the only
//! failure signal observers see is `connected` going false.

pub mod callback;
pub mod machine;
pub mod manager;
pub mod source;

pub use callback::CallbackClient;
pub use machine::{ConnectionMachine, Transition};
pub use manager::{TransportHandle, TransportManager};
pub use source::{HttpSurfaceSource, LiveFeed, SurfaceSource};
