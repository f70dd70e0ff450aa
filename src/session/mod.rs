//! Watch sessions: handle allocation, the handle registry and session supervision.
//!
//! Accepting a request resolves the container synchronously, then registers a session
//! under a fresh [`WatchHandle`] and starts the watch in the background. Failures after
//! acceptance are recorded in the session's [`SessionStatus`]; output lines are broadcast
//! as [`WatchEvent`]s to subscribers.
mod error;
mod manager;
mod registry;
mod status;

pub use error::{Error, Result};
pub use manager::{ManagerOptions, WatchManager};
pub use registry::{HandleAllocator, Session, SessionRegistry, WatchHandle};
pub use status::{SessionState, SessionStatus, WatchEvent};
