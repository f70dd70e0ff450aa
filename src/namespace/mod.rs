//! Joining a container's mount namespace from a dedicated OS thread.
//!
//! Namespace membership belongs to a kernel thread, not to a process or an async task.
//! [`spawn_pinned`] runs a future on a fresh thread with its own current-thread runtime so
//! every await point of the session stays on that thread, and the thread is discarded once
//! the future completes. [`MountNamespaceJoiner`] performs the actual switch.
mod error;
mod joiner;
mod worker;

pub use error::{Error, Result};
pub use joiner::{MountNamespace, MountNamespaceJoiner, NamespaceEntry, NamespaceJoiner};
pub use worker::{WorkerHandle, spawn_pinned};
