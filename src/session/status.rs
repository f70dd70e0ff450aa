use std::time::SystemTime;

use super::WatchHandle;

/// Lifecycle of a watch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Accepted; the worker hasn't started a watcher yet.
    Starting,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }
}

/// Observable state of one session.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SessionStatus {
    pub handle: WatchHandle,
    pub container_id: String,
    pub pid: u32,
    pub state: SessionState,
    /// Index of the subject being watched, or last watched once terminal.
    pub current_subject: usize,
    pub subjects: usize,
    /// Errors raised after the handle was issued, in order.
    pub errors: Vec<String>,
    #[serde(serialize_with = "serialize_unix_secs")]
    pub started_at: SystemTime,
}

impl SessionStatus {
    pub fn new(handle: WatchHandle, container_id: String, pid: u32, subjects: usize) -> Self {
        Self {
            handle,
            container_id,
            pid,
            state: SessionState::Starting,
            current_subject: 0,
            subjects,
            errors: Vec::new(),
            started_at: SystemTime::now(),
        }
    }
}

fn serialize_unix_secs<S: serde::Serializer>(
    time: &SystemTime,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let secs = time
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    serializer.serialize_u64(secs)
}

/// One line of watcher output.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct WatchEvent {
    pub handle: WatchHandle,
    pub subject: usize,
    pub line: String,
}
