use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::watch::Progress;

use super::{SessionState, SessionStatus, WatchEvent};

/// Capacity of the per-session output broadcast; slower subscribers skip lines.
const EVENT_CAPACITY: usize = 1024;

/// Opaque identifier of a watch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(transparent)]
pub struct WatchHandle(u64);

impl WatchHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out handles that are never reused during the lifetime of the process.
#[derive(Debug)]
pub struct HandleAllocator {
    next: AtomicU64,
}

impl HandleAllocator {
    pub fn allocate(&self) -> WatchHandle {
        WatchHandle(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

/// Shared state of one watch session.
#[derive(Debug)]
pub struct Session {
    status: watch::Sender<SessionStatus>,
    events: broadcast::Sender<WatchEvent>,
    cancel: CancellationToken,
}

impl Session {
    fn new(status: SessionStatus) -> Self {
        let (status, _) = watch::channel(status);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            status,
            events,
            cancel: CancellationToken::new(),
        }
    }

    pub fn handle(&self) -> WatchHandle {
        self.status.borrow().handle
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Receiver that observes every status change of the session.
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Folds a progress report from the watch worker into the status and event stream.
    pub fn apply(&self, progress: Progress) {
        match progress {
            Progress::SubjectStarted { subject, .. } => self.status.send_modify(|status| {
                if !status.state.is_terminal() {
                    status.state = SessionState::Running;
                }
                status.current_subject = subject;
            }),
            Progress::Line { subject, line } => {
                let event = WatchEvent {
                    handle: self.handle(),
                    subject,
                    line,
                };
                // No subscribers is fine, lines are only relayed live.
                let _ = self.events.send(event);
            }
            Progress::SubjectFinished { subject } => self.status.send_modify(|status| {
                status.current_subject = subject;
            }),
            Progress::SubjectFailed { subject, error } => self.status.send_modify(|status| {
                if status.state == SessionState::Starting {
                    status.state = SessionState::Running;
                }
                status.current_subject = subject;
                status.errors.push(format!("subject {subject}: {error}"));
            }),
        }
    }

    pub fn record_error(&self, error: String) {
        self.status.send_modify(|status| status.errors.push(error));
    }

    /// Moves the session into a terminal state. Later calls are ignored.
    pub fn finish(&self, state: SessionState) {
        self.status.send_if_modified(|status| {
            if status.state.is_terminal() {
                return false;
            }
            status.state = state;
            true
        });
    }

    /// Forwards output lines to `tx` until the session terminates or `tx` is closed.
    ///
    /// Lines emitted before the call are not replayed.
    pub async fn relay_events(&self, tx: mpsc::Sender<WatchEvent>) {
        let mut events = self.events.subscribe();
        let mut status = self.subscribe_status();

        loop {
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("watch {} subscriber skipped {} lines", self.handle(), skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                },
                _ = wait_terminal(&mut status) => break,
                _ = tx.closed() => return,
            }
        }

        while let Ok(event) = events.try_recv() {
            if tx.send(event).await.is_err() {
                return;
            }
        }
    }
}

async fn wait_terminal(status: &mut watch::Receiver<SessionStatus>) {
    // Fails only once the session is gone; either way the relay ends.
    let _ = status.wait_for(|s| s.state.is_terminal()).await;
}

/// Concurrent map from handle to live session.
///
/// Sessions are registered by the request path and removed by their background task or
/// by an explicit destroy; [`DashMap`] guards both sides.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    allocator: HandleAllocator,
    sessions: DashMap<WatchHandle, Arc<Session>>,
}

impl SessionRegistry {
    /// Allocates a handle and registers a new session in the `Starting` state.
    pub fn register(&self, container_id: String, pid: u32, subjects: usize) -> Arc<Session> {
        let handle = self.allocator.allocate();
        let session = Arc::new(Session::new(SessionStatus::new(
            handle,
            container_id,
            pid,
            subjects,
        )));
        self.sessions.insert(handle, Arc::clone(&session));
        session
    }

    pub fn get(&self, handle: WatchHandle) -> Option<Arc<Session>> {
        self.sessions.get(&handle).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, handle: WatchHandle) -> Option<Arc<Session>> {
        self.sessions.remove(&handle).map(|(_, session)| session)
    }

    /// Status of every registered session, ordered by handle.
    pub fn statuses(&self) -> Vec<SessionStatus> {
        let mut out: Vec<SessionStatus> = self
            .sessions
            .iter()
            .map(|entry| entry.value().status())
            .collect();
        out.sort_by_key(|status| status.handle);
        out
    }

    pub fn size(&self) -> usize {
        self.sessions.len()
    }
}
