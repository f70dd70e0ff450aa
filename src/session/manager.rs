use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::namespace::spawn_pinned;
use crate::resolver::{self, PidResolver};
use crate::watch::{Orchestrator, Outcome, Progress, WatchRequest, WatchSubject};

use super::{Error, Result, Session, SessionRegistry, SessionState, SessionStatus, WatchHandle};

/// Timing knobs of the [`WatchManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerOptions {
    /// Bound on PID resolution, which runs before the handle is returned.
    pub resolve_timeout: Duration,
    /// Sessions that haven't started a watcher within this bound are cancelled and failed.
    pub start_timeout: Duration,
    /// How long terminal sessions stay queryable before they are forgotten.
    pub linger: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            resolve_timeout: Duration::from_secs(5),
            start_timeout: Duration::from_secs(10),
            linger: Duration::from_secs(60),
        }
    }
}

/// Accepts watch requests and supervises the resulting sessions.
#[derive(Clone)]
pub struct WatchManager {
    registry: Arc<SessionRegistry>,
    resolver: Arc<dyn PidResolver>,
    orchestrator: Orchestrator,
    options: ManagerOptions,
}

impl WatchManager {
    pub fn new(
        resolver: Arc<dyn PidResolver>,
        orchestrator: Orchestrator,
        options: ManagerOptions,
    ) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::default()),
            resolver,
            orchestrator,
            options,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Resolves the request's container and starts watching it in the background.
    ///
    /// Returns as soon as the session is registered; the watchers are started by a
    /// dedicated worker thread afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resolve`] if the container can't be resolved. No session is created
    /// in that case.
    pub async fn new_watch(&self, request: WatchRequest) -> Result<WatchHandle> {
        let pid = resolver::resolve_with_timeout(
            self.resolver.as_ref(),
            &request.container_id,
            self.options.resolve_timeout,
        )
        .await?;

        let session = self.registry.register(
            request.container_id.to_string(),
            pid,
            request.subjects.len(),
        );
        let handle = session.handle();
        log::info!(
            "Accepted watch {} for container `{}` (pid {}, {} subjects)",
            handle,
            request.container_id,
            pid,
            request.subjects.len()
        );

        tokio::spawn(supervise(
            Arc::clone(&self.registry),
            session,
            pid,
            request.subjects,
            self.orchestrator.clone(),
            self.options,
        ));

        Ok(handle)
    }

    /// Cancels a session, killing its active watcher, and forgets its handle.
    pub fn destroy(&self, handle: WatchHandle) -> Result<()> {
        let session = self
            .registry
            .remove(handle)
            .ok_or(Error::UnknownHandle(handle))?;
        log::info!("Destroying watch {handle}");
        session.cancel();
        Ok(())
    }

    pub fn status(&self, handle: WatchHandle) -> Result<SessionStatus> {
        self.session(handle).map(|session| session.status())
    }

    pub fn statuses(&self) -> Vec<SessionStatus> {
        self.registry.statuses()
    }

    pub fn session(&self, handle: WatchHandle) -> Result<Arc<Session>> {
        self.registry
            .get(handle)
            .ok_or(Error::UnknownHandle(handle))
    }
}

/// Drives one session: runs the orchestrator on a pinned worker, folds its progress into
/// the session, enforces the start timeout and finally retires the handle.
async fn supervise(
    registry: Arc<SessionRegistry>,
    session: Arc<Session>,
    pid: u32,
    subjects: Vec<WatchSubject>,
    orchestrator: Orchestrator,
    options: ManagerOptions,
) {
    let handle = session.handle();
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<Progress>();
    let cancel = session.cancel_token().clone();

    let worker = spawn_pinned(format!("fimd-watch-{handle}"), move || async move {
        orchestrator.run(pid, &subjects, cancel, progress_tx).await
    });
    let worker = match worker {
        Ok(worker) => worker,
        Err(err) => {
            log::error!("watch {handle}: {err}");
            session.record_error(err.to_string());
            session.finish(SessionState::Failed);
            retire(&registry, &session, options.linger).await;
            return;
        }
    };

    let deadline = tokio::time::sleep(options.start_timeout);
    tokio::pin!(deadline);
    let mut started = false;
    loop {
        tokio::select! {
            progress = progress_rx.recv() => match progress {
                Some(progress) => {
                    started = true;
                    session.apply(progress);
                }
                None => break,
            },
            _ = &mut deadline, if !started => {
                log::error!("watch {handle} did not start within {:?}", options.start_timeout);
                session.record_error(format!(
                    "watcher did not start within {:?}",
                    options.start_timeout
                ));
                session.cancel();
                session.finish(SessionState::Failed);
                // The worker may be stuck in a blocking call; it sees the cancellation
                // once it returns.
                tokio::spawn(async move {
                    match worker.join().await {
                        Ok(Ok(outcome)) => log::debug!("abandoned watch {handle}: {outcome:?}"),
                        Ok(Err(err)) => log::warn!("abandoned watch {handle}: {err}"),
                        Err(err) => log::warn!("abandoned watch {handle}: {err}"),
                    }
                });
                retire(&registry, &session, options.linger).await;
                return;
            }
        }
    }

    let state = match worker.join().await {
        Ok(Ok(Outcome::Completed { failed: 0 })) => SessionState::Completed,
        Ok(Ok(Outcome::Completed { failed })) => {
            log::warn!("watch {handle}: {failed} subjects failed");
            SessionState::Failed
        }
        Ok(Ok(Outcome::Cancelled)) => SessionState::Cancelled,
        Ok(Err(err)) => {
            log::error!("watch {handle}: {err}");
            session.record_error(err.to_string());
            SessionState::Failed
        }
        Err(err) => {
            log::error!("watch {handle}: {err}");
            session.record_error(err.to_string());
            SessionState::Failed
        }
    };
    log::info!("Watch {handle} finished: {state:?}");
    session.finish(state);

    retire(&registry, &session, options.linger).await;
}

/// Keeps a terminal session queryable for `linger`, then drops its handle.
async fn retire(registry: &SessionRegistry, session: &Session, linger: Duration) {
    tokio::time::sleep(linger).await;
    if registry.remove(session.handle()).is_some() {
        log::debug!("Forgot watch {}", session.handle());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::container::ContainerID;
    use crate::namespace::{self, NamespaceEntry, NamespaceJoiner};
    use crate::resolver::BoxFuture;
    use crate::watch::{WatchOptions, WatcherCommand};

    struct StaticResolver(Option<u32>);

    impl PidResolver for StaticResolver {
        fn name(&self) -> &'static str {
            "static"
        }

        fn resolve<'a>(&'a self, id: &'a ContainerID) -> BoxFuture<'a, resolver::Result<u32>> {
            let result = self
                .0
                .ok_or_else(|| resolver::Error::NotFound { id: id.to_string() });
            Box::pin(async move { result })
        }
    }

    #[derive(Default)]
    struct NoopJoiner {
        opened: Mutex<Vec<u32>>,
    }

    struct NoopEntry;

    impl NamespaceJoiner for NoopJoiner {
        fn open(&self, pid: u32) -> namespace::Result<Box<dyn NamespaceEntry>> {
            self.opened.lock().unwrap().push(pid);
            Ok(Box::new(NoopEntry))
        }
    }

    impl NamespaceEntry for NoopEntry {
        fn join(&mut self) -> namespace::Result<()> {
            Ok(())
        }

        fn restore(&mut self) -> namespace::Result<()> {
            Ok(())
        }
    }

    fn manager(pid: Option<u32>, script: &str, options: ManagerOptions) -> WatchManager {
        let command = WatcherCommand::new("sh").with_leading_args(["-c", script, "fim-inotify"]);
        let orchestrator = Orchestrator::new(command, Arc::new(NoopJoiner::default()));
        WatchManager::new(Arc::new(StaticResolver(pid)), orchestrator, options)
    }

    fn request(paths: &[&str]) -> WatchRequest {
        let subjects = paths
            .iter()
            .map(|p| WatchSubject::new([*p], ["modify"], WatchOptions::default()).unwrap())
            .collect();
        WatchRequest::new(ContainerID::new("docker://abc1").unwrap(), subjects).unwrap()
    }

    async fn wait_terminal(manager: &WatchManager, handle: WatchHandle) -> SessionStatus {
        let session = manager.session(handle).unwrap();
        let mut rx = session.subscribe_status();
        let status = tokio::time::timeout(
            Duration::from_secs(10),
            rx.wait_for(|s| s.state.is_terminal()),
        )
        .await
        .expect("session should terminate")
        .expect("session alive")
        .clone();
        status
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_completed_session() {
        let manager = manager(Some(4321), "echo \"$@\"", ManagerOptions::default());
        let handle = manager.new_watch(request(&["/var/log", "/etc"])).await.unwrap();

        let status = wait_terminal(&manager, handle).await;
        assert_eq!(status.state, SessionState::Completed);
        assert_eq!(status.pid, 4321);
        assert_eq!(status.container_id, "abc1");
        assert_eq!(status.subjects, 2);
        assert_eq!(status.current_subject, 1);
        assert!(status.errors.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resolution_failure_issues_no_handle() {
        let manager = manager(None, "true", ManagerOptions::default());
        let err = manager.new_watch(request(&["/var/log"])).await.unwrap_err();
        assert!(matches!(err, Error::Resolve(resolver::Error::NotFound { .. })));
        assert!(manager.statuses().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_post_acceptance_failures_are_reported() {
        let manager = manager(Some(1), "exit 2", ManagerOptions::default());
        let handle = manager.new_watch(request(&["/var/log"])).await.unwrap();

        let status = wait_terminal(&manager, handle).await;
        assert_eq!(status.state, SessionState::Failed);
        assert_eq!(status.errors.len(), 1);
        assert!(status.errors[0].starts_with("subject 0:"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_destroy_cancels_and_forgets() {
        let manager = manager(Some(1), "exec sleep 30", ManagerOptions::default());
        let handle = manager.new_watch(request(&["/a", "/b"])).await.unwrap();
        let session = manager.session(handle).unwrap();
        let mut rx = session.subscribe_status();
        tokio::time::timeout(
            Duration::from_secs(10),
            rx.wait_for(|s| s.state == SessionState::Running),
        )
        .await
        .unwrap()
        .unwrap();

        manager.destroy(handle).unwrap();
        assert!(matches!(manager.status(handle), Err(Error::UnknownHandle(_))));
        assert!(matches!(manager.destroy(handle), Err(Error::UnknownHandle(_))));

        let state = tokio::time::timeout(
            Duration::from_secs(10),
            rx.wait_for(|s| s.state.is_terminal()),
        )
        .await
        .unwrap()
        .unwrap()
        .state;
        assert_eq!(state, SessionState::Cancelled);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_terminal_sessions_are_retired_after_linger() {
        let options = ManagerOptions {
            linger: Duration::from_millis(50),
            ..Default::default()
        };
        let manager = manager(Some(1), "true", options);
        let handle = manager.new_watch(request(&["/a"])).await.unwrap();
        wait_terminal(&manager, handle).await;

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(matches!(manager.status(handle), Err(Error::UnknownHandle(_))));
    }

    /// Blocks the worker thread inside `open`, before any watcher can start.
    struct StallingJoiner(Duration);

    impl NamespaceJoiner for StallingJoiner {
        fn open(&self, _pid: u32) -> namespace::Result<Box<dyn NamespaceEntry>> {
            std::thread::sleep(self.0);
            Ok(Box::new(NoopEntry))
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_timeout_fails_stalled_session() {
        let options = ManagerOptions {
            start_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let command = WatcherCommand::new("sh").with_leading_args(["-c", "true", "fim-inotify"]);
        let joiner = Arc::new(StallingJoiner(Duration::from_secs(5)));
        let manager = WatchManager::new(
            Arc::new(StaticResolver(Some(1))),
            Orchestrator::new(command, joiner),
            options,
        );

        let started = std::time::Instant::now();
        let handle = manager.new_watch(request(&["/a"])).await.unwrap();
        let status = wait_terminal(&manager, handle).await;

        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(status.state, SessionState::Failed);
        assert!(status.errors.iter().any(|e| e.contains("did not start")));
        assert!(manager.session(handle).unwrap().cancel_token().is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_handles_are_distinct() {
        let manager = manager(Some(1), "true", ManagerOptions::default());
        let first = manager.new_watch(request(&["/a"])).await.unwrap();
        let second = manager.new_watch(request(&["/a"])).await.unwrap();
        assert_ne!(first, second);
    }
}
