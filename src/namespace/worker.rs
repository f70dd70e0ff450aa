use std::future::Future;

use tokio::sync::oneshot;

use super::{Error, Result};

/// Completion handle of a pinned worker thread.
#[derive(Debug)]
pub struct WorkerHandle<T> {
    name: String,
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> WorkerHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits for the worker's future to finish.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Runtime`] if the worker could not build its runtime and
    /// [`Error::WorkerLost`] if the thread died (e.g. panicked) before reporting.
    pub async fn join(self) -> Result<T> {
        self.rx.await.map_err(|_| Error::WorkerLost(self.name))?
    }
}

/// Runs the future produced by `f` on a new OS thread that never executes anything else.
///
/// The thread drives a current-thread runtime, so the future and everything it spawns stay
/// on one kernel thread from start to finish. The thread exits with the future; it is
/// never handed back to a pool, which keeps per-thread kernel state such as namespace
/// membership from leaking into unrelated work.
///
/// # Errors
///
/// Returns [`Error::WorkerSpawn`] if the OS refuses to create the thread.
pub fn spawn_pinned<F, Fut>(name: impl Into<String>, f: F) -> Result<WorkerHandle<Fut::Output>>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future + 'static,
    Fut::Output: Send + 'static,
{
    let name = name.into();
    let (tx, rx) = oneshot::channel();
    let thread_name = name.clone();

    std::thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            let result = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|source| Error::Runtime {
                    name: thread_name.clone(),
                    source,
                })
                .map(|runtime| runtime.block_on(f()));
            if tx.send(result).is_err() {
                log::debug!("worker `{thread_name}` finished after its handle was dropped");
            }
        })
        .map_err(|source| Error::WorkerSpawn {
            name: name.clone(),
            source,
        })?;

    Ok(WorkerHandle { name, rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runs_on_dedicated_thread() {
        let caller = std::thread::current().id();
        let handle = spawn_pinned("fimd-test-worker", || async {
            let before = std::thread::current().id();
            tokio::task::yield_now().await;
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            let after = std::thread::current().id();
            (before, after, std::thread::current().name().map(str::to_owned))
        })
        .unwrap();

        assert_eq!(handle.name(), "fimd-test-worker");
        let (before, after, name) = handle.join().await.unwrap();
        assert_ne!(before, caller);
        assert_eq!(before, after);
        assert_eq!(name.as_deref(), Some("fimd-test-worker"));
    }

    #[tokio::test]
    async fn test_panicking_worker_is_reported() {
        let handle = spawn_pinned("fimd-test-panic", || async {
            panic!("boom");
        })
        .unwrap();

        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, Error::WorkerLost(name) if name == "fimd-test-panic"));
    }
}
