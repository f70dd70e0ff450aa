use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::error::ResultOkLogExt;
use crate::namespace::NamespaceJoiner;

use super::{Error, Result, WatchSubject, WatcherCommand};

/// Progress reports sent from a running session to whoever tracks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// The watcher for `subject` was started as process `child_pid`.
    SubjectStarted { subject: usize, child_pid: Option<u32> },
    /// One line of watcher output.
    Line { subject: usize, line: String },
    /// The watcher for `subject` exited successfully.
    SubjectFinished { subject: usize },
    /// Processing of `subject` failed; later subjects still run.
    SubjectFailed { subject: usize, error: String },
}

/// How a session ended when no fatal error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// All subjects were processed; `failed` of them reported an error.
    Completed { failed: usize },
    Cancelled,
}

enum SubjectOutcome {
    Exited,
    Cancelled,
}

/// Runs the watchers of one request, one subject after the other, inside the target
/// container's mount namespace.
#[derive(Clone)]
pub struct Orchestrator {
    command: WatcherCommand,
    joiner: Arc<dyn NamespaceJoiner>,
}

impl Orchestrator {
    pub fn new(command: WatcherCommand, joiner: Arc<dyn NamespaceJoiner>) -> Self {
        Self { command, joiner }
    }

    /// Watches every subject in order, forwarding watcher output through `progress`.
    ///
    /// Must run on a thread that is not shared with unrelated work (see
    /// [`crate::namespace::spawn_pinned`]); the thread is left in the target namespace only
    /// while a watcher runs and switched back afterwards.
    ///
    /// Subject `n` is started only after the watcher of subject `n - 1` has exited. A
    /// failing subject is reported through `progress` and the next one is started.
    /// `cancel` is checked between subjects and kills the active watcher.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Namespace`] if the target namespace can't be opened or joined.
    pub async fn run(
        &self,
        pid: u32,
        subjects: &[WatchSubject],
        cancel: CancellationToken,
        progress: UnboundedSender<Progress>,
    ) -> Result<Outcome> {
        let mut namespace = self.joiner.open(pid)?;
        let mut failed = 0;

        for (index, subject) in subjects.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }

            namespace.join()?;
            let result = self.run_subject(pid, index, subject, &cancel, &progress).await;
            namespace
                .restore()
                .ok_log_context(|| format!("leaving mount namespace of pid {pid}"));

            match result {
                Ok(SubjectOutcome::Exited) => {
                    log::debug!("watcher for subject {index} of pid {pid} exited");
                    let _ = progress.send(Progress::SubjectFinished { subject: index });
                }
                Ok(SubjectOutcome::Cancelled) => return Ok(Outcome::Cancelled),
                Err(err) => {
                    log::error!("watch of pid {pid} subject {index} failed: {err}");
                    failed += 1;
                    let _ = progress.send(Progress::SubjectFailed {
                        subject: index,
                        error: err.to_string(),
                    });
                }
            }
        }

        Ok(Outcome::Completed { failed })
    }

    async fn run_subject(
        &self,
        pid: u32,
        index: usize,
        subject: &WatchSubject,
        cancel: &CancellationToken,
        progress: &UnboundedSender<Progress>,
    ) -> Result<SubjectOutcome> {
        let mut child = self
            .command
            .command(pid, subject)
            .spawn()
            .map_err(|source| Error::Spawn {
                program: self.command.program().clone(),
                source,
            })?;
        log::info!(
            "Started watcher {:?} for subject {} of pid {}",
            child.id(),
            index,
            pid
        );
        let _ = progress.send(Progress::SubjectStarted {
            subject: index,
            child_pid: child.id(),
        });

        let stdout = child
            .stdout
            .take()
            .ok_or(Error::MissingStdout { subject: index })?;
        let mut lines = BufReader::new(stdout).lines();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    stop(&mut child, index).await;
                    return Ok(SubjectOutcome::Cancelled);
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        log::debug!("[pid {pid} subject {index}] {line}");
                        let _ = progress.send(Progress::Line { subject: index, line });
                    }
                    Ok(None) => break,
                    Err(source) => {
                        stop(&mut child, index).await;
                        return Err(Error::Read { subject: index, source });
                    }
                }
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                stop(&mut child, index).await;
                return Ok(SubjectOutcome::Cancelled);
            }
            status = child.wait() => status.map_err(|source| Error::Wait { subject: index, source })?,
        };

        if status.success() {
            Ok(SubjectOutcome::Exited)
        } else {
            Err(Error::Exit {
                subject: index,
                status,
            })
        }
    }
}

async fn stop(child: &mut Child, index: usize) {
    if let Err(err) = child.kill().await {
        log::warn!("failed to kill watcher for subject {index}: {err}");
    }
}
