//! Watch requests and the external watcher processes that serve them.
mod command;
mod error;
mod event;
mod orchestrator;

use std::path::PathBuf;

pub use command::{DEFAULT_WATCHER, WatcherCommand};
pub use error::{Error, Result};
pub use event::EventKind;
pub use orchestrator::{Orchestrator, Outcome, Progress};

use crate::container::ContainerID;

/// Optional watcher flags narrowing which objects and operations are reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Only watch paths that are directories.
    pub only_dir: bool,
    /// Don't follow a watched path if it is a symlink.
    pub dont_follow: bool,
    /// Drop events for children after they were unlinked.
    pub exclude_unlink: bool,
    /// Report one event, then stop watching.
    pub oneshot: bool,
}

/// Paths and event types watched together by one watcher process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSubject {
    paths: Vec<PathBuf>,
    events: Vec<EventKind>,
    options: WatchOptions,
}

impl WatchSubject {
    /// Validates a subject.
    ///
    /// Paths are interpreted inside the container and must be absolute. Event names must be
    /// part of the [`EventKind`] vocabulary; an empty list leaves the choice to the watcher.
    ///
    /// # Errors
    ///
    /// - [`Error::NoPaths`] if `paths` is empty.
    /// - [`Error::RelativePath`] for a path that isn't absolute.
    /// - [`Error::UnknownEvent`] for an unsupported event name.
    pub fn new<P, E>(paths: P, events: E, options: WatchOptions) -> Result<Self>
    where
        P: IntoIterator,
        P::Item: Into<PathBuf>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        let paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        if paths.is_empty() {
            return Err(Error::NoPaths);
        }
        if let Some(path) = paths.iter().find(|p| !p.is_absolute()) {
            return Err(Error::RelativePath(path.clone()));
        }

        let mut kinds = Vec::new();
        for event in events {
            let kind: EventKind = event.as_ref().parse()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }

        Ok(Self {
            paths,
            events: kinds,
            options,
        })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn events(&self) -> &[EventKind] {
        &self.events
    }

    pub fn options(&self) -> WatchOptions {
        self.options
    }
}

/// A container and the subjects to watch in it, processed in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRequest {
    pub container_id: ContainerID,
    pub subjects: Vec<WatchSubject>,
}

impl WatchRequest {
    /// # Errors
    ///
    /// Returns [`Error::NoSubjects`] if `subjects` is empty.
    pub fn new(container_id: ContainerID, subjects: Vec<WatchSubject>) -> Result<Self> {
        if subjects.is_empty() {
            return Err(Error::NoSubjects);
        }
        Ok(Self {
            container_id,
            subjects,
        })
    }
}
