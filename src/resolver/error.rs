use std::path::PathBuf;
use std::time::Duration;

use crate::{cgroup, fsutil, mounts};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Mounts(#[from] mounts::Error),
    #[error(transparent)]
    Cgroup(#[from] cgroup::Error),
    #[error("path `{0}` is not valid UTF-8")]
    NonUtf8Path(PathBuf),
    #[error("invalid glob pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("ambiguous container id `{id}` supplied: {matches:?}")]
    Ambiguous { id: String, matches: Vec<PathBuf> },
    #[error("unable to find container `{id}`")]
    NotFound { id: String },
    #[error("failed to read tasks file: {0}")]
    TasksFile(#[source] fsutil::FirstLineError),
    #[error("no pid found for container in `{path}`")]
    EmptyTasks { path: PathBuf },
    #[error("invalid pid `{value}` in `{path}`: {source}")]
    InvalidPid {
        path: PathBuf,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to connect to containerd socket `{path}`: {source}")]
    SocketConnect {
        path: PathBuf,
        #[source]
        source: tonic::transport::Error,
    },
    #[error("invalid containerd namespace `{0}`")]
    InvalidNamespace(String),
    #[error("containerd task request for `{id}` failed: {source}")]
    TaskRequest {
        id: String,
        #[source]
        source: Box<tonic::Status>,
    },
    #[error("container `{id}` has no running task")]
    NotRunning { id: String },
    #[error("pid resolution task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("resolving container `{id}` timed out after {timeout:?}")]
    Timeout { id: String, timeout: Duration },
}

impl Error {
    /// True for errors that only say the strategy doesn't know the container.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
