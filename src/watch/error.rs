use std::path::PathBuf;
use std::process::ExitStatus;

use crate::namespace;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("watch request has no subjects")]
    NoSubjects,
    #[error("watch subject has no paths")]
    NoPaths,
    #[error("watch path `{0}` is not absolute")]
    RelativePath(PathBuf),
    #[error("unknown watch event `{0}`")]
    UnknownEvent(String),
    #[error(transparent)]
    Namespace(#[from] namespace::Error),
    #[error("failed to start watcher `{program}`: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("watcher for subject {subject} has no stdout")]
    MissingStdout { subject: usize },
    #[error("failed to read watcher output for subject {subject}: {source}")]
    Read {
        subject: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to wait for watcher of subject {subject}: {source}")]
    Wait {
        subject: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("watcher for subject {subject} exited with {status}")]
    Exit { subject: usize, status: ExitStatus },
}

pub type Result<T> = std::result::Result<T, Error>;
