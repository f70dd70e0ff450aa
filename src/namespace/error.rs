use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to open namespace file `{path}`: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to unshare filesystem attributes of worker thread: {0}")]
    Unshare(#[source] nix::Error),
    #[error("failed to join mount namespace `{path}`: {source}")]
    Join {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },
    #[error("failed to restore original mount namespace: {0}")]
    Restore(#[source] nix::Error),
    #[error("failed to spawn worker thread `{name}`: {source}")]
    WorkerSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to build runtime for worker thread `{name}`: {source}")]
    Runtime {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("worker thread `{0}` exited without a result")]
    WorkerLost(String),
}

pub type Result<T> = std::result::Result<T, Error>;
