use std::path::PathBuf;

use crate::fsutil;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    FileOpen(#[from] fsutil::FileOpenError),
    #[error("failed to read line for file `{path}`: {source}")]
    ReadLine {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cgroup mountpoint not found for controller `{controller}` in `{path}`")]
    MissingControllerMount { controller: String, path: PathBuf },
}

pub type Result<T> = std::result::Result<T, Error>;
