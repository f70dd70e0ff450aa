use std::path::PathBuf;

use crate::fsutil;

use super::line::CgroupLineError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    FileOpen(#[from] fsutil::FileOpenError),
    #[error("failed to read engine pid file: {0}")]
    PidFile(#[from] fsutil::FirstLineError),
    #[error("failed to read line for file `{path}`: {source}")]
    ReadLine {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("engine pid not found in `{path}`")]
    MissingPid { path: PathBuf },
    #[error("invalid engine pid `{value}` in `{path}`: {source}")]
    InvalidPid {
        path: PathBuf,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("invalid line in file `{path}`: {source}")]
    InvalidLine {
        path: PathBuf,
        #[source]
        source: CgroupLineError,
    },
    #[error("cgroup `{controller}` not found in `{path}`")]
    MissingController { controller: String, path: PathBuf },
}

pub type Result<T> = std::result::Result<T, Error>;
