use crate::resolver;

use super::WatchHandle;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Resolve(#[from] resolver::Error),
    #[error("unknown watch handle {0}")]
    UnknownHandle(WatchHandle),
}

pub type Result<T> = std::result::Result<T, Error>;
