use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Error that occurs when opening a file fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to open file `{path}`: {source}")]
pub struct FileOpenError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Error that occurs when reading the first record of a file fails.
#[derive(Debug, thiserror::Error)]
pub enum FirstLineError {
    #[error(transparent)]
    FileOpen(#[from] FileOpenError),
    #[error("failed to read from file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Opens a file at the given path and wraps it in a [`BufReader`].
///
/// # Errors
///
/// Returns a [`FileOpenError`] if the file cannot be opened.
///
/// # Example
/// ```no_run
/// # use fimd::fsutil;
/// let reader = fsutil::open_file_reader("/proc/mounts")?;
/// # Ok::<(), fsutil::FileOpenError>(())
/// ```
pub fn open_file_reader(path: impl AsRef<Path>) -> Result<BufReader<File>, FileOpenError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| FileOpenError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Reads the first newline-delimited record of a file, without the line terminator.
///
/// An empty file yields an empty string; interpreting that is up to the caller.
pub fn read_first_line(path: impl AsRef<Path>) -> Result<String, FirstLineError> {
    let path = path.as_ref();
    let mut reader = open_file_reader(path)?;
    let mut line = String::with_capacity(32);
    reader
        .read_line(&mut line)
        .map_err(|source| FirstLineError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let trimmed_len = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed_len);
    Ok(line)
}
