use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

mod error;

pub use error::{Error, Result};

/// The maximum allowed length for a [`ContainerID`].
const CONTAINER_ID_MAX_LEN: usize = 255;

/// Separator between a runtime scheme and the id, as in `docker://<id>`.
const SCHEME_SEPARATOR: &str = "://";

/// A normalized container identifier.
///
/// Runtime prefixes such as `docker://` or `containerd://` are stripped. The remaining
/// token is non-empty and safe to embed as a single segment in a glob pattern, so it may be
/// a prefix of the full id.
///
/// # Examples
///
/// ```
/// # use fimd::container::ContainerID;
/// let id = ContainerID::new("docker://abc123").unwrap();
/// assert_eq!(id.as_ref(), "abc123");
/// assert_eq!(id, ContainerID::new("abc123").unwrap());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerID(Arc<str>);

impl ContainerID {
    /// Creates a new `ContainerID` from the given raw id.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyContainerID`] if nothing remains after stripping the scheme.
    /// - [`Error::ContainerIDTooLong`] if the id exceeds [`CONTAINER_ID_MAX_LEN`].
    /// - [`Error::InvalidCharacter`] for path separators, glob metacharacters or whitespace.
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        let id = src
            .split_once(SCHEME_SEPARATOR)
            .map_or(src, |(_, id)| id)
            .trim();
        if id.is_empty() || id == "." || id == ".." {
            return Err(Error::EmptyContainerID(src.to_owned()));
        }
        if id.len() > CONTAINER_ID_MAX_LEN {
            return Err(Error::ContainerIDTooLong(src.to_owned()));
        }
        if let Some(character) = id.chars().find(|c| !is_glob_safe(*c)) {
            return Err(Error::InvalidCharacter {
                id: src.to_owned(),
                character,
            });
        }

        Ok(Self(id.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_glob_safe(c: char) -> bool {
    !matches!(c, '/' | '\\' | '*' | '?' | '[' | ']' | '{' | '}' | '!')
        && !c.is_whitespace()
        && !c.is_control()
}

impl FromStr for ContainerID {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ContainerID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContainerID {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
