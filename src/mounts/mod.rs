//! Cgroup v1 controller mount discovery from the host mount table.
mod detect;
mod error;
mod parser;

pub use detect::{CgroupMountPoint, find_cgroup_mount_point};
pub use error::{Error, Result};
pub use parser::{MountEntry, MountField, ParseError, parse_mount_line};
