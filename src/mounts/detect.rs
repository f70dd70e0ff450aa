use crate::fsutil;

use super::parser::parse_mount_line;
use super::{Error, Result};
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// A cgroup v1 controller together with the host path it is mounted at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupMountPoint {
    pub controller: String,
    pub path: PathBuf,
}

/// Finds the mount point of the cgroup v1 hierarchy carrying `controller`.
///
/// Scans a mount table in `/proc/mounts` format top to bottom and returns the first
/// `cgroup` filesystem whose mount options list the controller.
///
/// # Arguments
///
/// * `path` - Path to the mount table (usually `/proc/mounts`).
/// * `controller` - Controller name, e.g. `memory`.
///
/// # Errors
///
/// - [`Error::FileOpen`] if the table can't be opened.
/// - [`Error::ReadLine`] if reading from the table fails.
/// - [`Error::MissingControllerMount`] if no line mounts the controller.
///
/// # Example
///
/// ```no_run
/// use fimd::mounts::find_cgroup_mount_point;
///
/// let mount = find_cgroup_mount_point("/proc/mounts", "memory").unwrap();
/// println!("memory cgroup root: {}", mount.path.display());
/// ```
pub fn find_cgroup_mount_point(
    path: impl AsRef<Path>,
    controller: &str,
) -> Result<CgroupMountPoint> {
    let path = path.as_ref();
    let buf = fsutil::open_file_reader(path)?;

    find_cgroup_mount_point_from_reader(buf, path, controller)
}

fn find_cgroup_mount_point_from_reader<R: BufRead>(
    mut reader: R,
    origin: &Path,
    controller: &str,
) -> Result<CgroupMountPoint> {
    let mut line = String::with_capacity(256);

    while reader
        .read_line(&mut line)
        .map_err(|source| Error::ReadLine {
            path: origin.to_path_buf(),
            source,
        })?
        != 0
    {
        // Lines that don't have the six mount table fields can't describe a cgroup mount.
        match parse_mount_line(line.trim_end()) {
            Ok(entry) if entry.fs_type == "cgroup" && entry.has_option(controller) => {
                log::debug!(
                    "Found `{}` cgroup mount point: {}",
                    controller,
                    entry.mount_point
                );
                return Ok(CgroupMountPoint {
                    controller: controller.to_owned(),
                    path: PathBuf::from(entry.mount_point),
                });
            }
            Ok(_) => {}
            Err(err) => log::trace!("skipping mount table line in `{}`: {}", origin.display(), err),
        }

        line.clear();
    }

    Err(Error::MissingControllerMount {
        controller: controller.to_owned(),
        path: origin.to_path_buf(),
    })
}
