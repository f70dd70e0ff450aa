use std::fmt;
use std::io::BufRead;
use std::path::Path;

use crate::fsutil;

use super::line::parse_cgroup_line;
use super::{Error, Result};

/// Path of a process' cgroup relative to a controller's mount point, e.g. `/docker/hostctr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupSubPath(String);

impl CgroupSubPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The sub-path without its leading `/`, suitable for [`Path::join`].
    pub fn relative(&self) -> &str {
        self.0.trim_start_matches('/')
    }
}

impl AsRef<str> for CgroupSubPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CgroupSubPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reads the PID recorded in a container engine PID file.
///
/// # Errors
///
/// - [`Error::PidFile`] if the file can't be read.
/// - [`Error::MissingPid`] if its first line is empty.
/// - [`Error::InvalidPid`] if the first line is not a PID.
pub fn read_engine_pid(pid_file: impl AsRef<Path>) -> Result<u32> {
    let pid_file = pid_file.as_ref();
    let line = fsutil::read_first_line(pid_file)?;
    let value = line.trim();
    if value.is_empty() {
        return Err(Error::MissingPid {
            path: pid_file.to_path_buf(),
        });
    }

    value.parse::<u32>().map_err(|source| Error::InvalidPid {
        path: pid_file.to_path_buf(),
        value: value.to_owned(),
        source,
    })
}

/// Returns the cgroup sub-path of process `pid` for `controller`.
///
/// # Arguments
///
/// * `proc_root` - Mount point of procfs, usually `/proc`.
/// * `pid` - Process to inspect.
/// * `controller` - Controller name, e.g. `memory`.
///
/// # Errors
///
/// - [`Error::FileOpen`] / [`Error::ReadLine`] if `<proc_root>/<pid>/cgroup` can't be read.
/// - [`Error::InvalidLine`] if a line is malformed.
/// - [`Error::MissingController`] if no line lists the controller.
pub fn find_process_cgroup(
    proc_root: impl AsRef<Path>,
    pid: u32,
    controller: &str,
) -> Result<CgroupSubPath> {
    let path = proc_root.as_ref().join(format!("{pid}/cgroup"));
    let reader = fsutil::open_file_reader(&path)?;
    find_cgroup_from_reader(reader, &path, controller)
}

fn find_cgroup_from_reader<R: BufRead>(
    mut reader: R,
    origin: &Path,
    controller: &str,
) -> Result<CgroupSubPath> {
    let mut line = String::with_capacity(256);
    while reader.read_line(&mut line).map_err(|source| Error::ReadLine {
        path: origin.to_path_buf(),
        source,
    })? != 0
    {
        if !line.trim().is_empty() {
            let cgl = parse_cgroup_line(&line).map_err(|source| Error::InvalidLine {
                path: origin.to_path_buf(),
                source,
            })?;
            if cgl.has_controller(controller) {
                return Ok(CgroupSubPath::new(cgl.cgroup_path));
            }
        }
        line.clear();
    }

    Err(Error::MissingController {
        controller: controller.to_owned(),
        path: origin.to_path_buf(),
    })
}

/// Determines the cgroup sub-path of the supervising container engine.
///
/// Combines [`read_engine_pid`] and [`find_process_cgroup`].
pub fn locate_engine_cgroup(
    pid_file: impl AsRef<Path>,
    proc_root: impl AsRef<Path>,
    controller: &str,
) -> Result<CgroupSubPath> {
    let pid = read_engine_pid(pid_file)?;
    let sub_path = find_process_cgroup(proc_root, pid, controller)?;
    log::debug!("Engine pid {pid} is in `{controller}` cgroup `{sub_path}`");
    Ok(sub_path)
}
