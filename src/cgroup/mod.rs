//! Cgroup membership of the supervising container engine.
//!
//! Container cgroups are created below the cgroup of the engine that started them, so the
//! engine's own membership for a controller is the root of every container lookup. The
//! engine is found through its PID file (`/var/run/docker.pid` for Docker) and its
//! membership is read from `/proc/<pid>/cgroup`, whose lines have the format
//! `<hierarchy-id>:<controller-list>:<cgroup-path>`.
mod error;
mod line;
mod locate;

pub use error::{Error, Result};
pub use line::{CgroupLine, CgroupLineError, parse_cgroup_line};
pub use locate::{CgroupSubPath, find_process_cgroup, locate_engine_cgroup, read_engine_pid};
