use std::collections::BTreeSet;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use normalize_path::NormalizePath;

use crate::cgroup::{self, CgroupSubPath};
use crate::container::ContainerID;
use crate::{fsutil, mounts};

use super::{BoxFuture, Error, PidResolver, Result};

/// Host files consulted while walking the cgroup hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    /// Mount table, `/proc/mounts`.
    pub mounts_file: PathBuf,
    /// PID file of the supervising container engine, `/var/run/docker.pid`.
    pub engine_pid_file: PathBuf,
    /// Mount point of procfs, `/proc`.
    pub proc_root: PathBuf,
    /// Controller whose hierarchy is searched. Any controller the engine uses works.
    pub controller: String,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            mounts_file: PathBuf::from("/proc/mounts"),
            engine_pid_file: PathBuf::from("/var/run/docker.pid"),
            proc_root: PathBuf::from("/proc"),
            controller: "memory".to_owned(),
        }
    }
}

/// Layouts container runtimes have used for container cgroups, in lookup priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupLayout {
    /// `<root>/<engine>/<id>`
    Plain,
    /// `<root>/<engine>/lxc/<id>`
    Lxc,
    /// `<root>/<engine>/docker/<id>`
    Docker,
    /// `<root>/system.slice/docker-<id>.scope`
    SystemdScope,
    /// `<root>/../systemd/docker/<id>`
    SystemdDocker,
    /// `<root>/../systemd/kubepods/*/pod*/<id>`
    Kubepods,
}

impl CgroupLayout {
    pub const ALL: [CgroupLayout; 6] = [
        CgroupLayout::Plain,
        CgroupLayout::Lxc,
        CgroupLayout::Docker,
        CgroupLayout::SystemdScope,
        CgroupLayout::SystemdDocker,
        CgroupLayout::Kubepods,
    ];

    /// Builds the glob pattern locating the `tasks` file of `id` under this layout.
    ///
    /// `id_glob` is the container id with its trailing wildcard. The literal part of the
    /// pattern is normalized lexically and escaped.
    pub fn pattern(&self, root: &Path, engine: &CgroupSubPath, id_glob: &str) -> Result<String> {
        let engine_root = root.join(engine.relative());
        let (base, tail) = match self {
            CgroupLayout::Plain => (engine_root, format!("{id_glob}/tasks")),
            CgroupLayout::Lxc => (engine_root.join("lxc"), format!("{id_glob}/tasks")),
            CgroupLayout::Docker => (engine_root.join("docker"), format!("{id_glob}/tasks")),
            CgroupLayout::SystemdScope => (
                root.join("system.slice"),
                format!("docker-{id_glob}.scope/tasks"),
            ),
            CgroupLayout::SystemdDocker => {
                (root.join("../systemd/docker"), format!("{id_glob}/tasks"))
            }
            CgroupLayout::Kubepods => (
                root.join("../systemd/kubepods"),
                format!("*/pod*/{id_glob}/tasks"),
            ),
        };
        let base = base.normalize();
        let base = base.to_str().ok_or_else(|| Error::NonUtf8Path(base.clone()))?;

        Ok(format!(
            "{}/{}",
            glob::Pattern::escape(base.trim_end_matches('/')),
            tail
        ))
    }
}

impl std::fmt::Display for CgroupLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CgroupLayout::Plain => "plain",
            CgroupLayout::Lxc => "lxc",
            CgroupLayout::Docker => "docker",
            CgroupLayout::SystemdScope => "systemd-scope",
            CgroupLayout::SystemdDocker => "systemd-docker",
            CgroupLayout::Kubepods => "kubepods",
        };
        write!(f, "{name}")
    }
}

/// Resolves containers by locating their cgroup `tasks` file.
///
/// Every lookup re-reads the mount table and the engine cgroup; nothing is cached.
#[derive(Debug, Clone, Default)]
pub struct CgroupResolver {
    paths: HostPaths,
}

impl CgroupResolver {
    pub fn new(paths: HostPaths) -> Self {
        Self { paths }
    }

    /// Resolves `id` synchronously. Blocks on filesystem access.
    ///
    /// # Errors
    ///
    /// - [`Error::Mounts`] / [`Error::Cgroup`] if host introspection fails.
    /// - [`Error::Ambiguous`] if more than one `tasks` file matches the id.
    /// - [`Error::NotFound`] if no layout matches.
    /// - [`Error::TasksFile`], [`Error::EmptyTasks`], [`Error::InvalidPid`] if the matched
    ///   `tasks` file doesn't start with a PID.
    pub fn resolve_blocking(&self, id: &ContainerID) -> Result<u32> {
        let controller = self.paths.controller.as_str();
        let mount = mounts::find_cgroup_mount_point(&self.paths.mounts_file, controller)?;
        let engine = cgroup::locate_engine_cgroup(
            &self.paths.engine_pid_file,
            &self.paths.proc_root,
            controller,
        )?;

        let tasks = find_tasks_file(&mount.path, &engine, id)?;
        log::debug!("Container `{}` cgroup tasks file: {}", id, tasks.display());
        read_tasks_pid(&tasks)
    }
}

impl PidResolver for CgroupResolver {
    fn name(&self) -> &'static str {
        "cgroup"
    }

    fn resolve<'a>(&'a self, id: &'a ContainerID) -> BoxFuture<'a, Result<u32>> {
        let resolver = self.clone();
        let id = id.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || resolver.resolve_blocking(&id)).await?
        })
    }
}

/// Searches all [`CgroupLayout`]s for the single `tasks` file belonging to `id`.
///
/// Layouts are tried in priority order. Several matches for one layout abort the search
/// immediately; a match is only accepted if no other layout matches as well. The walk does
/// not stop at the first layout with a single match: the same id present under two layouts
/// (plain and `lxc/`, say) must be reported as ambiguous rather than resolved by priority.
fn find_tasks_file(root: &Path, engine: &CgroupSubPath, id: &ContainerID) -> Result<PathBuf> {
    let id_glob = format!("{id}*");
    let mut found: BTreeSet<PathBuf> = BTreeSet::new();

    for layout in CgroupLayout::ALL {
        let pattern = layout.pattern(root, engine, &id_glob)?;
        let matches = expand(&pattern)?;
        log::trace!("layout {layout}: `{pattern}` matched {}", matches.len());
        match matches.len() {
            0 => continue,
            1 => found.extend(matches),
            _ => {
                return Err(Error::Ambiguous {
                    id: id.to_string(),
                    matches,
                });
            }
        }
    }

    let mut found = found.into_iter();
    match (found.next(), found.next()) {
        (None, _) => Err(Error::NotFound { id: id.to_string() }),
        (Some(path), None) => Ok(path),
        (Some(first), Some(second)) => Err(Error::Ambiguous {
            id: id.to_string(),
            matches: [first, second].into_iter().chain(found).collect(),
        }),
    }
}

fn expand(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob::glob(pattern).map_err(|source| Error::Pattern {
        pattern: pattern.to_owned(),
        source,
    })?;

    Ok(paths
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(err) => {
                log::trace!("skipping unreadable glob entry: {err}");
                None
            }
        })
        .collect())
}

/// Parses the first record of a cgroup `tasks` file as a PID.
fn read_tasks_pid(path: &Path) -> Result<u32> {
    let line = fsutil::read_first_line(path).map_err(Error::TasksFile)?;
    let value = line.trim();
    if value.is_empty() {
        return Err(Error::EmptyTasks {
            path: path.to_path_buf(),
        });
    }

    value
        .parse::<NonZeroU32>()
        .map(NonZeroU32::get)
        .map_err(|source| Error::InvalidPid {
            path: path.to_path_buf(),
            value: value.to_owned(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENGINE_PID: u32 = 812;

    /// Synthetic host with a memory hierarchy at `<tmp>/sys/fs/cgroup/memory` and a
    /// docker engine in cgroup `/docker/hostctr`.
    struct Host {
        dir: tempfile::TempDir,
    }

    impl Host {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let host = Self { dir };
            std::fs::create_dir_all(host.memory_root()).unwrap();
            std::fs::create_dir_all(host.path("sys/fs/cgroup/systemd")).unwrap();
            std::fs::write(
                host.path("mounts"),
                format!(
                    "proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0\n\
                     cgroup {} cgroup rw,nosuid,nodev,noexec,relatime,memory 0 0\n",
                    host.memory_root().display()
                ),
            )
            .unwrap();
            std::fs::create_dir_all(host.path(&format!("proc/{ENGINE_PID}"))).unwrap();
            std::fs::write(
                host.path(&format!("proc/{ENGINE_PID}/cgroup")),
                "5:cpu,cpuacct:/docker/hostctr\n4:memory:/docker/hostctr\n",
            )
            .unwrap();
            std::fs::write(host.path("docker.pid"), format!("{ENGINE_PID}\n")).unwrap();
            host
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.dir.path().join(rel)
        }

        fn memory_root(&self) -> PathBuf {
            self.path("sys/fs/cgroup/memory")
        }

        fn resolver(&self) -> CgroupResolver {
            CgroupResolver::new(HostPaths {
                mounts_file: self.path("mounts"),
                engine_pid_file: self.path("docker.pid"),
                proc_root: self.path("proc"),
                controller: "memory".to_owned(),
            })
        }

        fn add_tasks(&self, rel_dir: &str, contents: &str) {
            let dir = self.path(rel_dir);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("tasks"), contents).unwrap();
        }

        fn resolve(&self, id: &str) -> Result<u32> {
            self.resolver()
                .resolve_blocking(&ContainerID::new(id).unwrap())
        }
    }

    fn layout_dir(layout: CgroupLayout, id: &str) -> String {
        match layout {
            CgroupLayout::Plain => format!("sys/fs/cgroup/memory/docker/hostctr/{id}"),
            CgroupLayout::Lxc => format!("sys/fs/cgroup/memory/docker/hostctr/lxc/{id}"),
            CgroupLayout::Docker => format!("sys/fs/cgroup/memory/docker/hostctr/docker/{id}"),
            CgroupLayout::SystemdScope => {
                format!("sys/fs/cgroup/memory/system.slice/docker-{id}.scope")
            }
            CgroupLayout::SystemdDocker => format!("sys/fs/cgroup/systemd/docker/{id}"),
            CgroupLayout::Kubepods => {
                format!("sys/fs/cgroup/systemd/kubepods/burstable/pod1234/{id}")
            }
        }
    }

    #[test]
    fn test_each_layout_resolves_its_own_pid() {
        for (i, layout) in CgroupLayout::ALL.into_iter().enumerate() {
            let host = Host::new();
            let pid = 1000 + i as u32;
            host.add_tasks(&layout_dir(layout, "abc123def"), &format!("{pid}\n77\n"));

            let resolved = host
                .resolve("abc123")
                .unwrap_or_else(|err| panic!("layout {layout} failed: {err}"));
            assert_eq!(resolved, pid, "layout {layout}");
        }
    }

    #[test]
    fn test_end_to_end_docker_layout() {
        let host = Host::new();
        host.add_tasks(&layout_dir(CgroupLayout::Docker, "abc123"), "4321\n");

        assert_eq!(host.resolve("docker://abc1").unwrap(), 4321);
    }

    #[test]
    fn test_scheme_prefix_resolves_identically() {
        let host = Host::new();
        host.add_tasks(&layout_dir(CgroupLayout::Lxc, "abc123"), "55\n");

        assert_eq!(
            host.resolve("docker://abc123").unwrap(),
            host.resolve("abc123").unwrap()
        );
    }

    #[test]
    fn test_ambiguous_within_layout() {
        let host = Host::new();
        host.add_tasks(&layout_dir(CgroupLayout::Docker, "abc123"), "1\n");
        host.add_tasks(&layout_dir(CgroupLayout::Docker, "abc1ff"), "2\n");

        match host.resolve("abc1").unwrap_err() {
            Error::Ambiguous { id, matches } => {
                assert_eq!(id, "abc1");
                assert_eq!(matches.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_ambiguous_across_layouts() {
        let host = Host::new();
        host.add_tasks(&layout_dir(CgroupLayout::Plain, "abc123"), "1\n");
        host.add_tasks(&layout_dir(CgroupLayout::Lxc, "abc123"), "2\n");

        assert!(matches!(
            host.resolve("abc123").unwrap_err(),
            Error::Ambiguous { .. }
        ));
    }

    #[test]
    fn test_not_found() {
        let host = Host::new();
        host.add_tasks(&layout_dir(CgroupLayout::Docker, "ffff"), "1\n");

        match host.resolve("docker://abc1").unwrap_err() {
            Error::NotFound { id } => assert_eq!(id, "abc1"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_tasks_file() {
        let host = Host::new();
        host.add_tasks(&layout_dir(CgroupLayout::Docker, "abc1"), "");

        assert!(matches!(
            host.resolve("abc1").unwrap_err(),
            Error::EmptyTasks { .. }
        ));
    }

    #[test]
    fn test_non_numeric_tasks_file() {
        let host = Host::new();
        host.add_tasks(&layout_dir(CgroupLayout::Docker, "abc1"), "init\n");

        match host.resolve("abc1").unwrap_err() {
            Error::InvalidPid { value, .. } => assert_eq!(value, "init"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_pid_is_invalid() {
        let host = Host::new();
        host.add_tasks(&layout_dir(CgroupLayout::Docker, "abc1"), "0\n");

        assert!(matches!(
            host.resolve("abc1").unwrap_err(),
            Error::InvalidPid { .. }
        ));
    }

    #[test]
    fn test_missing_controller_mount() {
        let host = Host::new();
        std::fs::write(host.path("mounts"), "proc /proc proc rw 0 0\n").unwrap();

        assert!(matches!(
            host.resolve("abc1").unwrap_err(),
            Error::Mounts(mounts::Error::MissingControllerMount { .. })
        ));
    }

    #[test]
    fn test_missing_engine_pid_file() {
        let host = Host::new();
        std::fs::remove_file(host.path("docker.pid")).unwrap();

        assert!(matches!(
            host.resolve("abc1").unwrap_err(),
            Error::Cgroup(cgroup::Error::PidFile(_))
        ));
    }

    #[test]
    fn test_pattern_normalizes_parent_segments() {
        let engine = CgroupSubPath::new("/docker/hostctr");
        let pattern = CgroupLayout::Kubepods
            .pattern(Path::new("/sys/fs/cgroup/memory"), &engine, "abc*")
            .unwrap();
        assert_eq!(pattern, "/sys/fs/cgroup/systemd/kubepods/*/pod*/abc*/tasks");

        let pattern = CgroupLayout::SystemdScope
            .pattern(Path::new("/sys/fs/cgroup/memory"), &engine, "abc*")
            .unwrap();
        assert_eq!(
            pattern,
            "/sys/fs/cgroup/memory/system.slice/docker-abc*.scope/tasks"
        );
    }

    #[test]
    fn test_pattern_escapes_literal_root() {
        let engine = CgroupSubPath::new("/");
        let pattern = CgroupLayout::Plain
            .pattern(Path::new("/cg/[x]"), &engine, "abc*")
            .unwrap();
        assert_eq!(pattern, "/cg/[[]x[]]/abc*/tasks");
    }

    #[tokio::test]
    async fn test_async_resolve() {
        let host = Host::new();
        host.add_tasks(&layout_dir(CgroupLayout::SystemdScope, "abc1"), "99\n");
        let resolver = host.resolver();
        let id = ContainerID::new("abc1").unwrap();
        assert_eq!(resolver.resolve(&id).await.unwrap(), 99);
    }
}
