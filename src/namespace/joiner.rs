use std::fs::File;
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};

use nix::sched::{self, CloneFlags};

use super::{Error, Result};

/// Opens namespaces of target processes. Implementations must be usable from any thread.
pub trait NamespaceJoiner: Send + Sync {
    /// Opens the mount namespace of `pid` without entering it yet.
    ///
    /// Must be called before the first [`NamespaceEntry::join`]: after the switch the
    /// host's procfs is no longer reachable from the calling thread.
    fn open(&self, pid: u32) -> Result<Box<dyn NamespaceEntry>>;
}

/// An opened target namespace, bound to the thread that will join it.
pub trait NamespaceEntry {
    /// Moves the calling thread into the target namespace. Joining again is a no-op switch.
    fn join(&mut self) -> Result<()>;

    /// Moves the calling thread back into the namespace it was in when opened.
    fn restore(&mut self) -> Result<()>;
}

/// Joins mount namespaces through `/proc/<pid>/ns/mnt` and `setns(2)`.
#[derive(Debug, Clone)]
pub struct MountNamespaceJoiner {
    proc_root: PathBuf,
}

impl MountNamespaceJoiner {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }
}

impl Default for MountNamespaceJoiner {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl NamespaceJoiner for MountNamespaceJoiner {
    fn open(&self, pid: u32) -> Result<Box<dyn NamespaceEntry>> {
        Ok(Box::new(MountNamespace::open(&self.proc_root, pid)?))
    }
}

/// Open handles on a target mount namespace and on the caller's original one.
///
/// Both files are closed when the value is dropped.
#[derive(Debug)]
pub struct MountNamespace {
    target_path: PathBuf,
    target: File,
    original: File,
    fs_unshared: bool,
}

impl MountNamespace {
    pub fn open(proc_root: &Path, pid: u32) -> Result<Self> {
        let target_path = proc_root.join(format!("{pid}/ns/mnt"));
        let target = open_ns(&target_path)?;
        let original = open_ns(&proc_root.join("thread-self/ns/mnt"))?;

        Ok(Self {
            target_path,
            target,
            original,
            fs_unshared: false,
        })
    }

    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    fn unshare_fs(&mut self) -> Result<()> {
        // setns(CLONE_NEWNS) fails with EINVAL while the thread shares its fs attributes
        // with the rest of the process.
        if !self.fs_unshared {
            sched::unshare(CloneFlags::CLONE_FS).map_err(Error::Unshare)?;
            self.fs_unshared = true;
        }
        Ok(())
    }
}

impl NamespaceEntry for MountNamespace {
    fn join(&mut self) -> Result<()> {
        self.unshare_fs()?;
        sched::setns(self.target.as_fd(), CloneFlags::CLONE_NEWNS).map_err(|source| {
            Error::Join {
                path: self.target_path.clone(),
                source,
            }
        })?;
        log::debug!("Joined mount namespace {}", self.target_path.display());
        Ok(())
    }

    fn restore(&mut self) -> Result<()> {
        sched::setns(self.original.as_fd(), CloneFlags::CLONE_NEWNS).map_err(Error::Restore)
    }
}

fn open_ns(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| Error::Open {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_process() {
        let dir = tempfile::tempdir().unwrap();
        let err = MountNamespace::open(dir.path(), 4321).unwrap_err();
        match err {
            Error::Open { path, source } => {
                assert_eq!(path, dir.path().join("4321/ns/mnt"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_joiner_reports_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        let joiner = MountNamespaceJoiner::new(dir.path());
        assert!(matches!(joiner.open(1).err(), Some(Error::Open { .. })));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_open_own_namespace() {
        let ns = MountNamespace::open(Path::new("/proc"), std::process::id()).unwrap();
        assert_eq!(
            ns.target_path(),
            Path::new(&format!("/proc/{}/ns/mnt", std::process::id()))
        );
    }

    fn current_mount_ns() -> u64 {
        use std::os::unix::fs::MetadataExt;
        std::fs::metadata("/proc/thread-self/ns/mnt").unwrap().ino()
    }

    /// Joins the mount namespace of `pid`, runs a command there and switches back.
    ///
    /// Returns `None` when the caller lacks the privilege to switch namespaces.
    async fn join_round_trip(pid: u32) -> Result<Option<(u64, u64, String)>> {
        let before = current_mount_ns();
        let mut ns = MountNamespace::open(Path::new("/proc"), pid)?;
        match ns.join() {
            Err(Error::Unshare(nix::errno::Errno::EPERM))
            | Err(Error::Join {
                source: nix::errno::Errno::EPERM,
                ..
            }) => {
                eprintln!("skipping namespace round trip: setns needs CAP_SYS_ADMIN");
                return Ok(None);
            }
            other => other?,
        }

        let output = tokio::process::Command::new("sh")
            .args(["-c", "echo hi"])
            .output()
            .await
            .expect("sh runs inside the joined namespace");
        ns.restore()?;

        Ok(Some((
            before,
            current_mount_ns(),
            String::from_utf8_lossy(&output.stdout).into_owned(),
        )))
    }

    #[tokio::test]
    async fn test_join_and_restore_on_pinned_worker() {
        let pid = std::process::id();
        let worker =
            crate::namespace::spawn_pinned("fimd-test-join", move || join_round_trip(pid)).unwrap();

        let Some((before, after, stdout)) = worker.join().await.unwrap().unwrap() else {
            return;
        };
        assert_eq!(stdout, "hi\n");
        assert_eq!(before, after);
    }
}
