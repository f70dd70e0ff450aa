use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;

use super::WatchSubject;

/// Default name of the external watcher executable.
pub const DEFAULT_WATCHER: &str = "fim-inotify";

/// How the external watcher is invoked.
///
/// The resulting command line is
/// `<program> [leading args] -p<pid> -nmnt -t<path>... -e<event>... [flags]`.
/// The program is looked up after the namespace switch, i.e. in the container's view of
/// the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherCommand {
    program: PathBuf,
    leading_args: Vec<OsString>,
}

impl WatcherCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Arguments placed before the generated ones, e.g. for wrapper programs.
    pub fn with_leading_args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    /// The generated watcher arguments for `subject` in the namespace of `pid`.
    pub fn subject_args(&self, pid: u32, subject: &WatchSubject) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::with_capacity(
            2 + subject.paths().len() + subject.events().len() + 4,
        );
        args.push(format!("-p{pid}").into());
        args.push("-nmnt".into());
        for path in subject.paths() {
            let mut arg = OsString::from("-t");
            arg.push(path);
            args.push(arg);
        }
        for event in subject.events() {
            args.push(format!("-e{event}").into());
        }

        let options = subject.options();
        let flags = [
            (options.only_dir, "--only-dir"),
            (options.dont_follow, "--dont-follow"),
            (options.exclude_unlink, "--exclude-unlink"),
            (options.oneshot, "--oneshot"),
        ];
        args.extend(
            flags
                .into_iter()
                .filter(|(enabled, _)| *enabled)
                .map(|(_, flag)| OsString::from(flag)),
        );

        args
    }

    /// Builds the process for `subject`, with stdout piped and the child killed on drop.
    pub fn command(&self, pid: u32, subject: &WatchSubject) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.leading_args)
            .args(self.subject_args(pid, subject))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for WatcherCommand {
    fn default() -> Self {
        Self::new(DEFAULT_WATCHER)
    }
}
