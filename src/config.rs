//! Process configuration read from `FIMD_*` environment variables.
use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::resolver::HostPaths;
use crate::session::ManagerOptions;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid value `{value}` for `{var}`: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("environment variable `{0}` is not valid UTF-8")]
    NotUnicode(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub listen_addr: SocketAddr,
    /// `None` disables the HTTP status API.
    pub api_addr: Option<SocketAddr>,
    pub host: HostPaths,
    pub watcher: PathBuf,
    pub watcher_args: Vec<String>,
    pub containerd_socket: Option<PathBuf>,
    pub containerd_namespace: String,
    pub manager: ManagerOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 50051)),
            api_addr: Some(SocketAddr::from(([0, 0, 0, 0], 3000))),
            host: HostPaths::default(),
            watcher: PathBuf::from(crate::watch::DEFAULT_WATCHER),
            watcher_args: Vec::new(),
            containerd_socket: None,
            containerd_namespace: crate::resolver::CONTAINERD_DEFAULT_NAMESPACE.to_owned(),
            manager: ManagerOptions::default(),
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var_os(var))
    }

    /// Builds the configuration from `lookup`, falling back to defaults for unset variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Result<Self> {
        let mut config = Self::default();
        let get = |var: &'static str| -> Result<Option<String>> {
            lookup(var)
                .map(|value| value.into_string().map_err(|_| Error::NotUnicode(var)))
                .transpose()
        };

        if let Some(value) = get("FIMD_LISTEN_ADDR")? {
            config.listen_addr = parse_addr("FIMD_LISTEN_ADDR", &value)?;
        }
        if let Some(value) = get("FIMD_API_ADDR")? {
            config.api_addr = if value.eq_ignore_ascii_case("off") {
                None
            } else {
                Some(parse_addr("FIMD_API_ADDR", &value)?)
            };
        }
        if let Some(value) = get("FIMD_PROC_ROOT")? {
            config.host.proc_root = PathBuf::from(value);
        }
        if let Some(value) = get("FIMD_MOUNTS_FILE")? {
            config.host.mounts_file = PathBuf::from(value);
        }
        if let Some(value) = get("FIMD_ENGINE_PID_FILE")? {
            config.host.engine_pid_file = PathBuf::from(value);
        }
        if let Some(value) = get("FIMD_CGROUP_CONTROLLER")? {
            if value.is_empty() {
                return Err(Error::Invalid {
                    var: "FIMD_CGROUP_CONTROLLER",
                    value,
                    reason: "controller name must not be empty".to_owned(),
                });
            }
            config.host.controller = value;
        }
        if let Some(value) = get("FIMD_WATCHER")? {
            config.watcher = PathBuf::from(value);
        }
        if let Some(value) = get("FIMD_WATCHER_ARGS")? {
            config.watcher_args = value.split_whitespace().map(str::to_owned).collect();
        }
        if let Some(value) = get("FIMD_CONTAINERD_SOCKET")? {
            config.containerd_socket = (!value.is_empty()).then(|| PathBuf::from(value));
        }
        if let Some(value) = get("FIMD_CONTAINERD_NAMESPACE")? {
            config.containerd_namespace = value;
        }
        if let Some(value) = get("FIMD_RESOLVE_TIMEOUT_MS")? {
            config.manager.resolve_timeout = parse_millis("FIMD_RESOLVE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = get("FIMD_START_TIMEOUT_MS")? {
            config.manager.start_timeout = parse_millis("FIMD_START_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = get("FIMD_SESSION_LINGER_MS")? {
            config.manager.linger = parse_millis("FIMD_SESSION_LINGER_MS", &value)?;
        }

        Ok(config)
    }
}

fn parse_addr(var: &'static str, value: &str) -> Result<SocketAddr> {
    value.parse().map_err(|err: std::net::AddrParseError| Error::Invalid {
        var,
        value: value.to_owned(),
        reason: err.to_string(),
    })
}

fn parse_millis(var: &'static str, value: &str) -> Result<Duration> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|err| Error::Invalid {
            var,
            value: value.to_owned(),
            reason: err.to_string(),
        })
}
