//! Resolution of container identifiers to host process IDs.
//!
//! [`PidResolver`] is the seam between the watch service and the strategy used to find a
//! container's process: [`CgroupResolver`] walks the cgroup v1 hierarchy below the
//! container engine, [`ContainerdResolver`] asks containerd, and [`ChainedResolver`] tries
//! several strategies in order.
mod cgroup_walk;
mod chain;
mod containerd;
mod error;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub use cgroup_walk::{CgroupLayout, CgroupResolver, HostPaths};
pub use chain::ChainedResolver;
pub use containerd::{ContainerdResolver, DEFAULT_NAMESPACE as CONTAINERD_DEFAULT_NAMESPACE};
pub use error::{Error, Result};

use crate::container::ContainerID;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A strategy that maps a container to the host PID of its init process.
pub trait PidResolver: Send + Sync {
    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    /// Resolves `id` to a positive host PID. A single attempt, never retried.
    fn resolve<'a>(&'a self, id: &'a ContainerID) -> BoxFuture<'a, Result<u32>>;
}

/// Runs `resolver` for `id`, failing with [`Error::Timeout`] once `timeout` elapses.
pub async fn resolve_with_timeout(
    resolver: &dyn PidResolver,
    id: &ContainerID,
    timeout: Duration,
) -> Result<u32> {
    match tokio::time::timeout(timeout, resolver.resolve(id)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            id: id.to_string(),
            timeout,
        }),
    }
}
