//! fimd: a file integrity monitoring agent for Docker containers.
//!
//! A client names a container and a list of watch subjects. The agent resolves the
//! container to the host PID of its init process (by walking the cgroup v1 hierarchy or by
//! asking containerd), joins that process's mount namespace on a dedicated thread and runs
//! one `fim-inotify` watcher per subject, in order. Sessions are exposed through the
//! `fim.Fimd` gRPC service and a small read-only HTTP API.
use std::sync::Arc;

use resolver::{CgroupResolver, ChainedResolver, ContainerdResolver, PidResolver};
use session::WatchManager;
use watch::{Orchestrator, WatcherCommand};

use crate::error::ResultOkLogExt;

pub mod api;
pub mod cgroup;
pub mod config;
pub mod container;
pub mod error;
pub mod fsutil;
pub mod grpc;
pub mod mounts;
pub mod namespace;
pub mod resolver;
pub mod service;
pub mod session;
pub mod watch;

pub mod fim {
    tonic::include_proto!("fim");
}

pub mod containerd {
    pub mod v1 {
        pub mod types {
            tonic::include_proto!("containerd.v1.types");
        }
    }
    pub mod services {
        pub mod tasks {
            pub mod v1 {
                tonic::include_proto!("containerd.services.tasks.v1");
            }
        }
    }
}

/// Builds the PID resolver for `config`: the cgroup walk, falling back to containerd when
/// a socket is configured.
pub fn build_resolver(config: &config::Config) -> Arc<dyn PidResolver> {
    let cgroup: Arc<dyn PidResolver> = Arc::new(CgroupResolver::new(config.host.clone()));
    match &config.containerd_socket {
        Some(socket) => {
            log::info!(
                "Falling back to containerd at {} (namespace `{}`)",
                socket.display(),
                config.containerd_namespace
            );
            let containerd =
                ContainerdResolver::new(socket.clone(), config.containerd_namespace.clone());
            Arc::new(ChainedResolver::new(vec![cgroup, Arc::new(containerd)]))
        }
        None => cgroup,
    }
}

/// Builds the watch manager for `config`.
pub fn build_manager(config: &config::Config) -> WatchManager {
    let command =
        WatcherCommand::new(&config.watcher).with_leading_args(config.watcher_args.iter());
    let joiner = Arc::new(namespace::MountNamespaceJoiner::new(&config.host.proc_root));
    let orchestrator = Orchestrator::new(command, joiner);
    WatchManager::new(build_resolver(config), orchestrator, config.manager)
}

/// Runs the agent until the gRPC server stops.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the gRPC listener can't be bound.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::Config::from_env()?;
    log::debug!("Configuration: {config:?}");

    let manager = build_manager(&config);

    if let Some(addr) = config.api_addr {
        let api = api::APIServer::new(manager.clone());
        tokio::spawn(async move {
            api.listen(addr)
                .await
                .ok_log_context(|| format!("HTTP API on {addr} stopped"));
        });
    } else {
        log::info!("HTTP API disabled");
    }

    log::info!("gRPC server listening on {}", config.listen_addr);
    tonic::transport::Server::builder()
        .add_service(service::FimdService::new(manager).into_server())
        .serve(config.listen_addr)
        .await?;

    Ok(())
}
