use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tonic::metadata::MetadataValue;

use crate::container::ContainerID;
use crate::containerd::services::tasks::v1::GetRequest;
use crate::containerd::services::tasks::v1::tasks_client::TasksClient;
use crate::containerd::v1::types::Status;

use super::{BoxFuture, Error, PidResolver, Result};

/// Namespace Docker uses for its containers inside containerd.
pub const DEFAULT_NAMESPACE: &str = "moby";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Resolves containers by asking containerd for the PID of the container's task.
///
/// The lookup needs the full container id; containerd does not match prefixes.
#[derive(Debug, Clone)]
pub struct ContainerdResolver {
    socket_path: PathBuf,
    namespace: String,
}

impl ContainerdResolver {
    pub fn new(socket_path: PathBuf, namespace: impl Into<String>) -> Self {
        Self {
            socket_path,
            namespace: namespace.into(),
        }
    }

    async fn task_pid(&self, id: &ContainerID) -> Result<u32> {
        let namespace = MetadataValue::from_str(&self.namespace)
            .map_err(|_| Error::InvalidNamespace(self.namespace.clone()))?;
        let channel = crate::grpc::connect_unix(&self.socket_path, CONNECT_TIMEOUT)
            .await
            .map_err(|source| Error::SocketConnect {
                path: self.socket_path.clone(),
                source,
            })?;
        let mut client = TasksClient::new(channel);

        let mut request = tonic::Request::new(GetRequest {
            container_id: id.to_string(),
            exec_id: String::new(),
        });
        request
            .metadata_mut()
            .insert("containerd-namespace", namespace);

        let process = match client.get(request).await {
            Ok(response) => response.into_inner().process,
            Err(status) if status.code() == tonic::Code::NotFound => {
                return Err(Error::NotFound { id: id.to_string() });
            }
            Err(status) => {
                return Err(Error::TaskRequest {
                    id: id.to_string(),
                    source: Box::new(status),
                });
            }
        };

        match process {
            Some(process) if process.status() == Status::Running && process.pid > 0 => {
                Ok(process.pid)
            }
            Some(process) => {
                log::debug!(
                    "containerd task for `{}` has status {:?}",
                    id,
                    process.status()
                );
                Err(Error::NotRunning { id: id.to_string() })
            }
            None => Err(Error::NotFound { id: id.to_string() }),
        }
    }
}

impl PidResolver for ContainerdResolver {
    fn name(&self) -> &'static str {
        "containerd"
    }

    fn resolve<'a>(&'a self, id: &'a ContainerID) -> BoxFuture<'a, Result<u32>> {
        Box::pin(self.task_pid(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use tokio_stream::wrappers::UnixListenerStream;

    use crate::containerd::services::tasks::v1::GetResponse;
    use crate::containerd::services::tasks::v1::tasks_server::{Tasks, TasksServer};
    use crate::containerd::v1::types::Process;
    use crate::resolver::{CgroupResolver, ChainedResolver, HostPaths};

    #[derive(Clone)]
    enum Reply {
        Task { pid: u32, status: Status },
        NoProcess,
        Missing,
    }

    /// Requests seen by the fake: namespace header, container id, exec id.
    type Seen = Arc<Mutex<Vec<(String, String, String)>>>;

    struct FakeTasks {
        reply: Reply,
        seen: Seen,
    }

    #[tonic::async_trait]
    impl Tasks for FakeTasks {
        async fn get(
            &self,
            request: tonic::Request<GetRequest>,
        ) -> std::result::Result<tonic::Response<GetResponse>, tonic::Status> {
            let namespace = request
                .metadata()
                .get("containerd-namespace")
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_owned();
            let request = request.into_inner();
            self.seen
                .lock()
                .unwrap()
                .push((namespace, request.container_id.clone(), request.exec_id));

            let process = match self.reply.clone() {
                Reply::Task { pid, status } => Some(Process {
                    container_id: request.container_id.clone(),
                    id: request.container_id,
                    pid,
                    status: status as i32,
                    ..Default::default()
                }),
                Reply::NoProcess => None,
                Reply::Missing => {
                    return Err(tonic::Status::not_found("container not found"));
                }
            };
            Ok(tonic::Response::new(GetResponse { process }))
        }
    }

    /// Serves a fake Tasks service on a unix socket inside `dir`.
    fn serve(dir: &tempfile::TempDir, reply: Reply) -> (PathBuf, Seen) {
        let socket = dir.path().join("containerd.sock");
        let listener = tokio::net::UnixListener::bind(&socket).unwrap();
        let seen = Seen::default();
        let tasks = FakeTasks {
            reply,
            seen: Arc::clone(&seen),
        };
        tokio::spawn(
            tonic::transport::Server::builder()
                .add_service(TasksServer::new(tasks))
                .serve_with_incoming(UnixListenerStream::new(listener)),
        );
        (socket, seen)
    }

    fn id() -> ContainerID {
        ContainerID::new("containerd://abc1").unwrap()
    }

    #[tokio::test]
    async fn test_running_task_pid() {
        let dir = tempfile::tempdir().unwrap();
        let reply = Reply::Task {
            pid: 4321,
            status: Status::Running,
        };
        let (socket, seen) = serve(&dir, reply);

        let resolver = ContainerdResolver::new(socket, DEFAULT_NAMESPACE);
        assert_eq!(resolver.resolve(&id()).await.unwrap(), 4321);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![("moby".to_owned(), "abc1".to_owned(), String::new())]
        );
    }

    #[tokio::test]
    async fn test_namespace_header_is_configurable() {
        let dir = tempfile::tempdir().unwrap();
        let reply = Reply::Task {
            pid: 7,
            status: Status::Running,
        };
        let (socket, seen) = serve(&dir, reply);

        let resolver = ContainerdResolver::new(socket, "k8s.io");
        assert_eq!(resolver.resolve(&id()).await.unwrap(), 7);
        assert_eq!(seen.lock().unwrap()[0].0, "k8s.io");
    }

    #[tokio::test]
    async fn test_unknown_container_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (socket, _) = serve(&dir, Reply::Missing);

        let err = ContainerdResolver::new(socket, DEFAULT_NAMESPACE)
            .resolve(&id())
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_missing_process_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (socket, _) = serve(&dir, Reply::NoProcess);

        let err = ContainerdResolver::new(socket, DEFAULT_NAMESPACE)
            .resolve(&id())
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_stopped_task_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let reply = Reply::Task {
            pid: 4321,
            status: Status::Stopped,
        };
        let (socket, _) = serve(&dir, reply);

        let err = ContainerdResolver::new(socket, DEFAULT_NAMESPACE)
            .resolve(&id())
            .await
            .unwrap_err();
        match err {
            Error::NotRunning { id } => assert_eq!(id, "abc1"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_namespace_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ContainerdResolver::new(dir.path().join("absent.sock"), "bad\nns");
        assert!(matches!(
            resolver.resolve(&id()).await.unwrap_err(),
            Error::InvalidNamespace(_)
        ));
    }

    #[tokio::test]
    async fn test_chain_falls_back_from_cgroup_walk_to_containerd() {
        let dir = tempfile::tempdir().unwrap();
        let memory_root = dir.path().join("memory");
        std::fs::create_dir_all(&memory_root).unwrap();
        std::fs::create_dir_all(dir.path().join("proc/812")).unwrap();
        std::fs::write(
            dir.path().join("mounts"),
            format!("cgroup {} cgroup rw,memory 0 0\n", memory_root.display()),
        )
        .unwrap();
        std::fs::write(dir.path().join("docker.pid"), "812\n").unwrap();
        std::fs::write(
            dir.path().join("proc/812/cgroup"),
            "4:memory:/docker/hostctr\n",
        )
        .unwrap();
        let cgroup = CgroupResolver::new(HostPaths {
            mounts_file: dir.path().join("mounts"),
            engine_pid_file: dir.path().join("docker.pid"),
            proc_root: dir.path().join("proc"),
            controller: "memory".to_owned(),
        });
        assert!(cgroup.resolve(&id()).await.unwrap_err().is_not_found());

        let reply = Reply::Task {
            pid: 99,
            status: Status::Running,
        };
        let (socket, seen) = serve(&dir, reply);
        let chain = ChainedResolver::new(vec![
            Arc::new(cgroup),
            Arc::new(ContainerdResolver::new(socket, DEFAULT_NAMESPACE)),
        ]);

        assert_eq!(chain.resolve(&id()).await.unwrap(), 99);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
