//! The `fim.Fimd` gRPC service.
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status};

use crate::container::{self, ContainerID};
use crate::fim::{self, fimd_server::Fimd, watch_status};
use crate::resolver;
use crate::session::{self, SessionState, SessionStatus, WatchEvent, WatchHandle, WatchManager};
use crate::watch::{self, WatchOptions, WatchRequest, WatchSubject};

const EVENT_BUFFER: usize = 128;

/// Serves watch requests by delegating to a [`WatchManager`].
#[derive(Clone)]
pub struct FimdService {
    manager: WatchManager,
}

impl FimdService {
    pub fn new(manager: WatchManager) -> Self {
        Self { manager }
    }

    pub fn into_server(self) -> fim::fimd_server::FimdServer<Self> {
        fim::fimd_server::FimdServer::new(self)
    }
}

#[tonic::async_trait]
impl Fimd for FimdService {
    async fn new_watch(
        &self,
        request: Request<fim::FimdConfig>,
    ) -> Result<Response<fim::FimdHandle>, Status> {
        let request = watch_request(request.into_inner())?;
        let handle = self
            .manager
            .new_watch(request)
            .await
            .map_err(status_from_session)?;
        Ok(Response::new(fim::FimdHandle {
            id: handle.as_raw(),
        }))
    }

    async fn destroy_watch(
        &self,
        request: Request<fim::FimdHandle>,
    ) -> Result<Response<fim::Empty>, Status> {
        let handle = WatchHandle::from_raw(request.into_inner().id);
        self.manager.destroy(handle).map_err(status_from_session)?;
        Ok(Response::new(fim::Empty {}))
    }

    async fn get_watch_status(
        &self,
        request: Request<fim::FimdHandle>,
    ) -> Result<Response<fim::WatchStatus>, Status> {
        let handle = WatchHandle::from_raw(request.into_inner().id);
        let status = self.manager.status(handle).map_err(status_from_session)?;
        Ok(Response::new(status.into()))
    }

    type GetWatchStateStream =
        tokio_stream::Iter<std::vec::IntoIter<Result<fim::WatchStatus, Status>>>;

    async fn get_watch_state(
        &self,
        _request: Request<fim::Empty>,
    ) -> Result<Response<Self::GetWatchStateStream>, Status> {
        let statuses: Vec<_> = self
            .manager
            .statuses()
            .into_iter()
            .map(|status| Ok(status.into()))
            .collect();
        Ok(Response::new(tokio_stream::iter(statuses)))
    }

    type StreamWatchStream = Pin<Box<dyn Stream<Item = Result<fim::WatchEvent, Status>> + Send>>;

    async fn stream_watch(
        &self,
        request: Request<fim::FimdHandle>,
    ) -> Result<Response<Self::StreamWatchStream>, Status> {
        let handle = WatchHandle::from_raw(request.into_inner().id);
        let session = self.manager.session(handle).map_err(status_from_session)?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(async move {
            session.relay_events(tx).await;
            log::debug!("event stream of watch {handle} closed");
        });

        let stream = ReceiverStream::new(rx).map(|event| Ok(fim::WatchEvent::from(event)));
        Ok(Response::new(Box::pin(stream)))
    }
}

fn watch_request(config: fim::FimdConfig) -> Result<WatchRequest, Status> {
    let container_id = ContainerID::new(&config.container_id).map_err(status_from_container)?;
    let subjects = config
        .subject
        .into_iter()
        .map(watch_subject)
        .collect::<Result<Vec<_>, _>>()?;
    WatchRequest::new(container_id, subjects).map_err(status_from_watch)
}

fn watch_subject(subject: fim::FimWatcherSubject) -> Result<WatchSubject, Status> {
    let options = WatchOptions {
        only_dir: subject.only_dir,
        dont_follow: subject.dont_follow,
        exclude_unlink: subject.exclude_unlink,
        oneshot: subject.oneshot,
    };
    WatchSubject::new(subject.path, subject.event, options).map_err(status_from_watch)
}

fn status_from_container(err: container::Error) -> Status {
    Status::invalid_argument(err.to_string())
}

fn status_from_watch(err: watch::Error) -> Status {
    match err {
        watch::Error::NoSubjects
        | watch::Error::NoPaths
        | watch::Error::RelativePath(_)
        | watch::Error::UnknownEvent(_) => Status::invalid_argument(err.to_string()),
        _ => Status::internal(err.to_string()),
    }
}

fn status_from_session(err: session::Error) -> Status {
    match err {
        session::Error::UnknownHandle(_) => Status::not_found(err.to_string()),
        session::Error::Resolve(err) => match err {
            resolver::Error::NotFound { .. } => Status::not_found(err.to_string()),
            resolver::Error::Ambiguous { .. } | resolver::Error::NotRunning { .. } => {
                Status::failed_precondition(err.to_string())
            }
            resolver::Error::Timeout { .. } => Status::deadline_exceeded(err.to_string()),
            err => {
                log::error!("failed to resolve container: {err}");
                Status::internal(err.to_string())
            }
        },
    }
}

impl From<SessionState> for watch_status::State {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Starting => watch_status::State::Starting,
            SessionState::Running => watch_status::State::Running,
            SessionState::Completed => watch_status::State::Completed,
            SessionState::Failed => watch_status::State::Failed,
            SessionState::Cancelled => watch_status::State::Cancelled,
        }
    }
}

impl From<SessionStatus> for fim::WatchStatus {
    fn from(status: SessionStatus) -> Self {
        Self {
            handle: status.handle.as_raw(),
            container_id: status.container_id,
            pid: status.pid,
            state: watch_status::State::from(status.state) as i32,
            current_subject: u32::try_from(status.current_subject).unwrap_or(u32::MAX),
            errors: status.errors,
            started_at: Some(prost_types::Timestamp::from(status.started_at)),
        }
    }
}

impl From<WatchEvent> for fim::WatchEvent {
    fn from(event: WatchEvent) -> Self {
        Self {
            handle: event.handle.as_raw(),
            subject: u32::try_from(event.subject).unwrap_or(u32::MAX),
            line: event.line,
        }
    }
}
