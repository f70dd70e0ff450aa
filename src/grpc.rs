//! gRPC channels over Unix domain sockets.
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use std::{pin, task};

use hyper_util::rt::TokioIo;
use tonic::transport::{Channel, Endpoint};

/// Connects every request to the same socket; the URI is only used for the `:authority`.
#[derive(Debug, Clone)]
struct UnixSocketConnector {
    path: Arc<Path>,
}

impl tower::Service<hyper::Uri> for UnixSocketConnector {
    type Response = TokioIo<tokio::net::UnixStream>;

    type Error = std::io::Error;

    type Future = pin::Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut task::Context<'_>) -> task::Poll<Result<(), Self::Error>> {
        task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: hyper::Uri) -> Self::Future {
        let path = Arc::clone(&self.path);
        Box::pin(async move {
            let stream = tokio::net::UnixStream::connect(&*path).await?;
            Ok(TokioIo::new(stream))
        })
    }
}

/// Opens a channel to the gRPC server listening on the Unix socket at `path`.
pub async fn connect_unix(
    path: impl AsRef<Path>,
    connect_timeout: Duration,
) -> Result<Channel, tonic::transport::Error> {
    let path = path.as_ref();
    log::debug!("connecting to gRPC socket {}", path.display());
    let connector = UnixSocketConnector {
        path: Arc::from(path),
    };
    let channel = Endpoint::from_static("http://localhost")
        .connect_timeout(connect_timeout)
        .connect_with_connector(connector)
        .await?;
    log::trace!("channel to {} ready", path.display());

    Ok(channel)
}
