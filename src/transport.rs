//! Client connections to runtime and notification endpoints.
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use hyper::client::conn::http1::SendRequest;
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint};

/// Opens a stream to the unix socket at `path`, ready for hyper.
pub async fn connect_unix(path: &Path) -> std::io::Result<TokioIo<UnixStream>> {
    log::debug!("Connecting to {}...", path.display());
    let stream = UnixStream::connect(path).await?;
    Ok(TokioIo::new(stream))
}

/// Dials the same socket for every connection the gRPC channel opens. The
/// request URI only names the endpoint and is ignored.
#[derive(Debug, Clone)]
struct SocketDialer(Arc<Path>);

impl tower::Service<hyper::Uri> for SocketDialer {
    type Response = TokioIo<UnixStream>;
    type Error = std::io::Error;
    type Future = Pin<Box<dyn Future<Output = std::io::Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _endpoint: hyper::Uri) -> Self::Future {
        let path = Arc::clone(&self.0);
        Box::pin(async move { connect_unix(&path).await })
    }
}

/// Opens a gRPC channel over the unix socket at `path`.
///
/// The first connection is made eagerly, so a missing socket fails here.
pub async fn channel_for_unix_socket(path: &Path) -> Result<Channel, tonic::transport::Error> {
    let channel = Endpoint::from_static("http://containerd.sock")
        .connect_with_connector(SocketDialer(Arc::from(path)))
        .await?;
    log::debug!("gRPC channel to {} ready", path.display());

    Ok(channel)
}

/// Performs an HTTP/1.1 handshake on `io` and drives the connection in the
/// background.
///
/// The connection task ends once the returned sender and all response bodies
/// have been dropped.
pub async fn http1_handshake<IO>(io: IO, peer: String) -> Result<SendRequest<String>, hyper::Error>
where
    IO: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (sender, connection) = hyper::client::conn::http1::handshake(io).await?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            log::debug!("HTTP connection to {peer} closed: {err}");
        }
    });

    Ok(sender)
}
