//! Docker Engine API event source.
//!
//! `GET /events` on the Docker socket answers with a never-ending body of
//! newline separated JSON messages, one per event.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use hyper::body::{Body as _, Incoming};
use hyper::client::conn::http1::SendRequest;
use hyper::{StatusCode, header};
use tokio_util::sync::CancellationToken;

use crate::container::{self, Actor, ContainerID};
use crate::event::Event;

use super::{EventSource, EventStream, StreamSender};

/// `/events?filters={"type":["container"]}`
const EVENTS_PATH: &str = "/events?filters=%7B%22type%22%3A%5B%22container%22%5D%7D";

/// Upper bound for a single message line.
const MAX_LINE_LEN: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to connect to socket `{path}`: {source}")]
    SocketConnect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP handshake with `{path}` failed: {source}")]
    Handshake {
        path: PathBuf,
        #[source]
        source: hyper::Error,
    },
    #[error("events request failed: {0}")]
    Request(#[source] hyper::Error),
    #[error("events request returned status {status}")]
    Status { status: StatusCode },
    #[error("failed to read event stream: {0}")]
    Body(#[source] hyper::Error),
    #[error("event message exceeds {limit} bytes without a line break")]
    LineTooLong { limit: usize },
    #[error("failed to decode event message: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("invalid actor in event message: {0}")]
    InvalidActor(#[source] container::Error),
}

/// A subscription to the container events of a Docker daemon.
pub struct DockerEventSource {
    socket_path: PathBuf,
    // Keeps the connection open for as long as the body is read.
    _sender: SendRequest<String>,
    body: Incoming,
}

impl DockerEventSource {
    /// Connects to the Docker socket at `socket_path` and subscribes to
    /// container events.
    ///
    /// # Errors
    ///
    /// Fails if the socket cannot be reached, the HTTP exchange fails, or the
    /// daemon answers with anything but `200 OK`.
    pub async fn connect(socket_path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = socket_path.as_ref();
        let io = crate::transport::connect_unix(path)
            .await
            .map_err(|source| Error::SocketConnect {
                path: path.to_path_buf(),
                source,
            })?;
        let mut sender = crate::transport::http1_handshake(io, path.display().to_string())
            .await
            .map_err(|source| Error::Handshake {
                path: path.to_path_buf(),
                source,
            })?;

        let mut request = hyper::Request::new(String::new());
        *request.uri_mut() = hyper::Uri::from_static(EVENTS_PATH);
        request
            .headers_mut()
            .insert(header::HOST, header::HeaderValue::from_static("docker"));
        let response = sender.send_request(request).await.map_err(Error::Request)?;
        if response.status() != StatusCode::OK {
            return Err(Error::Status {
                status: response.status(),
            });
        }
        log::info!("Subscribed to Docker events on {}", path.display());

        Ok(Self {
            socket_path: path.to_path_buf(),
            _sender: sender,
            body: response.into_body(),
        })
    }
}

impl EventSource for DockerEventSource {
    fn into_stream(self, cancel: CancellationToken, capacity: usize) -> EventStream {
        let (tx, stream) = super::event_stream(capacity);
        tokio::spawn(pump(self, tx, cancel));
        stream
    }
}

async fn pump(mut source: DockerEventSource, tx: StreamSender, cancel: CancellationToken) {
    let mut buf = Vec::with_capacity(1024);
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tx.closed() => return,
            frame = std::future::poll_fn(|cx| Pin::new(&mut source.body).poll_frame(cx)) => frame,
        };

        let data = match frame {
            None => {
                log::info!(
                    "Docker event stream on {} ended",
                    source.socket_path.display()
                );
                return;
            }
            Some(Err(err)) => {
                tx.fail(Error::Body(err)).await;
                return;
            }
            Some(Ok(frame)) => match frame.into_data() {
                Ok(data) => data,
                // Trailers carry no events.
                Err(_) => continue,
            },
        };

        buf.extend_from_slice(&data);
        while let Some(line) = next_line(&mut buf) {
            match decode_message(&line) {
                Ok(Some(event)) => {
                    if !tx.send(event).await {
                        return;
                    }
                }
                Ok(None) => {}
                Err(err) => log::warn!("Skipping Docker event: {err}"),
            }
        }
        if buf.len() > MAX_LINE_LEN {
            log::error!(
                "Docker event stream on {} sent {} bytes without a line break",
                source.socket_path.display(),
                buf.len()
            );
            tx.fail(Error::LineTooLong {
                limit: MAX_LINE_LEN,
            })
            .await;
            return;
        }
    }
}

/// Removes and returns the first complete line from `buf`, without its newline.
fn next_line(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let end = buf.iter().position(|b| *b == b'\n')?;
    let mut line: Vec<u8> = buf.drain(..=end).collect();
    line.pop();
    Some(line)
}

#[derive(Debug, serde::Deserialize)]
struct Message {
    #[serde(rename = "Type", default)]
    kind: String,
    #[serde(rename = "Action", default)]
    action: String,
    #[serde(rename = "Actor", default)]
    actor: MessageActor,
}

#[derive(Debug, Default, serde::Deserialize)]
struct MessageActor {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "Attributes", default)]
    attributes: Option<HashMap<String, String>>,
}

/// Decodes a single message line. Blank lines and non-container messages
/// yield `None`.
fn decode_message(line: &[u8]) -> Result<Option<Event>, Error> {
    if line.trim_ascii().is_empty() {
        return Ok(None);
    }

    let message: Message = serde_json::from_slice(line).map_err(Error::Decode)?;
    if message.kind != "container" {
        log::trace!("Ignoring `{}` event of type `{}`", message.action, message.kind);
        return Ok(None);
    }

    let id = ContainerID::new(&message.actor.id).map_err(Error::InvalidActor)?;
    let actor = Actor {
        id,
        attributes: message.actor.attributes.unwrap_or_default(),
    };
    Ok(Some(Event::new(message.action, actor)))
}
