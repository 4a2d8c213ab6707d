//! containerd event source.
//!
//! containerd has no dedicated restart event: a restarted container starts a new
//! task, so every `/tasks/start` event is reported as a `start` action.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use prost::Message;
use prost_types::Any;
use tokio_util::sync::CancellationToken;
use tonic::Streaming;
use tonic::metadata::MetadataValue;
use tonic::transport::Channel;

use crate::container::{self, Actor, ContainerID, NAME_ATTRIBUTE, NAMESPACE_ATTRIBUTE};
use crate::containerd::events::TaskStart;
use crate::containerd::services::containers::v1::GetContainerRequest;
use crate::containerd::services::containers::v1::containers_client::ContainersClient;
use crate::containerd::services::events::v1::events_client::EventsClient;
use crate::containerd::services::events::v1::{Envelope, SubscribeRequest};
use crate::event::Event;

use super::{EventSource, EventStream, StreamSender};

const TASK_START_TOPIC: &str = "/tasks/start";
const TASK_START_TYPE_URL: &str = "containerd.events.TaskStart";

/// Container labels that carry a human readable name, in order of preference.
const NAME_LABELS: [&str; 2] = ["nerdctl/name", "io.kubernetes.container.name"];

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to connect to socket `{path}`: {source}")]
    SocketConnect {
        path: PathBuf,
        #[source]
        source: tonic::transport::Error,
    },
    #[error("failed to subscribe to events service: {0}")]
    Subscribe(#[source] Box<tonic::Status>),
    #[error("failed to receive event message: {0}")]
    EventMessage(#[source] Box<tonic::Status>),
    #[error("unexpected event type `{type_url}` on topic `{topic}`")]
    UnexpectedEvent { topic: String, type_url: String },
    #[error("failed to decode event type `{type_url}`: {source}")]
    EventDecode {
        type_url: String,
        #[source]
        source: prost::DecodeError,
    },
    #[error("invalid container in task event: {0}")]
    InvalidContainer(#[source] container::Error),
}

/// A subscription to the task start events of a containerd daemon.
pub struct ContainerdEventSource {
    socket_path: PathBuf,
    events: Streaming<Envelope>,
    containers: ContainersClient<Channel>,
}

impl ContainerdEventSource {
    /// Connects to the containerd socket at `socket_path` and subscribes to task
    /// start events across all namespaces.
    ///
    /// # Errors
    ///
    /// Fails if the socket cannot be reached or the subscription is rejected.
    pub async fn connect(socket_path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = socket_path.as_ref();
        let channel = crate::transport::channel_for_unix_socket(path)
            .await
            .map_err(|source| Error::SocketConnect {
                path: path.to_path_buf(),
                source,
            })?;

        let events = EventsClient::new(channel.clone())
            .subscribe(SubscribeRequest {
                filters: vec![format!(r#"topic=="{TASK_START_TOPIC}""#)],
            })
            .await
            .map_err(|err| Error::Subscribe(Box::new(err)))?
            .into_inner();
        log::info!("Subscribed to containerd events on {}", path.display());

        Ok(Self {
            socket_path: path.to_path_buf(),
            events,
            containers: ContainersClient::new(channel),
        })
    }

    /// Looks up a display name for the container from its labels, falling back
    /// to the container id.
    async fn container_name(&mut self, namespace: &str, id: &ContainerID) -> String {
        let namespace_value = match MetadataValue::from_str(namespace) {
            Ok(val) => val,
            Err(err) => {
                log::warn!("invalid containerd namespace `{namespace}`: {err}");
                return id.to_string();
            }
        };
        let mut request = tonic::Request::new(GetContainerRequest { id: id.to_string() });
        request
            .metadata_mut()
            .insert("containerd-namespace", namespace_value);

        match self.containers.get(request).await {
            Ok(response) => response
                .into_inner()
                .container
                .and_then(|container| name_from_labels(&container.labels))
                .unwrap_or_else(|| id.to_string()),
            Err(err) => {
                log::warn!("failed to get container info for container id `{id}`: {err}");
                id.to_string()
            }
        }
    }

    async fn to_event(&mut self, envelope: Envelope) -> Result<Option<Event>, Error> {
        log::debug!(
            "Received event: topic={}, namespace={}, timestamp={:?}",
            envelope.topic,
            envelope.namespace,
            envelope.timestamp,
        );
        let Some(ref payload) = envelope.event else {
            log::debug!("No event payload attached!");
            return Ok(None);
        };

        let task_start = decode_task_start(&envelope.topic, payload)?;
        let id = ContainerID::new(&task_start.container_id).map_err(Error::InvalidContainer)?;
        let name = self.container_name(&envelope.namespace, &id).await;

        Ok(Some(start_event(envelope.namespace, id, name)))
    }
}

impl EventSource for ContainerdEventSource {
    fn into_stream(self, cancel: CancellationToken, capacity: usize) -> EventStream {
        let (tx, stream) = super::event_stream(capacity);
        tokio::spawn(pump(self, tx, cancel));
        stream
    }
}

async fn pump(mut source: ContainerdEventSource, tx: StreamSender, cancel: CancellationToken) {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tx.closed() => return,
            message = source.events.message() => message,
        };

        let envelope = match message {
            Ok(Some(envelope)) => envelope,
            Ok(None) => {
                log::info!(
                    "containerd event stream on {} ended",
                    source.socket_path.display()
                );
                return;
            }
            Err(status) => {
                tx.fail(Error::EventMessage(Box::new(status))).await;
                return;
            }
        };

        match source.to_event(envelope).await {
            Ok(Some(event)) => {
                if !tx.send(event).await {
                    return;
                }
            }
            Ok(None) => {}
            Err(err) => log::error!("{}", err),
        }
    }
}

fn decode_task_start(topic: &str, event: &Any) -> Result<TaskStart, Error> {
    if topic != TASK_START_TOPIC || event.type_url != TASK_START_TYPE_URL {
        return Err(Error::UnexpectedEvent {
            topic: topic.to_owned(),
            type_url: event.type_url.clone(),
        });
    }

    TaskStart::decode(event.value.as_slice()).map_err(|source| Error::EventDecode {
        type_url: event.type_url.clone(),
        source,
    })
}

/// Container ids are only unique per namespace, so the namespace is always
/// attached to keep containers apart in the tracker.
fn start_event(namespace: String, id: ContainerID, name: String) -> Event {
    let actor = Actor::new(id)
        .with_attribute(NAME_ATTRIBUTE, name)
        .with_attribute(NAMESPACE_ATTRIBUTE, namespace);
    Event::new("start", actor)
}

fn name_from_labels(labels: &HashMap<String, String>) -> Option<String> {
    NAME_LABELS
        .iter()
        .find_map(|key| labels.get(*key))
        .filter(|name| !name.is_empty())
        .cloned()
}
