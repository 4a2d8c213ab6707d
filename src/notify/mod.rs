//! Delivery of restart violation notifications.
mod log_notifier;
mod smtp;
mod webhook;

use crate::event::Event;
use crate::tracker::{TimeLog, TrackerConfig};

pub use log_notifier::LogNotifier;
pub use smtp::SmtpNotifier;
pub use webhook::WebhookNotifier;

pub const SUBJECT: &str = "Container Restart Notification";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid webhook url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("failed to connect to `{addr}`: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP handshake with `{addr}` failed: {source}")]
    Handshake {
        addr: String,
        #[source]
        source: hyper::Error,
    },
    #[error("failed to serialize notification: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("webhook request failed: {0}")]
    Request(#[source] hyper::Error),
    #[error("webhook returned status {status}")]
    Status { status: hyper::StatusCode },
    #[error("invalid mail address `{address}`: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },
    #[error("failed to compose mail: {0}")]
    Compose(#[source] lettre::error::Error),
    #[error("SMTP delivery failed: {0}")]
    Smtp(#[source] lettre::transport::smtp::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A restart violation, ready to be delivered.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Notification {
    pub subject: String,
    pub container_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub container_name: String,
    /// Restarts within the window at the time of the violation.
    pub restarts: usize,
    /// The window, formatted like `5m`.
    pub window: String,
    pub body: String,
}

impl Notification {
    /// Builds the notification for a violation raised on `event`.
    ///
    /// Restarts are counted at the time of the last violation, which is the
    /// count the violation was raised for.
    pub fn new(event: &Event, time_log: &TimeLog, config: &TrackerConfig) -> Self {
        let container_id = event.actor.id.to_string();
        let namespace = event.actor.namespace().map(str::to_owned);
        let container_name = event.actor.name().unwrap_or(container_id.as_str()).to_owned();
        let restarts = match time_log.last_violation() {
            Some(at) => time_log.events_in_past_at(config.window(), at),
            None => time_log.events_in_past(config.window()),
        };
        let window = humantime::format_duration(config.window()).to_string();
        let body = format!(
            "Container {container_name:?} ({container_id}) has restarted {restarts} times in the past {window}"
        );

        Self {
            subject: SUBJECT.to_owned(),
            container_id,
            namespace,
            container_name,
            restarts,
            window,
            body,
        }
    }
}

/// A channel violation notifications are delivered through.
pub trait Notifier {
    fn notify(
        &self,
        notification: &Notification,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::time::Duration;

    use super::*;
    use crate::container::{Actor, ContainerID};

    fn config() -> TrackerConfig {
        TrackerConfig::new(
            Duration::from_secs(300),
            NonZeroUsize::new(3).unwrap(),
            Duration::from_secs(3600),
        )
    }

    fn time_log(restarts: usize) -> TimeLog {
        let mut log = TimeLog::new();
        for _ in 0..restarts {
            log.append_now();
        }
        log
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_body() {
        let actor = Actor::new(ContainerID::new("abc123").unwrap()).with_attribute("name", "web");
        let notification = Notification::new(&Event::new("start", actor), &time_log(3), &config());

        assert_eq!(notification.subject, SUBJECT);
        assert_eq!(notification.container_name, "web");
        assert_eq!(notification.restarts, 3);
        assert_eq!(notification.window, "5m");
        assert_eq!(
            notification.body,
            r#"Container "web" (abc123) has restarted 3 times in the past 5m"#
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_without_name_uses_id() {
        let actor = Actor::new(ContainerID::new("abc123").unwrap());
        let notification = Notification::new(&Event::new("restart", actor), &time_log(4), &config());

        assert_eq!(notification.container_name, "abc123");
        assert_eq!(notification.restarts, 4);
        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["container_id"], "abc123");
        assert_eq!(json["restarts"], 4);
        assert!(json.get("namespace").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarts_counted_at_violation_time() {
        let mut log = TimeLog::new();
        log.append_now();
        tokio::time::advance(Duration::from_secs(120)).await;
        log.append_now();
        tokio::time::advance(Duration::from_secs(120)).await;
        log.append_now();
        log.record_violation(tokio::time::Instant::now());

        // Delivery happens later, after the first trigger left the window.
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(log.events_in_past(Duration::from_secs(300)), 2);

        let actor = Actor::new(ContainerID::new("abc123").unwrap())
            .with_attribute(crate::container::NAMESPACE_ATTRIBUTE, "k8s.io");
        let notification = Notification::new(&Event::new("start", actor), &log, &config());
        assert_eq!(notification.restarts, 3);
        assert_eq!(notification.namespace.as_deref(), Some("k8s.io"));
    }
}
