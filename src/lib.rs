//! Creo Restart Watch: raises a notification when a container restarts too often.
//!
//! Lifecycle events are streamed from the container runtime (Docker or containerd),
//! dispatched one at a time to a [`tracker::RestartTracker`], and every violation of
//! the restart policy is handed to the configured notifiers.
use config::{Config, Runtime};
use error::ResultOkLogExt;
use event::Event;
use notify::{LogNotifier, Notification, Notifier, SmtpNotifier, WebhookNotifier};
use source::EventSource;
use tokio_util::sync::CancellationToken;
use tracker::{RestartTracker, TimeLog};

pub mod config;
pub mod container;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod notify;
pub mod source;
pub mod tracker;
pub mod transport;

pub mod containerd {
    pub mod events {
        tonic::include_proto!("containerd.events");
    }
    pub mod services {
        pub mod containers {
            pub mod v1 {
                tonic::include_proto!("containerd.services.containers.v1");
            }
        }
        pub mod events {
            pub mod v1 {
                tonic::include_proto!("containerd.services.events.v1");
            }
        }
    }
}

/// Runs Creo Restart Watch until the event stream fails or a stop signal arrives.
///
/// # Returns
///
/// Returns `Ok(())` after a stop signal or when the runtime closes the event
/// stream, or an error if any component fails.
///
/// # Errors
///
/// Possible errors include:
/// - Invalid configuration values in the environment.
/// - Failure to connect to the container runtime.
/// - An error on the runtime's event stream. Monitoring is not resumed; the
///   process is expected to be restarted by its supervisor.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    log::debug!("Config: {config:?}");
    let webhook = config
        .webhook_url
        .as_deref()
        .map(WebhookNotifier::new)
        .transpose()?;
    let mail = config.smtp.as_ref().map(SmtpNotifier::new).transpose()?;

    let cancel = CancellationToken::new();
    let stream = match config.runtime {
        Runtime::Docker => source::docker::DockerEventSource::connect(&config.docker_socket)
            .await
            .map_err(source::Error::from)?
            .into_stream(cancel.clone(), config.event_buffer),
        Runtime::Containerd => {
            source::containerd::ContainerdEventSource::connect(&config.containerd_socket)
                .await
                .map_err(source::Error::from)?
                .into_stream(cancel.clone(), config.event_buffer)
        }
    };
    spawn_signal_handler(cancel.clone());

    let (notification_tx, notification_rx) = tokio::sync::mpsc::unbounded_channel();
    let notifications = tokio::spawn(deliver_notifications(notification_rx, webhook, mail));

    let tracker_config = config.tracker;
    let mut tracker = RestartTracker::new(
        config.tracker,
        move |event: &Event, time_log: &TimeLog| {
            log::warn!(
                "Violation {} {}",
                event.actor.key(),
                event.actor.name().unwrap_or_default()
            );
            let notification = Notification::new(event, time_log, &tracker_config);
            if notification_tx.send(notification).is_err() {
                log::error!("notification task stopped, dropping notification");
            }
        },
    );

    let mut stream_error = None;
    let reason = dispatch::Dispatcher::new(
        stream,
        |event| tracker.handle(&event),
        |err| {
            log::error!("Error: {err}");
            stream_error = Some(err);
        },
    )
    .run(&cancel)
    .await;
    log::info!("Event loop stopped: {reason:?}");

    // Closes the notification channel so pending deliveries can finish.
    drop(tracker);
    notifications.await?;

    match stream_error {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

async fn deliver_notifications(
    mut rx: tokio::sync::mpsc::UnboundedReceiver<Notification>,
    webhook: Option<WebhookNotifier>,
    mail: Option<SmtpNotifier>,
) {
    while let Some(notification) = rx.recv().await {
        LogNotifier.notify(&notification).await.ok_log();
        if let Some(ref webhook) = webhook {
            webhook
                .notify(&notification)
                .await
                .ok_log_context("failed to deliver notification");
        }
        if let Some(ref mail) = mail {
            mail.notify(&notification)
                .await
                .ok_log_context("failed to send email");
        }
    }
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut terminate =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => Some(signal),
                Err(err) => {
                    log::warn!("failed to install SIGTERM handler: {err}");
                    None
                }
            };

        let signal = tokio::select! {
            res = tokio::signal::ctrl_c() => match res {
                Ok(()) => "SIGINT",
                Err(err) => {
                    log::error!("failed to listen for ctrl-c: {err}");
                    return;
                }
            },
            Some(()) = async {
                match terminate.as_mut() {
                    Some(terminate) => terminate.recv().await,
                    None => std::future::pending().await,
                }
            } => "SIGTERM",
        };
        log::warn!("Signal: {signal}, stop requested");
        cancel.cancel();
    });
}
