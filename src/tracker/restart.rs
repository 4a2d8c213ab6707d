use std::collections::HashMap;

use tokio::time::Instant;

use crate::container::ContainerKey;
use crate::event::Event;

use super::{TimeLog, TrackerConfig};

/// Receives every violation raised by a [`RestartTracker`].
///
/// Runs on the dispatch path: a slow handler delays processing of the next event.
pub trait ViolationHandler {
    fn on_violation(&mut self, event: &Event, time_log: &TimeLog);
}

impl<F> ViolationHandler for F
where
    F: FnMut(&Event, &TimeLog),
{
    fn on_violation(&mut self, event: &Event, time_log: &TimeLog) {
        self(event, time_log)
    }
}

/// Tracks restart timestamps per container and applies the restart policy.
#[derive(Debug)]
pub struct RestartTracker<V> {
    config: TrackerConfig,
    time_logs: HashMap<ContainerKey, TimeLog>,
    on_violation: V,
}

impl<V: ViolationHandler> RestartTracker<V> {
    pub fn new(config: TrackerConfig, on_violation: V) -> Self {
        Self {
            config,
            time_logs: HashMap::default(),
            on_violation,
        }
    }

    /// Applies a single lifecycle event.
    ///
    /// Events whose action is not `start` or `restart` are ignored. Otherwise the
    /// current time is appended to the [`TimeLog`] of the container's
    /// [`ContainerKey`], and if the number
    /// of triggers within the window reaches the threshold while the debounce
    /// period since the last violation has passed, the violation handler is
    /// invoked.
    pub fn handle(&mut self, event: &Event) {
        if !event.is_restart() {
            log::trace!(
                "Ignoring action `{}` for container `{}`",
                event.action,
                event.actor.id
            );
            return;
        }

        let now = Instant::now();
        let key = event.actor.key();
        let config = &self.config;
        let time_log = self.time_logs.entry(key.clone()).or_default();
        time_log.append_at(now);

        let count = time_log.events_in_past_at(config.window(), now);
        log::debug!(
            "Container `{}` triggered `{}` ({} in window, {} total)",
            key,
            event.action,
            count,
            time_log.len()
        );
        if count < config.threshold().get() {
            return;
        }

        if !time_log.debounce_elapsed(config.debounce(), now) {
            log::debug!(
                "Suppressing repeated violation for container `{key}`"
            );
            return;
        }

        time_log.record_violation(now);
        self.on_violation.on_violation(event, time_log);
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Returns the time log of a container, if it ever restarted.
    pub fn time_log(&self, key: &ContainerKey) -> Option<&TimeLog> {
        self.time_logs.get(key)
    }

    /// Number of containers with a time log.
    pub fn len(&self) -> usize {
        self.time_logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_logs.is_empty()
    }
}
