//! Runtime independent container lifecycle events.

use crate::container::Actor;

/// Actions that count towards a container's restart rate.
pub const RESTART_ACTIONS: [&str; 2] = ["restart", "start"];

/// A lifecycle event reported by a container runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// The runtime's action string, e.g. `start`, `die` or `restart`.
    pub action: String,
    pub actor: Actor,
}

impl Event {
    pub fn new(action: impl Into<String>, actor: Actor) -> Self {
        Self {
            action: action.into(),
            actor,
        }
    }

    /// Returns `true` if the action is one of [`RESTART_ACTIONS`].
    ///
    /// The comparison is exact. Docker reports exec sessions as `exec_start: <cmd>`,
    /// which must not count as a container start.
    pub fn is_restart(&self) -> bool {
        RESTART_ACTIONS.contains(&self.action.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerID;

    fn event(action: &str) -> Event {
        Event::new(action, Actor::new(ContainerID::new("abc").unwrap()))
    }

    #[test]
    fn test_is_restart() {
        assert!(event("start").is_restart());
        assert!(event("restart").is_restart());
        assert!(!event("stop").is_restart());
        assert!(!event("die").is_restart());
        assert!(!event("exec_start: sh").is_restart());
        assert!(!event("Start").is_restart());
    }
}
