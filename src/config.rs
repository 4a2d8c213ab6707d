//! Configuration read from environment variables.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::tracker::TrackerConfig;

const DEFAULT_RESTART_COUNT: NonZeroUsize = NonZeroUsize::new(5).unwrap();
const DEFAULT_RESTART_WINDOW: Duration = Duration::from_secs(5 * 60);
const DEFAULT_VIOLATION_LIMIT: Duration = Duration::from_secs(60 * 60);
const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";
const DEFAULT_CONTAINERD_SOCKET: &str = "/var/run/containerd/containerd.sock";
const DEFAULT_EVENT_BUFFER: usize = 64;
const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("environment variable `{name}` is not valid unicode")]
    NotUnicode { name: &'static str },
    #[error("invalid value `{value}` for `{name}`: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("`{name}` must be set when `{required_by}` is set")]
    MissingValue {
        name: &'static str,
        required_by: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// The container runtime events are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runtime {
    Docker,
    Containerd,
}

impl FromStr for Runtime {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(Runtime::Docker),
            "containerd" => Ok(Runtime::Containerd),
            other => Err(format!(
                "unknown runtime `{other}`, expected `docker` or `containerd`"
            )),
        }
    }
}

/// Mail delivery settings. Authentication is PLAIN with `from` as the user
/// name, over a STARTTLS connection.
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub from: String,
    pub to: String,
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Complete, immutable application configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub runtime: Runtime,
    pub docker_socket: PathBuf,
    pub containerd_socket: PathBuf,
    /// Where to post notifications; logging only when unset.
    pub webhook_url: Option<String>,
    /// Where to mail notifications; no mail is sent when unset.
    pub smtp: Option<SmtpConfig>,
    /// Capacity of the event channel between source and dispatcher.
    pub event_buffer: usize,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `RESTART_COUNT` | `5` |
    /// | `RESTART_WINDOW` | `5m` |
    /// | `VIOLATION_LIMIT` | `1h` |
    /// | `CONTAINER_RUNTIME` | `docker` |
    /// | `DOCKER_SOCKET` | `/var/run/docker.sock` |
    /// | `CONTAINERD_SOCKET` | `/var/run/containerd/containerd.sock` |
    /// | `NOTIFY_WEBHOOK_URL` | unset |
    /// | `EVENT_BUFFER` | `64` |
    /// | `SMTP_FROM` | unset |
    /// | `SMTP_TO` | unset |
    /// | `SMTP_HOST` | `smtp.gmail.com` |
    /// | `SMTP_PORT` | `587` |
    /// | `SMTP_PASSWORD` | unset |
    ///
    /// Mail is enabled as soon as any `SMTP_*` variable is set, which then
    /// requires `SMTP_FROM`, `SMTP_TO` and `SMTP_PASSWORD`.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a value that cannot be parsed,
    /// or if the mail settings are incomplete.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| match std::env::var(name) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => Err(Error::NotUnicode { name }),
        })
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&'static str) -> Result<Option<String>>,
    {
        let var = |name: &'static str| -> Result<Option<String>> {
            Ok(lookup(name)?.filter(|value| !value.trim().is_empty()))
        };

        let threshold = match var("RESTART_COUNT")? {
            Some(value) => parse("RESTART_COUNT", value, |v| {
                v.trim()
                    .parse::<NonZeroUsize>()
                    .map_err(|err| format!("{err}, expected a count of at least 1"))
            })?,
            None => DEFAULT_RESTART_COUNT,
        };
        let window = duration_var("RESTART_WINDOW", var("RESTART_WINDOW")?)?
            .unwrap_or(DEFAULT_RESTART_WINDOW);
        let debounce = duration_var("VIOLATION_LIMIT", var("VIOLATION_LIMIT")?)?
            .unwrap_or(DEFAULT_VIOLATION_LIMIT);
        let runtime = match var("CONTAINER_RUNTIME")? {
            Some(value) => parse("CONTAINER_RUNTIME", value, |v| v.parse())?,
            None => Runtime::Docker,
        };
        let event_buffer = match var("EVENT_BUFFER")? {
            Some(value) => parse("EVENT_BUFFER", value, |v| {
                v.trim()
                    .parse::<NonZeroUsize>()
                    .map(NonZeroUsize::get)
                    .map_err(|err| err.to_string())
            })?,
            None => DEFAULT_EVENT_BUFFER,
        };

        Ok(Self {
            tracker: TrackerConfig::new(window, threshold, debounce),
            runtime,
            docker_socket: var("DOCKER_SOCKET")?
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DOCKER_SOCKET)),
            containerd_socket: var("CONTAINERD_SOCKET")?
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTAINERD_SOCKET)),
            webhook_url: var("NOTIFY_WEBHOOK_URL")?,
            smtp: smtp_config(&var)?,
            event_buffer,
        })
    }
}

fn smtp_config(
    var: impl Fn(&'static str) -> Result<Option<String>>,
) -> Result<Option<SmtpConfig>> {
    let from = var("SMTP_FROM")?;
    let to = var("SMTP_TO")?;
    let host = var("SMTP_HOST")?;
    let port = var("SMTP_PORT")?;
    let password = var("SMTP_PASSWORD")?;

    let required_by = [
        ("SMTP_FROM", from.is_some()),
        ("SMTP_TO", to.is_some()),
        ("SMTP_HOST", host.is_some()),
        ("SMTP_PORT", port.is_some()),
        ("SMTP_PASSWORD", password.is_some()),
    ]
    .into_iter()
    .find_map(|(name, set)| set.then_some(name));
    let Some(required_by) = required_by else {
        return Ok(None);
    };
    let require = |name: &'static str, value: Option<String>| {
        value.ok_or(Error::MissingValue { name, required_by })
    };

    let port = match port {
        Some(value) => parse("SMTP_PORT", value, |v| {
            v.trim().parse::<u16>().map_err(|err| err.to_string())
        })?,
        None => DEFAULT_SMTP_PORT,
    };

    Ok(Some(SmtpConfig {
        from: require("SMTP_FROM", from)?,
        to: require("SMTP_TO", to)?,
        host: host.unwrap_or_else(|| DEFAULT_SMTP_HOST.to_owned()),
        port,
        password: require("SMTP_PASSWORD", password)?,
    }))
}

fn parse<T>(
    name: &'static str,
    value: String,
    f: impl FnOnce(&str) -> std::result::Result<T, String>,
) -> Result<T> {
    f(&value).map_err(|reason| Error::InvalidValue {
        name,
        value,
        reason,
    })
}

fn duration_var(name: &'static str, value: Option<String>) -> Result<Option<Duration>> {
    value
        .map(|value| {
            parse(name, value, |v| {
                humantime::parse_duration(v.trim()).map_err(|err| err.to_string())
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&'static str, &str)]) -> Result<Config> {
        let vars: HashMap<&'static str, String> =
            vars.iter().map(|(k, v)| (*k, v.to_string())).collect();
        Config::from_lookup(|name| Ok(vars.get(name).cloned()))
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.tracker.threshold().get(), 5);
        assert_eq!(config.tracker.window(), Duration::from_secs(300));
        assert_eq!(config.tracker.debounce(), Duration::from_secs(3600));
        assert_eq!(config.runtime, Runtime::Docker);
        assert_eq!(config.docker_socket, PathBuf::from("/var/run/docker.sock"));
        assert_eq!(
            config.containerd_socket,
            PathBuf::from("/var/run/containerd/containerd.sock")
        );
        assert_eq!(config.webhook_url, None);
        assert_eq!(config.smtp, None);
        assert_eq!(config.event_buffer, 64);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("RESTART_COUNT", "3"),
            ("RESTART_WINDOW", "90s"),
            ("VIOLATION_LIMIT", "2h 30m"),
            ("CONTAINER_RUNTIME", "containerd"),
            ("CONTAINERD_SOCKET", "/run/k3s/containerd/containerd.sock"),
            ("NOTIFY_WEBHOOK_URL", "http://alerts.local/hook"),
            ("EVENT_BUFFER", "8"),
        ])
        .unwrap();
        assert_eq!(config.tracker.threshold().get(), 3);
        assert_eq!(config.tracker.window(), Duration::from_secs(90));
        assert_eq!(config.tracker.debounce(), Duration::from_secs(9000));
        assert_eq!(config.runtime, Runtime::Containerd);
        assert_eq!(
            config.containerd_socket,
            PathBuf::from("/run/k3s/containerd/containerd.sock")
        );
        assert_eq!(
            config.webhook_url.as_deref(),
            Some("http://alerts.local/hook")
        );
        assert_eq!(config.event_buffer, 8);
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = config(&[("RESTART_COUNT", "  "), ("NOTIFY_WEBHOOK_URL", "")]).unwrap();
        assert_eq!(config.tracker.threshold().get(), 5);
        assert_eq!(config.webhook_url, None);
    }

    #[test]
    fn test_invalid_values() {
        for (name, value) in [
            ("RESTART_COUNT", "0"),
            ("RESTART_COUNT", "-1"),
            ("RESTART_WINDOW", "five minutes"),
            ("VIOLATION_LIMIT", "1x"),
            ("CONTAINER_RUNTIME", "podman"),
            ("EVENT_BUFFER", "0"),
            ("SMTP_PORT", "smtp"),
        ] {
            match config(&[(name, value)]).unwrap_err() {
                Error::InvalidValue {
                    name: err_name,
                    value: err_value,
                    ..
                } => {
                    assert_eq!(err_name, name);
                    assert_eq!(err_value, value);
                }
                other => panic!("unexpected error: {}", other),
            }
        }
    }

    #[test]
    fn test_lookup_errors_propagate() {
        let err = Config::from_lookup(|name| Err(Error::NotUnicode { name })).unwrap_err();
        assert!(matches!(err, Error::NotUnicode { .. }));
    }

    const MAIL: [(&str, &str); 3] = [
        ("SMTP_FROM", "watch@example.com"),
        ("SMTP_TO", "ops@example.com"),
        ("SMTP_PASSWORD", "hunter2"),
    ];

    #[test]
    fn test_smtp_defaults_host_and_port() {
        let smtp = config(&MAIL).unwrap().smtp.unwrap();
        assert_eq!(smtp.from, "watch@example.com");
        assert_eq!(smtp.to, "ops@example.com");
        assert_eq!(smtp.host, "smtp.gmail.com");
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.password, "hunter2");
        assert!(!format!("{smtp:?}").contains("hunter2"));
    }

    #[test]
    fn test_smtp_overrides() {
        let mut vars = MAIL.to_vec();
        vars.extend([("SMTP_HOST", "mail.internal"), ("SMTP_PORT", "2525")]);
        let smtp = config(&vars).unwrap().smtp.unwrap();
        assert_eq!(smtp.host, "mail.internal");
        assert_eq!(smtp.port, 2525);
    }

    #[test]
    fn test_smtp_requires_complete_settings() {
        for missing in ["SMTP_FROM", "SMTP_TO", "SMTP_PASSWORD"] {
            let vars: Vec<_> = MAIL.into_iter().filter(|(k, _)| *k != missing).collect();
            match config(&vars).unwrap_err() {
                Error::MissingValue { name, .. } => assert_eq!(name, missing),
                other => panic!("unexpected error: {}", other),
            }
        }

        match config(&[("SMTP_HOST", "mail.internal")]).unwrap_err() {
            Error::MissingValue { name, required_by } => {
                assert_eq!(name, "SMTP_FROM");
                assert_eq!(required_by, "SMTP_HOST");
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
