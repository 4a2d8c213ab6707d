use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

mod error;

pub use error::{Error, Result};

/// The maximum allowed length for a [`ContainerID`].
const CONTAINER_ID_MAX_LEN: usize = 255;

/// Attribute key under which runtimes report the human readable container name.
pub const NAME_ATTRIBUTE: &str = "name";

/// Attribute key holding the runtime namespace of the container (containerd).
pub const NAMESPACE_ATTRIBUTE: &str = "namespace";

/// A validated container identifier.
///
/// The identifier is opaque: Docker hands out 64 character hex ids, containerd
/// accepts any client chosen string. Only emptiness and length are checked.
///
/// # Examples
///
/// ```
/// # use creo_restart_watch::container::{ContainerID, Error};
/// let raw_id = "abc123abc123abc123abc123abc123abc123abc123abc123abc123abc123abcd";
/// let container_id = ContainerID::new(raw_id).unwrap();
/// assert_eq!(container_id.as_ref(), "abc123abc123abc123abc123abc123abc123abc123abc123abc123abc123abcd");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerID(Arc<str>);

impl ContainerID {
    /// Creates a new `ContainerID` from the given raw id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContainerID`] if the input is empty or its length
    /// exceeds [`CONTAINER_ID_MAX_LEN`].
    ///
    /// # Examples
    ///
    /// ```
    /// # use creo_restart_watch::container::{ContainerID, Error};
    /// assert!(ContainerID::new("web-1").is_ok());
    /// assert!(matches!(ContainerID::new(""), Err(Error::InvalidContainerID(_))));
    /// ```
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty() || src.len() > CONTAINER_ID_MAX_LEN {
            return Err(Error::InvalidContainerID(src.to_owned()));
        }

        Ok(Self(src.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ContainerID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContainerID {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies a container across runtime namespaces.
///
/// containerd ids are only unique within their namespace, so two containers
/// with the same id in different namespaces have different keys. Docker has no
/// namespaces and its keys are the bare id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerKey {
    namespace: Option<Arc<str>>,
    id: ContainerID,
}

impl ContainerKey {
    /// An empty namespace is treated as no namespace.
    pub fn new(namespace: Option<&str>, id: ContainerID) -> Self {
        Self {
            namespace: namespace.filter(|ns| !ns.is_empty()).map(Arc::from),
            id,
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn id(&self) -> &ContainerID {
        &self.id
    }
}

impl From<ContainerID> for ContainerKey {
    fn from(id: ContainerID) -> Self {
        Self { namespace: None, id }
    }
}

impl fmt::Display for ContainerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{namespace}/{}", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// The container an [`Event`](crate::event::Event) is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: ContainerID,
    pub attributes: HashMap<String, String>,
}

impl Actor {
    pub fn new(id: ContainerID) -> Self {
        Self {
            id,
            attributes: HashMap::default(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns the human readable name, if the runtime reported one.
    pub fn name(&self) -> Option<&str> {
        self.attributes.get(NAME_ATTRIBUTE).map(String::as_str)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.attributes.get(NAMESPACE_ATTRIBUTE).map(String::as_str)
    }

    /// The key the container is tracked under.
    pub fn key(&self) -> ContainerKey {
        ContainerKey::new(self.namespace(), self.id.clone())
    }
}
