use serde::{Serialize, Serializer};
use std::error::Error as StdError;
use std::fmt;
use std::str::FromStr;

/// Fixed first component of every channel name.
const CHANNEL_PREFIX: &str = "logs";

/// Channel name delimiter.
const DELIMITER: char = ':';

/// A parsed channel name of the shape `logs:<service>:<workspace>[:<resource>]`.
///
/// Components are opaque strings compared byte-exactly; channel names are
/// case-sensitive. The resource component is optional and may itself contain
/// the delimiter (the split is capped at four components).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Channel {
    name: String,
    service: String,
    workspace: String,
    resource: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelParseError {
    /// First component was not the literal `logs`.
    WrongPrefix,
    EmptyService,
    EmptyWorkspace,
    EmptyResource,
}

impl fmt::Display for ChannelParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChannelParseError::WrongPrefix => {
                write!(f, "channel name must start with '{CHANNEL_PREFIX}{DELIMITER}'")
            }
            ChannelParseError::EmptyService => write!(f, "channel service component is empty"),
            ChannelParseError::EmptyWorkspace => write!(f, "channel workspace component is empty"),
            ChannelParseError::EmptyResource => write!(f, "channel resource component is empty"),
        }
    }
}

impl StdError for ChannelParseError {}

impl Channel {
    /// Build a channel from its components, validating the same rules as
    /// parsing. Used by the publish path when deriving the target channel
    /// from a request body.
    pub fn new(
        service: &str,
        workspace: &str,
        resource: Option<&str>,
    ) -> Result<Self, ChannelParseError> {
        if service.is_empty() {
            return Err(ChannelParseError::EmptyService);
        }
        if workspace.is_empty() {
            return Err(ChannelParseError::EmptyWorkspace);
        }
        if resource == Some("") {
            return Err(ChannelParseError::EmptyResource);
        }

        let name = match resource {
            Some(resource) => {
                format!("{CHANNEL_PREFIX}{DELIMITER}{service}{DELIMITER}{workspace}{DELIMITER}{resource}")
            }
            None => format!("{CHANNEL_PREFIX}{DELIMITER}{service}{DELIMITER}{workspace}"),
        };

        Ok(Self {
            name,
            service: service.to_string(),
            workspace: workspace.to_string(),
            resource: resource.map(str::to_string),
        })
    }

    /// The canonical string form, used as the registry index key.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }
}

impl FromStr for Channel {
    type Err = ChannelParseError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let mut parts = name.splitn(4, DELIMITER);

        if parts.next() != Some(CHANNEL_PREFIX) {
            return Err(ChannelParseError::WrongPrefix);
        }
        let service = parts.next().unwrap_or_default();
        let workspace = parts.next().unwrap_or_default();
        let resource = parts.next();

        Channel::new(service, workspace, resource)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Serialize for Channel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}
