//! Strongly-typed identifiers for Courier entities
//!
//! Connections and protocols are both packaged components, identified by the
//! canonical `author/name:version` form. Agents are identified by opaque
//! addresses; an address that parses as a component identifier denotes an
//! internal component rather than a remote agent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while parsing or building identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("invalid component id '{0}': expected author/name:version")]
    InvalidFormat(String),

    #[error("invalid component id part '{0}': must be non-empty without '/' or ':'")]
    InvalidPart(String),
}

/// Identifier of a packaged component (a connection or a protocol).
///
/// Canonical text form is `author/name:version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ComponentId {
    author: String,
    name: String,
    version: String,
}

impl ComponentId {
    pub fn new(
        author: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self, IdError> {
        let author = author.into();
        let name = name.into();
        let version = version.into();
        for part in [&author, &name, &version] {
            if part.is_empty() || part.contains('/') || part.contains(':') {
                return Err(IdError::InvalidPart(part.clone()));
            }
        }
        Ok(Self {
            author,
            name,
            version,
        })
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.author, self.name, self.version)
    }
}

impl FromStr for ComponentId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (author, rest) = s
            .split_once('/')
            .ok_or_else(|| IdError::InvalidFormat(s.to_string()))?;
        let (name, version) = rest
            .split_once(':')
            .ok_or_else(|| IdError::InvalidFormat(s.to_string()))?;
        Self::new(author, name, version).map_err(|_| IdError::InvalidFormat(s.to_string()))
    }
}

impl TryFrom<String> for ComponentId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ComponentId> for String {
    fn from(id: ComponentId) -> Self {
        id.to_string()
    }
}

/// Opaque agent address.
///
/// Any non-empty string is a valid address. Addresses in the canonical
/// component form refer to internal components and are routed directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Random address, handy for tests and local development.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse the address as a component identifier, if it is one.
    pub fn as_component_id(&self) -> Option<ComponentId> {
        self.0.parse().ok()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ComponentId> for Address {
    fn from(id: ComponentId) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
