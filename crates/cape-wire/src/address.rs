//! Agent addresses.
//!
//! Two schemes are understood:
//! - `cape://<username>@<host>:<port>[/<resource>]` for agents behind a TCP [`PeerNode`](crate::peer::PeerNode)
//! - `local://<username>[/<resource>]` for agents on an in-process [`LocalNetwork`](crate::local::LocalNetwork)

use crate::peer::WireError;
use std::fmt;
use std::str::FromStr;

/// Scheme of a TCP-reachable agent.
pub const CAPE_SCHEME: &str = "cape";

/// Scheme of an in-process agent.
pub const LOCAL_SCHEME: &str = "local";

/// A parsed agent address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentAddress {
    /// `cape` or `local`.
    pub scheme: String,
    /// Username the agent's session was opened with.
    pub username: String,
    /// `host:port` of the hosting node (`cape` scheme only).
    pub authority: Option<String>,
    /// Optional session resource.
    pub resource: Option<String>,
}

impl AgentAddress {
    /// Address of an agent behind a TCP node.
    pub fn cape(username: &str, authority: &str, resource: Option<&str>) -> Self {
        Self {
            scheme: CAPE_SCHEME.to_string(),
            username: username.to_string(),
            authority: Some(authority.to_string()),
            resource: resource.map(String::from),
        }
    }

    /// Address of an in-process agent.
    pub fn local(username: &str, resource: Option<&str>) -> Self {
        Self {
            scheme: LOCAL_SCHEME.to_string(),
            username: username.to_string(),
            authority: None,
            resource: resource.map(String::from),
        }
    }
}

impl FromStr for AgentAddress {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| WireError::InvalidAddress(format!("{s}: {why}"));

        let (scheme, rest) = s.split_once("://").ok_or_else(|| invalid("missing scheme"))?;
        let (target, resource) = match rest.split_once('/') {
            Some((target, resource)) if !resource.is_empty() => {
                (target, Some(resource.to_string()))
            }
            Some((target, _)) => (target, None),
            None => (rest, None),
        };

        match scheme {
            CAPE_SCHEME => {
                let (username, authority) = target
                    .split_once('@')
                    .ok_or_else(|| invalid("expected <username>@<host>:<port>"))?;
                if username.is_empty() || authority.is_empty() {
                    return Err(invalid("empty username or host"));
                }
                Ok(Self {
                    scheme: scheme.to_string(),
                    username: username.to_string(),
                    authority: Some(authority.to_string()),
                    resource,
                })
            }
            LOCAL_SCHEME => {
                if target.is_empty() {
                    return Err(invalid("empty username"));
                }
                Ok(Self {
                    scheme: scheme.to_string(),
                    username: target.to_string(),
                    authority: None,
                    resource,
                })
            }
            other => Err(invalid(&format!("unsupported scheme '{other}'"))),
        }
    }
}

impl fmt::Display for AgentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.username)?;
        if let Some(authority) = &self.authority {
            write!(f, "@{authority}")?;
        }
        if let Some(resource) = &self.resource {
            write!(f, "/{resource}")?;
        }
        Ok(())
    }
}
