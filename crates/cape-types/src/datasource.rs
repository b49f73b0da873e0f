//! Data sources: claims that an agent serves a capability for a user.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Capability for delivering notifications / dialogs to a user.
pub const DIALOG: &str = "dialog";

/// Capability for serving a user's contact list.
pub const CONTACTS: &str = "contacts";

/// "The agent at `agent_url` can serve `data_type` for `user_id`".
///
/// Equality is structural over all three fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    /// User the capability is provided for.
    pub user_id: String,
    /// Transport address of the providing agent.
    pub agent_url: String,
    /// Capability name, e.g. [`DIALOG`] or [`CONTACTS`].
    pub data_type: String,
}

impl DataSource {
    /// Create a new data source.
    pub fn new(
        user_id: impl Into<String>,
        agent_url: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            agent_url: agent_url.into(),
            data_type: data_type.into(),
        }
    }

    /// True when this source serves `data_type` for `user_id`.
    pub fn serves(&self, user_id: &str, data_type: &str) -> bool {
        self.user_id == user_id && self.data_type == data_type
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} @ {}", self.user_id, self.data_type, self.agent_url)
    }
}

/// Structured predicate passed to a contacts provider.
pub type ContactFilter = serde_json::Map<String, serde_json::Value>;

/// A single contact, as returned by a contacts provider.
pub type Contact = serde_json::Value;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let ds = DataSource::new("alice", "peer://42", CONTACTS);
        let json = serde_json::to_value(&ds).unwrap();
        assert_eq!(json["userId"], "alice");
        assert_eq!(json["agentUrl"], "peer://42");
        assert_eq!(json["dataType"], "contacts");
    }

    #[test]
    fn test_structural_equality() {
        let a = DataSource::new("alice", "peer://42", DIALOG);
        let b = DataSource::new("alice", "peer://42", DIALOG);
        let c = DataSource::new("alice", "peer://43", DIALOG);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_serves() {
        let ds = DataSource::new("alice", "peer://42", DIALOG);
        assert!(ds.serves("alice", DIALOG));
        assert!(!ds.serves("alice", CONTACTS));
        assert!(!ds.serves("bob", DIALOG));
    }
}
