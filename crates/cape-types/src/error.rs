//! Shared error types for the CAPE system.

use thiserror::Error;

/// Top-level error type for the CAPE system.
#[derive(Error, Debug)]
pub enum CapeError {
    /// Credential verification failed.
    #[error("Username or password does not match the configured account")]
    AuthMismatch,

    /// The operation needs an account that is not configured.
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    /// Directory registration attempted without a configured username.
    #[error("No username set. Set username and password first using setAccount()")]
    NoIdentity,

    /// No transport service is registered for this process.
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// The directory knows no provider for the requested capability.
    #[error("No data source found providing '{data_type}' for user {user_id}")]
    NoProvider {
        /// User the lookup was made for.
        user_id: String,
        /// Requested capability.
        data_type: String,
    },

    /// The transport rejected a connect or disconnect.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A peer reply could not be deserialized.
    #[error("Bad response: {0}")]
    BadResponse(String),

    /// An error surfaced verbatim from a peer invocation.
    #[error("Remote call failed: {0}")]
    RemoteCall(String),

    /// The client façade was used before `login`.
    #[error("Not logged in")]
    NotLoggedIn,

    /// A state store error occurred.
    #[error("Memory error: {0}")]
    Memory(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CapeError {
    /// Shorthand for a missing provider of `data_type` for `user_id`.
    pub fn no_provider(user_id: impl Into<String>, data_type: impl Into<String>) -> Self {
        CapeError::NoProvider {
            user_id: user_id.into(),
            data_type: data_type.into(),
        }
    }
}

/// Alias for Result with CapeError.
pub type CapeResult<T> = Result<T, CapeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_provider_message() {
        let err = CapeError::no_provider("bob", "dialog");
        let msg = err.to_string();
        assert!(msg.contains("bob"));
        assert!(msg.contains("dialog"));
    }

    #[test]
    fn test_auth_mismatch_message_is_neutral() {
        let msg = CapeError::AuthMismatch.to_string();
        assert_eq!(msg, "Username or password does not match the configured account");
    }
}
