//! Transport credentials and the verification rule.
//!
//! Verification compares each supplied field against the stored one with a
//! three-way result. A stored field that is unset always matches: this is the
//! bootstrap case that lets the very first `setAccount` succeed before any
//! credential exists.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// The (username, password, resource) triple identifying a transport session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Transport username.
    pub username: String,
    /// SECURITY: Password is zeroized on drop.
    pub password: Zeroizing<String>,
    /// Optional transport resource (e.g. "client").
    pub resource: Option<String>,
}

impl Credential {
    /// Create a credential from its parts.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        resource: Option<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
            resource,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("resource", &self.resource)
            .finish()
    }
}

/// Outcome of comparing one supplied credential field with the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCheck {
    /// Nothing is stored for this field; anything matches.
    Unset,
    /// The supplied value equals the stored one, or no value was supplied.
    Match,
    /// The supplied value differs from the stored one.
    Mismatch,
}

impl FieldCheck {
    /// Compare a supplied field with the stored field.
    pub fn compare(stored: Option<&str>, supplied: Option<&str>) -> Self {
        match (stored, supplied) {
            (None, _) => FieldCheck::Unset,
            (Some(_), None) => FieldCheck::Match,
            (Some(stored), Some(supplied)) if stored == supplied => FieldCheck::Match,
            (Some(_), Some(_)) => FieldCheck::Mismatch,
        }
    }

    /// Whether this field passes verification.
    pub fn passes(self) -> bool {
        self != FieldCheck::Mismatch
    }
}

/// Per-field verification result for a username/password pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    pub username: FieldCheck,
    pub password: FieldCheck,
}

impl Verification {
    /// Verify `(username, password)` against the stored pair.
    pub fn check(
        stored_username: Option<&str>,
        stored_password: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Self {
        Self {
            username: FieldCheck::compare(stored_username, username),
            password: FieldCheck::compare(stored_password, password),
        }
    }

    /// True when no credential is stored at all.
    pub fn is_bootstrap(&self) -> bool {
        self.username == FieldCheck::Unset && self.password == FieldCheck::Unset
    }

    /// Both fields pass.
    pub fn is_ok(&self) -> bool {
        self.username.passes() && self.password.passes()
    }
}
