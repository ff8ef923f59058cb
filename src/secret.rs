//! Passphrase and password handling.
//!
//! Secrets are held in zeroize-on-drop buffers, never printed by `Debug`, and
//! only ever handed to external tools through stdin. CLI arguments are visible
//! in `/proc/<pid>/cmdline` to every user on the live system.

use std::fmt;

use serde::{Deserialize, Deserializer};
use thiserror::Error;
use zeroize::Zeroizing;

/// A secret string (LUKS passphrase, account password, Wi-Fi key).
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Borrow the plaintext. Callers must not log the returned value.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Config files may carry secrets; they are moved straight into the
/// zeroizing buffer. There is no `Serialize`: secrets are never written back.
impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Secret::new)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(<redacted>)")
    }
}

/// Recoverable input errors. The prompt layer re-asks on any of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("Entry must not be empty")]
    Empty,

    #[error("Entries do not match")]
    Mismatch,

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("{0}")]
    Invalid(String),
}

/// Accept a secret only when both entries are equal and non-empty.
///
/// ```
/// use tocainstall::secret::{confirm_secret, InputError};
///
/// assert!(confirm_secret("hunter2", "hunter2").is_ok());
/// assert_eq!(confirm_secret("hunter2", "hunter3"), Err(InputError::Mismatch));
/// assert_eq!(confirm_secret("", ""), Err(InputError::Empty));
/// ```
pub fn confirm_secret(first: &str, second: &str) -> Result<Secret, InputError> {
    if first.is_empty() {
        return Err(InputError::Empty);
    }
    if first != second {
        return Err(InputError::Mismatch);
    }
    Ok(Secret::new(first))
}
