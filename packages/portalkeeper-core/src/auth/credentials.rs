//! The stored credential list and the edits the presentation layer may make.

use crate::store::StateStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// Keep passwords out of logs and panics.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Rejections surfaced to whoever issued a credential edit.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("This username already exists.")]
    DuplicateUsername(String),

    #[error("Username and password cannot be empty.")]
    EmptyField,

    #[error("No credential with username '{0}'.")]
    UnknownUsername(String),

    #[error("Credential store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

/// Append a credential to the end of the rotation.
///
/// Fails without writing anything if either field is empty or the username
/// is already stored.
pub fn add_credential(store: &dyn StateStore, credential: Credential) -> Result<(), CredentialError> {
    if credential.username.is_empty() || credential.password.is_empty() {
        return Err(CredentialError::EmptyField);
    }

    let mut credentials = store.get_credentials()?;
    if credentials.iter().any(|c| c.username == credential.username) {
        return Err(CredentialError::DuplicateUsername(credential.username));
    }

    tracing::info!("Adding credential for '{}'", credential.username);
    credentials.push(credential);
    store.save_credentials(&credentials)?;
    Ok(())
}

/// Remove the credential with `username`. Unknown usernames are a no-op.
pub fn remove_credential(store: &dyn StateStore, username: &str) -> Result<(), CredentialError> {
    let credentials = store.get_credentials()?;
    let remaining: Vec<Credential> = credentials
        .iter()
        .filter(|c| c.username != username)
        .cloned()
        .collect();

    if remaining.len() == credentials.len() {
        tracing::debug!("No credential for '{}', nothing removed", username);
        return Ok(());
    }

    tracing::info!("Removing credential for '{}'", username);
    store.save_credentials(&remaining)?;
    Ok(())
}

/// Move the credential with `username` to `position` (0-based) in the rotation.
/// Positions past the end place it last.
pub fn move_credential(
    store: &dyn StateStore,
    username: &str,
    position: usize,
) -> Result<(), CredentialError> {
    let mut credentials = store.get_credentials()?;
    let from = credentials
        .iter()
        .position(|c| c.username == username)
        .ok_or_else(|| CredentialError::UnknownUsername(username.to_string()))?;

    let credential = credentials.remove(from);
    let to = position.min(credentials.len());
    credentials.insert(to, credential);

    tracing::info!("Moved credential '{}' from position {} to {}", username, from, to);
    store.save_credentials(&credentials)?;
    Ok(())
}
