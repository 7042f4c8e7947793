//! Access token storage in the system keyring.
//!
//! Uses the platform's native credential storage:
//! - Linux: Secret Service (GNOME Keyring, `KWallet`)
//! - macOS: Keychain
//! - Windows: Credential Manager

use keyring::Entry;
use tracing::{debug, warn};

use crate::message::ParticipantId;

/// Service name used for keyring entries.
const SERVICE_NAME: &str = "parley";

/// Credential type identifier for backend access tokens.
const ACCESS_TOKEN_CREDENTIAL: &str = "access_token";

/// Error type for credential operations.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Failed to access keyring.
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// Tokens cannot be empty.
    #[error("Access token is empty")]
    EmptyToken,
}

/// Result type for credential operations.
pub type CredentialResult<T> = std::result::Result<T, CredentialError>;

fn credential_key(participant: &ParticipantId) -> String {
    format!("{SERVICE_NAME}_{ACCESS_TOKEN_CREDENTIAL}_{participant}")
}

/// Stores the access token for `participant`.
///
/// # Errors
///
/// Returns an error if the token is empty or the keyring operation fails.
pub fn store_token(participant: &ParticipantId, token: &str) -> CredentialResult<()> {
    if token.trim().is_empty() {
        return Err(CredentialError::EmptyToken);
    }
    let entry = Entry::new(SERVICE_NAME, &credential_key(participant))?;
    entry.set_password(token)?;
    debug!("Stored access token for {participant}");
    Ok(())
}

/// Retrieves the access token for `participant`.
///
/// # Errors
///
/// Returns an error if the keyring operation fails.
pub fn get_token(participant: &ParticipantId) -> CredentialResult<Option<String>> {
    let entry = Entry::new(SERVICE_NAME, &credential_key(participant))?;
    match entry.get_password() {
        Ok(token) => Ok(Some(token)),
        Err(keyring::Error::NoEntry) => {
            debug!("No access token found for {participant}");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Deletes the access token for `participant`.
///
/// # Errors
///
/// Returns an error if the keyring operation fails (except for missing entries).
pub fn delete_token(participant: &ParticipantId) -> CredentialResult<()> {
    let entry = Entry::new(SERVICE_NAME, &credential_key(participant))?;
    match entry.delete_credential() {
        Ok(()) => debug!("Deleted access token for {participant}"),
        Err(keyring::Error::NoEntry) => debug!("No access token to delete for {participant}"),
        Err(e) => {
            warn!("Failed to delete access token: {e}");
            return Err(e.into());
        }
    }
    Ok(())
}
