//! Refresh token storage in the OS keychain.
//!
//! At startup, [`populate_env_from_keychain`] copies a stored refresh
//! token into `ALOR_REFRESH_TOKEN` so [`crate::config::fetch_config`]
//! picks it up without the token ever living in a shell profile.

use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Keychain service name used for all stored credentials.
const SERVICE: &str = "alor";

/// Credentials managed by this module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialKey {
    RefreshToken,
}

impl CredentialKey {
    /// Returns the keychain entry identifier.
    pub fn keyring_id(self) -> &'static str {
        match self {
            Self::RefreshToken => "refresh_token",
        }
    }

    /// Returns the environment variable name for this credential.
    pub fn env_var(self) -> &'static str {
        match self {
            Self::RefreshToken => "ALOR_REFRESH_TOKEN",
        }
    }

    pub const ALL: [CredentialKey; 1] = [Self::RefreshToken];
}

/// Loads a credential from the keychain, returning `None` if not set.
pub fn load(key: CredentialKey) -> Option<Zeroizing<String>> {
    let entry = keyring::Entry::new(SERVICE, key.keyring_id()).ok()?;
    match entry.get_password() {
        Ok(password) => Some(Zeroizing::new(password)),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key = key.keyring_id(), error = %e, "failed to read keychain entry");
            None
        }
    }
}

/// Saves a credential to the keychain.
///
/// # Errors
///
/// Returns [`AlorError::Config`](crate::AlorError::Config) if the keychain
/// is unavailable or refuses the write.
pub fn save(key: CredentialKey, value: &str) -> crate::Result<()> {
    let entry = keyring::Entry::new(SERVICE, key.keyring_id())
        .map_err(|e| crate::AlorError::Config(format!("keyring entry error: {e}")))?;
    entry
        .set_password(value)
        .map_err(|e| crate::AlorError::Config(format!("failed to save to keychain: {e}")))
}

/// Removes a credential from the keychain. Missing entries are not an
/// error.
///
/// # Errors
///
/// Returns [`AlorError::Config`](crate::AlorError::Config) if the keychain
/// refuses the deletion.
pub fn delete(key: CredentialKey) -> crate::Result<()> {
    let entry = keyring::Entry::new(SERVICE, key.keyring_id())
        .map_err(|e| crate::AlorError::Config(format!("keyring entry error: {e}")))?;
    match entry.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(crate::AlorError::Config(format!(
            "failed to delete keychain entry: {e}"
        ))),
    }
}

/// Populates environment variables from the keychain for any
/// credentials not already set in the environment.
///
/// Call this at startup, before the tokio runtime spawns worker threads.
pub fn populate_env_from_keychain() {
    for key in CredentialKey::ALL {
        if std::env::var(key.env_var()).is_err()
            && let Some(value) = load(key)
        {
            debug!(key = key.env_var(), "loaded credential from keychain");
            // SAFETY: called before any other thread reads the environment.
            unsafe {
                std::env::set_var(key.env_var(), value.as_str());
            }
        }
    }
}
