use keyring::Entry;
use std::error::Error;
use std::fmt;
use tracing::debug;

const KEYRING_SERVICE: &str = "ollamacode";
const REFRESH_TOKEN_ACCOUNT: &str = "refresh-token";

/// Describes failures when attempting to access the system keyring.
///
/// Recoverable errors indicate that the credential backend was
/// temporarily unavailable (for example when the keychain service is
/// locked or inaccessible). Permanent errors surface the underlying
/// cause directly so callers can report them to the user.
#[derive(Debug)]
pub enum KeyringAccessError {
    Recoverable(keyring::Error),
    Permanent(keyring::Error),
}

impl KeyringAccessError {
    fn inner(&self) -> &keyring::Error {
        match self {
            KeyringAccessError::Recoverable(err) | KeyringAccessError::Permanent(err) => err,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, KeyringAccessError::Recoverable(_))
    }
}

impl From<keyring::Error> for KeyringAccessError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::PlatformFailure(_) | keyring::Error::NoStorageAccess(_) => {
                KeyringAccessError::Recoverable(err)
            }
            other => KeyringAccessError::Permanent(other),
        }
    }
}

impl fmt::Display for KeyringAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "keyring unavailable: {}", self.inner())
    }
}

impl Error for KeyringAccessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.inner())
    }
}

/// Persists the refresh token between CLI invocations. With the keyring
/// disabled every operation is a no-op and nothing is remembered.
#[derive(Debug, Clone)]
pub struct SessionVault {
    use_keyring: bool,
    account: String,
}

impl SessionVault {
    pub fn new(use_keyring: bool) -> Self {
        Self {
            use_keyring,
            account: REFRESH_TOKEN_ACCOUNT.to_string(),
        }
    }

    /// Separate accounts per store project so switching projects does not
    /// reuse a foreign refresh token.
    pub fn for_store(use_keyring: bool, store_url: &str) -> Self {
        Self {
            use_keyring,
            account: format!("{REFRESH_TOKEN_ACCOUNT}@{}", store_url.trim_end_matches('/')),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.use_keyring
    }

    fn entry(&self) -> Result<Entry, KeyringAccessError> {
        Ok(Entry::new(KEYRING_SERVICE, &self.account)?)
    }

    pub fn store_refresh_token(&self, token: &str) -> Result<(), KeyringAccessError> {
        if !self.use_keyring {
            return Ok(());
        }
        self.entry()?.set_password(token)?;
        debug!(account = %self.account, "stored refresh token");
        Ok(())
    }

    pub fn refresh_token(&self) -> Result<Option<String>, KeyringAccessError> {
        if !self.use_keyring {
            return Ok(None);
        }
        match self.entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn clear(&self) -> Result<(), KeyringAccessError> {
        if !self.use_keyring {
            return Ok(());
        }
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
