//! Ledger API key storage in the OS keyring.
//!
//! `COINROOM_LEDGER_KEY` takes precedence over the stored key.

use crate::error::{CoreError, Result};

const SERVICE: &str = "coinroom";
const API_KEY_ENTRY: &str = "ledger_api_key";
pub const API_KEY_ENV: &str = "COINROOM_LEDGER_KEY";

pub fn api_key() -> Result<Option<String>> {
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            return Ok(Some(key));
        }
    }
    let entry = keyring::Entry::new(SERVICE, API_KEY_ENTRY)?;
    match entry.get_password() {
        Ok(key) => Ok(Some(key)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn set_api_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(CoreError::Credentials("api key must not be empty".into()));
    }
    let entry = keyring::Entry::new(SERVICE, API_KEY_ENTRY)?;
    entry.set_password(key)?;
    Ok(())
}

pub fn clear_api_key() -> Result<()> {
    let entry = keyring::Entry::new(SERVICE, API_KEY_ENTRY)?;
    match entry.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
