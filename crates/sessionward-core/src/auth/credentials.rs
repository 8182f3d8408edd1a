use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "sessionward";

/// OS keychain storage for password-mode secrets, keyed by API base URL
/// and username so one user can hold accounts on several servers.
pub struct Keychain;

impl Keychain {
    fn entry(base_url: &str, username: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &account_key(base_url, username))
            .context("Failed to create keyring entry")
    }

    /// Store the password for a username in the OS keychain
    pub fn store(base_url: &str, username: &str, password: &str) -> Result<()> {
        Self::entry(base_url, username)?
            .set_password(password)
            .context("Failed to store password in keychain")
    }

    /// Retrieve the password for a username from the OS keychain
    pub fn get_password(base_url: &str, username: &str) -> Result<String> {
        Self::entry(base_url, username)?
            .get_password()
            .context("Failed to retrieve password from keychain")
    }

    /// Delete the stored password for a username
    pub fn delete(base_url: &str, username: &str) -> Result<()> {
        Self::entry(base_url, username)?
            .delete_credential()
            .context("Failed to delete credential from keychain")
    }

    /// Check if a password is stored for a username
    pub fn has_credentials(base_url: &str, username: &str) -> bool {
        Self::entry(base_url, username)
            .and_then(|entry| entry.get_password().map_err(Into::into))
            .is_ok()
    }
}

fn account_key(base_url: &str, username: &str) -> String {
    format!("{}@{}", username, base_url.trim_end_matches('/'))
}
