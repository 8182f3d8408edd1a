//! CLI configuration management.
//!
//! Settings are stored at `~/.config/sessionward/config.json` and can be
//! overridden by environment variables (a `.env` file is honoured):
//! `SESSIONWARD_BASE_URL`, `SESSIONWARD_TOKEN`, `SESSIONWARD_USERNAME`,
//! `SESSIONWARD_PASSWORD`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sessionward_core::config::DEFAULT_BASE_URL;
use sessionward_core::{ClientOptions, Keychain};
use tracing::debug;

/// Application name used for the config directory path
const APP_NAME: &str = "sessionward";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const ENV_BASE_URL: &str = "SESSIONWARD_BASE_URL";
const ENV_TOKEN: &str = "SESSIONWARD_TOKEN";
const ENV_USERNAME: &str = "SESSIONWARD_USERNAME";
const ENV_PASSWORD: &str = "SESSIONWARD_PASSWORD";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub base_url: Option<String>,
    pub username: Option<String>,
    pub session_cookie_name: Option<String>,
    pub reauth_enabled: Option<bool>,
    pub identity_path: Option<String>,
}

/// Secrets and identity resolved from env, config and keychain.
#[derive(Debug, Default)]
pub struct Resolved {
    pub base_url: String,
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Ok(serde_json::from_str(&contents).context("Failed to parse config file")?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Merge environment overrides onto the stored settings.
    pub fn resolve(&self, lookup: impl Fn(&str) -> Option<String>) -> Resolved {
        let env = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let token = env(ENV_TOKEN);
        // A stored username belongs to password logins; a token replaces it.
        let stored_username = self.username.clone().filter(|_| token.is_none());
        Resolved {
            base_url: env(ENV_BASE_URL)
                .or_else(|| self.base_url.clone())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            token,
            username: env(ENV_USERNAME).or(stored_username),
            password: env(ENV_PASSWORD),
        }
    }

    /// Build client options. In password mode a missing password is looked
    /// up in the keychain, then prompted for when `prompt` is set.
    pub fn client_options(&self, mut resolved: Resolved, prompt: bool) -> Result<ClientOptions> {
        if resolved.token.is_none() && resolved.password.is_none() {
            if let Some(ref username) = resolved.username {
                resolved.password = Keychain::get_password(&resolved.base_url, username).ok();
                if resolved.password.is_none() && prompt {
                    resolved.password = Some(
                        rpassword::prompt_password(format!("Password for {}: ", username))
                            .context("Failed to read password")?,
                    );
                }
            }
        }

        let mut builder = ClientOptions::builder().base_url(resolved.base_url);
        if let Some(token) = resolved.token {
            builder = builder.api_token(token);
        }
        if let Some(username) = resolved.username {
            builder = builder.username(username);
        }
        if let Some(password) = resolved.password {
            builder = builder.password(password);
        }
        if let Some(ref name) = self.session_cookie_name {
            builder = builder.session_cookie_name(name.clone());
        }
        if let Some(enabled) = self.reauth_enabled {
            builder = builder.reauth_enabled(enabled);
        }
        if let Some(ref path) = self.identity_path {
            builder = builder.identity_path(path.clone());
        }

        builder.build().context("Invalid client configuration")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides_config() {
        let config = Config {
            base_url: Some("https://stored.test".to_string()),
            username: Some("stored".to_string()),
            ..Config::default()
        };
        let resolved = config.resolve(env_from(&[
            (ENV_BASE_URL, "https://env.test"),
            (ENV_USERNAME, "alice"),
            (ENV_PASSWORD, "secret"),
        ]));
        assert_eq!(resolved.base_url, "https://env.test");
        assert_eq!(resolved.username.as_deref(), Some("alice"));
        assert_eq!(resolved.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_token_env_ignores_stored_username() {
        let config = Config {
            username: Some("stored".to_string()),
            ..Config::default()
        };
        let resolved = config.resolve(env_from(&[(ENV_TOKEN, "tok")]));
        assert_eq!(resolved.token.as_deref(), Some("tok"));
        assert_eq!(resolved.username, None);

        let options = config.client_options(resolved, false).expect("token options");
        assert_eq!(options.mode(), sessionward_core::CredentialMode::Token);
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let config = Config {
            username: Some("stored".to_string()),
            ..Config::default()
        };
        let resolved = config.resolve(env_from(&[(ENV_USERNAME, ""), (ENV_BASE_URL, "")]));
        assert_eq!(resolved.username.as_deref(), Some("stored"));
        assert_eq!(resolved.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_token_client_options() {
        let config = Config::default();
        let resolved = config.resolve(env_from(&[(ENV_TOKEN, "tok")]));
        let options = config.client_options(resolved, false).expect("options");
        assert_eq!(options.mode(), sessionward_core::CredentialMode::Token);
    }

    #[test]
    fn test_password_client_options_apply_stored_settings() {
        let config = Config {
            session_cookie_name: Some("sid".to_string()),
            reauth_enabled: Some(true),
            identity_path: Some("/api/v8/me".to_string()),
            ..Config::default()
        };
        let resolved = config.resolve(env_from(&[(ENV_USERNAME, "alice"), (ENV_PASSWORD, "secret")]));
        let options = config.client_options(resolved, false).expect("options");
        assert_eq!(options.session_cookie_name(), "sid");
        assert!(options.reauth_enabled());
        assert_eq!(options.identity_path(), "/api/v8/me");
    }
}
