//! Credential entry for the portal login.
//!
//! Credentials come from the `B3_USER` / `B3_PASSWD` environment variables
//! when both are set, otherwise from an interactive prompt with masked
//! password entry. There is no on-disk credential storage.

use anyhow::{Context, Result};
use dialoguer::{Input, Password};
use secrecy::{ExposeSecret, SecretString};

pub const USER_ENV_VAR: &str = "B3_USER";
pub const PASSWORD_ENV_VAR: &str = "B3_PASSWD";

/// A portal login pair. The password is held as a [`SecretString`] so it
/// never appears in Debug output or logs.
pub struct Credentials {
    user: String,
    password: SecretString,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: normalize_user(&user.into()),
            password: SecretString::from(password.into()),
        }
    }

    /// The login user (CPF), with formatting punctuation stripped.
    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn expose_password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Read credentials from the environment. Returns `None` unless both
    /// variables are set.
    pub fn from_env() -> Option<Self> {
        let user = std::env::var(USER_ENV_VAR).ok()?;
        let password = std::env::var(PASSWORD_ENV_VAR).ok()?;
        Some(Self::new(user, password))
    }

    /// Prompt interactively, masking the password.
    pub fn prompt() -> Result<Self> {
        let user: String = Input::new()
            .with_prompt("CEI user (CPF)")
            .interact_text()
            .context("Failed to read user from terminal")?;

        let password = Password::new()
            .with_prompt("CEI password")
            .interact()
            .context("Failed to read password from terminal")?;

        Ok(Self::new(user, password))
    }

    /// Environment first, interactive prompt otherwise.
    pub fn resolve() -> Result<Self> {
        match Self::from_env() {
            Some(credentials) => Ok(credentials),
            None => Self::prompt(),
        }
    }
}

/// CPFs are often pasted formatted ("123.456.789-00"); the portal wants
/// digits only.
fn normalize_user(user: &str) -> String {
    user.trim()
        .chars()
        .filter(|c| *c != '.' && *c != '-')
        .collect()
}
