//! Bind credentials for the directory session.

use crate::error::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use validator::Validate;

/// Identity used to bind the directory session.
///
/// The username is whatever the directory accepts as a bind name (a DN, or a UPN such as
/// `svc-adctl@example.com` on Active Directory). The password stays wrapped in a
/// [`SecretString`] and is redacted from `Debug` output.
#[derive(Debug, Validate)]
pub struct BindCredentials {
    /// Bind DN or user principal name
    #[validate(length(min = 1, message = "bind username cannot be empty"))]
    username: String,

    password: SecretString,
}

impl BindCredentials {
    /// Create new bind credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] if the username is empty and
    /// [`Error::ConfigError`] if the password is empty, which most directories would
    /// silently treat as an unauthenticated bind.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let password: String = password.into();
        if password.is_empty() {
            return Err(Error::ConfigError("bind password cannot be empty".to_string()));
        }

        let credentials = Self {
            username: username.into(),
            password: SecretString::from(password),
        };
        credentials.validate()?;
        Ok(credentials)
    }

    /// Get the bind name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Get the bind password.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}
