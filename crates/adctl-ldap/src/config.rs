//! Configuration for the directory client.

use crate::{dn::DistinguishedName, Result};
use adctl_core::{BindCredentials, Error};
use std::env::VarError;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Default receive timeout (seconds).
pub const DEFAULT_RECEIVE_TIMEOUT_SECS: u64 = 45;
/// Default server-side search time limit (seconds).
pub const DEFAULT_TIME_LIMIT_SECS: u64 = 45;
/// Default per-endpoint connect timeout (seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Environment variable names read by [`DirectoryConfig::from_env`].
pub mod env {
    /// Endpoint list, JSON array or comma/whitespace separated.
    pub const URLS: &str = "LDAP_URLS";
    /// Bind DN or user principal name.
    pub const USERNAME: &str = "LDAP_USERNAME";
    /// Bind password.
    pub const PASSWORD: &str = "LDAP_PASSWORD";
    /// Subtree search base.
    pub const SEARCH_BASE: &str = "LDAP_SEARCH_BASE";
    /// Parent DN for organizational units created by the client.
    pub const OU_BASE: &str = "LDAP_OU_BASE";
    /// Receive timeout in seconds.
    pub const RECEIVE_TIMEOUT: &str = "LDAP_RECEIVE_TIMEOUT";
    /// Search time limit in seconds.
    pub const TIME_LIMIT: &str = "LDAP_TIME_LIMIT";
    /// Connect timeout in seconds.
    pub const CONNECT_TIMEOUT: &str = "LDAP_CONNECT_TIMEOUT";
    /// Whether to verify server certificates.
    pub const TLS_VERIFY: &str = "LDAP_TLS_VERIFY";
    /// Optional PEM CA certificate path.
    pub const TLS_CA_CERT: &str = "LDAP_TLS_CA_CERT";
}

/// Configuration for connecting to the directory.
///
/// Built once by the process entry point and handed to
/// [`DirectoryClient::connect`](crate::DirectoryClient::connect); the client keeps no other
/// configuration state.
#[derive(Debug, Validate)]
pub struct DirectoryConfig {
    urls: Vec<String>,
    #[validate(nested)]
    credentials: BindCredentials,
    search_base: DistinguishedName,
    ou_base: DistinguishedName,
    #[validate(range(min = 1, max = 600))]
    receive_timeout_secs: u64,
    #[validate(range(min = 1, max = 600))]
    time_limit_secs: u64,
    #[validate(range(min = 1, max = 600))]
    connect_timeout_secs: u64,
    tls_verify: bool,
    tls_ca_cert: Option<PathBuf>,
}

impl DirectoryConfig {
    /// Creates a configuration with default timeouts and TLS verification enabled.
    ///
    /// An empty `urls` list is accepted here; connecting with it fails.
    #[must_use]
    pub fn new(
        urls: Vec<String>,
        credentials: BindCredentials,
        search_base: DistinguishedName,
        ou_base: DistinguishedName,
    ) -> Self {
        Self {
            urls,
            credentials,
            search_base,
            ou_base,
            receive_timeout_secs: DEFAULT_RECEIVE_TIMEOUT_SECS,
            time_limit_secs: DEFAULT_TIME_LIMIT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            tls_verify: true,
            tls_ca_cert: None,
        }
    }

    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if a required variable is missing or any value is
    /// malformed or out of range.
    pub fn from_env() -> Result<Self> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Loads configuration through a custom variable reader.
    ///
    /// Tests use this to supply variables without touching process-global state.
    ///
    /// # Errors
    ///
    /// See [`DirectoryConfig::from_env`].
    pub fn from_reader<F>(reader: F) -> Result<Self>
    where
        F: Fn(&str) -> std::result::Result<String, VarError>,
    {
        let urls = parse_url_list(&required(&reader, env::URLS)?)?;
        let credentials = BindCredentials::new(
            required(&reader, env::USERNAME)?,
            required(&reader, env::PASSWORD)?,
        )
        .map_err(|err| Error::ConfigError(format!("invalid bind credentials: {err}")))?;
        let search_base = required_dn(&reader, env::SEARCH_BASE)?;
        let ou_base = required_dn(&reader, env::OU_BASE)?;

        let mut config = Self::new(urls, credentials, search_base, ou_base)
            .with_receive_timeout_secs(optional_secs(
                &reader,
                env::RECEIVE_TIMEOUT,
                DEFAULT_RECEIVE_TIMEOUT_SECS,
            )?)
            .with_time_limit_secs(optional_secs(
                &reader,
                env::TIME_LIMIT,
                DEFAULT_TIME_LIMIT_SECS,
            )?)
            .with_connect_timeout_secs(optional_secs(
                &reader,
                env::CONNECT_TIMEOUT,
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )?)
            .with_tls_verification(optional_bool(&reader, env::TLS_VERIFY, true)?);

        if let Ok(path) = reader(env::TLS_CA_CERT) {
            if !path.trim().is_empty() {
                config = config.with_tls_ca_cert(PathBuf::from(path.trim()));
            }
        }

        config
            .validate()
            .map_err(|err| Error::ConfigError(format!("invalid configuration: {err}")))?;
        Ok(config)
    }

    /// Configured endpoint addresses, in pool order.
    #[must_use]
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Bind credentials.
    #[must_use]
    pub const fn credentials(&self) -> &BindCredentials {
        &self.credentials
    }

    /// Base DN for subtree searches.
    #[must_use]
    pub const fn search_base(&self) -> &DistinguishedName {
        &self.search_base
    }

    /// Parent DN for organizational units.
    #[must_use]
    pub const fn ou_base(&self) -> &DistinguishedName {
        &self.ou_base
    }

    /// DN of the organizational unit `name` directly under the OU base.
    #[must_use]
    pub fn ou_dn(&self, name: &str) -> DistinguishedName {
        self.ou_base.child("OU", name)
    }

    /// Time to wait for a response on the bound connection.
    #[must_use]
    pub const fn receive_timeout(&self) -> Duration {
        Duration::from_secs(self.receive_timeout_secs)
    }

    /// Server-side search time limit.
    #[must_use]
    pub const fn time_limit(&self) -> Duration {
        Duration::from_secs(self.time_limit_secs)
    }

    /// Connect timeout applied to each endpoint.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Returns whether TLS certificate verification is enabled.
    #[must_use]
    pub const fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// Optional custom CA certificate path.
    #[must_use]
    pub fn tls_ca_cert(&self) -> Option<&PathBuf> {
        self.tls_ca_cert.as_ref()
    }

    /// Overrides the receive timeout in seconds.
    #[must_use]
    pub const fn with_receive_timeout_secs(mut self, seconds: u64) -> Self {
        self.receive_timeout_secs = seconds;
        self
    }

    /// Overrides the search time limit in seconds.
    #[must_use]
    pub const fn with_time_limit_secs(mut self, seconds: u64) -> Self {
        self.time_limit_secs = seconds;
        self
    }

    /// Overrides the connect timeout in seconds.
    #[must_use]
    pub const fn with_connect_timeout_secs(mut self, seconds: u64) -> Self {
        self.connect_timeout_secs = seconds;
        self
    }

    /// Enables or disables TLS certificate verification.
    #[must_use]
    pub const fn with_tls_verification(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Sets the custom CA certificate path for TLS verification.
    #[must_use]
    pub fn with_tls_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }
}

/// Parses an endpoint list without evaluating it.
///
/// Accepts a JSON array of strings, a bracketed list of single- or double-quoted strings
/// (`['ldaps://dc1', 'ldaps://dc2']`), or a comma/whitespace separated list. Blank input
/// yields an empty list.
///
/// # Errors
///
/// Returns [`Error::ConfigError`] naming the accepted formats when a bracketed list is
/// malformed.
pub fn parse_url_list(raw: &str) -> Result<Vec<String>> {
    let raw = raw.trim();
    if raw.starts_with('[') {
        let urls = match serde_json::from_str::<Vec<String>>(raw) {
            Ok(urls) => urls,
            Err(err) => parse_quoted_list(raw).ok_or_else(|| {
                Error::ConfigError(format!(
                    "{} must be a JSON string array such as [\"ldaps://dc1\"], a bracketed list \
                     of quoted strings such as ['ldaps://dc1'], or a comma separated list: {err}",
                    env::URLS
                ))
            })?,
        };
        return Ok(urls
            .into_iter()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect());
    }

    Ok(raw
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect())
}

/// `['a', "b"]` style lists. Items may not contain quotes, backslashes or commas.
fn parse_quoted_list(raw: &str) -> Option<Vec<String>> {
    let inner = raw.strip_prefix('[')?.strip_suffix(']')?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let quote = item.chars().next().filter(|c| *c == '\'' || *c == '"')?;
            let value = item.strip_prefix(quote)?.strip_suffix(quote)?;
            if value.contains(['\'', '"', '\\']) {
                return None;
            }
            Some(value.to_string())
        })
        .collect()
}

fn required<F>(reader: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> std::result::Result<String, VarError>,
{
    reader(key)
        .map_err(|_| Error::ConfigError(format!("missing required environment variable {key}")))
}

fn required_dn<F>(reader: &F, key: &str) -> Result<DistinguishedName>
where
    F: Fn(&str) -> std::result::Result<String, VarError>,
{
    let value = required(reader, key)?;
    DistinguishedName::parse(&value)
        .map_err(|err| Error::ConfigError(format!("invalid value for {key}: {err}")))
}

fn optional_secs<F>(reader: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> std::result::Result<String, VarError>,
{
    match reader(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map_err(|err| Error::ConfigError(format!("invalid value for {key}: {err}"))),
        _ => Ok(default),
    }
}

fn optional_bool<F>(reader: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> std::result::Result<String, VarError>,
{
    let Ok(value) = reader(key) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "" => Ok(default),
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(Error::ConfigError(format!(
            "invalid value for {key}: expected a boolean, got `{other}`"
        ))),
    }
}
