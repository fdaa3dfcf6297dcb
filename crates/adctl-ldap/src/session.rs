//! LDAP session boundary.
//!
//! Everything the client sends to the directory goes through [`LdapSession`]; the
//! production implementation wraps ldap3's synchronous [`LdapConn`], so every request
//! blocks until the server has answered or the receive timeout expires.

use crate::{config::DirectoryConfig, pool::DirectoryEndpoint, Result};
use adctl_core::Error;
use ldap3::{LdapConn, LdapConnSettings, LdapError, Mod, Scope, SearchEntry, SearchOptions};
use native_tls::{Certificate, TlsConnector};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Represents the search scope for LDAP queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Base object and all descendants.
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// A search result entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LdapEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute values, in the order the server returned them.
    pub attributes: HashMap<String, Vec<String>>,
}

impl LdapEntry {
    /// Returns the first value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.values(attribute)
            .and_then(|values| values.first().map(String::as_str))
    }

    /// Returns all values of the attribute, matching the name case-insensitively.
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes
            .get(attribute)
            .or_else(|| {
                self.attributes
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
                    .map(|(_, values)| values)
            })
            .map(Vec::as_slice)
    }
}

/// A single change inside an LDAP modify request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryModification {
    /// Add attribute values.
    Add {
        /// Attribute to modify.
        attribute: String,
        /// Values to add.
        values: Vec<String>,
    },
    /// Delete attribute values.
    Delete {
        /// Attribute to modify.
        attribute: String,
        /// Values to delete (empty removes the attribute).
        values: Vec<String>,
    },
    /// Replace all values of an attribute.
    Replace {
        /// Attribute to modify.
        attribute: String,
        /// Replacement values.
        values: Vec<String>,
    },
}

impl DirectoryModification {
    /// Replace `attribute` with exactly one value.
    #[must_use]
    pub fn replace(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Replace {
            attribute: attribute.into(),
            values: vec![value.into()],
        }
    }

    /// Name of the modified attribute.
    #[must_use]
    pub fn attribute(&self) -> &str {
        match self {
            Self::Add { attribute, .. }
            | Self::Delete { attribute, .. }
            | Self::Replace { attribute, .. } => attribute,
        }
    }

    /// Values carried by the change.
    #[must_use]
    pub fn values(&self) -> &[String] {
        match self {
            Self::Add { values, .. } | Self::Delete { values, .. } | Self::Replace { values, .. } => {
                values
            }
        }
    }

    fn to_mod(&self) -> Mod<&str> {
        let values = self.values().iter().map(String::as_str).collect::<HashSet<_>>();
        match self {
            Self::Add { attribute, .. } => Mod::Add(attribute.as_str(), values),
            Self::Delete { attribute, .. } => Mod::Delete(attribute.as_str(), values),
            Self::Replace { attribute, .. } => Mod::Replace(attribute.as_str(), values),
        }
    }
}

/// One open connection to a directory server.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait LdapSession: Send {
    fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;
    fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
        time_limit: Duration,
    ) -> Result<Vec<LdapEntry>>;
    fn add(&mut self, dn: &str, attributes: &[(String, Vec<String>)]) -> Result<()>;
    fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()>;
    fn unbind(&mut self) -> Result<()>;
}

/// Opens connections to individual endpoints.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait LdapConnector: Send + Sync {
    fn connect(&self, endpoint: &DirectoryEndpoint) -> Result<Box<dyn LdapSession>>;
}

/// Connector backed by ldap3's synchronous connection.
pub(crate) struct Ldap3Connector {
    receive_timeout: Duration,
    tls_verify: bool,
    tls_ca_cert: Option<PathBuf>,
}

impl Ldap3Connector {
    pub(crate) fn from_config(config: &DirectoryConfig) -> Self {
        Self {
            receive_timeout: config.receive_timeout(),
            tls_verify: config.tls_verify(),
            tls_ca_cert: config.tls_ca_cert().cloned(),
        }
    }

    fn settings(&self, connect_timeout: Duration) -> Result<LdapConnSettings> {
        let mut settings = LdapConnSettings::new().set_conn_timeout(connect_timeout);

        if !self.tls_verify {
            let connector = TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .build()
                .map_err(|err| {
                    Error::ConfigError(format!("failed to construct TLS connector: {err}"))
                })?;
            settings = settings.set_connector(connector).set_no_tls_verify(true);
        } else if let Some(cert_path) = &self.tls_ca_cert {
            let pem = fs::read(cert_path).map_err(|err| {
                Error::ConfigError(format!(
                    "failed to read directory CA certificate {}: {err}",
                    cert_path.display()
                ))
            })?;
            let certificate = Certificate::from_pem(&pem).map_err(|err| {
                Error::ConfigError(format!("invalid directory CA certificate: {err}"))
            })?;
            let connector = TlsConnector::builder()
                .add_root_certificate(certificate)
                .build()
                .map_err(|err| {
                    Error::ConfigError(format!("failed to load directory CA certificate: {err}"))
                })?;
            settings = settings.set_connector(connector);
        }

        Ok(settings)
    }
}

impl LdapConnector for Ldap3Connector {
    fn connect(&self, endpoint: &DirectoryEndpoint) -> Result<Box<dyn LdapSession>> {
        let settings = self.settings(endpoint.connect_timeout())?;
        let conn = LdapConn::with_settings(settings, endpoint.as_str()).map_err(map_ldap_error)?;
        debug!(server = %endpoint, "directory connection established");
        Ok(Box::new(Ldap3Session {
            conn,
            receive_timeout: self.receive_timeout,
        }))
    }
}

struct Ldap3Session {
    conn: LdapConn,
    receive_timeout: Duration,
}

impl LdapSession for Ldap3Session {
    fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        self.conn
            .with_timeout(self.receive_timeout)
            .simple_bind(dn, password)
            .and_then(ldap3::LdapResult::success)
            .map_err(map_ldap_error)?;
        Ok(())
    }

    fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
        time_limit: Duration,
    ) -> Result<Vec<LdapEntry>> {
        let options =
            SearchOptions::new().timelimit(i32::try_from(time_limit.as_secs()).unwrap_or(i32::MAX));
        let (entries, result) = self
            .conn
            .with_timeout(self.receive_timeout)
            .with_search_options(options)
            .search(base_dn, scope.into(), filter, attributes.to_vec())
            .and_then(ldap3::SearchResult::success)
            .map_err(map_ldap_error)?;
        debug!(base_dn, filter, rc = result.rc, count = entries.len(), "search complete");

        Ok(entries
            .into_iter()
            .filter(|entry| !entry.is_ref())
            .map(SearchEntry::construct)
            .map(|entry| LdapEntry {
                dn: entry.dn,
                attributes: entry.attrs,
            })
            .collect())
    }

    fn add(&mut self, dn: &str, attributes: &[(String, Vec<String>)]) -> Result<()> {
        let attrs = attributes
            .iter()
            .map(|(name, values)| {
                (
                    name.as_str(),
                    values.iter().map(String::as_str).collect::<HashSet<_>>(),
                )
            })
            .collect::<Vec<_>>();

        let result = self
            .conn
            .with_timeout(self.receive_timeout)
            .add(dn, attrs)
            .and_then(ldap3::LdapResult::success)
            .map_err(map_ldap_error)?;
        debug!(dn, rc = result.rc, "add complete");
        Ok(())
    }

    fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()> {
        let mods = modifications
            .iter()
            .map(DirectoryModification::to_mod)
            .collect::<Vec<_>>();

        let result = self
            .conn
            .with_timeout(self.receive_timeout)
            .modify(dn, mods)
            .and_then(ldap3::LdapResult::success)
            .map_err(map_ldap_error)?;
        debug!(dn, rc = result.rc, "modify complete");
        Ok(())
    }

    fn unbind(&mut self) -> Result<()> {
        self.conn.unbind().map_err(map_ldap_error)
    }
}

fn map_ldap_error(err: LdapError) -> Error {
    match &err {
        LdapError::LdapResult { result } => Error::Ldap {
            code: Some(result.rc),
            message: err.to_string(),
        },
        LdapError::Timeout { .. } => Error::Timeout(err.to_string()),
        _ => Error::Ldap {
            code: None,
            message: err.to_string(),
        },
    }
}
