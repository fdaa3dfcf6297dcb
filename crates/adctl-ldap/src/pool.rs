//! Directory server pool with round-robin selection and exhaust-on-failure.

use crate::{
    session::{LdapConnector, LdapSession},
    Result,
};
use adctl_core::Error;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const SUPPORTED_SCHEMES: &[&str] = &["ldap", "ldaps", "ldapi"];

/// One directory server address with its connect timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEndpoint {
    url: Url,
    connect_timeout: Duration,
}

impl DirectoryEndpoint {
    /// Parses an endpoint address.
    ///
    /// `ldap://`, `ldaps://` and `ldapi://` URLs are accepted as is; a bare host (optionally
    /// with a port) is treated as `ldap://<host>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] for unparsable addresses, other schemes, or URLs
    /// without a host.
    pub fn parse(address: &str, connect_timeout: Duration) -> Result<Self> {
        let address = address.trim();
        let url = if address.contains("://") {
            Url::parse(address)?
        } else {
            Url::parse(&format!("ldap://{address}"))?
        };

        if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
            return Err(Error::InvalidEndpoint(format!(
                "unsupported scheme `{}` in {address}",
                url.scheme()
            )));
        }
        if url.scheme() != "ldapi" && url.host_str().map_or(true, str::is_empty) {
            return Err(Error::InvalidEndpoint(format!("missing host in {address}")));
        }

        Ok(Self {
            url,
            connect_timeout,
        })
    }

    /// Endpoint URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Endpoint URL as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Time allowed for establishing a connection to this endpoint.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl fmt::Display for DirectoryEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Ordered set of endpoints, all treated as active.
///
/// Each connection attempt starts at the next endpoint in round-robin order and walks the
/// whole pool before giving up, so a dead server only costs its connect timeout.
#[derive(Debug, Clone)]
pub struct ServerPool {
    endpoints: Vec<DirectoryEndpoint>,
    next: usize,
}

impl ServerPool {
    /// Creates a pool from already parsed endpoints.
    #[must_use]
    pub fn new(endpoints: Vec<DirectoryEndpoint>) -> Self {
        Self { endpoints, next: 0 }
    }

    /// Parses every address into an endpoint sharing `connect_timeout`.
    ///
    /// An empty list builds an empty pool; the failure surfaces on the first connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] if any address is invalid.
    pub fn from_addresses<S: AsRef<str>>(
        addresses: &[S],
        connect_timeout: Duration,
    ) -> Result<Self> {
        let endpoints = addresses
            .iter()
            .map(|address| DirectoryEndpoint::parse(address.as_ref(), connect_timeout))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(endpoints))
    }

    /// Endpoints in configured order.
    #[must_use]
    pub fn endpoints(&self) -> &[DirectoryEndpoint] {
        &self.endpoints
    }

    /// Number of endpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Returns true if no endpoint is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Endpoints in the order the next connection attempt will try them; advances the
    /// round-robin cursor.
    fn rotation(&mut self) -> Vec<DirectoryEndpoint> {
        let len = self.endpoints.len();
        let start = self.next % len.max(1);
        self.next = (start + 1) % len.max(1);
        (0..len)
            .map(|offset| self.endpoints[(start + offset) % len].clone())
            .collect()
    }

    /// Opens a connection to the first reachable endpoint.
    pub(crate) fn open(
        &mut self,
        connector: &dyn LdapConnector,
    ) -> Result<(DirectoryEndpoint, Box<dyn LdapSession>)> {
        if self.is_empty() {
            return Err(Error::ConnectionFailed(
                "no directory servers configured".to_string(),
            ));
        }

        let mut last_error = None;
        for endpoint in self.rotation() {
            match connector.connect(&endpoint) {
                Ok(session) => {
                    debug!(server = %endpoint, "selected directory server");
                    return Ok((endpoint, session));
                }
                Err(err) => {
                    warn!(server = %endpoint, error = %err, "directory server unreachable, trying next");
                    last_error = Some(err);
                }
            }
        }

        Err(Error::ConnectionFailed(format!(
            "all {} directory servers unreachable; last error: {}",
            self.len(),
            last_error.map_or_else(String::new, |err| err.to_string())
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MockLdapConnector, MockLdapSession};

    fn pool(addresses: &[&str]) -> ServerPool {
        ServerPool::from_addresses(addresses, Duration::from_secs(10)).unwrap()
    }

    fn unreachable() -> Error {
        Error::Ldap {
            code: None,
            message: "connection refused".to_string(),
        }
    }

    #[test]
    fn endpoint_parsing() {
        let timeout = Duration::from_secs(5);
        let ldaps = DirectoryEndpoint::parse("ldaps://dc1.example.com:636", timeout).unwrap();
        assert_eq!(ldaps.url().scheme(), "ldaps");
        assert_eq!(ldaps.url().port(), Some(636));
        assert_eq!(ldaps.connect_timeout(), timeout);

        let bare = DirectoryEndpoint::parse("dc2.example.com", timeout).unwrap();
        assert_eq!(bare.as_str(), "ldap://dc2.example.com");

        assert!(matches!(
            DirectoryEndpoint::parse("https://dc1.example.com", timeout),
            Err(Error::InvalidEndpoint(_))
        ));
        assert!(DirectoryEndpoint::parse("ldap://", timeout).is_err());
    }

    #[test]
    fn empty_pool_builds_but_cannot_open() {
        let mut pool = pool(&[]);
        assert!(pool.is_empty());

        let mut connector = MockLdapConnector::new();
        connector.expect_connect().never();
        let err = pool.open(&connector).err().unwrap();
        assert!(matches!(err, Error::ConnectionFailed(_)));
    }

    #[test]
    fn round_robin_advances_per_open() {
        let mut pool = pool(&["ldap://dc1", "ldap://dc2", "ldap://dc3"]);
        let first: Vec<String> = pool.rotation().iter().map(|e| e.to_string()).collect();
        let second: Vec<String> = pool.rotation().iter().map(|e| e.to_string()).collect();
        assert_eq!(first, ["ldap://dc1", "ldap://dc2", "ldap://dc3"]);
        assert_eq!(second, ["ldap://dc2", "ldap://dc3", "ldap://dc1"]);
    }

    #[test]
    fn open_fails_over_to_next_server() {
        let mut pool = pool(&["ldap://dc1", "ldap://dc2"]);
        let mut connector = MockLdapConnector::new();
        connector
            .expect_connect()
            .withf(|endpoint| endpoint.as_str() == "ldap://dc1")
            .times(1)
            .returning(|_| Err(unreachable()));
        connector
            .expect_connect()
            .withf(|endpoint| endpoint.as_str() == "ldap://dc2")
            .times(1)
            .return_once(|_| Ok(Box::new(MockLdapSession::new())));

        let (endpoint, _session) = pool.open(&connector).unwrap();
        assert_eq!(endpoint.as_str(), "ldap://dc2");
    }

    #[test]
    fn open_exhausts_every_server_before_failing() {
        let mut pool = pool(&["ldap://dc1", "ldap://dc2", "ldap://dc3"]);
        let mut connector = MockLdapConnector::new();
        connector
            .expect_connect()
            .times(3)
            .returning(|_| Err(unreachable()));

        let err = pool.open(&connector).err().unwrap();
        assert!(matches!(err, Error::ConnectionFailed(ref msg) if msg.contains("all 3")));
    }
}
