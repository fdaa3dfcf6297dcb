//! Directory mutation client.

use crate::{
    config::DirectoryConfig,
    dn::DistinguishedName,
    guard::tolerate_existing,
    membership,
    pool::{DirectoryEndpoint, ServerPool},
    session::{
        DirectoryModification, Ldap3Connector, LdapConnector, LdapEntry, LdapSession, SearchScope,
    },
    Result,
};
use adctl_core::Error;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, error, info};
use validator::Validate;

/// `groupType` of a global security group (`ADS_GROUP_TYPE_GLOBAL_GROUP | SECURITY_ENABLED`).
const SECURITY_GROUP_TYPE: &str = "-2147483640";

/// Client holding one bound, synchronous directory session.
///
/// The session is established by [`DirectoryClient::connect`] and lives until
/// [`DirectoryClient::close`] or drop. Every mutation is idempotent: creating something that
/// already exists, or adding a member that is already present, succeeds with a warning.
pub struct DirectoryClient {
    config: DirectoryConfig,
    pool: ServerPool,
    active: Option<DirectoryEndpoint>,
    session: Option<Box<dyn LdapSession>>,
}

impl DirectoryClient {
    /// Connects to the first reachable server of the pool and binds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionFailed`] if no endpoint is configured or none is reachable,
    /// [`Error::InvalidEndpoint`] for a malformed address and [`Error::BindFailed`] if the
    /// directory rejects the credentials.
    pub fn connect(config: DirectoryConfig) -> Result<Self> {
        let connector = Ldap3Connector::from_config(&config);
        Self::connect_with(config, &connector)
    }

    pub(crate) fn connect_with(
        config: DirectoryConfig,
        connector: &dyn LdapConnector,
    ) -> Result<Self> {
        config.validate()?;
        let mut pool = ServerPool::from_addresses(config.urls(), config.connect_timeout())?;
        let (endpoint, mut session) = pool.open(connector)?;

        let credentials = config.credentials();
        if let Err(err) = session.simple_bind(credentials.username(), credentials.password()) {
            if let Err(unbind_err) = session.unbind() {
                debug!(server = %endpoint, error = %unbind_err, "unbind after failed bind");
            }
            return Err(Error::BindFailed {
                source: Box::new(err),
            });
        }

        info!(server = %endpoint, user = credentials.username(), "bound to directory");
        Ok(Self {
            config,
            pool,
            active: Some(endpoint),
            session: Some(session),
        })
    }

    /// Replaces attributes of an entry, one value per attribute.
    ///
    /// An empty change set sends nothing. Returns `true` once the directory accepted the
    /// change or already held it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] for a malformed DN or any directory failure other
    /// than "already exists", and [`Error::ConnectionFailed`] after [`DirectoryClient::close`].
    pub fn modify<I, K, V>(&mut self, dn: &str, changes: I) -> Result<bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let modifications = changes
            .into_iter()
            .map(|(attribute, value)| DirectoryModification::replace(attribute, value))
            .collect::<Vec<_>>();
        let session = self.session_mut()?;
        if modifications.is_empty() {
            debug!(dn, "empty change set, nothing to modify");
            return Ok(true);
        }

        info!(dn, count = modifications.len(), "modifying entry");
        tolerate_existing("modify", dn, || {
            let target = DistinguishedName::parse(dn)?;
            session.modify(target.as_str(), &modifications)
        })?;
        Ok(true)
    }

    /// Runs a subtree search below the search base and returns the first match's attributes.
    ///
    /// # Errors
    ///
    /// See [`DirectoryClient::find_entry`].
    pub fn search(
        &mut self,
        filter: &str,
        attributes: &[&str],
    ) -> Result<Option<HashMap<String, Vec<String>>>> {
        Ok(self
            .find_entry(filter, attributes)?
            .map(|entry| entry.attributes))
    }

    /// Runs a subtree search below the search base and returns the first matching entry.
    ///
    /// No match is `Ok(None)`, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] when the directory rejects the search and
    /// [`Error::ConnectionFailed`] after [`DirectoryClient::close`].
    pub fn find_entry(&mut self, filter: &str, attributes: &[&str]) -> Result<Option<LdapEntry>> {
        let base = self.config.search_base().to_string();
        let time_limit = self.config.time_limit();
        let attributes = attributes
            .iter()
            .map(|attribute| (*attribute).to_string())
            .collect::<Vec<_>>();

        let entries = self
            .session_mut()?
            .search(&base, SearchScope::Subtree, filter, &attributes, time_limit)
            .map_err(|err| Error::operation("search", err))?;
        debug!(filter, count = entries.len(), "search returned");

        Ok(entries.into_iter().next())
    }

    /// Creates the organizational unit `name` under the OU base and returns its DN.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] for any failure other than "already exists".
    pub fn create_ou(&mut self, name: &str) -> Result<String> {
        let dn = self.config.ou_dn(name);
        let session = self.session_mut()?;

        info!(dn = %dn, "creating organizational unit");
        tolerate_existing("create_ou", dn.as_str(), || {
            session.add(
                dn.as_str(),
                &[attribute("objectClass", &["top", "organizationalUnit"])],
            )
        })?;
        Ok(dn.to_string())
    }

    /// DN the organizational unit `name` has under the OU base. Never touches the network.
    #[must_use]
    pub fn get_ou(&self, name: &str) -> String {
        self.config.ou_dn(name).to_string()
    }

    /// Creates the global security group `name` inside `parent` and returns its DN.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] for a malformed parent DN or any failure other than
    /// "already exists".
    pub fn create_group(&mut self, name: &str, parent: &str) -> Result<String> {
        let parent = DistinguishedName::parse(parent)
            .map_err(|err| Error::operation("create_group", err.into()))?;
        let dn = parent.child("CN", name);
        let session = self.session_mut()?;

        info!(dn = %dn, "creating security group");
        tolerate_existing("create_group", dn.as_str(), || {
            session.add(
                dn.as_str(),
                &[
                    attribute("objectClass", &["top", "group"]),
                    attribute("cn", &[name]),
                    attribute("groupType", &[SECURITY_GROUP_TYPE]),
                    attribute("sAMAccountName", &[name]),
                ],
            )
        })?;
        Ok(dn.to_string())
    }

    /// Adds the user to the group unless it already is a member.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] for malformed DNs, a missing group or any other
    /// directory failure.
    pub fn user_group_add(&mut self, user: &str, group: &str) -> Result<()> {
        let time_limit = self.config.time_limit();
        let session = self.session_mut()?;

        info!(user, group, "adding user to group");
        tolerate_existing("user_group_add", group, || {
            let (user, group) = (DistinguishedName::parse(user)?, DistinguishedName::parse(group)?);
            membership::add_members_to_groups(session, &[user], &[group], true, time_limit)
        })?;
        Ok(())
    }

    /// Removes the user from the group; a user that is not a member is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] for malformed DNs, a missing group or any other
    /// directory failure.
    pub fn user_group_remove(&mut self, user: &str, group: &str) -> Result<()> {
        let time_limit = self.config.time_limit();
        let session = self.session_mut()?;

        info!(user, group, "removing user from group");
        tolerate_existing("user_group_remove", group, || {
            let (user, group) = (DistinguishedName::parse(user)?, DistinguishedName::parse(group)?);
            membership::remove_members_from_groups(session, &[user], &[group], true, time_limit)
        })?;
        Ok(())
    }

    /// Unbinds the session. Failures are logged, never returned; calling it twice is a no-op.
    pub fn close(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let server = self.active.take();

        debug!(server = ?server.as_ref().map(DirectoryEndpoint::as_str), "unbinding directory session");
        if let Err(err) = session.unbind() {
            error!(error = %err, "failed to unbind directory session");
        }
    }

    /// Returns true until [`DirectoryClient::close`] is called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Server the session is bound to, if still open.
    #[must_use]
    pub fn active_endpoint(&self) -> Option<&DirectoryEndpoint> {
        self.active.as_ref()
    }

    /// Server pool the client was built from.
    #[must_use]
    pub fn pool(&self) -> &ServerPool {
        &self.pool
    }

    /// Configuration the client was built from.
    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    fn session_mut(&mut self) -> Result<&mut (dyn LdapSession + 'static)> {
        self.session
            .as_deref_mut()
            .ok_or_else(|| Error::ConnectionFailed("session closed".to_string()))
    }
}

impl Drop for DirectoryClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for DirectoryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryClient")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .field("active", &self.active)
            .field("open", &self.is_open())
            .finish()
    }
}

fn attribute(name: &str, values: &[&str]) -> (String, Vec<String>) {
    (
        name.to_string(),
        values.iter().map(|value| (*value).to_string()).collect(),
    )
}
