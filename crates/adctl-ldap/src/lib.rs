//! Idempotent LDAP / Active Directory mutation client.
//!
//! [`DirectoryClient`] binds once over a round-robin pool of directory servers and exposes
//! the structural mutations an account-provisioning workflow needs: create organizational
//! units and security groups, change attributes, and manage group membership. Mutations are
//! wrapped by [`tolerate_existing`], so repeating one against a directory that is already in
//! the desired state succeeds.

#![deny(missing_docs)]

mod client;
mod config;
mod dn;
mod guard;
mod membership;
mod pool;
mod session;

pub use client::DirectoryClient;
pub use config::{
    env, parse_url_list, DirectoryConfig, DEFAULT_CONNECT_TIMEOUT_SECS,
    DEFAULT_RECEIVE_TIMEOUT_SECS, DEFAULT_TIME_LIMIT_SECS,
};
pub use dn::{AttributeValue, DistinguishedName, DistinguishedNameError, RelativeDistinguishedName};
pub use guard::tolerate_existing;
pub use pool::{DirectoryEndpoint, ServerPool};
pub use session::{DirectoryModification, LdapEntry, SearchScope};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = adctl_core::Result<T>;
