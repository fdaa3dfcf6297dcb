//! Batch group membership changes, Active Directory style.
//!
//! With `fix` enabled each group's current `member` values are read first and only the
//! missing (add) or present (remove) member DNs are sent, so adding an existing member or
//! removing an absent one is a no-op instead of an `attributeOrValueExists` /
//! `noSuchAttribute` failure. Without `fix` the change is sent blindly.

use crate::{
    dn::DistinguishedName,
    session::{DirectoryModification, LdapSession, SearchScope},
    Result,
};
use adctl_core::{error::result_code, Error};
use std::time::Duration;
use tracing::{debug, info, warn};

const MEMBER_ATTRIBUTE: &str = "member";
const RANGE_PREFIX: &str = "member;range=";

/// Adds every member to every group.
pub(crate) fn add_members_to_groups(
    session: &mut dyn LdapSession,
    members: &[DistinguishedName],
    groups: &[DistinguishedName],
    fix: bool,
    time_limit: Duration,
) -> Result<()> {
    for group in groups {
        let pending = if fix {
            let current = current_members(session, group, time_limit)?;
            members
                .iter()
                .filter(|member| !current.iter().any(|existing| existing.same_entry(member)))
                .collect::<Vec<_>>()
        } else {
            members.iter().collect()
        };

        if pending.is_empty() {
            debug!(group = %group, "all members already present");
            continue;
        }

        info!(group = %group, count = pending.len(), "adding group members");
        session.modify(
            group.as_str(),
            &[DirectoryModification::Add {
                attribute: MEMBER_ATTRIBUTE.to_string(),
                values: pending.iter().map(|dn| dn.to_string()).collect(),
            }],
        )?;
    }
    Ok(())
}

/// Removes every member from every group.
pub(crate) fn remove_members_from_groups(
    session: &mut dyn LdapSession,
    members: &[DistinguishedName],
    groups: &[DistinguishedName],
    fix: bool,
    time_limit: Duration,
) -> Result<()> {
    for group in groups {
        // Delete the values as the directory spells them, a case-only mismatch is not
        // guaranteed to match on every server.
        let pending = if fix {
            current_members(session, group, time_limit)?
                .into_iter()
                .filter(|existing| members.iter().any(|member| member.same_entry(existing)))
                .collect::<Vec<_>>()
        } else {
            members.to_vec()
        };

        if pending.is_empty() {
            debug!(group = %group, "no members to remove");
            continue;
        }

        info!(group = %group, count = pending.len(), "removing group members");
        session.modify(
            group.as_str(),
            &[DirectoryModification::Delete {
                attribute: MEMBER_ATTRIBUTE.to_string(),
                values: pending.iter().map(ToString::to_string).collect(),
            }],
        )?;
    }
    Ok(())
}

fn current_members(
    session: &mut dyn LdapSession,
    group: &DistinguishedName,
    time_limit: Duration,
) -> Result<Vec<DistinguishedName>> {
    // Large AD groups answer with ranged attributes such as `member;range=0-1499`; keep
    // asking for `member;range=<next>-*` until the server reports the final `*` range.
    let mut requested = MEMBER_ATTRIBUTE.to_string();
    let mut start = 0u64;
    let mut values = Vec::new();
    loop {
        let entries = session.search(
            group.as_str(),
            SearchScope::Base,
            "(objectClass=*)",
            &[requested.clone()],
            time_limit,
        )?;
        let entry = entries.into_iter().next().ok_or_else(|| Error::Ldap {
            code: Some(result_code::NO_SUCH_OBJECT),
            message: format!("group {group} not found"),
        })?;

        let mut next = None;
        for (name, found) in entry.attributes {
            let name = name.to_ascii_lowercase();
            if name == MEMBER_ATTRIBUTE {
                values.extend(found);
            } else if let Some(range) = name.strip_prefix(RANGE_PREFIX) {
                next = next_range_start(range);
                values.extend(found);
            }
        }

        match next {
            Some(next) if next > start => {
                debug!(group = %group, next, "reading next member range");
                start = next;
                requested = format!("{RANGE_PREFIX}{next}-*");
            }
            Some(next) => {
                warn!(group = %group, next, "member range did not advance, stopping");
                break;
            }
            None => break,
        }
    }

    let members = values
        .iter()
        .filter_map(|value| match DistinguishedName::parse(value) {
            Ok(dn) => Some(dn),
            Err(err) => {
                warn!("Failed to parse member DN `{value}`: {err}");
                None
            }
        })
        .collect();
    Ok(members)
}

/// First index after a `<low>-<high>` range, `None` once `high` is `*`.
fn next_range_start(range: &str) -> Option<u64> {
    let (_, high) = range.split_once('-')?;
    if high == "*" {
        return None;
    }
    match high.parse::<u64>() {
        Ok(high) => high.checked_add(1),
        Err(err) => {
            warn!("Unexpected member range `{range}`: {err}");
            None
        }
    }
}
