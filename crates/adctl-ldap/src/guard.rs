//! Idempotency guard for mutating directory calls.
//!
//! Creating an entry that already exists is an error at the protocol level, but callers
//! mean "make sure this exists". [`tolerate_existing`] runs a mutation and turns
//! already-exists outcomes into success; see [`Error::already_exists`] for the
//! classification rules.

use crate::Result;
use adctl_core::Error;
use tracing::warn;

/// Runs `op`, treating "already exists" failures as success.
///
/// Returns `Ok(Some(value))` when the operation succeeded and `Ok(None)` when the directory
/// already held the target. Every other failure is wrapped in
/// [`Error::OperationFailed`] named after `operation`, with the original error as its source.
///
/// # Errors
///
/// Any failure of `op` that does not mean the target already exists.
pub fn tolerate_existing<T, F>(operation: &str, target: &str, op: F) -> Result<Option<T>>
where
    F: FnOnce() -> Result<T>,
{
    match op() {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.already_exists() => {
            warn!(
                operation,
                target,
                code = ?err.result_code(),
                error = %err,
                "target already exists, treating as success"
            );
            Ok(None)
        }
        Err(err) => Err(Error::operation(operation, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adctl_core::error::result_code;

    fn ldap(code: Option<u32>, message: &str) -> Error {
        Error::Ldap {
            code,
            message: message.to_string(),
        }
    }

    #[test]
    fn success_passes_value_through() {
        let result = tolerate_existing("create_ou", "OU=x", || Ok(7)).unwrap();
        assert_eq!(result, Some(7));
    }

    #[test]
    fn entry_already_exists_is_suppressed() {
        let result: Option<()> = tolerate_existing("create_ou", "OU=x", || {
            Err(ldap(Some(result_code::ENTRY_ALREADY_EXISTS), "entryAlreadyExists"))
        })
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn message_fallback_without_result_code() {
        let result: Option<()> = tolerate_existing("create_group", "CN=g", || {
            Err(ldap(None, "LDAPEntryAlreadyExistsResult"))
        })
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn permission_denied_is_never_swallowed() {
        let err = tolerate_existing::<(), _>("create_ou", "OU=x", || {
            Err(ldap(
                Some(result_code::INSUFFICIENT_ACCESS_RIGHTS),
                "insufficientAccessRights",
            ))
        })
        .unwrap_err();

        match err {
            Error::OperationFailed { operation, source } => {
                assert_eq!(operation, "create_ou");
                assert_eq!(
                    source.result_code(),
                    Some(result_code::INSUFFICIENT_ACCESS_RIGHTS)
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_protocol_failures_are_wrapped() {
        let err = tolerate_existing::<(), _>("user_group_add", "CN=g", || {
            Err(Error::InvalidDn("not a dn".to_string()))
        })
        .unwrap_err();
        assert_eq!(err.error_code(), "OPERATION_FAILED");
        assert!(err.to_string().contains("not a dn"));
    }
}
