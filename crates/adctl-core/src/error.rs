//! Error types for directory operations.
//!
//! Every failure surfaced by the client is an [`Error`]. Protocol failures keep the LDAP
//! result code when the server returned one, which is what the idempotency classification in
//! [`Error::already_exists`] relies on.

use thiserror::Error;

/// LDAP result codes (RFC 4511 §4.1.9) the client reasons about.
pub mod result_code {
    /// `noSuchAttribute`
    pub const NO_SUCH_ATTRIBUTE: u32 = 16;
    /// `attributeOrValueExists`
    pub const ATTRIBUTE_OR_VALUE_EXISTS: u32 = 20;
    /// `noSuchObject`
    pub const NO_SUCH_OBJECT: u32 = 32;
    /// `invalidDNSyntax`
    pub const INVALID_DN_SYNTAX: u32 = 34;
    /// `invalidCredentials`
    pub const INVALID_CREDENTIALS: u32 = 49;
    /// `insufficientAccessRights`
    pub const INSUFFICIENT_ACCESS_RIGHTS: u32 = 50;
    /// `entryAlreadyExists`
    pub const ENTRY_ALREADY_EXISTS: u32 = 68;
}

/// Main error type for directory operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid directory endpoint address
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Malformed distinguished name
    #[error("Invalid distinguished name: {0}")]
    InvalidDn(String),

    /// No directory server could be reached, or the session is gone
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication against the directory failed
    #[error("Bind failed: {source}")]
    BindFailed {
        /// Underlying protocol failure
        source: Box<Error>,
    },

    /// Raw failure reported by the LDAP layer
    #[error("LDAP error: {message}")]
    Ldap {
        /// Result code returned by the server, if the failure carried one
        code: Option<u32>,
        /// Error message
        message: String,
    },

    /// Operation timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A directory operation failed
    #[error("{operation} failed: {source}")]
    OperationFailed {
        /// Name of the client operation
        operation: String,
        /// Underlying failure
        source: Box<Error>,
    },
}

/// Specialized result type for directory operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wraps a failure as the normalized error of the named operation.
    #[must_use]
    pub fn operation(operation: impl Into<String>, source: Error) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::InvalidEndpoint(_) => "INVALID_ENDPOINT",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::InvalidDn(_) => "INVALID_DN",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::BindFailed { .. } => "BIND_FAILED",
            Self::Ldap { .. } => "LDAP_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::OperationFailed { .. } => "OPERATION_FAILED",
        }
    }

    /// Returns the LDAP result code carried by this error or the failure it wraps.
    #[must_use]
    pub fn result_code(&self) -> Option<u32> {
        match self {
            Self::Ldap { code, .. } => *code,
            Self::BindFailed { source } | Self::OperationFailed { source, .. } => {
                source.result_code()
            }
            _ => None,
        }
    }

    /// Returns true if the failure means the target is already in the desired state.
    ///
    /// A structured result code always wins: only `entryAlreadyExists` and
    /// `attributeOrValueExists` count. The message text is consulted only when the server
    /// returned no result code at all.
    #[must_use]
    pub fn already_exists(&self) -> bool {
        match self {
            Self::Ldap {
                code: Some(code), ..
            } => matches!(
                *code,
                result_code::ENTRY_ALREADY_EXISTS | result_code::ATTRIBUTE_OR_VALUE_EXISTS
            ),
            Self::Ldap {
                code: None,
                message,
            } => mentions_existing(message),
            Self::OperationFailed { source, .. } => source.already_exists(),
            _ => false,
        }
    }

    /// Returns true if this error points at the environment rather than the request and
    /// should be logged at error level.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::ConfigError(_)
                | Self::ConnectionFailed(_)
                | Self::BindFailed { .. }
                | Self::Timeout(_)
        )
    }
}

fn mentions_existing(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    lowered.contains("alreadyexists") || lowered.contains("already exists")
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidEndpoint(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ValidationError(err.to_string())
    }
}
