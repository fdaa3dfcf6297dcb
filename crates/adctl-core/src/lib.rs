//! # adctl-core
//!
//! Core types shared by the adctl directory client crates.
//!
//! ## Modules
//!
//! - [`error`] - The normalized error type and LDAP result-code classification
//! - [`credentials`] - Bind credentials with a redacted password

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod credentials;
pub mod error;

// Re-export commonly used types
pub use credentials::BindCredentials;
pub use error::{Error, Result};
