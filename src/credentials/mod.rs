//! Registry credential management
//!
//! This module handles:
//! - The on-disk auth file shape (`{"auths": {registry: {"auth": ...}}}`)
//! - Validating and merging request credentials into it
//! - Serialised, atomic rewrites of the file before each command runs

mod auths;
mod store;

#[cfg(test)]
pub use auths::encode_basic_auth;
pub use store::{default_auth_file, CredentialStore};
