//! Directory client adapter
//!
//! Wraps the `ldap3` client behind the [`DirectoryService`] trait. Every
//! operation opens its own connection and releases it before returning; the
//! directory enforces connection limits, so a leaked connection is a
//! correctness bug and not just a resource leak.

mod client;

pub use client::LdapDirectory;

use async_trait::async_trait;
use rekrut_core::types::DirectoryProfile;
use rekrut_core::Result;

/// The seam between the authenticator and the directory server.
///
/// Implemented by [`LdapDirectory`] in production and by in-memory fakes in
/// tests.
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Search for the entry matching `email` using the configured service
    /// credential (never the end-user's). `Error::NotFound` when no entry
    /// matches, `Error::DirectoryUnavailable` on transport failure.
    async fn find_identifier_by_email(&self, email: &str) -> Result<String>;

    /// Bind AS the end-user. The outcome of this bind is the sole source of
    /// truth for password correctness. Wrong password is `Ok(false)`, never
    /// an error; only transport failures error.
    async fn verify_credential(&self, identifier: &str, secret: &str) -> Result<bool>;

    /// Read the full profile, including group memberships, with the service
    /// credential. `Error::NotFound` if the entry disappeared between calls.
    async fn fetch_profile(&self, identifier: &str) -> Result<DirectoryProfile>;

    /// Whether the entry's group memberships contain `group` under the
    /// configured match policy.
    async fn is_group_member(&self, identifier: &str, group: &str) -> Result<bool>;

    /// Short-timeout connectivity probe. Diagnostic only, never an
    /// authorization gate, and never errors.
    async fn is_service_reachable(&self) -> bool;
}
