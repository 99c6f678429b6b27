//! Credential materialization for freshly created orgs.
//!
//! A missing password is a fatal provisioning failure, distinct from a
//! transient network failure: password reset against the same org is not
//! guaranteed idempotent on the remote side, so it is never retried and
//! never silently returned empty.

use tracing::info;

use crate::error::PoolError;
use crate::lifecycle::{OrgLifecycle, PasswordCredential};

/// Generates login credentials and portable auth descriptors.
pub struct CredentialProvisioner<'a> {
    lifecycle: &'a dyn OrgLifecycle,
}

impl<'a> CredentialProvisioner<'a> {
    pub fn new(lifecycle: &'a dyn OrgLifecycle) -> Self {
        Self { lifecycle }
    }

    /// Generate a login password for the org's user.
    ///
    /// Fails with [`PoolError::PasswordUnset`] when generation yields no
    /// value.
    pub async fn generate_password(&self, username: &str) -> Result<PasswordCredential, PoolError> {
        let credential = self.lifecycle.generate_password(username).await?;

        if credential.password.is_empty() {
            return Err(PoolError::PasswordUnset {
                username: username.to_string(),
            });
        }

        info!(username = %credential.username, "Password successfully set");
        Ok(credential)
    }

    /// Derive the portable auth descriptor for the org.
    pub async fn derive_auth_descriptor(&self, username: &str) -> Result<String, PoolError> {
        self.lifecycle.auth_url(username).await
    }
}
