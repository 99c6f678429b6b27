//! Org-lifecycle collaborator boundary.
//!
//! Remote org creation, password generation, and auth-descriptor derivation
//! are opaque platform operations; this subsystem only consumes their
//! results. [`OrgLifecycle`] is the seam, with [`SfdxCli`] as the
//! production implementation shelling out to the platform CLI, and test
//! doubles standing in elsewhere.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::error::PoolError;

/// Result of remote org creation.
#[derive(Debug, Clone)]
pub struct CreatedOrg {
    /// 18-character org identifier as returned by the platform.
    pub org_id: String,

    /// Platform-assigned username.
    pub username: String,
}

/// Result of remote password generation.
#[derive(Debug, Clone)]
pub struct PasswordCredential {
    pub username: String,

    /// May be empty when the remote operation yields no value; callers must
    /// treat that as a fatal provisioning failure.
    pub password: String,
}

/// Black-box remote lifecycle operations for scratch orgs.
#[async_trait]
pub trait OrgLifecycle: Send + Sync {
    /// Create a new scratch org under the hub identity.
    ///
    /// Never wrapped in retry: re-issuing would create a duplicate
    /// environment.
    async fn create_org(
        &self,
        alias: &str,
        definition_file: &Path,
        expiry_days: u32,
        admin_email: Option<&str>,
        hub_username: &str,
    ) -> Result<CreatedOrg, PoolError>;

    /// Generate a login password for an org's user.
    async fn generate_password(&self, username: &str) -> Result<PasswordCredential, PoolError>;

    /// Derive the portable auth descriptor for an org.
    async fn auth_url(&self, username: &str) -> Result<String, PoolError>;
}

/// [`OrgLifecycle`] backed by the `sfdx` CLI with `--json` output.
#[derive(Debug, Clone)]
pub struct SfdxCli {
    binary: PathBuf,
}

impl Default for SfdxCli {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("sfdx"),
        }
    }
}

impl SfdxCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific CLI binary path.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run_json<T: serde::de::DeserializeOwned>(
        &self,
        args: &[&str],
    ) -> Result<T, PoolError> {
        debug!(binary = %self.binary.display(), ?args, "Invoking platform CLI");

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| PoolError::Command {
                command: format!("{} {}", self.binary.display(), args.join(" ")),
                stderr: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(PoolError::Command {
                command: format!("{} {}", self.binary.display(), args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        trace!(stdout = %stdout, "CLI output");

        let envelope: CliEnvelope<T> = serde_json::from_str(&stdout)?;
        Ok(envelope.result)
    }
}

#[async_trait]
impl OrgLifecycle for SfdxCli {
    async fn create_org(
        &self,
        alias: &str,
        definition_file: &Path,
        expiry_days: u32,
        admin_email: Option<&str>,
        hub_username: &str,
    ) -> Result<CreatedOrg, PoolError> {
        let definition = definition_file.display().to_string();
        let expiry = expiry_days.to_string();
        let email_arg = admin_email.map(|email| format!("adminEmail={email}"));

        let mut args = vec![
            "force:org:create",
            "-f",
            definition.as_str(),
            "-d",
            expiry.as_str(),
            "-a",
            alias,
            "-v",
            hub_username,
            "--json",
        ];
        if let Some(email_arg) = email_arg.as_deref() {
            args.push(email_arg);
        }

        let created: CreateOrgResult = self.run_json(&args).await?;
        Ok(CreatedOrg {
            org_id: created.org_id,
            username: created.username,
        })
    }

    async fn generate_password(&self, username: &str) -> Result<PasswordCredential, PoolError> {
        let result: PasswordGenerateResult = self
            .run_json(&["force:user:password:generate", "-u", username, "--json"])
            .await?;

        Ok(PasswordCredential {
            username: result.username.unwrap_or_else(|| username.to_string()),
            password: result.password.unwrap_or_default(),
        })
    }

    async fn auth_url(&self, username: &str) -> Result<String, PoolError> {
        let result: OrgDisplayResult = self
            .run_json(&["force:org:display", "-u", username, "--verbose", "--json"])
            .await?;

        Ok(result.sfdx_auth_url)
    }
}

/// `--json` output envelope of the platform CLI.
#[derive(Debug, Deserialize)]
struct CliEnvelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct CreateOrgResult {
    #[serde(rename = "orgId")]
    org_id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct PasswordGenerateResult {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrgDisplayResult {
    #[serde(rename = "sfdxAuthUrl")]
    sfdx_auth_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_org_envelope_parses() {
        let json = r#"{"status": 0, "result": {"orgId": "00D5g0000012abcEAA", "username": "test-x1@example.com"}}"#;
        let envelope: CliEnvelope<CreateOrgResult> = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.result.org_id, "00D5g0000012abcEAA");
        assert_eq!(envelope.result.username, "test-x1@example.com");
    }

    #[test]
    fn password_result_tolerates_missing_value() {
        let json = r#"{"status": 0, "result": {"username": "test-x1@example.com"}}"#;
        let envelope: CliEnvelope<PasswordGenerateResult> = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.result.password, None);
    }
}
