//! Multi-step provisioning of new scratch orgs.
//!
//! Each step is a distinct failure domain: remote creation, login-URL
//! lookup, credential materialization, assembly. Creation itself is never
//! retried (a duplicate org would result); the login-URL query is, because
//! freshly created records lag behind in the tracking object. A creation
//! failure propagates unmodified so the pool-fill orchestration can decide
//! whether to keep filling or abort, and an org whose password cannot be
//! set is never returned as successful.

use std::path::PathBuf;

use tracing::{debug, info};

use sfpool_retry::{self as retry, Attempt, RetryPolicy, QUERY_TIER};

use crate::capability::TRACKING_OBJECT;
use crate::credentials::CredentialProvisioner;
use crate::error::PoolError;
use crate::hub::{HubClient, QueryResult};
use crate::lifecycle::OrgLifecycle;
use crate::model::{LoginUrlRow, ScratchOrg};

/// One org-creation request within a pool-fill run.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    /// Local sequence number; the org alias is `SO{sequence_id}`, keeping
    /// concurrent fill tasks distinguishable in logs within a run.
    pub sequence_id: u32,

    /// Admin email recorded on the signup, when given.
    pub admin_email: Option<String>,

    /// Org definition file handed to the creation command.
    pub definition_file: PathBuf,

    /// Days until the org expires.
    pub expiry_days: u32,
}

/// Drives creation of new scratch orgs.
pub struct OrgProvisioner<'a> {
    hub: &'a HubClient,
    lifecycle: &'a dyn OrgLifecycle,
    query_tier: RetryPolicy,
}

impl<'a> OrgProvisioner<'a> {
    pub fn new(hub: &'a HubClient, lifecycle: &'a dyn OrgLifecycle) -> Self {
        Self {
            hub,
            lifecycle,
            query_tier: QUERY_TIER,
        }
    }

    /// Override the login-URL query retry tier (tests use zero delay).
    pub fn with_query_tier(mut self, tier: RetryPolicy) -> Self {
        self.query_tier = tier;
        self
    }

    /// Create one scratch org and materialize its credentials.
    pub async fn create(&self, request: &ProvisionRequest) -> Result<ScratchOrg, PoolError> {
        let alias = format!("SO{}", request.sequence_id);
        debug!(
            alias = %alias,
            definition_file = %request.definition_file.display(),
            expiry_days = request.expiry_days,
            "Creating scratch org"
        );

        // Failure here belongs to the pool-fill orchestration; propagate as-is.
        let created = self
            .lifecycle
            .create_org(
                &alias,
                &request.definition_file,
                request.expiry_days,
                request.admin_email.as_deref(),
                self.hub.username(),
            )
            .await?;

        let login_url = self.fetch_login_url(&created.username).await?;

        let credentials = CredentialProvisioner::new(self.lifecycle);
        let password = credentials.generate_password(&created.username).await?;
        let sfdx_auth_url = credentials.derive_auth_descriptor(&created.username).await?;

        info!(
            alias = %alias,
            username = %created.username,
            org_id = %created.org_id,
            "Scratch org provisioned"
        );

        Ok(ScratchOrg {
            org_id: created.org_id,
            username: created.username,
            alias: Some(alias),
            signup_email: request.admin_email.clone(),
            login_url: Some(login_url),
            password: Some(password.password),
            sfdx_auth_url: Some(sfdx_auth_url),
            record_id: None,
            status: None,
            tag: None,
            expiry_date: None,
            failure_message: None,
        })
    }

    /// Fetch the org's login URL by signup username.
    ///
    /// Retried: the tracking record for a just-created org may not be
    /// queryable yet.
    async fn fetch_login_url(&self, username: &str) -> Result<String, PoolError> {
        let soql = format!(
            "SELECT Id, SignupUsername, LoginUrl FROM {TRACKING_OBJECT} \
             WHERE SignupUsername = '{username}'"
        );

        retry::run(&self.query_tier, |_| {
            let soql = soql.clone();
            async move {
                let result: Result<QueryResult<LoginUrlRow>, PoolError> =
                    self.hub.query(&soql).await;
                match result {
                    Ok(result) => match result.records.into_iter().next() {
                        Some(row) => Attempt::Done(row.login_url),
                        None => Attempt::Retry(PoolError::EmptyResult(soql)),
                    },
                    Err(e) if e.is_transient() => Attempt::Retry(e),
                    Err(e) => Attempt::Bail(e),
                }
            }
        })
        .await
        .map_err(PoolError::from)
    }
}
