//! Email hand-off of fetched scratch orgs.
//!
//! Sends the org's coordinates to a recipient through the platform's
//! standard send-email action. Re-issuing the action is acceptable, so the
//! call runs at the slow tier.

use tracing::info;

use sfpool_retry::{self as retry, Attempt, RetryPolicy, SLOW_TIER};

use crate::error::PoolError;
use crate::hub::{EmailInput, HubClient};
use crate::model::ScratchOrg;

/// Email a fetched org's login coordinates to a recipient.
pub async fn share_scratch_org(
    hub: &HubClient,
    recipient: &str,
    org: &ScratchOrg,
) -> Result<(), PoolError> {
    share_scratch_org_with_tier(hub, recipient, org, SLOW_TIER).await
}

/// As [`share_scratch_org`], with an explicit retry tier.
pub async fn share_scratch_org_with_tier(
    hub: &HubClient,
    recipient: &str,
    org: &ScratchOrg,
    tier: RetryPolicy,
) -> Result<(), PoolError> {
    let hub_username = hub.username();
    let input = EmailInput {
        email_body: format!(
            "{hub_username} has fetched a new scratch org from the scratch org pool!\n\
             All the post scratch org scripts have been successfully completed in this org!\n\
             The login url for this org is: {}\n\
             Username: {}\n\
             Password: {}\n\
             Please use sfdx force:auth:web:login -r {} -a <alias> to authenticate against \
             this scratch org.",
            org.login_url.as_deref().unwrap_or(""),
            org.username,
            org.password.as_deref().unwrap_or(""),
            org.login_url.as_deref().unwrap_or(""),
        ),
        email_addresses: recipient.to_string(),
        email_subject: format!("{hub_username} created you a new Salesforce org"),
        sender_type: "CurrentUser".to_string(),
    };

    let input_ref = &input;
    retry::run(&tier, |_| async move {
        match hub.send_email(input_ref).await {
            Ok(()) => Attempt::Done(()),
            Err(e) if e.is_transient() => Attempt::Retry(e),
            Err(e) => Attempt::Bail(e),
        }
    })
    .await
    .map_err(PoolError::from)?;

    info!(recipient = %recipient, username = %org.username, "Scratch org shared via email");
    Ok(())
}
