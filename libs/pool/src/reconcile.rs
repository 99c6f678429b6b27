//! Allocation-state reconciliation between local orgs and tracking records.
//!
//! Three responsibilities:
//!
//! - **Record-id resolution**: orgs fetched or created locally only carry
//!   the remote org id; the tracking-record id is resolved in a batch, and
//!   every input must resolve or the whole batch fails (no partial silent
//!   success).
//! - **State writes**: allocation-status transitions are written per record;
//!   an individual failure is logged and reported as `false` so a bulk pass
//!   can continue and summarize, rather than aborting on the first loss.
//! - **Deletion**: reclaimed and expired active-org records are removed as a
//!   whole batch.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use sfpool_retry::{self as retry, Attempt, RetryPolicy, QUERY_TIER};

use crate::capability::{AUTH_URL_FIELD, CapabilitySet, TRACKING_OBJECT};
use crate::error::PoolError;
use crate::hub::{HubClient, QueryResult};
use crate::model::{lookup_key, AllocationStatus, RecordIdRow, ScratchOrg};

/// Mutable tracking-record fields written on allocation transitions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AllocationUpdate {
    /// Tracking-record id being updated (path parameter, not payload).
    #[serde(skip)]
    pub record_id: String,

    #[serde(rename = "Allocation_status__c", skip_serializing_if = "Option::is_none")]
    pub allocation_status: Option<AllocationStatus>,

    #[serde(rename = "Password__c", skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(rename = "SfdxAuthUrl__c", skip_serializing_if = "Option::is_none")]
    pub sfdx_auth_url: Option<String>,
}

/// Persists allocation-state transitions and reconciles identifiers.
pub struct AllocationReconciler<'a> {
    hub: &'a HubClient,
    capabilities: CapabilitySet,
    query_tier: RetryPolicy,
}

impl<'a> AllocationReconciler<'a> {
    pub fn new(hub: &'a HubClient, capabilities: CapabilitySet) -> Self {
        Self {
            hub,
            capabilities,
            query_tier: QUERY_TIER,
        }
    }

    /// Override the retry tier (tests use a zero-delay policy).
    pub fn with_query_tier(mut self, tier: RetryPolicy) -> Self {
        self.query_tier = tier;
        self
    }

    /// Resolve tracking-record ids for a batch of orgs, in place.
    ///
    /// Org ids are normalized to their 15-character lookup form first. A
    /// missing tracking record is treated as consistency lag and retries the
    /// whole batch; once the budget is spent the batch fails rather than
    /// returning a partial result.
    pub async fn resolve_record_ids(&self, orgs: &mut [ScratchOrg]) -> Result<(), PoolError> {
        if orgs.is_empty() {
            return Ok(());
        }

        for org in orgs.iter_mut() {
            org.org_id = lookup_key(&org.org_id).to_string();
        }

        let keys: Vec<String> = orgs.iter().map(|org| org.org_id.clone()).collect();
        let quoted = keys
            .iter()
            .map(|key| format!("'{key}'"))
            .collect::<Vec<_>>()
            .join(",");
        let soql = format!(
            "SELECT Id, ScratchOrg FROM {TRACKING_OBJECT} WHERE ScratchOrg IN ({quoted})"
        );

        let keys_ref = &keys;
        let by_org_id: HashMap<String, String> = retry::run(&self.query_tier, |_| {
            let soql = soql.clone();
            async move {
                let result: Result<QueryResult<RecordIdRow>, PoolError> =
                    self.hub.query(&soql).await;
                match result {
                    Ok(result) => {
                        let map: HashMap<String, String> = result
                            .records
                            .into_iter()
                            .map(|row| (row.scratch_org, row.id))
                            .collect();

                        match keys_ref.iter().find(|key| !map.contains_key(*key)) {
                            Some(missing) => Attempt::Retry(PoolError::TrackingRecordNotFound {
                                org_id: missing.clone(),
                            }),
                            None => Attempt::Done(map),
                        }
                    }
                    Err(e) if e.is_transient() => Attempt::Retry(e),
                    Err(e) => Attempt::Bail(e),
                }
            }
        })
        .await
        .map_err(PoolError::from)?;

        for org in orgs.iter_mut() {
            org.record_id = by_org_id.get(&org.org_id).cloned();
        }

        debug!(count = orgs.len(), "Resolved tracking record ids");
        Ok(())
    }

    /// Write allocation-state fields to one tracking record.
    ///
    /// Failures are caught and reported as `false` so bulk reconciliation
    /// can continue past individual records; they are never silently
    /// dropped.
    pub async fn write_allocation_state(&self, update: &AllocationUpdate) -> bool {
        let body = allocation_payload(update, &self.capabilities);
        trace!(record_id = %update.record_id, body = %body, "Setting allocation state");

        match self
            .hub
            .update_record(TRACKING_OBJECT, &update.record_id, &body)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    record_id = %update.record_id,
                    error = %e,
                    "Failed to set allocation state"
                );
                false
            }
        }
    }

    /// Bulk-delete reclaimed or expired active-org records.
    ///
    /// Retried as a whole batch; there is no per-id retry here.
    pub async fn delete_active(&self, active_record_ids: &[String]) -> Result<(), PoolError> {
        if active_record_ids.is_empty() {
            return Ok(());
        }

        retry::run(&self.query_tier, |_| async move {
            match self.hub.delete_records(active_record_ids).await {
                Ok(()) => Attempt::Done(()),
                Err(e) if e.is_transient() => Attempt::Retry(e),
                Err(e) => Attempt::Bail(e),
            }
        })
        .await
        .map_err(PoolError::from)
    }

    /// Resolve the active-org view record id for one scratch org.
    pub async fn active_record_id_for_org(&self, org_id: &str) -> Result<String, PoolError> {
        let key = lookup_key(org_id);
        let soql = format!("SELECT Id FROM ActiveScratchOrg WHERE ScratchOrg = '{key}'");

        retry::run(&self.query_tier, |_| {
            let soql = soql.clone();
            async move {
                let result: Result<QueryResult<IdRow>, PoolError> = self.hub.query(&soql).await;
                match result {
                    Ok(result) => match result.records.into_iter().next() {
                        Some(row) => Attempt::Done(row.id),
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

/// Build the update payload, stripping the auth-descriptor field when the
/// hub schema does not carry it (an unknown field hard-fails the write).
pub fn allocation_payload(
    update: &AllocationUpdate,
    capabilities: &CapabilitySet,
) -> serde_json::Value {
    let mut body = serde_json::to_value(update).unwrap_or_else(|_| serde_json::json!({}));

    if !capabilities.auth_url_field_exists {
        if let Some(map) = body.as_object_mut() {
            if map.remove(AUTH_URL_FIELD).is_some() {
                trace!("Removed auth descriptor from payload; {AUTH_URL_FIELD} not found on hub");
            }
        }
    }

    body
}

#[derive(Debug, Deserialize)]
struct IdRow {
    #[serde(rename = "Id")]
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_update() -> AllocationUpdate {
        AllocationUpdate {
            record_id: "a005g000001abcdAAA".to_string(),
            allocation_status: Some(AllocationStatus::Assigned),
            password: Some("s3cret".to_string()),
            sfdx_auth_url: Some("force://PlatformCLI::token@example.com".to_string()),
        }
    }

    #[test]
    fn payload_keeps_auth_url_when_field_exists() {
        let caps = CapabilitySet {
            new_version_compatible: true,
            auth_url_field_exists: true,
        };

        let body = allocation_payload(&full_update(), &caps);
        assert_eq!(body["Allocation_status__c"], "Assigned");
        assert_eq!(body["Password__c"], "s3cret");
        assert!(body.get("SfdxAuthUrl__c").is_some());
        // The record id is a path parameter, never part of the payload.
        assert!(body.get("record_id").is_none());
        assert!(body.get("Id").is_none());
    }

    #[test]
    fn payload_strips_auth_url_when_field_absent() {
        let body = allocation_payload(&full_update(), &CapabilitySet::LEGACY);
        assert!(body.get("SfdxAuthUrl__c").is_none());
        assert_eq!(body["Allocation_status__c"], "Assigned");
    }

    #[test]
    fn payload_omits_unset_fields() {
        let update = AllocationUpdate {
            record_id: "a00".to_string(),
            allocation_status: Some(AllocationStatus::Available),
            ..Default::default()
        };

        let caps = CapabilitySet {
            new_version_compatible: true,
            auth_url_field_exists: true,
        };
        let body = allocation_payload(&update, &caps);
        assert_eq!(body["Allocation_status__c"], "Available");
        assert!(body.get("Password__c").is_none());
        assert!(body.get("SfdxAuthUrl__c").is_none());
    }

    #[test]
    fn in_progress_serializes_with_space() {
        let update = AllocationUpdate {
            record_id: "a00".to_string(),
            allocation_status: Some(AllocationStatus::InProgress),
            ..Default::default()
        };

        let caps = CapabilitySet {
            new_version_compatible: true,
            auth_url_field_exists: true,
        };
        assert_eq!(allocation_payload(&update, &caps)["Allocation_status__c"], "In Progress");
    }
}
