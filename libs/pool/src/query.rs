//! Tag-scoped queries against the org-tracking object and active-org view.
//!
//! Query construction is capability-gated: the auth-descriptor field is only
//! projected when the probe confirmed it exists, and the "unassigned"
//! predicate diverges between the legacy and four-value allocation
//! vocabularies. Both rules are the compatibility shim bridging two schema
//! generations and must be preserved exactly. Results are always ordered
//! oldest-first so allocation is FIFO-fair across the pool.

use tracing::debug;

use sfpool_retry::{self as retry, Attempt, RetryPolicy, METADATA_TIER, QUERY_TIER, SLOW_TIER};

use crate::capability::{ALLOCATION_STATUS_FIELD, CapabilitySet, TRACKING_OBJECT};
use crate::error::PoolError;
use crate::hub::{HubClient, OrgLimits, QueryResult};
use crate::model::{ActiveOrgRecord, TrackingRecord, UtilizationRow};

const ORDER_BY_FILTER: &str = " ORDER BY CreatedDate ASC";

/// Options for tag-scoped pool fetches.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Restrict to records created by the calling hub identity.
    pub mine_only: bool,

    /// Restrict to orgs that are fetchable (not yet claimed).
    pub unassigned_only: bool,
}

/// Query service over the shared pool.
pub struct PoolQueryService<'a> {
    hub: &'a HubClient,
    capabilities: CapabilitySet,
    query_tier: RetryPolicy,
    slow_tier: RetryPolicy,
}

impl<'a> PoolQueryService<'a> {
    pub fn new(hub: &'a HubClient, capabilities: CapabilitySet) -> Self {
        Self {
            hub,
            capabilities,
            query_tier: QUERY_TIER,
            slow_tier: SLOW_TIER,
        }
    }

    /// Override the query retry tier (tests use a zero-delay policy).
    pub fn with_query_tier(mut self, tier: RetryPolicy) -> Self {
        self.query_tier = tier;
        self
    }

    /// Override the slow retry tier used for the limits fetch.
    pub fn with_slow_tier(mut self, tier: RetryPolicy) -> Self {
        self.slow_tier = tier;
        self
    }

    /// Fetch tracking records for a pool tag (or any pool when `None`),
    /// oldest first.
    pub async fn fetch_by_tag(
        &self,
        tag: Option<&str>,
        options: FetchOptions,
    ) -> Result<Vec<TrackingRecord>, PoolError> {
        let soql = build_pool_query(tag, self.hub.username(), &self.capabilities, options);

        let result: QueryResult<TrackingRecord> = self.retried_query(&soql).await?;
        debug!(
            tag = tag.unwrap_or("<any>"),
            count = result.records.len(),
            "Fetched pool tracking records"
        );

        Ok(result.records)
    }

    /// Count active tracking records carrying a pool tag.
    pub async fn count_active_by_tag(&self, tag: &str) -> Result<usize, PoolError> {
        let soql = format!(
            "SELECT Id, CreatedDate, ScratchOrg, ExpirationDate, SignupUsername, SignupEmail, \
             Password__c, Allocation_status__c, LoginUrl FROM {TRACKING_OBJECT} \
             WHERE Pooltag__c = '{tag}' AND Status = 'Active'"
        );

        let result: QueryResult<TrackingRecord> = self.retried_query(&soql).await?;
        Ok(result.total_size)
    }

    /// Look up active-org view records for a set of tracking-record ids.
    ///
    /// `tracking_ids` is the pre-quoted id list as it appears in the `IN`
    /// clause, e.g. `'a00...','a01...'`.
    pub async fn active_orgs_by_tracking_ids(
        &self,
        tracking_ids: &str,
    ) -> Result<Vec<ActiveOrgRecord>, PoolError> {
        let soql = format!(
            "SELECT Id, SignupUsername FROM ActiveScratchOrg \
             WHERE ScratchOrgInfoId IN ({tracking_ids})"
        );

        let result: QueryResult<ActiveOrgRecord> = self.retried_query(&soql).await?;
        Ok(result.records)
    }

    /// Per-user utilization report over the active-org view, most loaded
    /// signup user first.
    pub async fn utilization_by_user(&self) -> Result<Vec<UtilizationRow>, PoolError> {
        let soql = "SELECT count(Id) In_Use, SignupEmail FROM ActiveScratchOrg \
                    GROUP BY SignupEmail ORDER BY count(Id) DESC";

        let result: QueryResult<UtilizationRow> = self.retried_query(soql).await?;
        Ok(result.records)
    }

    /// Fetch the hub's limits document for pool sizing.
    pub async fn scratch_org_limits(&self) -> Result<OrgLimits, PoolError> {
        retry::run(&self.slow_tier, |_| async move {
            match self.hub.limits().await {
                Ok(limits) => Attempt::Done(limits),
                Err(e) if e.is_transient() => Attempt::Retry(e),
                Err(e) => Attempt::Bail(e),
            }
        })
        .await
        .map_err(PoolError::from)
    }

    /// Verify the tracking object carries the allocation-status field at all.
    ///
    /// Pools cannot operate without it; callers surface this before any
    /// fill or fetch run.
    pub async fn check_prerequisites(&self) -> Result<bool, PoolError> {
        let describe = retry::run(&METADATA_TIER, |_| async move {
            match self.hub.describe_sobject(TRACKING_OBJECT).await {
                Ok(describe) => Attempt::Done(describe),
                Err(e) if e.is_transient() => Attempt::Retry(e),
                Err(e) => Attempt::Bail(e),
            }
        })
        .await
        .map_err(PoolError::from)?;

        Ok(describe
            .fields
            .iter()
            .any(|field| field.name == ALLOCATION_STATUS_FIELD))
    }

    async fn retried_query<T: serde::de::DeserializeOwned>(
        &self,
        soql: &str,
    ) -> Result<QueryResult<T>, PoolError> {
        retry::run(&self.query_tier, |_| async move {
            match self.hub.query::<T>(soql).await {
                Ok(result) => Attempt::Done(result),
                Err(e) if e.is_transient() => Attempt::Retry(e),
                Err(e) => Attempt::Bail(e),
            }
        })
        .await
        .map_err(PoolError::from)
    }
}

/// Build the tag-scoped pool query.
///
/// Reproduced exactly for compatibility with existing pool data: base
/// predicate restricts to active tracking records; the tag predicate is an
/// exact match, or any non-null tag when no tag is given; `mine_only` scopes
/// to the calling identity; the `unassigned_only` predicate depends on the
/// allocation vocabulary the hub exposes.
pub fn build_pool_query(
    tag: Option<&str>,
    hub_username: &str,
    capabilities: &CapabilitySet,
    options: FetchOptions,
) -> String {
    let mut fields = String::from(
        "Pooltag__c, Id, CreatedDate, ScratchOrg, ExpirationDate, SignupUsername, \
         SignupEmail, Password__c, Allocation_status__c, LoginUrl",
    );
    if capabilities.auth_url_field_exists {
        // Projecting this field on a hub without it hard-fails the query.
        fields.push_str(", SfdxAuthUrl__c");
    }

    let tag_predicate = match tag {
        Some(tag) => format!("Pooltag__c = '{tag}'"),
        None => "Pooltag__c != null".to_string(),
    };

    let mut query = format!(
        "SELECT {fields} FROM {TRACKING_OBJECT} WHERE {tag_predicate} AND Status = 'Active'"
    );

    if options.mine_only {
        query.push_str(&format!(" AND createdby.username = '{hub_username}'"));
    }

    if options.unassigned_only {
        if capabilities.new_version_compatible {
            query.push_str(
                " AND ( Allocation_status__c = 'Available' OR Allocation_status__c = 'In Progress' )",
            );
        } else {
            query.push_str(" AND Allocation_status__c != 'Assigned'");
        }
    }

    query.push_str(ORDER_BY_FILTER);
    query
}
