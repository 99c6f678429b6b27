//! Data model for pooled scratch orgs.
//!
//! - [`ScratchOrg`] is the value handed to pipeline callers; it is owned
//!   exclusively by the invocation that created or fetched it.
//! - [`TrackingRecord`] is the typed projection of the remote org-tracking
//!   object, validated at the deserialization boundary.
//! - [`lookup_key`] is the one place the 18-to-15 character identifier
//!   truncation happens.

use serde::{Deserialize, Serialize};

/// Number of characters of an org id used as a tracking-object lookup key.
pub const LOOKUP_KEY_LEN: usize = 15;

/// Derive the tracking-object lookup key from a remote org id.
///
/// The platform returns 18-character ids from creation and active-org
/// listings, while tracking records store the 15-character form, so every
/// query keyed by org id must use the first 15 characters. Inputs are
/// expected to be at least 15 characters (normally exactly 18); shorter
/// inputs are returned unchanged. Repeated application is idempotent.
pub fn lookup_key(org_id: &str) -> &str {
    if org_id.len() > LOOKUP_KEY_LEN {
        &org_id[..LOOKUP_KEY_LEN]
    } else {
        org_id
    }
}

/// One provisioned scratch org.
///
/// Created by the provisioner with credential fields unpopulated, enriched
/// by credential provisioning (`password`, `sfdx_auth_url`) and by record-id
/// resolution (`record_id`), and mutated (`status`) on allocation/return.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScratchOrg {
    /// Remote 18-character org identifier. Use [`lookup_key`] when querying
    /// the tracking object by this value.
    pub org_id: String,

    /// Platform-assigned username; immutable once created.
    pub username: String,

    /// Local human label, `SO{n}` for pool-fill runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub signup_email: Option<String>,

    #[serde(rename = "loginURL", skip_serializing_if = "Option::is_none")]
    pub login_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Portable auth descriptor for non-interactive re-authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sfdx_auth_url: Option<String>,

    /// Tracking-record id. Only populated after an explicit resolution step;
    /// never assumed present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

impl ScratchOrg {
    /// Build a pool org from a fetched tracking record.
    pub fn from_tracking_record(record: &TrackingRecord) -> Self {
        Self {
            org_id: record.scratch_org.clone().unwrap_or_default(),
            username: record.signup_username.clone(),
            alias: None,
            signup_email: record.signup_email.clone(),
            login_url: record.login_url.clone(),
            password: record.password.clone(),
            sfdx_auth_url: record.sfdx_auth_url.clone(),
            record_id: Some(record.id.clone()),
            status: record.allocation_status.clone(),
            tag: record.pool_tag.clone(),
            expiry_date: record.expiration_date.clone(),
            failure_message: None,
        }
    }
}

/// Allocation lifecycle marker on a tracking record.
///
/// Current platforms expose the full four-value lifecycle
/// `Allocate -> Available -> In Progress -> Assigned`; legacy platforms only
/// distinguish assigned from unassigned. The capability probe decides which
/// vocabulary is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationStatus {
    Allocate,
    Available,
    #[serde(rename = "In Progress")]
    InProgress,
    Assigned,
}

impl AllocationStatus {
    /// The exact platform picklist value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allocate => "Allocate",
            Self::Available => "Available",
            Self::InProgress => "In Progress",
            Self::Assigned => "Assigned",
        }
    }

    /// Picklist values a new-version-compatible platform must expose.
    pub const EXPECTED_VALUES: [&'static str; 4] =
        ["In Progress", "Available", "Allocate", "Assigned"];
}

impl std::fmt::Display for AllocationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AllocationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Allocate" => Ok(Self::Allocate),
            "Available" => Ok(Self::Available),
            "In Progress" => Ok(Self::InProgress),
            "Assigned" => Ok(Self::Assigned),
            other => Err(format!("unknown allocation status: {other}")),
        }
    }
}

/// Tracking-object record as projected by pool queries.
///
/// `SfdxAuthUrl__c` is only projected when the capability probe confirmed
/// the field exists, so it stays optional with a default.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingRecord {
    #[serde(rename = "Id")]
    pub id: String,

    #[serde(rename = "Pooltag__c", default)]
    pub pool_tag: Option<String>,

    #[serde(rename = "CreatedDate", default)]
    pub created_date: Option<String>,

    /// 15-character org id as stored on the tracking object.
    #[serde(rename = "ScratchOrg", default)]
    pub scratch_org: Option<String>,

    #[serde(rename = "ExpirationDate", default)]
    pub expiration_date: Option<String>,

    #[serde(rename = "SignupUsername")]
    pub signup_username: String,

    #[serde(rename = "SignupEmail", default)]
    pub signup_email: Option<String>,

    #[serde(rename = "Password__c", default)]
    pub password: Option<String>,

    #[serde(rename = "Allocation_status__c", default)]
    pub allocation_status: Option<String>,

    #[serde(rename = "LoginUrl", default)]
    pub login_url: Option<String>,

    #[serde(rename = "SfdxAuthUrl__c", default)]
    pub sfdx_auth_url: Option<String>,
}

/// Row of the record-id resolution query (`SELECT Id, ScratchOrg ...`).
#[derive(Debug, Clone, Deserialize)]
pub struct RecordIdRow {
    #[serde(rename = "Id")]
    pub id: String,

    #[serde(rename = "ScratchOrg")]
    pub scratch_org: String,
}

/// Row of the login-URL lookup keyed by signup username.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginUrlRow {
    #[serde(rename = "Id")]
    pub id: String,

    #[serde(rename = "SignupUsername")]
    pub signup_username: String,

    #[serde(rename = "LoginUrl")]
    pub login_url: String,
}

/// Row of the active-org view lookup by tracking-record id set.
#[derive(Debug, Clone, Deserialize)]
pub struct ActiveOrgRecord {
    #[serde(rename = "Id")]
    pub id: String,

    #[serde(rename = "SignupUsername")]
    pub signup_username: String,
}

/// Row of the per-user utilization report
/// (`count(Id) In_Use, SignupEmail ... GROUP BY SignupEmail`).
#[derive(Debug, Clone, Deserialize)]
pub struct UtilizationRow {
    #[serde(rename = "In_Use")]
    pub in_use: i64,

    #[serde(rename = "SignupEmail")]
    pub signup_email: String,
}
