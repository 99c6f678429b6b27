//! Runtime schema capability detection.
//!
//! The org-tracking object's shape varies between hub deployments: the
//! `SfdxAuthUrl__c` field may be absent, and the allocation-status picklist
//! may carry the legacy two-state vocabulary instead of the current
//! four-value lifecycle. Every query-construction and state-write decision
//! downstream consults the [`CapabilitySet`] produced here, so it must be
//! computed before any tag-scoped query that depends on allocation
//! semantics.
//!
//! The probe issues at most one describe per probe value; callers thread one
//! probe (or its resolved set) through a context rather than relying on
//! ambient global state.

use tokio::sync::OnceCell;
use tracing::{debug, warn};

use sfpool_retry::{self as retry, Attempt, SLOW_TIER};

use crate::error::PoolError;
use crate::hub::{HubClient, SObjectDescribe};
use crate::model::AllocationStatus;

/// The remote sobject tracking scratch-org provisioning state.
pub const TRACKING_OBJECT: &str = "ScratchOrgInfo";

/// Allocation-status field on the tracking object.
pub const ALLOCATION_STATUS_FIELD: &str = "Allocation_status__c";

/// Optional portable-auth-descriptor field on the tracking object.
pub const AUTH_URL_FIELD: &str = "SfdxAuthUrl__c";

/// Detected schema capabilities of the hub deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilitySet {
    /// All four allocation-status lifecycle values are present and active.
    pub new_version_compatible: bool,

    /// The tracking object carries the `SfdxAuthUrl__c` field.
    pub auth_url_field_exists: bool,
}

impl CapabilitySet {
    /// Legacy fallback: two-state allocation vocabulary, no auth-url field.
    pub const LEGACY: Self = Self {
        new_version_compatible: false,
        auth_url_field_exists: false,
    };
}

/// Once-per-process capability detection against the tracking object.
#[derive(Debug, Default)]
pub struct CapabilityProbe {
    detected: OnceCell<CapabilitySet>,
}

impl CapabilityProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detect capabilities, issuing the describe call at most once.
    ///
    /// Subsequent invocations return the memoized classification; a stale
    /// value is never invalidated mid-run, since a probe is only meaningful
    /// per process.
    pub async fn detect(&self, hub: &HubClient) -> Result<CapabilitySet, PoolError> {
        self.detected
            .get_or_try_init(|| probe(hub))
            .await
            .copied()
    }

    /// The memoized capability set, if detection has already run.
    pub fn current(&self) -> Option<CapabilitySet> {
        self.detected.get().copied()
    }
}

async fn probe(hub: &HubClient) -> Result<CapabilitySet, PoolError> {
    let describe = retry::run(&SLOW_TIER, |_| async move {
        match hub.describe_sobject(TRACKING_OBJECT).await {
            Ok(describe) => Attempt::Done(describe),
            Err(e) if e.is_transient() => Attempt::Retry(e),
            Err(e) => Attempt::Bail(e),
        }
    })
    .await
    .map_err(PoolError::from)?;

    let capabilities = classify(&describe);

    if !capabilities.new_version_compatible {
        warn!(
            expected = ?AllocationStatus::EXPECTED_VALUES,
            "Required values missing on {TRACKING_OBJECT}.{ALLOCATION_STATUS_FIELD} in the hub; \
             falling back to legacy allocation semantics. Update the field configuration in the \
             hub to enable the four-value lifecycle."
        );
    }

    debug!(?capabilities, "Capability probe completed");
    Ok(capabilities)
}

/// Classify a tracking-object describe into a capability set.
///
/// The allocation-status picklist only counts when it carries exactly the
/// four lifecycle entries and all expected values are active.
pub fn classify(describe: &SObjectDescribe) -> CapabilitySet {
    let mut auth_url_field_exists = false;
    let mut available_values: Vec<&str> = Vec::new();

    for field in &describe.fields {
        if field.name == AUTH_URL_FIELD {
            auth_url_field_exists = true;
        }

        if field.name == ALLOCATION_STATUS_FIELD && field.picklist_values.len() == 4 {
            available_values.extend(
                field
                    .picklist_values
                    .iter()
                    .filter(|v| v.active)
                    .map(|v| v.value.as_str()),
            );
        }
    }

    let new_version_compatible = AllocationStatus::EXPECTED_VALUES
        .iter()
        .all(|expected| available_values.contains(expected));

    CapabilitySet {
        new_version_compatible,
        auth_url_field_exists,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{FieldDescribe, PicklistValue, SObjectDescribe};

    fn picklist(values: &[(&str, bool)]) -> Vec<PicklistValue> {
        values
            .iter()
            .map(|(value, active)| PicklistValue {
                active: *active,
                value: value.to_string(),
            })
            .collect()
    }

    #[test]
    fn four_active_values_classify_as_new_version() {
        let describe = SObjectDescribe {
            name: TRACKING_OBJECT.to_string(),
            fields: vec![
                FieldDescribe {
                    name: AUTH_URL_FIELD.to_string(),
                    picklist_values: vec![],
                },
                FieldDescribe {
                    name: ALLOCATION_STATUS_FIELD.to_string(),
                    picklist_values: picklist(&[
                        ("Allocate", true),
                        ("Available", true),
                        ("In Progress", true),
                        ("Assigned", true),
                    ]),
                },
            ],
        };

        let caps = classify(&describe);
        assert!(caps.new_version_compatible);
        assert!(caps.auth_url_field_exists);
    }

    #[test]
    fn inactive_value_falls_back_to_legacy() {
        let describe = SObjectDescribe {
            name: TRACKING_OBJECT.to_string(),
            fields: vec![FieldDescribe {
                name: ALLOCATION_STATUS_FIELD.to_string(),
                picklist_values: picklist(&[
                    ("Allocate", true),
                    ("Available", false),
                    ("In Progress", true),
                    ("Assigned", true),
                ]),
            }],
        };

        let caps = classify(&describe);
        assert!(!caps.new_version_compatible);
        assert!(!caps.auth_url_field_exists);
    }

    #[test]
    fn short_picklist_falls_back_to_legacy() {
        let describe = SObjectDescribe {
            name: TRACKING_OBJECT.to_string(),
            fields: vec![FieldDescribe {
                name: ALLOCATION_STATUS_FIELD.to_string(),
                picklist_values: picklist(&[("Assigned", true), ("Unassigned", true)]),
            }],
        };

        assert!(!classify(&describe).new_version_compatible);
    }
}
