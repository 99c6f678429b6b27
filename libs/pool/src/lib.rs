//! # sfpool-core
//!
//! Pool management for ephemeral, API-rate-limited scratch orgs: CI/CD
//! pipelines request a ready, pre-validated environment from a tag-scoped
//! pool instead of provisioning one on demand.
//!
//! ## Architecture
//!
//! - **CapabilityProbe**: detects, once per process, which optional schema
//!   fields and picklist values the hub's org-tracking object supports; its
//!   [`capability::CapabilitySet`] gates query construction and state
//!   writes everywhere else.
//! - **OrgProvisioner**: drives multi-step org creation (create, login-URL
//!   lookup, credential materialization, assembly); each step is its own
//!   failure domain.
//! - **PoolQueryService**: tag-scoped queries over the tracking object and
//!   active-org view, oldest-first for FIFO-fair allocation.
//! - **AllocationReconciler**: record-id resolution, allocation-state
//!   writes, and bulk deletion of reclaimed orgs.
//!
//! Every remote call runs through the bounded-retry executor in
//! `sfpool-retry`; only re-issuable operations are wrapped, never org
//! creation itself. The subsystem holds no cross-call shared mutable state
//! beyond the probe's write-once memoization, and callers own each
//! [`model::ScratchOrg`] value exclusively until hand-off.

pub mod capability;
pub mod config;
pub mod credentials;
pub mod email;
pub mod error;
pub mod hub;
pub mod lifecycle;
pub mod model;
pub mod provision;
pub mod query;
pub mod reconcile;

pub use capability::{CapabilityProbe, CapabilitySet};
pub use config::Config;
pub use credentials::CredentialProvisioner;
pub use error::PoolError;
pub use hub::{HubClient, HubConnection};
pub use lifecycle::{OrgLifecycle, SfdxCli};
pub use model::{lookup_key, AllocationStatus, ScratchOrg, TrackingRecord};
pub use provision::{OrgProvisioner, ProvisionRequest};
pub use query::{FetchOptions, PoolQueryService};
pub use reconcile::{AllocationReconciler, AllocationUpdate};
