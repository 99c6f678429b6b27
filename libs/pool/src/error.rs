//! Error taxonomy for pool operations.
//!
//! Four classes of failure flow through the subsystem:
//!
//! - **Transient**: network errors and 5xx/429 API responses; eligible for
//!   bounded retry.
//! - **Fatal**: failures a retry cannot fix (empty generated password, a
//!   collaborator command rejecting its input); bail immediately.
//! - **Soft**: individual allocation-state write failures during bulk
//!   reconciliation; logged and reported as `false`, never propagated.
//! - **Compatibility warnings**: missing schema configuration; logged at
//!   warn level and handled by degrading to the legacy query path.

use sfpool_retry::RetryError;
use thiserror::Error;

/// Errors surfaced by pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Transport-level failure talking to the platform.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The platform rejected or failed a request.
    #[error("platform API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A retried operation spent its attempt budget.
    #[error("gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<PoolError>,
    },

    /// Password generation yielded no value for a freshly created org.
    ///
    /// Fatal: retrying a password reset against the same org is not
    /// guaranteed idempotent, and an empty credential must never be
    /// returned as success.
    #[error("unable to set password for scratch org {username}")]
    PasswordUnset { username: String },

    /// A scratch org id has no matching tracking record.
    #[error("no tracking record found for scratch org {org_id}")]
    TrackingRecordNotFound { org_id: String },

    /// A collaborator CLI command failed.
    #[error("command `{command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    /// A response did not match the expected shape.
    #[error("unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),

    /// A query returned no rows where at least one was required.
    #[error("empty result for query: {0}")]
    EmptyResult(String),
}

impl PoolError {
    /// Whether a bounded retry may change the outcome.
    ///
    /// This is the retryable-error predicate consulted at every retry site:
    /// transport failures and server-side/ratelimit statuses are transient,
    /// everything else bails.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            // Freshly created records lag behind in tracking-object queries.
            Self::EmptyResult(_) | Self::TrackingRecordNotFound { .. } => true,
            _ => false,
        }
    }
}

impl From<RetryError<PoolError>> for PoolError {
    fn from(err: RetryError<PoolError>) -> Self {
        match err {
            RetryError::Exhausted { attempts, last } => Self::RetriesExhausted {
                attempts,
                source: Box::new(last),
            },
            RetryError::Aborted(inner) => inner,
        }
    }
}
