//! HTTP surface of the platform's control organization.
//!
//! [`HubConnection`] is the caller-supplied session handle: this subsystem
//! never authenticates, refreshes, or closes it, it only issues calls
//! through a [`HubClient`] built from it. Each client method is a single
//! attempt; retry discipline lives with the component issuing the call.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::PoolError;

/// Authenticated session handle to the control organization.
///
/// Read-shared across all calls in a process.
#[derive(Debug, Clone)]
pub struct HubConnection {
    /// Instance base URL, e.g. `https://myhub.my.salesforce.com`.
    pub instance_url: String,

    /// Bearer access token for the session.
    pub access_token: String,

    /// Username of the hub identity (used for `mine_only` pool scoping).
    pub username: String,

    /// Platform API version, e.g. `50.0`.
    pub api_version: String,
}

/// REST client over a [`HubConnection`].
#[derive(Debug, Clone)]
pub struct HubClient {
    client: reqwest::Client,
    base_url: String,
    api_version: String,
    username: String,
}

impl HubClient {
    /// Build a client with the connection's bearer token as a default header.
    pub fn new(connection: &HubConnection) -> Result<Self, PoolError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", connection.access_token)).map_err(
                |_| PoolError::Api {
                    status: 0,
                    message: "access token is not a valid header value".to_string(),
                },
            )?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: connection.instance_url.trim_end_matches('/').to_string(),
            api_version: connection.api_version.clone(),
            username: connection.username.clone(),
        })
    }

    /// Username of the hub identity behind this client.
    pub fn username(&self) -> &str {
        &self.username
    }

    fn data_url(&self, path: &str) -> String {
        format!(
            "{}/services/data/v{}{}",
            self.base_url, self.api_version, path
        )
    }

    /// Run a SOQL query and deserialize its records.
    pub async fn query<T: DeserializeOwned>(&self, soql: &str) -> Result<QueryResult<T>, PoolError> {
        debug!(query = %soql, "QUERY");

        let response = self
            .client
            .get(self.data_url("/query"))
            .query(&[("q", soql)])
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Describe an sobject's schema (fields, picklists).
    pub async fn describe_sobject(&self, object: &str) -> Result<SObjectDescribe, PoolError> {
        debug!(object = %object, "Describing sobject");

        let response = self
            .client
            .get(self.data_url(&format!("/sobjects/{object}/describe")))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Update mutable fields on one record.
    pub async fn update_record(
        &self,
        object: &str,
        record_id: &str,
        body: &serde_json::Value,
    ) -> Result<(), PoolError> {
        trace!(object = %object, record_id = %record_id, body = %body, "Updating record");

        let response = self
            .client
            .patch(self.data_url(&format!("/sobjects/{object}/{record_id}")))
            .json(body)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }

    /// Bulk-delete records by id via the composite endpoint.
    ///
    /// The whole batch succeeds or the call fails; there is no partial retry
    /// of individual ids at this layer.
    pub async fn delete_records(&self, ids: &[String]) -> Result<(), PoolError> {
        debug!(count = ids.len(), "Deleting records");

        let response = self
            .client
            .delete(self.data_url("/composite/sobjects"))
            .query(&[("ids", ids.join(",")), ("allOrNone", "true".to_string())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let results: Vec<DeleteResult> = response.json().await?;
        if let Some(failed) = results.iter().find(|r| !r.success) {
            return Err(PoolError::Api {
                status: 400,
                message: format!(
                    "delete rejected for {}: {}",
                    failed.id.as_deref().unwrap_or("<unknown>"),
                    failed
                        .errors
                        .first()
                        .map(|e| e.message.as_str())
                        .unwrap_or("no error detail")
                ),
            });
        }

        Ok(())
    }

    /// Fetch the versioned limits document for the instance.
    pub async fn limits(&self) -> Result<OrgLimits, PoolError> {
        let response = self.client.get(self.data_url("/limits")).send().await?;
        let limits: OrgLimits = self.handle_response(response).await?;
        trace!(?limits, "Limits fetched");
        Ok(limits)
    }

    /// Invoke the standard send-email action.
    pub async fn send_email(&self, input: &EmailInput) -> Result<(), PoolError> {
        let body = serde_json::json!({ "inputs": [input] });

        let response = self
            .client
            .post(self.data_url("/actions/standard/emailSimple"))
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, PoolError> {
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(Self::error_from(response).await)
        }
    }

    /// Map an error response to [`PoolError::Api`], keeping the platform's
    /// first error message when the body parses.
    async fn error_from(response: reqwest::Response) -> PoolError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        let message = serde_json::from_str::<Vec<ApiErrorBody>>(&body)
            .ok()
            .and_then(|errors| errors.into_iter().next())
            .map(|e| match e.error_code {
                Some(code) => format!("{code}: {}", e.message),
                None => e.message,
            })
            .unwrap_or(body);

        PoolError::Api { status, message }
    }
}

/// SOQL query response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResult<T> {
    #[serde(rename = "totalSize")]
    pub total_size: usize,

    pub done: bool,

    pub records: Vec<T>,
}

/// Platform error body entry.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
    #[serde(rename = "errorCode", default)]
    error_code: Option<String>,
}

/// Result entry of a composite delete.
#[derive(Debug, Deserialize)]
struct DeleteResult {
    #[serde(default)]
    id: Option<String>,
    success: bool,
    #[serde(default)]
    errors: Vec<ApiErrorBody>,
}

/// Sobject schema description (fields only; the rest is ignored).
#[derive(Debug, Clone, Deserialize)]
pub struct SObjectDescribe {
    pub name: String,

    pub fields: Vec<FieldDescribe>,
}

/// One field of an sobject describe.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDescribe {
    pub name: String,

    #[serde(rename = "picklistValues", default)]
    pub picklist_values: Vec<PicklistValue>,
}

/// One picklist entry of a field describe.
#[derive(Debug, Clone, Deserialize)]
pub struct PicklistValue {
    pub active: bool,

    pub value: String,
}

/// Limits document subset consumed by pool sizing.
#[derive(Debug, Clone, Deserialize)]
pub struct OrgLimits {
    #[serde(rename = "ActiveScratchOrgs", default)]
    pub active_scratch_orgs: Option<LimitUsage>,

    #[serde(rename = "DailyScratchOrgs", default)]
    pub daily_scratch_orgs: Option<LimitUsage>,
}

/// Max/remaining pair of one limit.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LimitUsage {
    #[serde(rename = "Max")]
    pub max: i64,

    #[serde(rename = "Remaining")]
    pub remaining: i64,
}

/// Input entry of the standard send-email action.
#[derive(Debug, Clone, Serialize)]
pub struct EmailInput {
    #[serde(rename = "emailBody")]
    pub email_body: String,

    #[serde(rename = "emailAddresses")]
    pub email_addresses: String,

    #[serde(rename = "emailSubject")]
    pub email_subject: String,

    #[serde(rename = "senderType")]
    pub sender_type: String,
}
