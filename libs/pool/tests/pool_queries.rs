//! Pool query behavior against a mocked hub: capability gating, FIFO
//! ordering, and the retry budget.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sfpool_core::capability::CapabilityProbe;
use sfpool_core::error::PoolError;
use sfpool_core::hub::{HubClient, HubConnection};
use sfpool_core::query::{FetchOptions, PoolQueryService};
use sfpool_retry::RetryPolicy;

const DESCRIBE_PATH: &str = "/services/data/v50.0/sobjects/ScratchOrgInfo/describe";
const QUERY_PATH: &str = "/services/data/v50.0/query";

/// Zero-delay policy so retry paths run instantly under test.
const FAST_TIER: RetryPolicy = RetryPolicy::new(3, Duration::ZERO);

async fn hub_client(server: &MockServer) -> HubClient {
    HubClient::new(&HubConnection {
        instance_url: server.uri(),
        access_token: "test-token".to_string(),
        username: "devhub@example.com".to_string(),
        api_version: "50.0".to_string(),
    })
    .unwrap()
}

fn legacy_describe_body() -> serde_json::Value {
    json!({
        "name": "ScratchOrgInfo",
        "fields": [
            {"name": "Allocation_status__c", "picklistValues": [
                {"active": true, "value": "Assigned"},
                {"active": true, "value": "Unassigned"}
            ]}
        ]
    })
}

fn new_schema_describe_body() -> serde_json::Value {
    json!({
        "name": "ScratchOrgInfo",
        "fields": [
            {"name": "SfdxAuthUrl__c", "picklistValues": []},
            {"name": "Allocation_status__c", "picklistValues": [
                {"active": true, "value": "Allocate"},
                {"active": true, "value": "Available"},
                {"active": true, "value": "In Progress"},
                {"active": true, "value": "Assigned"}
            ]}
        ]
    })
}

fn tracking_record(username: &str, created: &str) -> serde_json::Value {
    json!({
        "Pooltag__c": "pool-dev",
        "Id": format!("a005g{username}"),
        "CreatedDate": created,
        "ScratchOrg": "00D5g0000012abc",
        "ExpirationDate": "2026-09-01",
        "SignupUsername": username,
        "SignupEmail": "admin@example.com",
        "Password__c": "s3cret",
        "Allocation_status__c": "Available",
        "LoginUrl": "https://test.salesforce.com"
    })
}

#[tokio::test]
async fn probe_issues_exactly_one_describe() {
    let server = MockServer::start().await;
    let hub = hub_client(&server).await;

    Mock::given(method("GET"))
        .and(path(DESCRIBE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(new_schema_describe_body()))
        .expect(1)
        .mount(&server)
        .await;

    let probe = CapabilityProbe::new();
    let first = probe.detect(&hub).await.unwrap();
    let second = probe.detect(&hub).await.unwrap();
    let third = probe.detect(&hub).await.unwrap();

    assert!(first.new_version_compatible);
    assert!(first.auth_url_field_exists);
    assert_eq!(first, second);
    assert_eq!(second, third);
    // The .expect(1) on the mock verifies the call-count invariant on drop.
}

#[tokio::test]
async fn legacy_schema_fetch_uses_not_assigned_predicate() {
    let server = MockServer::start().await;
    let hub = hub_client(&server).await;

    Mock::given(method("GET"))
        .and(path(DESCRIBE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(legacy_describe_body()))
        .mount(&server)
        .await;

    // The exact predicate contract for existing pool data.
    let expected = "SELECT Pooltag__c, Id, CreatedDate, ScratchOrg, ExpirationDate, \
                    SignupUsername, SignupEmail, Password__c, Allocation_status__c, LoginUrl \
                    FROM ScratchOrgInfo WHERE Pooltag__c = 'pool-dev' AND Status = 'Active' \
                    AND Allocation_status__c != 'Assigned' ORDER BY CreatedDate ASC";

    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(query_param("q", expected))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalSize": 2,
            "done": true,
            "records": [
                tracking_record("old@example.com", "2026-08-01T08:00:00.000+0000"),
                tracking_record("new@example.com", "2026-08-02T08:00:00.000+0000")
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let probe = CapabilityProbe::new();
    let capabilities = probe.detect(&hub).await.unwrap();
    assert!(!capabilities.new_version_compatible);

    let service = PoolQueryService::new(&hub, capabilities).with_query_tier(FAST_TIER);
    let records = service
        .fetch_by_tag(
            Some("pool-dev"),
            FetchOptions {
                mine_only: false,
                unassigned_only: true,
            },
        )
        .await
        .unwrap();

    // Oldest-first ordering comes back from the platform untouched.
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].signup_username, "old@example.com");
    assert_eq!(records[1].signup_username, "new@example.com");
}

#[tokio::test]
async fn new_schema_fetch_projects_auth_url_and_available_predicate() {
    let server = MockServer::start().await;
    let hub = hub_client(&server).await;

    Mock::given(method("GET"))
        .and(path(DESCRIBE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(new_schema_describe_body()))
        .mount(&server)
        .await;

    let expected = "SELECT Pooltag__c, Id, CreatedDate, ScratchOrg, ExpirationDate, \
                    SignupUsername, SignupEmail, Password__c, Allocation_status__c, LoginUrl, \
                    SfdxAuthUrl__c FROM ScratchOrgInfo WHERE Pooltag__c = 'pool-ci' \
                    AND Status = 'Active' AND ( Allocation_status__c = 'Available' \
                    OR Allocation_status__c = 'In Progress' ) ORDER BY CreatedDate ASC";

    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(query_param("q", expected))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalSize": 0,
            "done": true,
            "records": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let probe = CapabilityProbe::new();
    let capabilities = probe.detect(&hub).await.unwrap();

    let service = PoolQueryService::new(&hub, capabilities).with_query_tier(FAST_TIER);
    let records = service
        .fetch_by_tag(
            Some("pool-ci"),
            FetchOptions {
                mine_only: false,
                unassigned_only: true,
            },
        )
        .await
        .unwrap();

    assert!(records.is_empty());
}

#[tokio::test]
async fn query_fails_after_third_attempt_without_a_fourth() {
    let server = MockServer::start().await;
    let hub = hub_client(&server).await;

    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!([
            {"message": "unavailable", "errorCode": "SERVER_UNAVAILABLE"}
        ])))
        .expect(3)
        .mount(&server)
        .await;

    let service = PoolQueryService::new(&hub, sfpool_core::CapabilitySet::LEGACY)
        .with_query_tier(FAST_TIER);

    let err = service
        .fetch_by_tag(Some("pool-dev"), FetchOptions::default())
        .await
        .unwrap_err();

    match err {
        PoolError::RetriesExhausted { attempts, source } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*source, PoolError::Api { status: 503, .. }));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test]
async fn non_retryable_api_error_bails_on_first_attempt() {
    let server = MockServer::start().await;
    let hub = hub_client(&server).await;

    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!([
            {"message": "unexpected token", "errorCode": "MALFORMED_QUERY"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let service = PoolQueryService::new(&hub, sfpool_core::CapabilitySet::LEGACY)
        .with_query_tier(FAST_TIER);

    let err = service
        .fetch_by_tag(None, FetchOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, PoolError::Api { status: 400, .. }));
}

#[tokio::test]
async fn utilization_report_orders_by_usage() {
    let server = MockServer::start().await;
    let hub = hub_client(&server).await;

    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(query_param(
            "q",
            "SELECT count(Id) In_Use, SignupEmail FROM ActiveScratchOrg \
             GROUP BY SignupEmail ORDER BY count(Id) DESC",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalSize": 2,
            "done": true,
            "records": [
                {"In_Use": 7, "SignupEmail": "busy@example.com"},
                {"In_Use": 2, "SignupEmail": "light@example.com"}
            ]
        })))
        .mount(&server)
        .await;

    let service = PoolQueryService::new(&hub, sfpool_core::CapabilitySet::LEGACY)
        .with_query_tier(FAST_TIER);

    let rows = service.utilization_by_user().await.unwrap();
    assert_eq!(rows[0].in_use, 7);
    assert_eq!(rows[0].signup_email, "busy@example.com");
}

#[tokio::test]
async fn limits_fetch_reads_active_scratch_org_usage() {
    let server = MockServer::start().await;
    let hub = hub_client(&server).await;

    Mock::given(method("GET"))
        .and(path("/services/data/v50.0/limits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ActiveScratchOrgs": {"Max": 40, "Remaining": 12},
            "DailyScratchOrgs": {"Max": 80, "Remaining": 79}
        })))
        .mount(&server)
        .await;

    let service = PoolQueryService::new(&hub, sfpool_core::CapabilitySet::LEGACY)
        .with_slow_tier(FAST_TIER);

    let limits = service.scratch_org_limits().await.unwrap();
    assert_eq!(limits.active_scratch_orgs.unwrap().remaining, 12);
    assert_eq!(limits.daily_scratch_orgs.unwrap().max, 80);
}
