// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Adapter-level integration tests against `wiremock` stand-ins for the
//! Validation Service and Bulk Data Service, exercising the actual HTTP
//! wire format each `reqwest`-backed client sends and expects
//! (`spec.md` §4.4, §4.1, §6).

use std::time::Duration;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use iati_pipeline::infrastructure::adapters::{ReqwestBulkDataServiceClient, ReqwestValidationServiceClient};
use iati_pipeline::infrastructure::config::{BulkDataServiceConfig, ValidationServiceConfig};
use iati_pipeline_domain::error::PipelineError;
use iati_pipeline_domain::repositories::{BulkDataServiceClient, IndexFetch, ValidationOutcome, ValidationServiceClient};

fn validation_config(server: &MockServer) -> ValidationServiceConfig {
    ValidationServiceConfig {
        schema_validation_url: format!("{}/schema", server.uri()),
        full_validation_url: format!("{}/validate", server.uri()),
        api_key_header_name: "X-Api-Key".into(),
        api_key_header_value: "secret".into(),
        timeout: Duration::from_secs(5),
    }
}

fn bds_config(server: &MockServer) -> BulkDataServiceConfig {
    BulkDataServiceConfig {
        dataset_index_url: format!("{}/datasets", server.uri()),
        reporting_org_index_url: format!("{}/orgs", server.uri()),
        timeout: Duration::from_secs(5),
    }
}

/// `spec.md` §4.4/§6: the validation service is called with a `POST` and
/// the raw XML as the request body, not a reference to where it lives.
#[tokio::test]
async fn check_schema_posts_raw_xml_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/schema"))
        .and(header("X-Api-Key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"valid": true})))
        .mount(&server)
        .await;

    let client = ReqwestValidationServiceClient::new(validation_config(&server)).unwrap();
    let outcome = client.check_schema(b"<iati-activities></iati-activities>").await.unwrap();
    assert_eq!(outcome, ValidationOutcome::Completed { valid: Some(true), report: serde_json::json!({"valid": true}) });
}

/// `spec.md` §8 boundary case: a body with neither `valid: true` nor
/// `valid: false` leaves the outcome ambiguous rather than defaulting to
/// a hard failure.
#[tokio::test]
async fn validate_with_malformed_valid_field_returns_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"valid": "unknown"})))
        .mount(&server)
        .await;

    let client = ReqwestValidationServiceClient::new(validation_config(&server)).unwrap();
    let outcome = client.validate(b"<iati-activities></iati-activities>").await.unwrap();
    assert!(matches!(outcome, ValidationOutcome::Completed { valid: None, .. }));
}

/// 4xx responses are a persisted `ClientError`, not a transport failure.
#[tokio::test]
async fn validate_maps_client_error_status_without_erroring() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/validate")).respond_with(ResponseTemplate::new(422)).mount(&server).await;

    let client = ReqwestValidationServiceClient::new(validation_config(&server)).unwrap();
    let outcome = client.validate(b"<iati-activities></iati-activities>").await.unwrap();
    assert_eq!(outcome, ValidationOutcome::ClientError { status: 422 });
}

/// `spec.md` §6: the dataset and reporting-org index bodies are objects
/// carrying `index_created_unix_timestamp` alongside their named array,
/// not bare arrays.
#[tokio::test]
async fn fetch_reporting_orgs_parses_timestamped_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orgs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "index_created_unix_timestamp": 1_700_000_000i64,
            "reporting_orgs": [
                {"org-id": "GB-1", "short-name": "Example", "title": "Example Org", "iati-identifier": null},
            ],
        })))
        .mount(&server)
        .await;
    Mock::given(method("HEAD")).and(path("/datasets")).respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"abc\"")).mount(&server).await;

    let client = ReqwestBulkDataServiceClient::new(bds_config(&server)).unwrap();
    let fetch = client.fetch_reporting_orgs(None).await.unwrap();
    match fetch {
        IndexFetch::Fresh { index_created_unix_timestamp, entries, .. } => {
            assert_eq!(index_created_unix_timestamp, 1_700_000_000);
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].org_id.as_str(), "GB-1");
        }
        IndexFetch::NotModified => panic!("expected a fresh fetch"),
    }
}

/// `spec.md` §6: a `HEAD` on the dataset index with no `ETag` header is a
/// hard error, distinct from the body's own conditional-fetch ETag.
#[tokio::test]
async fn fetch_datasets_errors_when_head_has_no_etag() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD")).and(path("/datasets")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

    let client = ReqwestBulkDataServiceClient::new(bds_config(&server)).unwrap();
    let result = client.fetch_datasets(None).await;
    assert!(matches!(result, Err(PipelineError::Upstream { .. })));
}
