// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! `reqwest`-backed [`ValidationServiceClient`] (`spec.md` §4.4): documented
//! 4xx responses are a persisted [`ValidationOutcome::ClientError`], never a
//! [`PipelineError`] — only transport failures and undocumented statuses are.

use async_trait::async_trait;

use iati_pipeline_domain::error::{PipelineError, PipelineResult};
use iati_pipeline_domain::repositories::{ValidationOutcome, ValidationServiceClient};

use crate::infrastructure::config::ValidationServiceConfig;

const SERVICE: &str = "validation-service";

pub struct ReqwestValidationServiceClient {
    client: reqwest::Client,
    config: ValidationServiceConfig,
}

impl ReqwestValidationServiceClient {
    pub fn new(config: ValidationServiceConfig) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PipelineError::InvalidConfiguration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn call(&self, base_url: &str, xml: &[u8], with_meta: bool) -> PipelineResult<ValidationOutcome> {
        let mut request = self
            .client
            .post(base_url)
            .header(&self.config.api_key_header_name, &self.config.api_key_header_value)
            .header(reqwest::header::CONTENT_TYPE, "application/xml")
            .body(xml.to_vec());
        if with_meta {
            request = request.query(&[("meta", "true")]);
        }

        let response = request.send().await.map_err(|e| PipelineError::upstream(SERVICE, e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            return Ok(ValidationOutcome::ClientError { status: status.as_u16() });
        }
        if !status.is_success() {
            return Err(PipelineError::upstream(SERVICE, format!("unexpected status {status}")));
        }

        let report: serde_json::Value = response.json().await.map_err(|e| PipelineError::upstream(SERVICE, e.to_string()))?;
        let valid = report.get("valid").and_then(|v| v.as_bool());
        Ok(ValidationOutcome::Completed { valid, report })
    }
}

#[async_trait]
impl ValidationServiceClient for ReqwestValidationServiceClient {
    async fn validate(&self, xml: &[u8]) -> PipelineResult<ValidationOutcome> {
        self.call(&self.config.full_validation_url, xml, true).await
    }

    async fn check_schema(&self, xml: &[u8]) -> PipelineResult<ValidationOutcome> {
        self.call(&self.config.schema_validation_url, xml, false).await
    }
}
