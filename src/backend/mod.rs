//! HTTP client for the test generation/execution backend.
//!
//! Five endpoints, all JSON: test generation (`POST /{unit|restassured}`),
//! job submission (`POST /execute-tests`), coarse status polls
//! (`GET /execution-status/{id}`), the one-shot detailed metrics fetch
//! (`GET /execution-metrics/{id}`), and the test-case archive
//! (`POST /db/testcases`).

pub mod extract;

use crate::model::{
    CoverageSummary, ExecutionMetrics, ExecutionRecord, ExecutionStatus, QualityAnalysis,
    TestType,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Errors from talking to the backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Network/transport failure before a response arrived.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status with no usable error body.
    #[error("Request failed with status {0}")]
    Http(u16),

    /// The backend reported a failure in its `{error}` payload.
    #[error("Backend error: {0}")]
    Backend(String),

    /// A 2xx response missing an expected field.
    #[error("Backend response missing field '{0}'")]
    MissingField(&'static str),

    /// Rejected locally, before any network call.
    #[error("No test code to execute")]
    EmptyTestCode,
}

/// Coarse payload from `GET /execution-status/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusPayload {
    pub status: ExecutionStatus,
    #[serde(default)]
    pub metrics: Option<ExecutionMetrics>,
    #[serde(default)]
    pub logs: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

impl StatusPayload {
    /// Lift the payload into a partial record for merging.
    pub fn into_record(self, execution_id: &str) -> ExecutionRecord {
        let mut rec = ExecutionRecord::new(execution_id);
        rec.status = self.status;
        rec.timestamp = Utc::now();
        rec.metrics = self.metrics;
        rec.logs = self.logs;
        rec.start_time = self.start_time;
        rec.end_time = self.end_time;
        rec
    }
}

/// Rich payload from `GET /execution-metrics/{id}`, fetched once a job is
/// terminal. Everything here augments the coarse record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailedPayload {
    #[serde(default)]
    pub metrics: Option<ExecutionMetrics>,
    #[serde(default)]
    pub quality_analysis: Option<QualityAnalysis>,
    #[serde(default)]
    pub recommendations: Option<Vec<String>>,
    #[serde(default)]
    pub coverage_summary: Option<CoverageSummary>,
}

impl DetailedPayload {
    pub fn into_record(self, execution_id: &str, status: ExecutionStatus) -> ExecutionRecord {
        let mut rec = ExecutionRecord::new(execution_id);
        rec.status = status;
        rec.metrics = self.metrics;
        rec.quality_analysis = self.quality_analysis;
        rec.recommendations = self.recommendations;
        rec.coverage_summary = self.coverage_summary;
        rec
    }
}

#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    #[serde(default)]
    execution_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    generated_test: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for one backend instance.
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ask the backend to generate a test for `api_code`.
    ///
    /// Returns the raw generated text; callers usually run it through
    /// [`extract::test_code_blocks`] to strip the fencing.
    pub async fn generate_test(
        &self,
        test_type: TestType,
        api_code: &str,
    ) -> Result<String, BackendError> {
        let url = format!("{}/{}", self.base_url, test_type);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "api_code": api_code }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::error_from_body(status.as_u16(), response).await);
        }

        let body: GenerateResponse = response.json().await?;
        match body.generated_test {
            Some(text) if !text.is_empty() => Ok(text),
            _ => match body.error {
                Some(msg) => Err(BackendError::Backend(msg)),
                None => Err(BackendError::MissingField("generated_test")),
            },
        }
    }

    /// Submit a test run, returning the backend-assigned execution id.
    ///
    /// Empty test code is rejected here, before any request goes out.
    pub async fn execute_tests(
        &self,
        test_code: &str,
        api_code: &str,
    ) -> Result<String, BackendError> {
        if test_code.trim().is_empty() {
            return Err(BackendError::EmptyTestCode);
        }

        let url = format!("{}/execute-tests", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "test_code": test_code, "api_code": api_code }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::error_from_body(status.as_u16(), response).await);
        }

        let body: ExecuteResponse = response.json().await?;
        match body.execution_id {
            Some(id) => Ok(id),
            None => match body.error {
                Some(msg) => Err(BackendError::Backend(msg)),
                None => Err(BackendError::MissingField("execution_id")),
            },
        }
    }

    /// One coarse status poll.
    pub async fn execution_status(
        &self,
        execution_id: &str,
    ) -> Result<StatusPayload, BackendError> {
        let url = format!("{}/execution-status/{}", self.base_url, execution_id);
        let response = self.http.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::error_from_body(status.as_u16(), response).await);
        }

        Ok(response.json().await?)
    }

    /// Fetch the detailed metrics for a finished execution.
    pub async fn execution_metrics(
        &self,
        execution_id: &str,
    ) -> Result<DetailedPayload, BackendError> {
        let url = format!("{}/execution-metrics/{}", self.base_url, execution_id);
        let response = self.http.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::error_from_body(status.as_u16(), response).await);
        }

        Ok(response.json().await?)
    }

    /// Persist a generated test case in the backend's database.
    pub async fn save_test_case(
        &self,
        test_type: TestType,
        source_code: &str,
        test_case: &str,
    ) -> Result<(), BackendError> {
        let url = format!("{}/db/testcases", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({
                "testType": test_type.to_string(),
                "sourceCode": source_code,
                "testCase": test_case,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::error_from_body(status.as_u16(), response).await);
        }
        Ok(())
    }

    /// Prefer the backend's `{error}` message when a failing response
    /// carries one; fall back to the bare status code.
    async fn error_from_body(code: u16, response: reqwest::Response) -> BackendError {
        #[derive(Deserialize)]
        struct Body {
            error: Option<String>,
        }
        match response.json::<Body>().await {
            Ok(Body { error: Some(msg) }) => BackendError::Backend(msg),
            _ => BackendError::Http(code),
        }
    }
}
