//! HTTP client for the cell execution backend.
//!
//! Thin reqwest wrapper over the two endpoints. All body parsing is
//! delegated to pure functions in [`crate::api`] for testability.

use std::time::Duration;

use crate::api::{ApiError, ExecuteRequest, TaskStatus, parse_execute_response, parse_poll_response};
use crate::config::ClientConfig;

/// Backend-neutral async trait for cell execution. Enables mocking in tests.
#[async_trait::async_trait]
pub trait CellApi: Send + Sync {
    /// Submit a cell for execution and return the backend task id.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] if the request fails, the status is not
    /// success, or the response carries no task id.
    async fn execute(&self, request: &ExecuteRequest) -> Result<String, ApiError>;

    /// Fetch the current status of a submitted task.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] if the request fails, the task is unknown to
    /// the backend, or the response body is malformed.
    async fn poll(&self, task_id: &str) -> Result<TaskStatus, ApiError>;
}

// =============================================================================
// HTTP IMPLEMENTATION
// =============================================================================

pub struct HttpCellApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpCellApi {
    /// Build a client against the configured backend.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::HttpClientBuild`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: config.base_url.clone() })
    }
}

#[async_trait::async_trait]
impl CellApi for HttpCellApi {
    async fn execute(&self, request: &ExecuteRequest) -> Result<String, ApiError> {
        let url = format!("{}/api/execute", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        if status != 200 {
            return Err(ApiError::Response { status, body: text });
        }

        parse_execute_response(&text)
    }

    async fn poll(&self, task_id: &str) -> Result<TaskStatus, ApiError> {
        let url = format!("{}/api/result/{task_id}", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        // The backend answers 404 for ids it has never seen (and for results
        // already expired from its store). Not retryable.
        if status == 404 {
            return Err(ApiError::TaskNotFound { task_id: task_id.to_owned() });
        }

        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        if status != 200 {
            return Err(ApiError::Response { status, body: text });
        }

        parse_poll_response(&text)
    }
}
