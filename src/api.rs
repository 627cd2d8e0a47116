//! Wire contract for the cell execution backend.
//!
//! DESIGN
//! ======
//! The backend exposes two endpoints: `POST /api/execute` accepts a cell and
//! returns a task id, and `GET /api/result/{task_id}` reports whether that
//! task has finished. Responses are parsed by pure functions here
//! (`parse_execute_response`, `parse_poll_response`) so the protocol can be
//! tested without a server. The shape of the `result` payload and the
//! meaning of `dtype` are backend-defined and kept opaque.

use serde::{Deserialize, Serialize};

/// Result variable name sent when the caller does not pick one.
pub const DEFAULT_RESULT_VAR: &str = "df";

/// Result container type sent when the caller does not pick one.
pub const DEFAULT_DTYPE: &str = "pandas";

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by cell API operations.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request to the backend failed (connect, timeout, transport).
    #[error("request failed: {0}")]
    Request(String),

    /// The backend returned a non-success HTTP status.
    #[error("response error: status {status}")]
    Response { status: u16, body: String },

    /// The backend does not know the polled task id.
    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: String },

    /// The response body could not be deserialized.
    #[error("response parse failed: {0}")]
    Parse(String),

    /// The response body is missing a required field.
    #[error("missing expected field `{0}`")]
    MissingField(&'static str),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

/// Grepable error code and retryable flag for structured error reporting.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

impl ErrorCode for ApiError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Request(_) => "E_REQUEST",
            Self::Response { .. } => "E_RESPONSE",
            Self::TaskNotFound { .. } => "E_TASK_NOT_FOUND",
            Self::Parse(_) => "E_PARSE",
            Self::MissingField(_) => "E_MISSING_FIELD",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Response { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

/// Backend cell discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Sql,
    Python,
}

impl std::fmt::Display for CellKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sql => write!(f, "sql"),
            Self::Python => write!(f, "python"),
        }
    }
}

/// Cell submission body for `POST /api/execute`.
///
/// `result_var` names the variable the backend binds the result to; it is
/// serialized as `result`, matching the endpoint's field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecuteRequest {
    pub cell_type: CellKind,
    pub source: String,
    pub connection: String,
    #[serde(rename = "result")]
    pub result_var: String,
    pub dtype: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Parsed `GET /api/result/{task_id}` response.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    /// The task has not finished; poll again later.
    Pending,
    /// The task finished; carries the backend-defined payload.
    Ready(serde_json::Value),
}

// =============================================================================
// PARSING
// =============================================================================

/// Extract the task id from an execute response body.
///
/// The id is nominally a string but a numeric id is accepted and normalized.
///
/// # Errors
///
/// Returns [`ApiError::Parse`] for an unreadable body and
/// [`ApiError::MissingField`] when `task_id` is absent or not a string/number.
pub fn parse_execute_response(json: &str) -> Result<String, ApiError> {
    let value: serde_json::Value = serde_json::from_str(json).map_err(|e| ApiError::Parse(e.to_string()))?;
    match value.get("task_id") {
        Some(serde_json::Value::String(id)) => Ok(id.clone()),
        Some(serde_json::Value::Number(id)) => Ok(id.to_string()),
        _ => Err(ApiError::MissingField("task_id")),
    }
}

/// Parse a poll response body into a task status.
///
/// # Errors
///
/// Returns [`ApiError::Parse`] for an unreadable body,
/// [`ApiError::MissingField`] when `ready` is absent or not a bool, or when
/// a finished task carries no `result` field.
pub fn parse_poll_response(json: &str) -> Result<TaskStatus, ApiError> {
    let mut value: serde_json::Value = serde_json::from_str(json).map_err(|e| ApiError::Parse(e.to_string()))?;
    let Some(ready) = value.get("ready").and_then(serde_json::Value::as_bool) else {
        return Err(ApiError::MissingField("ready"));
    };
    if !ready {
        return Ok(TaskStatus::Pending);
    }
    match value.get_mut("result") {
        Some(result) => Ok(TaskStatus::Ready(result.take())),
        None => Err(ApiError::MissingField("result")),
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
