//! Cell run lifecycle: submit, poll, publish.
//!
//! DESIGN
//! ======
//! A run is `submit → poll* → ready | failed`. [`run_cell`] drives one run
//! to completion against a [`CellApi`], sleeping between polls on a
//! [`PollPolicy`] schedule. [`SqlCell`] adds the editor-facing shell: a
//! mutable source buffer and a shared slot holding the newest run's state
//! and result. Each run captures a generation number at start; a run whose
//! generation has been superseded keeps polling to completion but its
//! writes to the slot are discarded, so the visible result always belongs
//! to the newest run.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::json;
use tracing::{info, warn};

use crate::api::{ApiError, CellKind, DEFAULT_DTYPE, DEFAULT_RESULT_VAR, ErrorCode, ExecuteRequest, TaskStatus};
use crate::client::CellApi;
use crate::config::env_parse;
use crate::notebook::{Cell, Notebook};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_POLL_BACKOFF: f64 = 1.5;
pub const DEFAULT_POLL_MAX_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 120;

// =============================================================================
// POLL POLICY
// =============================================================================

/// Poll schedule for a single run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    /// Delay before the first poll and base of the backoff curve.
    pub interval: Duration,
    /// Multiplier applied per attempt. `1.0` polls at a fixed interval.
    pub backoff: f64,
    /// Upper bound on the delay between polls.
    pub max_interval: Duration,
    /// Poll budget before the run fails with [`RunError::TimedOut`].
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            backoff: DEFAULT_POLL_BACKOFF,
            max_interval: Duration::from_millis(DEFAULT_POLL_MAX_INTERVAL_MS),
            max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
        }
    }
}

impl PollPolicy {
    /// Build a policy from `NBRUN_POLL_*` environment variables.
    ///
    /// - `NBRUN_POLL_INTERVAL_MS`: default 500
    /// - `NBRUN_POLL_BACKOFF`: default 1.5
    /// - `NBRUN_POLL_MAX_INTERVAL_MS`: default 5000
    /// - `NBRUN_POLL_MAX_ATTEMPTS`: default 120
    ///
    /// Absent or unparsable values fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            interval: Duration::from_millis(env_parse("NBRUN_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)),
            backoff: env_parse("NBRUN_POLL_BACKOFF", DEFAULT_POLL_BACKOFF),
            max_interval: Duration::from_millis(env_parse(
                "NBRUN_POLL_MAX_INTERVAL_MS",
                DEFAULT_POLL_MAX_INTERVAL_MS,
            )),
            max_attempts: env_parse("NBRUN_POLL_MAX_ATTEMPTS", DEFAULT_POLL_MAX_ATTEMPTS),
        }
    }

    /// Delay before poll attempt `attempt` (1-based), capped at
    /// `max_interval`. Backoff factors below 1.0 are treated as fixed-rate.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.backoff.max(1.0).powi(exponent);
        let base_ms = self.interval.as_millis() as f64;
        let capped_ms = (base_ms * factor).min(self.max_interval.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }
}

// =============================================================================
// RUN STATE
// =============================================================================

/// Lifecycle position of a cell run.
///
/// Every run is `idle → submitted → polling* → ready | failed`.
#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    /// No run has started.
    Idle,
    /// The execute request succeeded; polling has not begun.
    Submitted { task_id: String },
    /// Waiting on the backend. `attempt` counts issued polls.
    Polling { task_id: String, attempt: u32 },
    /// The run finished; carries the payload.
    Ready { result: serde_json::Value },
    /// The run failed and will not be retried.
    Failed { error: String },
}

impl RunState {
    /// Terminal states end a run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Ready { .. } | RunState::Failed { .. })
    }
}

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by driving a run to completion.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The execute request failed; no task was created.
    #[error("submit failed: {0}")]
    Submit(#[source] ApiError),

    /// A poll failed with a non-retryable error.
    #[error("poll failed: {0}")]
    Poll(#[source] ApiError),

    /// The poll budget ran out before the task finished.
    #[error("task {task_id} not ready after {attempts} polls")]
    TimedOut { task_id: String, attempts: u32 },
}

impl ErrorCode for RunError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Submit(_) => "E_SUBMIT",
            Self::Poll(_) => "E_POLL",
            Self::TimedOut { .. } => "E_POLL_TIMEOUT",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Submit(e) | Self::Poll(e) if e.retryable())
    }
}

// =============================================================================
// RUN DRIVER
// =============================================================================

/// Drive one cell run to completion: submit, then poll until the task is
/// ready, the poll budget runs out, or a non-retryable error occurs.
///
/// Transient poll errors (transport failures, HTTP 429/5xx) consume an
/// attempt and retry on the same schedule.
///
/// # Errors
///
/// Returns a [`RunError`] describing which phase failed.
pub async fn run_cell(
    api: &dyn CellApi,
    request: &ExecuteRequest,
    policy: &PollPolicy,
) -> Result<serde_json::Value, RunError> {
    run_cell_observed(api, request, policy, |_| {}).await
}

/// [`run_cell`] with a state observer. The observer sees every transition
/// in order, ending with `Ready` or `Failed`.
///
/// # Errors
///
/// Returns a [`RunError`] describing which phase failed.
pub async fn run_cell_observed(
    api: &dyn CellApi,
    request: &ExecuteRequest,
    policy: &PollPolicy,
    mut on_state: impl FnMut(&RunState) + Send,
) -> Result<serde_json::Value, RunError> {
    let task_id = match api.execute(request).await {
        Ok(task_id) => task_id,
        Err(e) => {
            let err = RunError::Submit(e);
            warn!(error = %err, "submit failed");
            on_state(&RunState::Failed { error: err.to_string() });
            return Err(err);
        }
    };
    info!(%task_id, cell_type = %request.cell_type, "cell submitted");
    on_state(&RunState::Submitted { task_id: task_id.clone() });

    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(policy.delay_for(attempt)).await;
        on_state(&RunState::Polling { task_id: task_id.clone(), attempt });

        match api.poll(&task_id).await {
            Ok(TaskStatus::Ready(result)) => {
                info!(%task_id, attempt, "cell ready");
                on_state(&RunState::Ready { result: result.clone() });
                return Ok(result);
            }
            Ok(TaskStatus::Pending) => {}
            Err(e) if e.retryable() => {
                warn!(%task_id, attempt, error = %e, "poll failed, retrying");
            }
            Err(e) => {
                let err = RunError::Poll(e);
                warn!(%task_id, attempt, error = %err, "poll failed");
                on_state(&RunState::Failed { error: err.to_string() });
                return Err(err);
            }
        }
    }

    let err = RunError::TimedOut { task_id: task_id.clone(), attempts: policy.max_attempts };
    warn!(%task_id, attempts = policy.max_attempts, "poll budget exhausted");
    on_state(&RunState::Failed { error: err.to_string() });
    Err(err)
}

// =============================================================================
// SQL CELL
// =============================================================================

/// Fixed cell configuration supplied at creation, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellConfig {
    pub connection: String,
    pub result_var: String,
    pub dtype: String,
    pub session_id: Option<String>,
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            connection: String::new(),
            result_var: DEFAULT_RESULT_VAR.to_string(),
            dtype: DEFAULT_DTYPE.to_string(),
            session_id: None,
        }
    }
}

/// A headless SQL cell: an editable source buffer plus the shared state of
/// its runs. Cheap to clone; clones share the same slot.
#[derive(Clone)]
pub struct SqlCell {
    inner: Arc<CellInner>,
}

struct CellInner {
    config: CellConfig,
    source: Mutex<String>,
    slot: Mutex<CellSlot>,
}

/// Observable state shared by all clones of a cell. `generation` counts
/// started runs; only the run holding the current generation may write.
struct CellSlot {
    generation: u64,
    state: RunState,
    result: Option<serde_json::Value>,
}

impl CellInner {
    fn lock_slot(&self) -> std::sync::MutexGuard<'_, CellSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the next generation for a starting run.
    fn begin_run(&self) -> u64 {
        let mut slot = self.lock_slot();
        slot.generation += 1;
        slot.generation
    }

    /// Mirror a run transition into the slot unless the run was superseded.
    fn publish(&self, generation: u64, state: &RunState) {
        let mut slot = self.lock_slot();
        if slot.generation != generation {
            return;
        }
        if let RunState::Ready { result } = state {
            slot.result = Some(result.clone());
        }
        slot.state = state.clone();
    }
}

impl SqlCell {
    #[must_use]
    pub fn new(config: CellConfig) -> Self {
        Self::with_source(config, String::new())
    }

    #[must_use]
    pub fn with_source(config: CellConfig, source: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(CellInner {
                config,
                source: Mutex::new(source.into()),
                slot: Mutex::new(CellSlot { generation: 0, state: RunState::Idle, result: None }),
            }),
        }
    }

    /// Replace the source text. Purely in-memory; nothing is submitted.
    pub fn set_source(&self, source: impl Into<String>) {
        *self.inner.source.lock().unwrap_or_else(PoisonError::into_inner) = source.into();
    }

    /// Current source text.
    #[must_use]
    pub fn source(&self) -> String {
        self.inner
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// State of the newest run.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.inner.lock_slot().state.clone()
    }

    /// Task id of the newest run, while it is in flight.
    #[must_use]
    pub fn task_id(&self) -> Option<String> {
        match &self.inner.lock_slot().state {
            RunState::Submitted { task_id } | RunState::Polling { task_id, .. } => Some(task_id.clone()),
            _ => None,
        }
    }

    /// Last published result payload. Survives the start of a new run until
    /// that run publishes its own payload.
    #[must_use]
    pub fn result(&self) -> Option<serde_json::Value> {
        self.inner.lock_slot().result.clone()
    }

    /// Run the current source against the backend.
    ///
    /// Claims the next generation: earlier in-flight runs keep polling to
    /// completion but can no longer write the shared slot. Returns this
    /// run's own outcome regardless of whether it was superseded.
    ///
    /// # Errors
    ///
    /// Returns a [`RunError`] describing which phase failed.
    pub async fn run(&self, api: &dyn CellApi, policy: &PollPolicy) -> Result<serde_json::Value, RunError> {
        let generation = self.inner.begin_run();
        let request = self.execute_request();
        run_cell_observed(api, &request, policy, |state| self.inner.publish(generation, state)).await
    }

    fn execute_request(&self) -> ExecuteRequest {
        ExecuteRequest {
            cell_type: CellKind::Sql,
            source: self.source(),
            connection: self.inner.config.connection.clone(),
            result_var: self.inner.config.result_var.clone(),
            dtype: self.inner.config.dtype.clone(),
            session_id: self.inner.config.session_id.clone(),
        }
    }
}

// =============================================================================
// NOTEBOOK RUNNER
// =============================================================================

/// Outcome of a whole-notebook run. Markdown cells are not counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotebookRunReport {
    /// Runnable cells that finished with a payload.
    pub executed: usize,
    /// Runnable cells whose run failed; each carries an error output.
    pub failed: usize,
    /// Runnable cells not attempted after an earlier failure.
    pub skipped: usize,
}

/// Execute every runnable cell in document order, embedding each payload as
/// that cell's `output`.
///
/// Cells share one backend session so state (variables, attached databases)
/// carries across cells; runs are sequential for the same reason. A failed
/// cell records a structured error output and, unless `keep_going` is set,
/// the remaining runnable cells are skipped.
pub async fn run_notebook(
    api: &dyn CellApi,
    notebook: &mut Notebook,
    policy: &PollPolicy,
    session_id: &str,
    keep_going: bool,
) -> NotebookRunReport {
    let mut report = NotebookRunReport { executed: 0, failed: 0, skipped: 0 };
    let total = notebook.cells.len();

    for (index, cell) in notebook.cells.iter_mut().enumerate() {
        let Some(request) = cell_request(cell, session_id) else {
            continue;
        };
        if report.failed > 0 && !keep_going {
            report.skipped += 1;
            continue;
        }

        info!(cell = index + 1, total, cell_type = %request.cell_type, "running cell");
        match run_cell(api, &request, policy).await {
            Ok(result) => {
                set_output(cell, result);
                report.executed += 1;
            }
            Err(e) => {
                warn!(cell = index + 1, error = %e, "cell failed");
                set_output(cell, json!({ "status": "error", "error": e.to_string(), "code": e.error_code() }));
                report.failed += 1;
            }
        }
    }

    info!(
        executed = report.executed,
        failed = report.failed,
        skipped = report.skipped,
        "notebook run complete"
    );
    report
}

fn cell_request(cell: &Cell, session_id: &str) -> Option<ExecuteRequest> {
    match cell {
        Cell::Markdown { .. } => None,
        Cell::Sql { source, meta, .. } => Some(ExecuteRequest {
            cell_type: CellKind::Sql,
            source: source.clone(),
            connection: meta.connection.clone().unwrap_or_default(),
            result_var: meta
                .result_var
                .clone()
                .unwrap_or_else(|| DEFAULT_RESULT_VAR.to_string()),
            dtype: meta.dtype.clone().unwrap_or_else(|| DEFAULT_DTYPE.to_string()),
            session_id: Some(session_id.to_owned()),
        }),
        Cell::Python { source, .. } => Some(ExecuteRequest {
            cell_type: CellKind::Python,
            source: source.clone(),
            connection: String::new(),
            result_var: DEFAULT_RESULT_VAR.to_string(),
            dtype: DEFAULT_DTYPE.to_string(),
            session_id: Some(session_id.to_owned()),
        }),
    }
}

fn set_output(cell: &mut Cell, payload: serde_json::Value) {
    match cell {
        Cell::Markdown { .. } => {}
        Cell::Sql { output, .. } | Cell::Python { output, .. } => *output = Some(payload),
    }
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
