//! Notebook model and formats.
//!
//! A notebook is JSON (`.ngnb`): `{ "metadata": {...}, "cells": [...] }`
//! with markdown, sql, and python cells. Executed cells carry an embedded
//! `output` payload. The `script` submodule converts to and from the
//! `# %%` cell-marker script form.

pub mod script;

use serde::{Deserialize, Serialize};

pub use script::{notebook_to_script, script_to_notebook};

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by notebook loading, saving, and conversion.
#[derive(Debug, thiserror::Error)]
pub enum NotebookError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The JSON is unreadable or a cell has an unknown `type`.
    #[error("invalid notebook: {0}")]
    Json(#[from] serde_json::Error),
}

impl crate::api::ErrorCode for NotebookError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "E_IO",
            Self::Json(_) => "E_NOTEBOOK_JSON",
        }
    }
}

// =============================================================================
// MODEL
// =============================================================================

/// Notebook-level metadata. Unknown keys are preserved across load/save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Per-cell configuration of a sql cell. All fields are optional on disk;
/// unknown keys (e.g. from a hand-written script header) are preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
    #[serde(default, rename = "result", skip_serializing_if = "Option::is_none")]
    pub result_var: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A notebook cell. `type` discriminates on disk; unknown types are
/// rejected at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Cell {
    Markdown {
        source: String,
    },
    Sql {
        source: String,
        #[serde(default)]
        meta: SqlMeta,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<serde_json::Value>,
    },
    Python {
        source: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<serde_json::Value>,
    },
}

impl Cell {
    /// The cell's source text.
    #[must_use]
    pub fn source(&self) -> &str {
        match self {
            Cell::Markdown { source } | Cell::Sql { source, .. } | Cell::Python { source, .. } => source,
        }
    }

    /// The embedded output payload, if the cell has been executed.
    #[must_use]
    pub fn output(&self) -> Option<&serde_json::Value> {
        match self {
            Cell::Markdown { .. } => None,
            Cell::Sql { output, .. } | Cell::Python { output, .. } => output.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub cells: Vec<Cell>,
}

// =============================================================================
// JSON I/O
// =============================================================================

impl Notebook {
    /// Parse a notebook from `.ngnb` JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`NotebookError::Json`] for unreadable JSON or an unknown
    /// cell type.
    pub fn from_json(json: &str) -> Result<Self, NotebookError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Render the notebook as pretty-printed `.ngnb` JSON.
    ///
    /// # Errors
    ///
    /// Returns [`NotebookError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String, NotebookError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a notebook from an `.ngnb` file.
    ///
    /// # Errors
    ///
    /// Returns [`NotebookError::Io`] or [`NotebookError::Json`].
    pub fn load(path: &std::path::Path) -> Result<Self, NotebookError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Write the notebook to an `.ngnb` file.
    ///
    /// # Errors
    ///
    /// Returns [`NotebookError::Io`] or [`NotebookError::Json`].
    pub fn save(&self, path: &std::path::Path) -> Result<(), NotebookError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
