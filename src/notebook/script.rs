//! Script form of a notebook (`# %%` cell markers).
//!
//! DESIGN
//! ======
//! Line-based: a line starting with `# %%` opens a new cell, and the
//! marker's bracket label picks the cell type (`[markdown]`, `[sql]`,
//! anything else is python). Markdown sources travel as `# `-prefixed
//! comment lines. A sql cell's first body line is a `%%sql key=value ...`
//! header carrying connection/result/dtype; unknown header keys survive
//! into the cell meta. Embedded outputs do not survive the script form.

use super::{Cell, Metadata, Notebook, SqlMeta};
use crate::api::DEFAULT_DTYPE;

/// Connection written into a sql header when the cell names none.
pub const DEFAULT_SCRIPT_CONNECTION: &str = "duckdb:///:memory:";

// =============================================================================
// NOTEBOOK -> SCRIPT
// =============================================================================

/// Render a notebook as `# %%` script text. Lossy: outputs and unknown sql
/// meta keys are not carried.
#[must_use]
pub fn notebook_to_script(notebook: &Notebook) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cell in &notebook.cells {
        match cell {
            Cell::Markdown { source } => {
                let commented: Vec<String> = source.lines().map(|line| format!("# {line}")).collect();
                parts.push(format!("# %% [markdown]\n{}", commented.join("\n")));
            }
            Cell::Sql { source, meta, .. } => {
                let connection = meta.connection.as_deref().unwrap_or(DEFAULT_SCRIPT_CONNECTION);
                let result_var = meta.result_var.as_deref().unwrap_or("");
                let dtype = meta.dtype.as_deref().unwrap_or(DEFAULT_DTYPE);
                parts.push(format!(
                    "# %% [sql]\n%%sql connection={connection} result={result_var} dtype={dtype}\n{source}"
                ));
            }
            Cell::Python { source, .. } => {
                parts.push(format!("# %% [python]\n{source}"));
            }
        }
    }
    parts.join("\n\n")
}

// =============================================================================
// SCRIPT -> NOTEBOOK
// =============================================================================

/// Parse `# %%` script text into a notebook.
///
/// Total: any text is a valid script. Text before the first marker becomes
/// a python cell. Blank lines around each cell body are trimmed.
#[must_use]
pub fn script_to_notebook(script: &str) -> Notebook {
    let mut cells: Vec<Cell> = Vec::new();
    // None until the first marker line is seen.
    let mut label: Option<String> = None;
    let mut body: Vec<&str> = Vec::new();

    for line in script.lines() {
        if let Some(rest) = line.trim_start().strip_prefix("# %%") {
            flush_block(&mut cells, label.as_deref(), &body);
            label = Some(rest.trim().to_owned());
            body.clear();
        } else {
            body.push(line);
        }
    }
    flush_block(&mut cells, label.as_deref(), &body);

    Notebook { metadata: Metadata::default(), cells }
}

fn flush_block(cells: &mut Vec<Cell>, label: Option<&str>, lines: &[&str]) {
    let lines = trim_blank_edges(lines);

    let Some(label) = label else {
        // Preamble before the first marker: keep it when it has content.
        if !lines.is_empty() {
            cells.push(Cell::Python { source: lines.join("\n"), output: None });
        }
        return;
    };

    // A bare `# %%` with nothing under it emits no cell.
    if label.is_empty() && lines.is_empty() {
        return;
    }

    if label == "[markdown]" {
        let source: Vec<&str> = lines
            .iter()
            .map(|line| line.strip_prefix("# ").unwrap_or(line))
            .collect();
        cells.push(Cell::Markdown { source: source.join("\n") });
    } else if label == "[sql]" {
        let (meta, source_lines) = match lines.first() {
            Some(first) if first.trim_start().starts_with("%%sql") => (parse_sql_header(first), &lines[1..]),
            _ => (SqlMeta::default(), lines),
        };
        cells.push(Cell::Sql { source: source_lines.join("\n"), meta, output: None });
    } else {
        cells.push(Cell::Python { source: lines.join("\n"), output: None });
    }
}

/// Parse a `%%sql key=value ...` header line. Tokens without `=` (including
/// the `%%sql` marker itself) are ignored.
fn parse_sql_header(header: &str) -> SqlMeta {
    let mut meta = SqlMeta::default();
    for token in header.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        match key {
            "connection" => meta.connection = Some(value.to_owned()),
            "result" => meta.result_var = Some(value.to_owned()),
            "dtype" => meta.dtype = Some(value.to_owned()),
            _ => {
                meta.extra
                    .insert(key.to_owned(), serde_json::Value::String(value.to_owned()));
            }
        }
    }
    meta
}

fn trim_blank_edges<'a>(lines: &'a [&'a str]) -> &'a [&'a str] {
    let Some(start) = lines.iter().position(|line| !line.trim().is_empty()) else {
        return &[];
    };
    let end = lines
        .iter()
        .rposition(|line| !line.trim().is_empty())
        .unwrap_or(start);
    &lines[start..=end]
}

#[cfg(test)]
#[path = "script_test.rs"]
mod tests;
