//! Static HTML export of a notebook.
//!
//! Produces one self-contained page: markdown cells as text blocks, code
//! cells as `<pre>` blocks, each executed cell followed by its
//! pretty-printed output payload. All interpolated text is escaped.

use std::fmt::Write;

use crate::notebook::{Cell, Notebook};

const PAGE_STYLE: &str = "body{font-family: Arial, sans-serif; padding:20px} pre{background:#f6f8fa;padding:10px}";
const CELL_STYLE: &str = "border:1px solid #eee;padding:10px;margin:8px 0";
const DEFAULT_TITLE: &str = "Notebook";

/// Render a notebook as a self-contained HTML document.
#[must_use]
pub fn render_static(notebook: &Notebook) -> String {
    let title = escape_html(notebook.metadata.title.as_deref().unwrap_or(DEFAULT_TITLE));

    let mut html = String::new();
    let _ = writeln!(html, "<!doctype html>");
    let _ = writeln!(html, "<html>");
    let _ = writeln!(html, "<head>");
    let _ = writeln!(html, "  <meta charset=\"utf-8\"/>");
    let _ = writeln!(html, "  <title>{title}</title>");
    let _ = writeln!(html, "  <style>{PAGE_STYLE}</style>");
    let _ = writeln!(html, "</head>");
    let _ = writeln!(html, "<body>");
    let _ = writeln!(html, "  <h1>{title}</h1>");

    for cell in &notebook.cells {
        match cell {
            Cell::Markdown { source } => {
                let _ = writeln!(html, "  <div class=\"md\">{}</div>", escape_html(source));
            }
            Cell::Sql { source, output, .. } | Cell::Python { source, output, .. } => {
                let _ = writeln!(html, "  <div style=\"{CELL_STYLE}\">");
                let _ = writeln!(html, "    <pre>{}</pre>", escape_html(source));
                if let Some(output) = output {
                    let rendered = serde_json::to_string_pretty(output).unwrap_or_default();
                    let _ = writeln!(html, "    <div><b>Output:</b><pre>{}</pre></div>", escape_html(&rendered));
                }
                let _ = writeln!(html, "  </div>");
            }
        }
    }

    let _ = writeln!(html, "</body>");
    let _ = writeln!(html, "</html>");
    html
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
#[path = "export_test.rs"]
mod tests;
