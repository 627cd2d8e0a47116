use super::*;
use serde_json::json;

// =========================================================================
// Notebook -> script
// =========================================================================

#[test]
fn renders_all_cell_kinds() {
    let notebook = Notebook {
        metadata: Metadata::default(),
        cells: vec![
            Cell::Markdown { source: "# Title\nSome text".into() },
            Cell::Sql {
                source: "SELECT 1".into(),
                meta: SqlMeta {
                    connection: Some("duckdb:///db.duckdb".into()),
                    result_var: Some("out".into()),
                    dtype: Some("polars".into()),
                    extra: serde_json::Map::new(),
                },
                output: Some(json!({ "rows": 1 })),
            },
            Cell::Python { source: "print(out)".into(), output: None },
        ],
    };

    // Outputs do not survive the script form.
    assert_eq!(
        notebook_to_script(&notebook),
        "# %% [markdown]\n\
         # # Title\n\
         # Some text\n\
         \n\
         # %% [sql]\n\
         %%sql connection=duckdb:///db.duckdb result=out dtype=polars\n\
         SELECT 1\n\
         \n\
         # %% [python]\n\
         print(out)"
    );
}

#[test]
fn sql_header_defaults_when_meta_is_empty() {
    let notebook = Notebook {
        metadata: Metadata::default(),
        cells: vec![Cell::Sql { source: "SELECT 1".into(), meta: SqlMeta::default(), output: None }],
    };
    assert_eq!(
        notebook_to_script(&notebook),
        "# %% [sql]\n%%sql connection=duckdb:///:memory: result= dtype=pandas\nSELECT 1"
    );
}

// =========================================================================
// Script -> notebook
// =========================================================================

#[test]
fn parses_markdown_sql_and_python_blocks() {
    let notebook = script_to_notebook(
        "# %% [markdown]\n# # Title\n\n# %% [sql]\n%%sql connection=c result=out dtype=pandas\nSELECT 1\n\n# %% [python]\nprint(out)",
    );

    assert_eq!(notebook.cells.len(), 3);
    assert_eq!(notebook.cells[0], Cell::Markdown { source: "# Title".into() });
    assert_eq!(
        notebook.cells[1],
        Cell::Sql {
            source: "SELECT 1".into(),
            meta: SqlMeta {
                connection: Some("c".into()),
                result_var: Some("out".into()),
                dtype: Some("pandas".into()),
                extra: serde_json::Map::new(),
            },
            output: None,
        }
    );
    assert_eq!(notebook.cells[2], Cell::Python { source: "print(out)".into(), output: None });
}

#[test]
fn sql_header_keeps_unknown_keys_and_empty_values() {
    let notebook = script_to_notebook("# %% [sql]\n%%sql connection=c result= dtype=pandas timeout=30\nSELECT 1");

    let Cell::Sql { source, meta, .. } = &notebook.cells[0] else {
        panic!("expected a sql cell");
    };
    assert_eq!(source, "SELECT 1");
    assert_eq!(meta.connection.as_deref(), Some("c"));
    assert_eq!(meta.result_var.as_deref(), Some(""));
    assert_eq!(meta.dtype.as_deref(), Some("pandas"));
    assert_eq!(meta.extra.get("timeout"), Some(&json!("30")));
}

#[test]
fn sql_block_without_header_keeps_all_lines() {
    let notebook = script_to_notebook("# %% [sql]\nSELECT 1\nFROM t");
    assert_eq!(
        notebook.cells[0],
        Cell::Sql { source: "SELECT 1\nFROM t".into(), meta: SqlMeta::default(), output: None }
    );
}

#[test]
fn markdown_lines_without_comment_prefix_survive() {
    let notebook = script_to_notebook("# %% [markdown]\n# # Title\nraw line");
    assert_eq!(notebook.cells[0], Cell::Markdown { source: "# Title\nraw line".into() });
}

#[test]
fn text_before_the_first_marker_becomes_python() {
    let notebook = script_to_notebook("import duckdb\n\n# %% [sql]\nSELECT 1");
    assert_eq!(notebook.cells.len(), 2);
    assert_eq!(notebook.cells[0], Cell::Python { source: "import duckdb".into(), output: None });
}

#[test]
fn bare_markers_with_no_content_emit_nothing() {
    let notebook = script_to_notebook("# %%\n\n# %%\n");
    assert!(notebook.cells.is_empty());
}

#[test]
fn unlabeled_marker_with_content_is_python() {
    let notebook = script_to_notebook("# %%\nx = 1");
    assert_eq!(notebook.cells[0], Cell::Python { source: "x = 1".into(), output: None });
}

#[test]
fn unknown_labels_fall_back_to_python() {
    let notebook = script_to_notebook("# %% [r]\nsummary(df)");
    assert_eq!(notebook.cells[0], Cell::Python { source: "summary(df)".into(), output: None });
}

#[test]
fn blank_edges_are_trimmed_and_markers_may_be_indented() {
    let notebook = script_to_notebook("  # %% [python]\n\nx = 1\n\n");
    assert_eq!(notebook.cells[0], Cell::Python { source: "x = 1".into(), output: None });
}

#[test]
fn empty_script_is_an_empty_notebook() {
    assert!(script_to_notebook("").cells.is_empty());
}

// =========================================================================
// Round trip
// =========================================================================

#[test]
fn script_round_trip_preserves_output_free_cells() {
    let original = Notebook {
        metadata: Metadata::default(),
        cells: vec![
            Cell::Markdown { source: "# Title\n\nIntro text".into() },
            Cell::Sql {
                source: "SELECT *\nFROM t".into(),
                meta: SqlMeta {
                    connection: Some("duckdb:///db.duckdb".into()),
                    result_var: Some("out".into()),
                    dtype: Some("pandas".into()),
                    extra: serde_json::Map::new(),
                },
                output: None,
            },
            Cell::Python { source: "print(out)".into(), output: None },
        ],
    };

    let reparsed = script_to_notebook(&notebook_to_script(&original));
    assert_eq!(reparsed, original);
}
