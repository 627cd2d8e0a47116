use super::*;
use serde_json::json;

// =========================================================================
// Deserialization
// =========================================================================

#[test]
fn parses_a_full_notebook() {
    let notebook = Notebook::from_json(
        r##"{
            "metadata": { "title": "Demo", "author": "ana" },
            "cells": [
                { "type": "markdown", "source": "# Hello" },
                {
                    "type": "sql",
                    "source": "SELECT 1",
                    "meta": { "connection": "duckdb:///:memory:", "result": "out" }
                },
                { "type": "python", "source": "print(out)", "output": { "stdout": "1" } }
            ]
        }"##,
    )
    .unwrap();

    assert_eq!(notebook.metadata.title.as_deref(), Some("Demo"));
    assert_eq!(notebook.metadata.extra.get("author"), Some(&json!("ana")));
    assert_eq!(notebook.cells.len(), 3);

    assert_eq!(notebook.cells[0], Cell::Markdown { source: "# Hello".into() });
    let Cell::Sql { source, meta, output } = &notebook.cells[1] else {
        panic!("expected a sql cell");
    };
    assert_eq!(source, "SELECT 1");
    assert_eq!(meta.connection.as_deref(), Some("duckdb:///:memory:"));
    assert_eq!(meta.result_var.as_deref(), Some("out"));
    assert_eq!(meta.dtype, None);
    assert_eq!(*output, None);
    assert_eq!(notebook.cells[2].output(), Some(&json!({ "stdout": "1" })));
}

#[test]
fn missing_metadata_and_cells_default() {
    let notebook = Notebook::from_json("{}").unwrap();
    assert_eq!(notebook.metadata, Metadata::default());
    assert!(notebook.cells.is_empty());
}

#[test]
fn sql_cell_without_meta_gets_defaults() {
    let notebook = Notebook::from_json(r#"{ "cells": [{ "type": "sql", "source": "SELECT 1" }] }"#).unwrap();
    let Cell::Sql { meta, .. } = &notebook.cells[0] else {
        panic!("expected a sql cell");
    };
    assert_eq!(*meta, SqlMeta::default());
}

#[test]
fn unknown_cell_type_is_rejected() {
    let err = Notebook::from_json(r#"{ "cells": [{ "type": "scala", "source": "x" }] }"#).unwrap_err();
    assert!(matches!(err, NotebookError::Json(_)));
}

#[test]
fn invalid_json_is_rejected() {
    assert!(Notebook::from_json("not json").is_err());
}

// =========================================================================
// Serialization
// =========================================================================

#[test]
fn round_trip_preserves_unknown_keys() {
    let mut meta_extra = serde_json::Map::new();
    meta_extra.insert("timeout".into(), json!("30"));
    let mut extra = serde_json::Map::new();
    extra.insert("kernel".into(), json!("duckdb"));

    let notebook = Notebook {
        metadata: Metadata { title: Some("T".into()), extra },
        cells: vec![Cell::Sql {
            source: "SELECT 1".into(),
            meta: SqlMeta { connection: Some("c".into()), extra: meta_extra, ..SqlMeta::default() },
            output: None,
        }],
    };

    let reloaded = Notebook::from_json(&notebook.to_json().unwrap()).unwrap();
    assert_eq!(reloaded, notebook);
}

#[test]
fn output_is_omitted_until_present() {
    let mut notebook = Notebook {
        metadata: Metadata::default(),
        cells: vec![Cell::Python { source: "1 + 1".into(), output: None }],
    };
    assert!(!notebook.to_json().unwrap().contains("output"));

    notebook.cells[0] = Cell::Python { source: "1 + 1".into(), output: Some(json!(2)) };
    let json = notebook.to_json().unwrap();
    let reloaded = Notebook::from_json(&json).unwrap();
    assert_eq!(reloaded.cells[0].output(), Some(&json!(2)));
}

// =========================================================================
// Accessors
// =========================================================================

#[test]
fn source_and_output_cover_all_variants() {
    let markdown = Cell::Markdown { source: "m".into() };
    let sql = Cell::Sql { source: "s".into(), meta: SqlMeta::default(), output: Some(json!(1)) };
    let python = Cell::Python { source: "p".into(), output: None };

    assert_eq!(markdown.source(), "m");
    assert_eq!(sql.source(), "s");
    assert_eq!(python.source(), "p");

    assert_eq!(markdown.output(), None);
    assert_eq!(sql.output(), Some(&json!(1)));
    assert_eq!(python.output(), None);
}
