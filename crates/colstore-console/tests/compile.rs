use std::io::Write;

use colstore_console::{ConsoleError, IndexSpec, compile_file};
use colstore_core::schema::{CellNameType, ColumnKind};

fn definition_file(json: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

#[test]
fn test_compile_file_with_index() {
    let file = definition_file(
        r#"{
            "keyspace": "ks",
            "name": "events",
            "columns": [
                {"name": "id", "type": "uuid"},
                {"name": "at", "type": "timestamp"},
                {"name": "kind", "type": "text"}
            ],
            "partition_key_groups": [["id"]],
            "clustering_columns": ["at"],
            "clustering_order": [{"column": "at", "direction": "desc"}]
        }"#,
    );
    let specs = vec!["kind=by_kind".parse::<IndexSpec>().unwrap()];
    let output = compile_file(file.path(), &specs).unwrap();
    assert_eq!(output.table.role("kind"), Some(ColumnKind::Regular));
    assert!(matches!(
        output.table.comparator(),
        CellNameType::CompoundSparse { .. }
    ));
    assert_eq!(output.indexes[0].id(), "ks.events.by_kind");
}

#[test]
fn test_schema_error_is_reported() {
    let file = definition_file(
        r#"{
            "keyspace": "ks",
            "name": "t",
            "columns": [
                {"name": "id", "type": "int"},
                {"name": "s", "type": "int", "static": true}
            ],
            "partition_key_groups": [["id"]]
        }"#,
    );
    let err = compile_file(file.path(), &[]).unwrap_err();
    assert!(matches!(err, ConsoleError::Core(_)));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = compile_file(&dir.path().join("absent.json"), &[]).unwrap_err();
    assert!(matches!(err, ConsoleError::Read { .. }));
}

#[test]
fn test_malformed_json() {
    let file = definition_file("{ not json");
    let err = compile_file(file.path(), &[]).unwrap_err();
    assert!(matches!(err, ConsoleError::Definition(_)));
}
