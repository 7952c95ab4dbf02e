use std::fmt::Write;

use colstore_core::index::IndexDescriptor;
use colstore_core::schema::{ColumnKind, CompactValue, ResolvedTableSchema};
use serde_json::{Value, json};

use crate::CompileOutput;

/// Output mode for rendering compiled schemas.
pub enum OutputMode {
    /// Human-readable output.
    Pretty,
    /// One JSON object on stdout.
    Json,
}

pub fn render(output: &CompileOutput, mode: &OutputMode) -> String {
    match mode {
        OutputMode::Pretty => pretty(output),
        OutputMode::Json => to_json(output).to_string(),
    }
}

pub fn to_json(output: &CompileOutput) -> Value {
    let indexes: Vec<Value> = output
        .indexes
        .iter()
        .map(|index| {
            json!({
                "id": index.id(),
                "name": index.name(),
                "column": index.column(),
                "target": index.target(),
                "schema": index.index_schema(),
            })
        })
        .collect();
    json!({
        "table": output.table.as_ref(),
        "schema_version": format!("{:016x}", output.table.schema_version()),
        "indexes": indexes,
    })
}

fn pretty(output: &CompileOutput) -> String {
    let mut out = String::new();
    write_table(&mut out, "table", &output.table);
    for index in &output.indexes {
        out.push('\n');
        write_index(&mut out, index);
    }
    out
}

fn kind_label(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::PartitionKey => "partition key",
        ColumnKind::ClusteringKey => "clustering",
        ColumnKind::Static => "static",
        ColumnKind::Regular => "regular",
        ColumnKind::CompactValue => "compact value",
    }
}

fn write_table(out: &mut String, label: &str, schema: &ResolvedTableSchema) {
    let compact_value = match schema.compact_value() {
        Some(CompactValue::Column(name)) => name.as_str(),
        Some(CompactValue::Empty) => "(empty)",
        None => "(none)",
    };
    // Writing into a String cannot fail.
    let _ = writeln!(out, "{label} {}", schema.id());
    let _ = writeln!(out, "  key:           {}", schema.key_encoding());
    let _ = writeln!(out, "  comparator:    {}", schema.comparator());
    let _ = writeln!(out, "  default:       {}", schema.default_validator());
    let _ = writeln!(out, "  dense:         {}", schema.is_dense());
    let _ = writeln!(out, "  compact:       {}", schema.is_compact());
    let _ = writeln!(out, "  compact value: {compact_value}");
    let _ = writeln!(out, "  version:       {:016x}", schema.schema_version());

    let width = schema
        .columns()
        .iter()
        .map(|c| c.name.len())
        .max()
        .unwrap_or(0);
    let _ = writeln!(out, "  columns:");
    for column in schema.columns() {
        let position = column
            .component_index
            .map(|i| format!(" #{i}"))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "    {:<width$}  {:<20}  {}{position}",
            column.name,
            column.data_type.to_string(),
            kind_label(column.kind),
        );
    }
}

fn write_index(out: &mut String, index: &IndexDescriptor) {
    write_table(out, "index", index.index_schema());
    let _ = writeln!(out, "  on column:     {}", index.column());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IndexSpec, compile};
    use colstore_core::schema::TableDefinitionBuilder;
    use colstore_core::types::{DataType, NativeType};

    fn output() -> CompileOutput {
        let definition = TableDefinitionBuilder::new("ks", "users")
            .column("id", DataType::Native(NativeType::Uuid))
            .column("email", DataType::TEXT)
            .partition_key(&["id"])
            .build();
        let spec = IndexSpec {
            column: "email".into(),
            name: None,
        };
        compile(&definition, &[spec]).unwrap()
    }

    #[test]
    fn test_pretty_lists_table_and_index() {
        let text = render(&output(), &OutputMode::Pretty);
        assert!(text.contains("table ks.users"));
        assert!(text.contains("index ks.users.email"));
        assert!(text.contains("partition key"));
    }

    #[test]
    fn test_json_round_trips_schema() {
        let value = to_json(&output());
        let table: ResolvedTableSchema = serde_json::from_value(value["table"].clone()).unwrap();
        assert_eq!(table, *output().table);
        assert_eq!(value["indexes"][0]["name"], "email");
    }
}
