//! Logical table definitions and the accumulator that builds them.

use serde::{Deserialize, Serialize};

use crate::config::TableProperties;
use crate::error::Error;
use crate::types::{DataType, SortDirection};

use super::compiler::SchemaCompiler;
use super::resolved::ResolvedTableSchema;

/// A declared column, as handed over by the statement-preparation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default, rename = "static")]
    pub is_static: bool,
}

impl LogicalColumn {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            is_static: false,
        }
    }

    /// True when the column holds a non-frozen collection.
    pub fn is_multi_cell(&self) -> bool {
        self.data_type.is_multi_cell()
    }
}

/// One entry of a `CLUSTERING ORDER BY` directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusteringOrder {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// The unvalidated description of a table.
///
/// Columns keep their declaration order and may contain duplicates; the
/// compiler rejects them. `partition_key_groups` holds one entry per declared
/// primary key so that missing or repeated declarations can be reported.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogicalTableDefinition {
    pub keyspace: String,
    pub name: String,
    pub columns: Vec<LogicalColumn>,
    pub partition_key_groups: Vec<Vec<String>>,
    pub clustering_columns: Vec<String>,
    pub clustering_order: Vec<ClusteringOrder>,
    pub compact_storage: bool,
    pub properties: TableProperties,
}

impl LogicalTableDefinition {
    /// Look up a declared column (first declaration wins).
    pub fn column(&self, name: &str) -> Option<&LogicalColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Names of the columns declared static.
    pub fn static_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|c| c.is_static)
            .map(|c| c.name.as_str())
    }

    /// Compile this definition into a resolved schema.
    pub fn compile(&self) -> Result<ResolvedTableSchema, Error> {
        SchemaCompiler::compile(self)
    }
}

/// Accumulates table declarations before a single validation pass.
///
/// Every method only adds to the definition; nothing is checked until
/// [`finalize`](Self::finalize) hands the result to the compiler.
#[derive(Debug, Clone)]
pub struct TableDefinitionBuilder {
    definition: LogicalTableDefinition,
}

impl TableDefinitionBuilder {
    pub fn new(keyspace: &str, name: &str) -> Self {
        Self {
            definition: LogicalTableDefinition {
                keyspace: keyspace.to_string(),
                name: name.to_string(),
                ..Default::default()
            },
        }
    }

    /// Declare a column.
    pub fn column(mut self, name: &str, data_type: DataType) -> Self {
        self.definition
            .columns
            .push(LogicalColumn::new(name, data_type));
        self
    }

    /// Declare a static column.
    pub fn static_column(mut self, name: &str, data_type: DataType) -> Self {
        self.definition.columns.push(LogicalColumn {
            name: name.to_string(),
            data_type,
            is_static: true,
        });
        self
    }

    /// Declare a primary key's partition key columns. Calling this more than
    /// once records several primary keys, which the compiler rejects.
    pub fn partition_key(mut self, columns: &[&str]) -> Self {
        self.definition
            .partition_key_groups
            .push(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Append a clustering column to the primary key.
    pub fn clustering_column(mut self, name: &str) -> Self {
        self.definition.clustering_columns.push(name.to_string());
        self
    }

    /// Append an entry to the clustering order directive.
    pub fn clustering_order(mut self, column: &str, direction: SortDirection) -> Self {
        self.definition.clustering_order.push(ClusteringOrder {
            column: column.to_string(),
            direction,
        });
        self
    }

    pub fn compact_storage(mut self) -> Self {
        self.definition.compact_storage = true;
        self
    }

    pub fn properties(mut self, properties: TableProperties) -> Self {
        self.definition.properties = properties;
        self
    }

    pub fn default_time_to_live(mut self, seconds: u32) -> Self {
        self.definition.properties.default_time_to_live = seconds;
        self
    }

    pub fn comment(mut self, comment: &str) -> Self {
        self.definition.properties.comment = comment.to_string();
        self
    }

    /// Return the accumulated definition without validating it.
    pub fn build(self) -> LogicalTableDefinition {
        self.definition
    }

    /// Validate everything at once and produce the resolved schema.
    pub fn finalize(self) -> Result<ResolvedTableSchema, Error> {
        SchemaCompiler::compile(&self.definition)
    }
}
