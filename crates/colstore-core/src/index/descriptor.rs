//! Metadata describing one secondary index.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::encoding::display_value;
use crate::error::Error;
use crate::schema::ResolvedTableSchema;
use crate::types::DataType;

use super::builder::{IndexSchemaBuilder, IndexTarget};

/// Comparison operator of an index expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
    Contains,
    ContainsKey,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operator::Eq => "=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Contains => "CONTAINS",
            Operator::ContainsKey => "CONTAINS KEY",
        })
    }
}

/// An index on one column of a base table, with the schema of the table
/// storing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    base: Arc<ResolvedTableSchema>,
    column: String,
    index_name: Option<String>,
    target: IndexTarget,
    index_schema: ResolvedTableSchema,
}

impl IndexDescriptor {
    pub fn new(
        base: Arc<ResolvedTableSchema>,
        column: &str,
        index_name: Option<&str>,
    ) -> Result<Self, Error> {
        let (index_schema, target) = IndexSchemaBuilder::build(&base, column, index_name)?;
        Ok(Self {
            base,
            column: column.to_string(),
            index_name: index_name.map(str::to_string),
            target,
            index_schema,
        })
    }

    /// The same index over a new version of its base table.
    pub fn rebased(&self, base: Arc<ResolvedTableSchema>) -> Result<Self, Error> {
        Self::new(base, &self.column, self.index_name.as_deref())
    }

    pub fn base(&self) -> &Arc<ResolvedTableSchema> {
        &self.base
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn index_name(&self) -> Option<&str> {
        self.index_name.as_deref()
    }

    /// The explicit index name, or the column name for unnamed indexes.
    pub fn name(&self) -> &str {
        self.index_name.as_deref().unwrap_or(&self.column)
    }

    pub fn target(&self) -> IndexTarget {
        self.target
    }

    pub fn index_schema(&self) -> &ResolvedTableSchema {
        &self.index_schema
    }

    /// `keyspace.table` of the index table.
    pub fn id(&self) -> String {
        self.index_schema.id()
    }

    /// Type of the indexed values.
    pub fn indexed_type(&self) -> &DataType {
        self.index_schema.key_encoding().component_types()[0].base()
    }

    /// Render a query expression against this index, e.g. `'users.email = a@b'`.
    pub fn expression_string(&self, operator: Operator, value: &[u8]) -> String {
        format!(
            "'{}.{} {} {}'",
            self.base.name(),
            self.column,
            operator,
            display_value(self.indexed_type(), value)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TableDefinitionBuilder;
    use crate::types::NativeType;

    fn base() -> Arc<ResolvedTableSchema> {
        let schema = TableDefinitionBuilder::new("ks", "users")
            .column("id", DataType::Native(NativeType::Int))
            .column("email", DataType::TEXT)
            .column("age", DataType::Native(NativeType::Int))
            .partition_key(&["id"])
            .finalize()
            .unwrap();
        Arc::new(schema)
    }

    #[test]
    fn test_expression_string() {
        let descriptor = IndexDescriptor::new(base(), "email", None).unwrap();
        assert_eq!(
            descriptor.expression_string(Operator::Eq, b"a@b"),
            "'users.email = a@b'"
        );
        let descriptor = IndexDescriptor::new(base(), "age", Some("by_age")).unwrap();
        assert_eq!(
            descriptor.expression_string(Operator::Gte, &42i32.to_be_bytes()),
            "'users.age >= 42'"
        );
    }

    #[test]
    fn test_names() {
        let descriptor = IndexDescriptor::new(base(), "age", Some("by_age")).unwrap();
        assert_eq!(descriptor.name(), "by_age");
        assert_eq!(descriptor.id(), "ks.users.by_age");
        let unnamed = IndexDescriptor::new(base(), "age", None).unwrap();
        assert_eq!(unnamed.name(), "age");
        assert_eq!(unnamed.id(), "ks.users.age");
    }

    #[test]
    fn test_serializes_losslessly() {
        let descriptor = IndexDescriptor::new(base(), "email", Some("by_email")).unwrap();
        let json = serde_json::to_string(&descriptor).unwrap();
        let back: IndexDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, descriptor);
    }
}
