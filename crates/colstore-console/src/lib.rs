//! Compile table definitions from JSON files and derive their index schemas.

pub mod display;
pub mod error;

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use colstore_core::index::IndexDescriptor;
use colstore_core::schema::{LogicalTableDefinition, ResolvedTableSchema, SchemaCompiler};
use tracing::debug;

pub use error::ConsoleError;

/// An index requested on the command line: `<column>` or `<column>=<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub column: String,
    pub name: Option<String>,
}

impl FromStr for IndexSpec {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (column, name) = match s.split_once('=') {
            Some((column, name)) => (column.trim(), Some(name.trim())),
            None => (s.trim(), None),
        };
        if column.is_empty() || name.is_some_and(str::is_empty) {
            return Err(ConsoleError::IndexSpec(s.to_string()));
        }
        Ok(Self {
            column: column.to_string(),
            name: name.map(str::to_string),
        })
    }
}

/// A compiled table and the indexes derived from it.
#[derive(Debug)]
pub struct CompileOutput {
    pub table: Arc<ResolvedTableSchema>,
    pub indexes: Vec<IndexDescriptor>,
}

pub fn compile(
    definition: &LogicalTableDefinition,
    indexes: &[IndexSpec],
) -> Result<CompileOutput, ConsoleError> {
    let table = Arc::new(SchemaCompiler::compile(definition)?);
    let indexes = indexes
        .iter()
        .map(|spec| IndexDescriptor::new(Arc::clone(&table), &spec.column, spec.name.as_deref()))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(table = %table.id(), indexes = indexes.len(), "compiled definition");
    Ok(CompileOutput { table, indexes })
}

/// Read a JSON table definition from `path` and compile it.
pub fn compile_file(path: &Path, indexes: &[IndexSpec]) -> Result<CompileOutput, ConsoleError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConsoleError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let definition: LogicalTableDefinition = serde_json::from_str(&text)?;
    compile(&definition, indexes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index_spec() {
        assert_eq!(
            "email".parse::<IndexSpec>().unwrap(),
            IndexSpec {
                column: "email".into(),
                name: None
            }
        );
        assert_eq!(
            "email=by_email".parse::<IndexSpec>().unwrap(),
            IndexSpec {
                column: "email".into(),
                name: Some("by_email".into())
            }
        );
        assert!("=x".parse::<IndexSpec>().is_err());
        assert!("email=".parse::<IndexSpec>().is_err());
    }
}
